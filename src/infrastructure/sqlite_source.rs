// SQLite query source - read-only parameterized statements
use crate::domain::error::{DashboardError, DashboardResult};
use crate::domain::table::{RawTable, Scalar};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Run `sql` with `params` on the blocking pool
    pub async fn query(&self, sql: &str, params: &[Scalar]) -> DashboardResult<RawTable> {
        let path = self.path.clone();
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || run_query(&path, &sql, &params))
            .await
            .map_err(|e| DashboardError::unavailable(format!("query task failed: {}", e)))?
    }
}

fn open_readonly(path: &Path) -> DashboardResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| DashboardError::unavailable(format!("open {}: {}", path.display(), e)))?;
    conn.execute_batch("PRAGMA query_only=ON; PRAGMA temp_store=MEMORY;")
        .map_err(|e| DashboardError::unavailable(e.to_string()))?;
    Ok(conn)
}

fn run_query(path: &Path, sql: &str, params: &[Scalar]) -> DashboardResult<RawTable> {
    let conn = open_readonly(path)?;
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DashboardError::unavailable(format!("prepare failed: {}", e)))?;
    if !stmt.readonly() {
        return Err(DashboardError::malformed("statement is not read-only"));
    }
    if stmt.parameter_count() != params.len() {
        return Err(DashboardError::malformed(format!(
            "statement takes {} parameters, {} bound",
            stmt.parameter_count(),
            params.len()
        )));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let binds = params.iter().map(to_sql_value);

    let mut rows = stmt
        .query(params_from_iter(binds))
        .map_err(|e| DashboardError::unavailable(format!("query failed: {}", e)))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| DashboardError::unavailable(format!("row read failed: {}", e)))?
    {
        let cells = (0..width)
            .map(|i| {
                row.get_ref(i)
                    .map(from_sql_value)
                    .map_err(|e| DashboardError::malformed(e.to_string()))
            })
            .collect::<DashboardResult<Vec<_>>>()?;
        out.push(cells);
    }

    tracing::debug!(rows = out.len(), columns = width, "query complete");
    Ok(RawTable::new(columns, out))
}

fn to_sql_value(scalar: &Scalar) -> SqlValue {
    match scalar {
        Scalar::Null => SqlValue::Null,
        // Whole numbers bind as integers so `WHERE year = ?` matches INTEGER columns
        Scalar::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => SqlValue::Integer(*n as i64),
        Scalar::Number(n) => SqlValue::Real(*n),
        Scalar::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Scalar {
    match value {
        ValueRef::Null => Scalar::Null,
        ValueRef::Integer(i) => Scalar::Number(i as f64),
        ValueRef::Real(f) => Scalar::Number(f),
        ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Scalar::Text(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("civic.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE population_cover (County TEXT, Population INTEGER, Share REAL);
             INSERT INTO population_cover VALUES ('Honolulu', 1016508, 0.70);
             INSERT INTO population_cover VALUES ('Hawaii', 200629, NULL);
             INSERT INTO population_cover VALUES ('Maui', 164221, 0.11);",
        )
        .unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_query_returns_rows_in_order() {
        let (_dir, path) = fixture();
        let source = SqliteSource::new(&path);
        let table = source
            .query("SELECT County, Population, Share FROM population_cover ORDER BY rowid", &[])
            .await
            .unwrap();

        assert_eq!(table.columns, vec!["County", "Population", "Share"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(
            table.rows[1],
            vec![Scalar::text("Hawaii"), Scalar::Number(200629.0), Scalar::Null]
        );
    }

    #[tokio::test]
    async fn test_bind_parameters() {
        let (_dir, path) = fixture();
        let source = SqliteSource::new(&path);
        let table = source
            .query(
                "SELECT County FROM population_cover WHERE Population > ? AND County <> ?",
                &[Scalar::Number(180000.0), Scalar::text("Honolulu")],
            )
            .await
            .unwrap();
        assert_eq!(table.rows, vec![vec![Scalar::text("Hawaii")]]);
    }

    #[tokio::test]
    async fn test_numbered_parameters_and_quoted_marks() {
        let (_dir, path) = fixture();
        let source = SqliteSource::new(&path);
        let table = source
            .query(
                "SELECT County, '?' FROM population_cover WHERE Population > ?1 AND Population < ?1 * 2",
                &[Scalar::Number(150000.0)],
            )
            .await
            .unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], Scalar::text("?"));
    }

    #[tokio::test]
    async fn test_parameter_count_mismatch_is_malformed() {
        let (_dir, path) = fixture();
        let err = SqliteSource::new(&path)
            .query("SELECT County FROM population_cover WHERE Population > ?", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SourceMalformed");
    }

    #[tokio::test]
    async fn test_writes_are_rejected() {
        let (_dir, path) = fixture();
        let source = SqliteSource::new(&path);
        let err = source
            .query("DELETE FROM population_cover", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SourceMalformed");
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = SqliteSource::new(dir.path().join("absent.sqlite"));
        let err = source.query("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.code(), "SourceUnavailable");
    }

    #[tokio::test]
    async fn test_unknown_table_is_unavailable() {
        let (_dir, path) = fixture();
        let err = SqliteSource::new(&path)
            .query("SELECT * FROM nope", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SourceUnavailable");
    }
}
