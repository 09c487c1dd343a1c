//! File-backed sources
//!
//! Reads delimited text, spreadsheets and JSON record files into a
//! [`RawTable`]. Rows come back in file order; when a header row is present it
//! names the columns, otherwise columns are called `column_1..n`.
//!
//! Read and parse failures are `SourceUnavailable`; shape problems (ragged
//! rows, non-object records) are `SourceMalformed`.

use crate::domain::dataset::DATE_FORMAT;
use crate::domain::error::{DashboardError, DashboardResult};
use crate::domain::source::{FileFormat, RowWindow};
use crate::domain::table::{RawTable, Scalar};
use calamine::{Data, DataType, Reader, open_workbook_auto};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

/// Files above this size are refused rather than loaded eagerly
pub const MAX_FILE_SIZE_MB: u64 = 100;

const RECORD_WRAPPER_KEYS: [&str; 5] = ["data", "rows", "items", "records", "results"];

#[derive(Debug, Clone)]
pub struct FileSource {
    data_dir: PathBuf,
}

impl FileSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Relative paths resolve against the data directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub async fn read(&self, path: &Path, format: &FileFormat) -> DashboardResult<RawTable> {
        let path = self.resolve(path);
        check_size(&path).await?;

        match format {
            FileFormat::Delimited {
                delimiter,
                has_header,
            } => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| read_error(&path, e))?;
                let delimiter = delimiter
                    .as_deref()
                    .and_then(|d| d.chars().next())
                    .unwrap_or_else(|| detect_delimiter(&path, &content));
                table_from_records(parse_delimited(&content, delimiter), *has_header, None)
            }
            FileFormat::Spreadsheet {
                sheet,
                has_header,
                rows,
            } => {
                let sheet = sheet.clone();
                let (has_header, rows) = (*has_header, *rows);
                tokio::task::spawn_blocking(move || read_spreadsheet(&path, sheet.as_deref(), has_header, rows))
                    .await
                    .map_err(|e| DashboardError::unavailable(format!("spreadsheet task failed: {}", e)))?
            }
            FileFormat::Records => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| read_error(&path, e))?;
                parse_records(&content)
            }
        }
    }
}

fn read_error(path: &Path, error: std::io::Error) -> DashboardError {
    DashboardError::unavailable(format!("{}: {}", path.display(), error))
}

async fn check_size(path: &Path) -> DashboardResult<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| read_error(path, e))?;
    let size_mb = metadata.len() / (1024 * 1024);
    if size_mb > MAX_FILE_SIZE_MB {
        return Err(DashboardError::unavailable(format!(
            "{} is {}MB (max {}MB)",
            path.display(),
            size_mb,
            MAX_FILE_SIZE_MB
        )));
    }
    Ok(())
}

/// Split off the header (or synthesize names) and window the data rows
fn table_from_records(
    mut records: Vec<Vec<Scalar>>,
    has_header: bool,
    window: Option<RowWindow>,
) -> DashboardResult<RawTable> {
    let columns: Vec<String> = if has_header {
        if records.is_empty() {
            return Err(DashboardError::malformed("file has no header row"));
        }
        records
            .remove(0)
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Scalar::Null => format!("column_{}", i + 1),
                other => other.to_string(),
            })
            .collect()
    } else {
        let width = records.iter().map(Vec::len).max().unwrap_or(0);
        (1..=width).map(|i| format!("column_{}", i)).collect()
    };

    let rows = match window {
        Some(w) => records
            .into_iter()
            .skip(w.start)
            .take(w.end.saturating_sub(w.start))
            .collect(),
        None => records,
    };

    RawTable::rectangular(columns, rows)
}

/// Pick the delimiter from the extension, else the most frequent candidate
fn detect_delimiter(path: &Path, content: &str) -> char {
    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"))
    {
        return '\t';
    }

    let first_lines: String = content.lines().take(5).collect::<Vec<_>>().join("\n");
    let comma_count = first_lines.matches(',').count();
    let tab_count = first_lines.matches('\t').count();
    let semicolon_count = first_lines.matches(';').count();

    if tab_count > comma_count && tab_count > semicolon_count {
        '\t'
    } else if semicolon_count > comma_count {
        ';'
    } else {
        ','
    }
}

/// Quote-aware split; `""` inside quotes is a literal quote and quoted fields may span lines
fn parse_delimited(content: &str, delimiter: char) -> Vec<Vec<Scalar>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = Vec::new();
    let mut record: Vec<Scalar> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                record.push(Scalar::from_cell(&field));
                field.clear();
            }
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                record.push(Scalar::from_cell(&field));
                field.clear();
                if record.iter().any(|cell| !cell.is_null()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            c => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(Scalar::from_cell(&field));
        if record.iter().any(|cell| !cell.is_null()) {
            records.push(record);
        }
    }
    records
}

fn read_spreadsheet(
    path: &Path,
    sheet: Option<&str>,
    has_header: bool,
    window: Option<RowWindow>,
) -> DashboardResult<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| DashboardError::unavailable(format!("{}: {}", path.display(), e)))?;

    let range = match sheet {
        Some(name) => workbook.worksheet_range(name),
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| DashboardError::malformed(format!("{} has no sheets", path.display())))?,
    }
    .map_err(|e| DashboardError::unavailable(format!("{}: {}", path.display(), e)))?;

    let records = range
        .rows()
        .map(|row| row.iter().map(cell_to_scalar).collect())
        .collect();
    table_from_records(records, has_header, window)
}

fn cell_to_scalar(cell: &Data) -> Scalar {
    match cell {
        Data::Empty | Data::Error(_) => Scalar::Null,
        Data::Int(i) => Scalar::Number(*i as f64),
        Data::Float(f) => Scalar::Number(*f),
        Data::String(s) => Scalar::from_cell(s),
        Data::Bool(b) => Scalar::Text(b.to_string()),
        Data::DateTime(dt) => cell
            .as_date()
            .map(|d| Scalar::Text(d.format(DATE_FORMAT).to_string()))
            .unwrap_or(Scalar::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Scalar::from_cell(s),
    }
}

fn parse_records(content: &str) -> DashboardResult<RawTable> {
    let value: JsonValue = serde_json::from_str(content)
        .map_err(|e| DashboardError::unavailable(format!("invalid JSON: {}", e)))?;
    let array = extract_array(&value)?;

    let mut columns: Vec<String> = Vec::new();
    for item in array {
        let object = item
            .as_object()
            .ok_or_else(|| DashboardError::malformed("records must be JSON objects"))?;
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = array
        .iter()
        .filter_map(JsonValue::as_object)
        .map(|object| {
            columns
                .iter()
                .map(|column| object.get(column).map(json_to_scalar).unwrap_or(Scalar::Null))
                .collect()
        })
        .collect();

    Ok(RawTable::new(columns, rows))
}

/// Bare arrays, or an array under one of the usual wrapper keys
fn extract_array(value: &JsonValue) -> DashboardResult<&Vec<JsonValue>> {
    match value {
        JsonValue::Array(array) => Ok(array),
        JsonValue::Object(object) => RECORD_WRAPPER_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(JsonValue::as_array))
            .ok_or_else(|| {
                DashboardError::malformed("JSON object has no data/rows/items/records/results array")
            }),
        _ => Err(DashboardError::malformed("JSON must be an array of objects")),
    }
}

fn json_to_scalar(value: &JsonValue) -> Scalar {
    match value {
        JsonValue::Null => Scalar::Null,
        JsonValue::Number(n) => n.as_f64().map(Scalar::Number).unwrap_or(Scalar::Null),
        JsonValue::String(s) => Scalar::from_cell(s),
        JsonValue::Bool(b) => Scalar::Text(b.to_string()),
        nested => Scalar::Text(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn delimited() -> FileFormat {
        FileFormat::Delimited {
            delimiter: None,
            has_header: true,
        }
    }

    #[tokio::test]
    async fn test_read_csv_with_header() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "cover.csv",
            "City,Latitude,Longitude,BroadbandCoverage\nHilo,19.72,-155.08,91.5%\n\"Kailua, Kona\",,,80%\n",
        );
        let source = FileSource::new(dir.path());
        let table = source.read(Path::new("cover.csv"), &delimited()).await.unwrap();

        assert_eq!(table.columns, vec!["City", "Latitude", "Longitude", "BroadbandCoverage"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][0], Scalar::text("Kailua, Kona"));
        assert_eq!(table.rows[1][1], Scalar::Null);
        assert_eq!(table.rows[0][3], Scalar::text("91.5%"));
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path());
        let err = source
            .read(Path::new("BroadBandCover_by_City.csv"), &delimited())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SourceUnavailable");
    }

    #[tokio::test]
    async fn test_ragged_row_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.csv", "a,b\n1,2,3\n");
        let err = FileSource::new(dir.path())
            .read(Path::new("bad.csv"), &delimited())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SourceMalformed");
    }

    #[tokio::test]
    async fn test_tsv_without_header() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "survey.tsv", "Can use email\t0.82\nCan spot scams\t0.41\n");
        let format = FileFormat::Delimited {
            delimiter: None,
            has_header: false,
        };
        let table = FileSource::new(dir.path())
            .read(Path::new("survey.tsv"), &format)
            .await
            .unwrap();
        assert_eq!(table.columns, vec!["column_1", "column_2"]);
        assert_eq!(table.rows[1], vec![Scalar::text("Can spot scams"), Scalar::text("0.41")]);
    }

    #[tokio::test]
    async fn test_read_records() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "finance.json",
            r#"{"data": [
                {"Candidate": "A", "Amount": 1200.5, "Party": "D"},
                {"Candidate": "B", "Amount": null, "Office": "Mayor"}
            ]}"#,
        );
        let table = FileSource::new(dir.path())
            .read(Path::new("finance.json"), &FileFormat::Records)
            .await
            .unwrap();
        assert_eq!(table.columns, vec!["Candidate", "Amount", "Party", "Office"]);
        assert_eq!(
            table.rows[1],
            vec![Scalar::text("B"), Scalar::Null, Scalar::Null, Scalar::text("Mayor")]
        );
    }

    #[tokio::test]
    async fn test_invalid_json_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.json", "[{\"a\": ");
        let err = FileSource::new(dir.path())
            .read(Path::new("broken.json"), &FileFormat::Records)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SourceUnavailable");
    }

    #[tokio::test]
    async fn test_missing_spreadsheet_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let format = FileFormat::Spreadsheet {
            sheet: None,
            has_header: true,
            rows: None,
        };
        let err = FileSource::new(dir.path())
            .read(Path::new("acs2022_5yr_counties_hi.xlsx"), &format)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SourceUnavailable");
    }

    #[test]
    fn test_parse_delimited_quotes() {
        let records = parse_delimited("a;\"say \"\"hi\"\"\"\r\n\r\n1;\"two\nlines\"", ';');
        assert_eq!(records.len(), 2);
        assert_eq!(records[0][1], Scalar::text("say \"hi\""));
        assert_eq!(records[1][1], Scalar::text("two\nlines"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter(Path::new("a.tsv"), "a,b"), '\t');
        assert_eq!(detect_delimiter(Path::new("a.csv"), "a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter(Path::new("a.txt"), "a,b\n1,2"), ',');
    }

    #[test]
    fn test_row_window() {
        let records: Vec<Vec<Scalar>> = (0..10)
            .map(|i| vec![Scalar::Number(i as f64)])
            .collect();
        let table = table_from_records(records, true, Some(RowWindow { start: 2, end: 5 })).unwrap();
        assert_eq!(table.columns, vec!["0"]);
        let values: Vec<Scalar> = table.rows.into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(values, vec![Scalar::Number(3.0), Scalar::Number(4.0), Scalar::Number(5.0)]);
    }

    #[test]
    fn test_cell_to_scalar() {
        assert_eq!(cell_to_scalar(&Data::Empty), Scalar::Null);
        assert_eq!(cell_to_scalar(&Data::Int(7)), Scalar::Number(7.0));
        assert_eq!(cell_to_scalar(&Data::String(" Maui ".into())), Scalar::text("Maui"));
        assert_eq!(cell_to_scalar(&Data::Bool(true)), Scalar::text("true"));
    }

    #[test]
    fn test_resolve() {
        let source = FileSource::new("/srv/data");
        assert_eq!(source.resolve(Path::new("a.csv")), PathBuf::from("/srv/data/a.csv"));
        assert_eq!(source.resolve(Path::new("/tmp/b.csv")), PathBuf::from("/tmp/b.csv"));
    }
}
