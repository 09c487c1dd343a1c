// Source router - SourceAdapter implementation dispatching on locator kind
use crate::application::source_adapter::SourceAdapter;
use crate::domain::error::{DashboardError, DashboardResult};
use crate::domain::source::{Locator, SourceDescriptor};
use crate::domain::table::RawTable;
use crate::infrastructure::file_source::FileSource;
use crate::infrastructure::sqlite_source::SqliteSource;
use async_trait::async_trait;

pub struct SourceRouter {
    query: Option<SqliteSource>,
    files: FileSource,
}

impl SourceRouter {
    pub fn new(query: Option<SqliteSource>, files: FileSource) -> Self {
        Self { query, files }
    }
}

#[async_trait]
impl SourceAdapter for SourceRouter {
    async fn fetch(&self, descriptor: &SourceDescriptor) -> DashboardResult<RawTable> {
        let table = match &descriptor.locator {
            Locator::Query { sql, params } => {
                let source = self
                    .query
                    .as_ref()
                    .ok_or_else(|| DashboardError::unavailable("no database configured"))?;
                source.query(sql, params).await?
            }
            Locator::File { path, format } => self.files.read(path, format).await?,
        };

        table.ensure_column_count(descriptor.expected_columns)?;
        tracing::debug!(
            kind = descriptor.kind(),
            rows = table.rows.len(),
            "source fetched"
        );
        Ok(table)
    }
}
