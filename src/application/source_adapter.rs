// Adapter trait for raw tabular sources
use crate::domain::error::DashboardResult;
use crate::domain::source::SourceDescriptor;
use crate::domain::table::RawTable;
use async_trait::async_trait;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Read the source described by `descriptor`.
    ///
    /// Fails with `SourceUnavailable` when the store or file cannot be read
    /// and with `SourceMalformed` when the result has the wrong shape.
    async fn fetch(&self, descriptor: &SourceDescriptor) -> DashboardResult<RawTable>;
}
