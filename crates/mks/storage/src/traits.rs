use crate::model::{Kernel, NewKernel, RawTrend};
use crate::StorageResult;
use async_trait::async_trait;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn latest(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Storage interface for harvested trends.
#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Append a batch of trends and return the number of rows written.
    async fn insert_trends(&self, trends: Vec<RawTrend>) -> StorageResult<usize>;

    /// Text of the `limit` most recently collected trends, newest first.
    async fn recent_trend_texts(&self, limit: usize) -> StorageResult<Vec<String>>;

    /// List trends newest-first.
    async fn list_trends(&self, window: QueryWindow) -> StorageResult<Vec<RawTrend>>;

    async fn count_trends(&self) -> StorageResult<u64>;
}

/// Storage interface for generated kernels.
#[async_trait]
pub trait KernelStore: Send + Sync {
    /// Append a batch of kernels, stamping `created_at` at insert time.
    async fn insert_kernels(&self, kernels: Vec<NewKernel>) -> StorageResult<Vec<Kernel>>;

    /// List kernels newest-first.
    async fn list_kernels(&self, window: QueryWindow) -> StorageResult<Vec<Kernel>>;

    async fn count_kernels(&self) -> StorageResult<u64>;
}

/// Storage bundle used by the ingestion/generation cycle.
pub trait SwarmStorage: TrendStore + KernelStore + Send + Sync {}

impl<T> SwarmStorage for T where T: TrendStore + KernelStore + Send + Sync {}
