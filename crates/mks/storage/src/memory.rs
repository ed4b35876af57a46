//! In-memory reference implementation of the swarm storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use the PostgreSQL backend.

use crate::model::{ensure_source_ids, Kernel, NewKernel, RawTrend};
use crate::traits::{KernelStore, QueryWindow, TrendStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::RwLock;

/// In-memory swarm storage adapter.
#[derive(Default)]
pub struct InMemorySwarmStorage {
    trends: RwLock<Vec<RawTrend>>,
    kernels: RwLock<Vec<Kernel>>,
}

impl InMemorySwarmStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trends newest-first; ties keep the most recently inserted first.
    fn trends_newest_first(&self) -> StorageResult<Vec<RawTrend>> {
        let guard = self
            .trends
            .read()
            .map_err(|_| StorageError::Backend("trends lock poisoned".to_string()))?;
        let mut values = guard.iter().rev().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
        Ok(values)
    }
}

#[async_trait]
impl TrendStore for InMemorySwarmStorage {
    async fn insert_trends(&self, trends: Vec<RawTrend>) -> StorageResult<usize> {
        ensure_source_ids(&trends)?;

        let mut guard = self
            .trends
            .write()
            .map_err(|_| StorageError::Backend("trends lock poisoned".to_string()))?;
        let written = trends.len();
        guard.extend(trends);
        Ok(written)
    }

    async fn recent_trend_texts(&self, limit: usize) -> StorageResult<Vec<String>> {
        Ok(self
            .trends_newest_first()?
            .into_iter()
            .take(limit)
            .map(|t| t.text)
            .collect())
    }

    async fn list_trends(&self, window: QueryWindow) -> StorageResult<Vec<RawTrend>> {
        Ok(apply_window(self.trends_newest_first()?, window))
    }

    async fn count_trends(&self) -> StorageResult<u64> {
        let guard = self
            .trends
            .read()
            .map_err(|_| StorageError::Backend("trends lock poisoned".to_string()))?;
        Ok(guard.len() as u64)
    }
}

#[async_trait]
impl KernelStore for InMemorySwarmStorage {
    async fn insert_kernels(&self, kernels: Vec<NewKernel>) -> StorageResult<Vec<Kernel>> {
        let mut guard = self
            .kernels
            .write()
            .map_err(|_| StorageError::Backend("kernels lock poisoned".to_string()))?;

        let mut seen = guard.iter().map(|k| k.id).collect::<HashSet<_>>();
        for kernel in &kernels {
            if !seen.insert(kernel.id) {
                return Err(StorageError::Conflict(format!(
                    "kernel {} already exists",
                    kernel.id
                )));
            }
        }

        let created_at = Utc::now();
        let stored = kernels
            .into_iter()
            .map(|k| Kernel::stamped(k, created_at))
            .collect::<Vec<_>>();
        guard.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn list_kernels(&self, window: QueryWindow) -> StorageResult<Vec<Kernel>> {
        let guard = self
            .kernels
            .read()
            .map_err(|_| StorageError::Backend("kernels lock poisoned".to_string()))?;
        let mut values = guard.iter().rev().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }

    async fn count_kernels(&self) -> StorageResult<u64> {
        let guard = self
            .kernels
            .read()
            .map_err(|_| StorageError::Backend("kernels lock poisoned".to_string()))?;
        Ok(guard.len() as u64)
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
