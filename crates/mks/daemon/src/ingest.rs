//! Ingestion coordinator
//!
//! Runs every source concurrently, stamps one collection time on the
//! combined batch and writes it to the trend store in a single insert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use mks_sources::{SourceError, TrendSource};
use mks_storage::{Platform, RawTrend, TrendDraft, TrendStore};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// What to do with the batch when one source fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFailurePolicy {
    /// Report the failed source; write what the others returned
    #[default]
    Isolate,
    /// Fail the whole step; write nothing
    Abort,
}

/// Per-source result of one ingestion step
#[derive(Debug)]
pub struct SourceOutcome {
    pub platform: Platform,
    pub result: FetchResult,
}

#[derive(Debug)]
pub enum FetchResult {
    Fetched(usize),
    Failed(SourceError),
}

impl SourceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.result, FetchResult::Failed(_))
    }
}

/// Summary of one ingestion step
#[derive(Debug)]
pub struct IngestReport {
    pub collected_at: DateTime<Utc>,
    pub written: usize,
    pub outcomes: Vec<SourceOutcome>,
}

impl IngestReport {
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.outcomes
            .iter()
            .filter(|o| o.is_failed())
            .map(|o| o.platform)
            .collect()
    }
}

pub struct Ingestor {
    sources: Vec<Arc<dyn TrendSource>>,
    policy: SourceFailurePolicy,
}

impl Ingestor {
    /// Sources are flattened in the order given here.
    pub fn new(sources: Vec<Arc<dyn TrendSource>>, policy: SourceFailurePolicy) -> Self {
        Self { sources, policy }
    }

    pub fn policy(&self) -> SourceFailurePolicy {
        self.policy
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.sources.iter().map(|s| s.platform()).collect()
    }

    pub async fn ingest<S>(&self, store: &S) -> DaemonResult<IngestReport>
    where
        S: TrendStore + ?Sized,
    {
        let fetches = self.sources.iter().map(|source| async move {
            let platform = source.platform();
            (platform, source.fetch().await)
        });
        let results = join_all(fetches).await;

        let collected_at = Utc::now();
        let mut batch: Vec<RawTrend> = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());

        for (platform, result) in results {
            match result {
                Ok(drafts) => {
                    tracing::debug!(%platform, count = drafts.len(), "source fetched");
                    outcomes.push(SourceOutcome {
                        platform,
                        result: FetchResult::Fetched(drafts.len()),
                    });
                    batch.extend(drafts.into_iter().map(|d: TrendDraft| d.collected(collected_at)));
                }
                Err(error) => {
                    if self.policy == SourceFailurePolicy::Abort {
                        tracing::error!(%platform, error = %error, "source failed, aborting ingestion");
                        return Err(DaemonError::Source {
                            platform,
                            source: error,
                        });
                    }
                    tracing::warn!(%platform, error = %error, "source failed, continuing with the rest");
                    outcomes.push(SourceOutcome {
                        platform,
                        result: FetchResult::Failed(error),
                    });
                }
            }
        }

        let written = if batch.is_empty() {
            0
        } else {
            store.insert_trends(batch).await?
        };

        tracing::info!(written, %collected_at, "ingestion complete");
        Ok(IngestReport {
            collected_at,
            written,
            outcomes,
        })
    }
}
