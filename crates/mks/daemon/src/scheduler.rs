//! Cycle scheduler: ingest, generate, sleep, repeat.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mks_storage::{Platform, SwarmStorage};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ScheduleConfig;
use crate::error::DaemonResult;
use crate::generate::Sampler;
use crate::ingest::Ingestor;

/// Counts from one full cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub collected_at: DateTime<Utc>,
    pub ingested: usize,
    pub generated: usize,
    pub failed_sources: Vec<Platform>,
}

pub struct CycleScheduler {
    storage: Arc<dyn SwarmStorage>,
    ingestor: Ingestor,
    sampler: Sampler,
    config: ScheduleConfig,
}

impl CycleScheduler {
    pub fn new(
        storage: Arc<dyn SwarmStorage>,
        ingestor: Ingestor,
        sampler: Sampler,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            storage,
            ingestor,
            sampler,
            config,
        }
    }

    /// One ingestion step followed by one generation step. The generation
    /// window includes the rows this cycle just wrote.
    pub async fn run_cycle(&self) -> DaemonResult<CycleSummary> {
        let report = self.ingestor.ingest(self.storage.as_ref()).await?;
        let generated = self
            .sampler
            .generate(self.storage.as_ref(), self.config.kernel_batch)
            .await?;

        Ok(CycleSummary {
            failed_sources: report.failed_platforms(),
            collected_at: report.collected_at,
            ingested: report.written,
            generated,
        })
    }

    /// Run cycles back to back until `shutdown` resolves. Shutdown is only
    /// observed between cycles, so an in-flight cycle always completes.
    /// A cycle error is returned immediately.
    pub async fn run_until<F>(&self, shutdown: F) -> DaemonResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            kernel_batch = self.config.kernel_batch,
            loop_minutes = self.config.loop_minutes,
            "Cycle scheduler started"
        );

        loop {
            let summary = self.run_cycle().await?;
            if !summary.failed_sources.is_empty() {
                tracing::warn!(failed = ?summary.failed_sources, "cycle completed with failed sources");
            }
            tracing::info!(
                "Cycle complete: ingested {}, generated {}. Sleeping {} min.",
                summary.ingested,
                summary.generated,
                self.config.loop_minutes
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval()) => {}
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping cycle scheduler");
                    return Ok(());
                }
            }
        }
    }

    /// Run until Ctrl+C.
    pub async fn run(&self) -> DaemonResult<()> {
        let mut listener = spawn_ctrl_c_listener();
        let result = self.run_until(listener.wait()).await;
        listener.stop();
        result
    }
}

/// Ctrl+C listener registered before the first cycle starts, so an
/// interrupt during any cycle is held until that cycle completes.
pub struct ShutdownListener {
    received: oneshot::Receiver<()>,
    task: JoinHandle<()>,
}

impl ShutdownListener {
    /// Resolves once the signal has been received. Never resolves if the
    /// handler could not be installed.
    pub async fn wait(&mut self) {
        if (&mut self.received).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

pub fn spawn_ctrl_c_listener() -> ShutdownListener {
    spawn_shutdown_listener(async { tokio::signal::ctrl_c().await })
}

/// Spawn `signal` right away and relay its completion to the listener.
pub fn spawn_shutdown_listener<F>(signal: F) -> ShutdownListener
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, received) = oneshot::channel();
    let task = tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
        }
    });
    ShutdownListener { received, task }
}
