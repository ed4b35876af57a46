//! Meme-kernel swarm daemon library
//!
//! This module provides the core components for the swarm daemon:
//! - Ingestion coordinator over the platform adapters
//! - Generation sampler over the completion backend
//! - Cycle scheduler
//! - Layered configuration and the interactive launch form

pub mod config;
pub mod error;
pub mod form;
pub mod generate;
pub mod ingest;
pub mod scheduler;
pub mod swarm;

pub use config::{Credentials, LaunchParams, SwarmConfig};
pub use error::{DaemonError, DaemonResult};
pub use generate::{sample_window, Sampler, SamplerConfig};
pub use ingest::{FetchResult, IngestReport, Ingestor, SourceFailurePolicy, SourceOutcome};
pub use scheduler::{
    spawn_ctrl_c_listener, spawn_shutdown_listener, CycleScheduler, CycleSummary, ShutdownListener,
};
