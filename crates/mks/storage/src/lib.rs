//! Meme-kernel swarm storage abstractions.
//!
//! Two append-only record sets:
//! - `raw_trends`: normalized observations harvested from source platforms
//! - `kernels`: short texts generated from sampled trends
//!
//! Nothing here updates or deletes a record. The in-memory adapter backs
//! development and tests; PostgreSQL is the durable backend.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemorySwarmStorage;
pub use model::{truncate_chars, Kernel, NewKernel, Platform, RawTrend, TrendDraft};
pub use traits::{KernelStore, QueryWindow, SwarmStorage, TrendStore};
