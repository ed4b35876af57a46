//! Records exchanged between the source adapters, the stores and the
//! generation sampler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::StorageError;

/// Source platform a trend was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Sponsored-post search (CrowdTangle).
    Facebook,
    /// Forum hot listing.
    Reddit,
    /// Tag page scraped through a headless browser.
    #[serde(rename = "tiktok")]
    TikTok,
}

impl Platform {
    /// Canonical ingestion order.
    pub const ALL: [Platform; 3] = [Platform::Facebook, Platform::Reddit, Platform::TikTok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Reddit => "reddit",
            Platform::TikTok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "facebook" => Ok(Platform::Facebook),
            "reddit" => Ok(Platform::Reddit),
            "tiktok" => Ok(Platform::TikTok),
            other => Err(StorageError::Serialization(format!(
                "unknown platform '{}'",
                other
            ))),
        }
    }
}

/// Normalized record as produced by a source adapter, before the cycle
/// timestamp is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDraft {
    pub platform: Platform,
    pub source_id: String,
    pub text: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl TrendDraft {
    pub fn new(platform: Platform, source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            platform,
            source_id: source_id.into(),
            text: text.into(),
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Stamp the draft with the ingestion cycle timestamp.
    pub fn collected(self, collected_at: DateTime<Utc>) -> RawTrend {
        RawTrend {
            platform: self.platform,
            source_id: self.source_id,
            text: self.text,
            meta: self.meta,
            collected_at,
        }
    }
}

/// Persisted trend observation. Every row of one ingestion cycle shares
/// the same `collected_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrend {
    pub platform: Platform,
    pub source_id: String,
    pub text: String,
    pub meta: Map<String, Value>,
    pub collected_at: DateTime<Utc>,
}

/// Rejects a batch containing a trend with no source identifier.
pub(crate) fn ensure_source_ids(trends: &[RawTrend]) -> Result<(), StorageError> {
    match trends.iter().find(|t| t.source_id.is_empty()) {
        Some(bad) => Err(StorageError::InvalidInput(format!(
            "{} trend without source_id",
            bad.platform
        ))),
        None => Ok(()),
    }
}

/// Kernel insert payload. `created_at` is assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKernel {
    pub id: Uuid,
    pub text: String,
    pub generation: i32,
}

impl NewKernel {
    /// First-generation kernel with a fresh identifier.
    pub fn seed(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            generation: 0,
        }
    }
}

/// Persisted kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kernel {
    pub id: Uuid,
    pub text: String,
    pub generation: i32,
    pub created_at: DateTime<Utc>,
}

impl Kernel {
    pub(crate) fn stamped(kernel: NewKernel, created_at: DateTime<Utc>) -> Self {
        Self {
            id: kernel.id,
            text: kernel.text,
            generation: kernel.generation,
            created_at,
        }
    }
}

/// Keep at most `max_chars` characters. Counts characters, not bytes.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
