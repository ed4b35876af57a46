//! Source adapters for the meme-kernel swarm.
//!
//! Each adapter converts one platform's result set into [`TrendDraft`]s:
//! - [`FacebookSource`]: sponsored-post search (CrowdTangle)
//! - [`RedditSource`]: hot listing of one community, paged lazily
//! - [`TikTokSource`]: tag page scraped through a headless browser
//!
//! Adapters share no state and never retry; any unrecoverable failure is
//! returned to the caller as a [`SourceError`].

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod browser;
mod error;
pub mod facebook;
pub mod reddit;
pub mod tiktok;
pub mod webdriver;

use std::time::Duration;

use async_trait::async_trait;
use mks_storage::{Platform, TrendDraft};
use reqwest::Client;

pub use browser::{BrowserLauncher, BrowserSession, ElementRef};
pub use error::{SourceError, SourceResult};
pub use facebook::{FacebookQuery, FacebookSource};
pub use reddit::{RedditCredentials, RedditQuery, RedditSource};
pub use tiktok::{ScrapeOptions, TikTokQuery, TikTokSource};
pub use webdriver::WebDriverLauncher;

/// A platform adapter. Output holds at most the adapter's requested count,
/// and every draft carries a non-empty `source_id`.
#[async_trait]
pub trait TrendSource: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(&self) -> SourceResult<Vec<TrendDraft>>;
}

pub(crate) fn http_client(platform: Platform, timeout: Duration) -> SourceResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Http {
            platform,
            message: format!("failed to build HTTP client: {e}"),
        })
}
