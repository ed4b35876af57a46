//! Short-video tag adapter (TikTok), scraped through a headless browser.
//!
//! One browser session per fetch: launch with a random user agent, open the
//! tag page, wait for the top-video marker, scroll a few times, then read
//! captions. The session is closed on every exit path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mks_storage::{Platform, TrendDraft};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::{SourceError, SourceResult, TrendSource};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TikTokQuery {
    pub tag: String,
    pub limit: usize,
}

impl Default for TikTokQuery {
    fn default() -> Self {
        Self {
            tag: "viral".to_string(),
            limit: 10,
        }
    }
}

/// Page-shape and pacing knobs for the tag scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOptions {
    pub base_url: String,
    pub marker_selector: String,
    pub caption_selector: String,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub scroll_steps: u32,
    pub scroll_distance: i64,
    pub scroll_pause: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            base_url: "https://www.tiktok.com/tag".to_string(),
            marker_selector: "div[data-e2e=top-video]".to_string(),
            caption_selector: "a div".to_string(),
            wait_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
            scroll_steps: 3,
            scroll_distance: 2000,
            scroll_pause: Duration::from_secs(1),
        }
    }
}

pub struct TikTokSource {
    launcher: Arc<dyn BrowserLauncher>,
    query: TikTokQuery,
    options: ScrapeOptions,
}

impl TikTokSource {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, query: TikTokQuery, options: ScrapeOptions) -> Self {
        Self {
            launcher,
            query,
            options,
        }
    }

    pub fn query(&self) -> &TikTokQuery {
        &self.query
    }

    fn tag_url(&self) -> String {
        format!(
            "{}/{}",
            self.options.base_url.trim_end_matches('/'),
            self.query.tag
        )
    }

    async fn scrape(&self, session: &dyn BrowserSession) -> SourceResult<Vec<TrendDraft>> {
        session.goto(&self.tag_url()).await?;
        self.wait_for_marker(session).await?;

        for _ in 0..self.options.scroll_steps {
            session.scroll_by(self.options.scroll_distance).await?;
            tokio::time::sleep(self.options.scroll_pause).await;
        }

        let items = session.query_all(&self.options.marker_selector).await?;
        let mut drafts = Vec::with_capacity(items.len().min(self.query.limit));
        for item in items.iter().take(self.query.limit) {
            let caption = session
                .child_text(item, &self.options.caption_selector)
                .await?
                .unwrap_or_default();
            let source_id = match session.attribute(item, "data-id").await? {
                Some(id) if !id.is_empty() => id,
                _ => caption_id(&caption),
            };
            drafts.push(TrendDraft::new(Platform::TikTok, source_id, caption));
        }
        Ok(drafts)
    }

    async fn wait_for_marker(&self, session: &dyn BrowserSession) -> SourceResult<()> {
        let selector = self.options.marker_selector.as_str();
        let poll = async {
            loop {
                if !session.query_all(selector).await?.is_empty() {
                    return Ok::<(), SourceError>(());
                }
                tokio::time::sleep(self.options.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.options.wait_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                platform: Platform::TikTok,
                waiting_for: selector.to_string(),
                after: self.options.wait_timeout,
            }),
        }
    }
}

#[async_trait]
impl TrendSource for TikTokSource {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn fetch(&self) -> SourceResult<Vec<TrendDraft>> {
        let user_agent = pick_user_agent();
        let session = self.launcher.launch(user_agent).await?;

        let result = self.scrape(session.as_ref()).await;
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "failed to close browser session");
        }

        let drafts = result?;
        tracing::debug!(tag = %self.query.tag, count = drafts.len(), "tiktok items scraped");
        Ok(drafts)
    }
}

fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Stable id for items that carry no `data-id`: BLAKE3 of the caption.
pub fn caption_id(caption: &str) -> String {
    blake3::hash(caption.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ElementRef;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct PageState {
        closed: AtomicBool,
        scrolls: AtomicUsize,
        visited: Mutex<Vec<String>>,
        user_agent: Mutex<Option<String>>,
    }

    struct FakeSession {
        state: Arc<PageState>,
        items: Vec<(Option<String>, Option<String>)>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn goto(&self, url: &str) -> SourceResult<()> {
            self.state.visited.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn query_all(&self, _selector: &str) -> SourceResult<Vec<ElementRef>> {
            Ok((0..self.items.len())
                .map(|i| ElementRef(i.to_string()))
                .collect())
        }

        async fn scroll_by(&self, _dy: i64) -> SourceResult<()> {
            self.state.scrolls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn child_text(
            &self,
            element: &ElementRef,
            _selector: &str,
        ) -> SourceResult<Option<String>> {
            let idx: usize = element.0.parse().unwrap();
            Ok(self.items[idx].1.clone())
        }

        async fn attribute(
            &self,
            element: &ElementRef,
            _name: &str,
        ) -> SourceResult<Option<String>> {
            let idx: usize = element.0.parse().unwrap();
            Ok(self.items[idx].0.clone())
        }

        async fn close(&self) -> SourceResult<()> {
            self.state.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeLauncher {
        state: Arc<PageState>,
        items: Vec<(Option<String>, Option<String>)>,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self, user_agent: &str) -> SourceResult<Box<dyn BrowserSession>> {
            *self.state.user_agent.lock().unwrap() = Some(user_agent.to_string());
            Ok(Box::new(FakeSession {
                state: self.state.clone(),
                items: self.items.clone(),
            }))
        }
    }

    fn fast_options() -> ScrapeOptions {
        ScrapeOptions {
            wait_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            scroll_pause: Duration::from_millis(1),
            ..ScrapeOptions::default()
        }
    }

    fn source(items: Vec<(Option<String>, Option<String>)>, limit: usize) -> (TikTokSource, Arc<PageState>) {
        let state = Arc::new(PageState::default());
        let launcher = Arc::new(FakeLauncher {
            state: state.clone(),
            items,
        });
        let query = TikTokQuery {
            tag: "viral".to_string(),
            limit,
        };
        (TikTokSource::new(launcher, query, fast_options()), state)
    }

    #[tokio::test]
    async fn scrape_reads_captions_and_falls_back_to_hash() {
        let items = vec![
            (Some("v1".to_string()), Some("first caption".to_string())),
            (None, Some("second caption".to_string())),
        ];
        let (source, state) = source(items, 10);

        let drafts = source.fetch().await.unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].source_id, "v1");
        assert_eq!(drafts[1].source_id, caption_id("second caption"));
        assert_eq!(drafts[1].text, "second caption");

        assert!(state.closed.load(Ordering::SeqCst));
        assert_eq!(state.scrolls.load(Ordering::SeqCst), 3);
        assert_eq!(
            state.visited.lock().unwrap().as_slice(),
            ["https://www.tiktok.com/tag/viral".to_string()]
        );
        let ua = state.user_agent.lock().unwrap().clone().unwrap();
        assert!(USER_AGENTS.contains(&ua.as_str()));
    }

    #[tokio::test]
    async fn output_is_bounded_by_limit() {
        let items = (0..8)
            .map(|i| (Some(format!("id{i}")), Some(format!("caption {i}"))))
            .collect();
        let (source, _) = source(items, 3);

        let drafts = source.fetch().await.unwrap();
        assert_eq!(drafts.len(), 3);
        assert!(drafts.iter().all(|d| d.platform == Platform::TikTok));
    }

    #[tokio::test]
    async fn marker_timeout_fails_and_still_closes_session() {
        let (source, state) = source(Vec::new(), 10);

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Timeout { platform: Platform::TikTok, .. }));
        assert!(state.closed.load(Ordering::SeqCst));
        assert_eq!(state.scrolls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn caption_id_is_deterministic() {
        assert_eq!(caption_id("same"), caption_id("same"));
        assert_ne!(caption_id("same"), caption_id("other"));
        assert_eq!(caption_id("").len(), 64);
    }
}
