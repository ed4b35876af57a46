//! Headless browser seam used by the TikTok adapter.

use async_trait::async_trait;

use crate::SourceResult;

/// Opaque handle to an element inside a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// One live browser page. Closed by the caller on every exit path.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> SourceResult<()>;

    /// All elements currently matching a CSS selector.
    async fn query_all(&self, selector: &str) -> SourceResult<Vec<ElementRef>>;

    async fn scroll_by(&self, dy: i64) -> SourceResult<()>;

    /// Visible text of the first descendant matching `selector`, if any.
    async fn child_text(&self, element: &ElementRef, selector: &str)
        -> SourceResult<Option<String>>;

    async fn attribute(&self, element: &ElementRef, name: &str) -> SourceResult<Option<String>>;

    async fn close(&self) -> SourceResult<()>;
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, user_agent: &str) -> SourceResult<Box<dyn BrowserSession>>;
}
