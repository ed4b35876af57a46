//! Forum hot-listing adapter (Reddit).
//!
//! Authenticates with an application-only OAuth token, then pages
//! `/r/{subreddit}/hot` lazily. Consumption is bounded to the requested
//! limit, so pages past that point are never requested.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use mks_storage::{truncate_chars, Platform, TrendDraft};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{http_client, SourceError, SourceResult, TrendSource};

pub const DEFAULT_AUTH_ENDPOINT: &str = "https://www.reddit.com/api/v1/access_token";
pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";
pub const DEFAULT_USER_AGENT: &str = "mks_agent";
const MAX_PAGE_SIZE: usize = 100;

/// Application credentials for the client-credentials grant.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditQuery {
    pub subreddit: String,
    pub limit: usize,
}

impl Default for RedditQuery {
    fn default() -> Self {
        Self {
            subreddit: "memes".to_string(),
            limit: 20,
        }
    }
}

/// One page of a listing plus the cursor for the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub items: Vec<TrendDraft>,
    pub after: Option<String>,
}

pub struct RedditSource {
    client: Client,
    credentials: RedditCredentials,
    query: RedditQuery,
    auth_endpoint: String,
    api_base: String,
    user_agent: String,
}

impl RedditSource {
    pub fn new(
        credentials: RedditCredentials,
        query: RedditQuery,
        timeout: Duration,
    ) -> SourceResult<Self> {
        Ok(Self {
            client: http_client(Platform::Reddit, timeout)?,
            credentials,
            query,
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    pub fn with_endpoints(
        mut self,
        auth_endpoint: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        self.auth_endpoint = auth_endpoint.into();
        self.api_base = api_base.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn query(&self) -> &RedditQuery {
        &self.query
    }

    async fn access_token(&self) -> SourceResult<String> {
        let response = self
            .client
            .post(&self.auth_endpoint)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                platform: Platform::Reddit,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SourceError::Auth {
                platform: Platform::Reddit,
                message: format!("token endpoint returned {}", response.status()),
            });
        }

        let body: Value = response.json().await.map_err(|e| SourceError::Parse {
            platform: Platform::Reddit,
            message: e.to_string(),
        })?;

        body["access_token"]
            .as_str()
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SourceError::Auth {
                platform: Platform::Reddit,
                message: body["error"]
                    .as_str()
                    .unwrap_or("token response without access_token")
                    .to_string(),
            })
    }

    async fn hot_page(&self, token: &str, after: Option<String>) -> SourceResult<ListingPage> {
        let url = format!(
            "{}/r/{}/hot",
            self.api_base.trim_end_matches('/'),
            self.query.subreddit
        );
        let page_size = self.query.limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut params = vec![("limit", page_size), ("raw_json", "1".to_string())];
        if let Some(after) = after {
            params.push(("after", after));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&params)
            .send()
            .await
            .map_err(|e| SourceError::Http {
                platform: Platform::Reddit,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                platform: Platform::Reddit,
                status,
                body: truncate_chars(&body, 320),
            });
        }

        let body: Value = response.json().await.map_err(|e| SourceError::Parse {
            platform: Platform::Reddit,
            message: e.to_string(),
        })?;
        Ok(parse_listing(&body))
    }
}

#[async_trait]
impl TrendSource for RedditSource {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    async fn fetch(&self) -> SourceResult<Vec<TrendDraft>> {
        let token = self.access_token().await?;
        let token = token.as_str();

        let drafts: Vec<TrendDraft> = paged(|after| self.hot_page(token, after))
            .take(self.query.limit)
            .try_collect()
            .await?;

        tracing::debug!(
            subreddit = %self.query.subreddit,
            count = drafts.len(),
            "reddit hot items fetched"
        );
        Ok(drafts)
    }
}

enum Cursor {
    Start,
    After(String),
    Done,
}

/// Flatten a cursor-paged listing into a lazy, finite stream of drafts.
/// A page is requested only when the previous one is exhausted; the stream
/// ends at the first page without a cursor or without items.
pub fn paged<F, Fut>(mut fetch_page: F) -> impl Stream<Item = SourceResult<TrendDraft>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = SourceResult<ListingPage>>,
{
    stream::try_unfold(Cursor::Start, move |cursor| {
        let pending = match cursor {
            Cursor::Start => Some(fetch_page(None)),
            Cursor::After(after) => Some(fetch_page(Some(after))),
            Cursor::Done => None,
        };
        async move {
            let Some(pending) = pending else {
                return Ok(None);
            };
            let page = pending.await?;
            let next = match page.after {
                Some(after) if !page.items.is_empty() => Cursor::After(after),
                _ => Cursor::Done,
            };
            if page.items.is_empty() {
                return Ok(None);
            }
            Ok(Some((page.items, next)))
        }
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<TrendDraft, SourceError>)))
    .try_flatten()
}

/// Map a listing response (`data.children[*].data`) to one page of drafts.
pub fn parse_listing(body: &Value) -> ListingPage {
    let data = &body["data"];
    let items = data["children"]
        .as_array()
        .map(|children| {
            children
                .iter()
                .filter_map(|child| {
                    let post = &child["data"];
                    let id = post["id"].as_str().filter(|id| !id.is_empty())?;
                    let title = post["title"].as_str().unwrap_or_default();
                    let body = post["selftext"].as_str().unwrap_or_default();
                    let score = post["score"].as_i64().unwrap_or_default();
                    Some(
                        TrendDraft::new(Platform::Reddit, id, format!("{}\n{}", title, body))
                            .with_meta("score", json!(score)),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    ListingPage {
        items,
        after: data["after"].as_str().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn listing(ids: &[&str], after: Option<&str>) -> Value {
        let children = ids
            .iter()
            .map(|id| {
                json!({
                    "kind": "t3",
                    "data": {"id": id, "title": format!("title {id}"), "selftext": "", "score": 7}
                })
            })
            .collect::<Vec<_>>();
        json!({"kind": "Listing", "data": {"children": children, "after": after}})
    }

    #[test]
    fn listing_concatenates_title_and_body() {
        let body = json!({
            "data": {
                "children": [
                    {"data": {"id": "a1", "title": "Top", "selftext": "body text", "score": 12}},
                    {"data": {"title": "no id"}}
                ],
                "after": "t3_a1"
            }
        });

        let page = parse_listing(&body);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].text, "Top\nbody text");
        assert_eq!(page.items[0].meta["score"], 12);
        assert_eq!(page.after.as_deref(), Some("t3_a1"));
    }

    #[tokio::test]
    async fn consumption_is_bounded_and_lazy() {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        let drafts: Vec<TrendDraft> = paged(move |after| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match after.as_deref() {
                    None => parse_listing(&listing(&["a", "b", "c"], Some("c"))),
                    Some("c") => parse_listing(&listing(&["d", "e", "f"], Some("f"))),
                    _ => parse_listing(&listing(&["g", "h", "i"], None)),
                })
            }
        })
        .take(4)
        .try_collect()
        .await
        .unwrap();

        assert_eq!(drafts.len(), 4);
        assert_eq!(drafts[3].source_id, "d");
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_is_finite_without_cursor() {
        let drafts: Vec<TrendDraft> =
            paged(|_| async { Ok(parse_listing(&listing(&["x", "y"], None))) })
                .take(50)
                .try_collect()
                .await
                .unwrap();

        assert_eq!(drafts.len(), 2);
        assert!(drafts
            .iter()
            .all(|d| d.platform == Platform::Reddit && !d.source_id.is_empty()));
    }

    #[tokio::test]
    async fn page_error_surfaces() {
        let result: SourceResult<Vec<TrendDraft>> = paged(|_| async {
            Err(SourceError::Status {
                platform: Platform::Reddit,
                status: 503,
                body: String::new(),
            })
        })
        .take(5)
        .try_collect()
        .await;

        assert!(matches!(result, Err(SourceError::Status { status: 503, .. })));
    }
}
