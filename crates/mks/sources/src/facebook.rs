//! Sponsored-post search adapter (CrowdTangle `posts/search`).

use std::time::Duration;

use async_trait::async_trait;
use mks_storage::{truncate_chars, Platform, TrendDraft};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{http_client, SourceError, SourceResult, TrendSource};

pub const DEFAULT_ENDPOINT: &str = "https://api.crowdtangle.com/posts/search";
const MAX_TEXT_CHARS: usize = 500;

/// Search parameters for one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookQuery {
    pub search_term: String,
    pub sort_by: String,
    pub count: usize,
}

impl Default for FacebookQuery {
    fn default() -> Self {
        Self {
            search_term: "meme".to_string(),
            sort_by: "overperforming".to_string(),
            count: 20,
        }
    }
}

pub struct FacebookSource {
    client: Client,
    endpoint: String,
    token: String,
    query: FacebookQuery,
}

impl FacebookSource {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        query: FacebookQuery,
        timeout: Duration,
    ) -> SourceResult<Self> {
        Ok(Self {
            client: http_client(Platform::Facebook, timeout)?,
            endpoint: endpoint.into(),
            token: token.into(),
            query,
        })
    }

    pub fn query(&self) -> &FacebookQuery {
        &self.query
    }
}

#[async_trait]
impl TrendSource for FacebookSource {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn fetch(&self) -> SourceResult<Vec<TrendDraft>> {
        let count = self.query.count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("token", self.token.as_str()),
                ("searchTerm", self.query.search_term.as_str()),
                ("sortBy", self.query.sort_by.as_str()),
                ("count", count.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                platform: Platform::Facebook,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                platform: Platform::Facebook,
                status,
                body: truncate_chars(&body, 320),
            });
        }

        let body: Value = response.json().await.map_err(|e| SourceError::Parse {
            platform: Platform::Facebook,
            message: e.to_string(),
        })?;

        let drafts = parse_posts(&body, self.query.count);
        tracing::debug!(
            search_term = %self.query.search_term,
            count = drafts.len(),
            "facebook posts fetched"
        );
        Ok(drafts)
    }
}

/// Map `result.posts[*]` to drafts. Posts without an id are skipped; a
/// missing message becomes empty text and missing statistics an empty meta.
pub fn parse_posts(body: &Value, count: usize) -> Vec<TrendDraft> {
    let Some(posts) = body["result"]["posts"].as_array() else {
        return Vec::new();
    };

    posts
        .iter()
        .filter_map(|post| {
            let Some(id) = post_id(&post["id"]) else {
                tracing::warn!("skipping facebook post without id");
                return None;
            };
            let message = post["message"].as_str().unwrap_or_default();
            let mut draft =
                TrendDraft::new(Platform::Facebook, id, truncate_chars(message, MAX_TEXT_CHARS));
            if let Some(actual) = post["statistics"].get("actual") {
                draft = draft.with_meta("actual", actual.clone());
            }
            Some(draft)
        })
        .take(count)
        .collect()
}

fn post_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> Value {
        json!({
            "status": 200,
            "result": {
                "posts": [
                    {
                        "id": "101|202",
                        "message": "x".repeat(700),
                        "statistics": {"actual": {"likeCount": 10, "shareCount": 2}}
                    },
                    {"id": 303, "statistics": {}},
                    {"message": "no id here"},
                    {"id": "404", "message": "short"}
                ]
            }
        })
    }

    #[test]
    fn maps_posts_and_truncates_message() {
        let drafts = parse_posts(&fixture(), 20);

        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].source_id, "101|202");
        assert_eq!(drafts[0].text.chars().count(), 500);
        assert_eq!(drafts[0].meta["actual"]["likeCount"], 10);

        assert_eq!(drafts[1].source_id, "303");
        assert_eq!(drafts[1].text, "");
        assert!(drafts[1].meta.is_empty());
    }

    #[test]
    fn never_returns_more_than_requested() {
        let drafts = parse_posts(&fixture(), 2);
        assert_eq!(drafts.len(), 2);
        assert!(drafts
            .iter()
            .all(|d| d.platform == Platform::Facebook && !d.source_id.is_empty()));
    }

    #[test]
    fn missing_result_yields_no_posts() {
        assert!(parse_posts(&json!({"status": 200}), 20).is_empty());
    }
}
