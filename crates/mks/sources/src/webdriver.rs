//! Minimal W3C WebDriver client (chromedriver, geckodriver, selenium).
//!
//! Only the handful of commands the tag scrape needs are implemented:
//! new session, navigate, find elements, execute script, element text and
//! attribute, delete session.

use std::time::Duration;

use async_trait::async_trait;
use mks_storage::{truncate_chars, Platform};
use reqwest::{Client, Method};
use serde_json::{json, Value};

use crate::browser::{BrowserLauncher, BrowserSession, ElementRef};
use crate::{http_client, SourceError, SourceResult};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:9515";
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Launches headless Chrome sessions through a WebDriver endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    client: Client,
    endpoint: String,
    headless: bool,
}

impl WebDriverLauncher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: http_client(Platform::TikTok, timeout)?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            headless: true,
        })
    }

    pub fn headed(mut self) -> Self {
        self.headless = false;
        self
    }

    fn capabilities(&self, user_agent: &str) -> Value {
        let mut args = vec![
            format!("--user-agent={user_agent}"),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, user_agent: &str) -> SourceResult<Box<dyn BrowserSession>> {
        let url = format!("{}/session", self.endpoint);
        let value = command(
            &self.client,
            Method::POST,
            &url,
            Some(self.capabilities(user_agent)),
        )
        .await?;

        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| browser_error("new session response without sessionId"))?;
        tracing::debug!(session_id, "webdriver session started");

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
        }))
    }
}

/// A single WebDriver session.
pub struct WebDriverSession {
    client: Client,
    base: String,
}

impl WebDriverSession {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> SourceResult<Value> {
        command(&self.client, method, &format!("{}{}", self.base, path), body).await
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> SourceResult<()> {
        self.call(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn query_all(&self, selector: &str) -> SourceResult<Vec<ElementRef>> {
        let value = self
            .call(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        Ok(element_refs(&value))
    }

    async fn scroll_by(&self, dy: i64) -> SourceResult<()> {
        self.call(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": "window.scrollBy(0, arguments[0]);", "args": [dy] })),
        )
        .await
        .map(|_| ())
    }

    async fn child_text(
        &self,
        element: &ElementRef,
        selector: &str,
    ) -> SourceResult<Option<String>> {
        let found = self
            .call(
                Method::POST,
                &format!("/element/{}/elements", element.0),
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        let Some(child) = element_refs(&found).into_iter().next() else {
            return Ok(None);
        };

        let text = self
            .call(Method::GET, &format!("/element/{}/text", child.0), None)
            .await?;
        Ok(text.as_str().map(str::to_string))
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> SourceResult<Option<String>> {
        let value = self
            .call(
                Method::GET,
                &format!("/element/{}/attribute/{}", element.0, name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn close(&self) -> SourceResult<()> {
        self.call(Method::DELETE, "", None).await.map(|_| ())
    }
}

async fn command(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> SourceResult<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| SourceError::Http {
        platform: Platform::TikTok,
        message: e.to_string(),
    })?;
    let status = response.status();
    let body: Value = response.json().await.map_err(|e| SourceError::Parse {
        platform: Platform::TikTok,
        message: format!("webdriver response: {e}"),
    })?;

    if !status.is_success() {
        return Err(SourceError::Browser {
            platform: Platform::TikTok,
            message: webdriver_error(status.as_u16(), &body["value"]),
        });
    }
    Ok(body["value"].clone())
}

fn element_refs(value: &Value) -> Vec<ElementRef> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item[ELEMENT_KEY].as_str())
                .map(|id| ElementRef(id.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn webdriver_error(status: u16, value: &Value) -> String {
    let error = value["error"].as_str().unwrap_or("unknown error");
    let message = value["message"].as_str().unwrap_or_default();
    format!("{status} {error}: {}", truncate_chars(message, 320))
}

fn browser_error(message: &str) -> SourceError {
    SourceError::Browser {
        platform: Platform::TikTok,
        message: message.to_string(),
    }
}
