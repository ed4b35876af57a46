//! OpenAI-compatible completion backend for kernel generation.
//!
//! The generation sampler only needs single-turn text completion: one system
//! role string, one user prompt, a token ceiling, one completion back.

use std::time::Duration;

use async_trait::async_trait;
use mks_storage::truncate_chars;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const AUTH_ENV_VAR: &str = "OPENAI_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Completion backend errors.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid backend config: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
}

/// Opaque text-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            temperature: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completions over HTTP.
#[derive(Clone)]
pub struct OpenAiChatBackend {
    config: OpenAiConfig,
    client: Client,
}

impl std::fmt::Debug for OpenAiChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatBackend")
            .field("config", &self.config)
            .finish()
    }
}

impl OpenAiChatBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, ModelError> {
        if config.api_key.trim().is_empty() {
            return Err(ModelError::InvalidConfig(format!(
                "missing api key ({})",
                AUTH_ENV_VAR
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionBackend for OpenAiChatBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let url = resolve_chat_endpoint(&self.config.endpoint);
        let payload = chat_payload(&self.config, request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::Transport(format!("chat request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status,
                body: truncate_chars(&body, 320),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let output = first_choice_text(&body)?;
        tracing::debug!(model = %self.config.model, chars = output.len(), "completion received");
        Ok(output)
    }
}

fn chat_payload(config: &OpenAiConfig, request: &CompletionRequest) -> Value {
    let mut messages = Vec::new();
    if !request.system_prompt.trim().is_empty() {
        messages.push(json!({
            "role": "system",
            "content": request.system_prompt,
        }));
    }
    messages.push(json!({
        "role": "user",
        "content": request.user_prompt,
    }));

    let mut payload = json!({
        "model": config.model,
        "messages": messages,
        "max_tokens": request.max_tokens,
    });
    if let Some(temp) = config.temperature {
        payload["temperature"] = json!(temp);
    }
    payload
}

fn first_choice_text(body: &ChatResponse) -> Result<String, ModelError> {
    let choice = body
        .choices
        .first()
        .ok_or_else(|| ModelError::InvalidResponse("response did not include choices".into()))?;
    Ok(extract_text(&choice.message.content))
}

fn resolve_chat_endpoint(endpoint: &str) -> String {
    if endpoint.contains("/chat/completions") {
        endpoint.to_string()
    } else {
        format!("{}/chat/completions", endpoint.trim_end_matches('/'))
    }
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "You are a meme copywriter.".to_string(),
            user_prompt: "Write a caption".to_string(),
            max_tokens: 40,
        }
    }

    #[test]
    fn payload_carries_roles_and_token_ceiling() {
        let config = OpenAiConfig::new("sk-test");
        let payload = chat_payload(&config, &request());

        assert_eq!(payload["model"], DEFAULT_MODEL);
        assert_eq!(payload["max_tokens"], 40);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "Write a caption");
        assert!(payload.get("temperature").is_none());
    }

    #[test]
    fn payload_carries_temperature_when_set() {
        let config = OpenAiConfig::new("sk-test").with_temperature(Some(0.5));
        let payload = chat_payload(&config, &request());
        assert_eq!(payload["temperature"], 0.5);
    }

    #[test]
    fn endpoint_resolution_appends_path_once() {
        assert_eq!(
            resolve_chat_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            resolve_chat_endpoint("http://localhost:8000/v1/chat/completions"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn first_choice_accepts_string_and_parts() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "when the build passes"}}]
        }))
        .unwrap();
        assert_eq!(first_choice_text(&body).unwrap(), "when the build passes");

        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}}]
        }))
        .unwrap();
        assert_eq!(first_choice_text(&body).unwrap(), "a\nb");
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let body = ChatResponse { choices: vec![] };
        assert!(matches!(
            first_choice_text(&body),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let result = OpenAiChatBackend::new(OpenAiConfig::new("  "));
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let rendered = format!("{:?}", OpenAiConfig::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
    }
}
