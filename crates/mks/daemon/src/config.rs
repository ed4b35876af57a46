//! Configuration for the swarm daemon
//!
//! Layering: serialized defaults, then an optional file, then `MKS__*`
//! environment variables, then [`LaunchParams`] from the CLI or the
//! interactive form. Credentials are read once into [`Credentials`] and
//! passed down by parameter.

use mks_model_openai::{DEFAULT_ENDPOINT as DEFAULT_MODEL_ENDPOINT, DEFAULT_MODEL};
use mks_sources::facebook::DEFAULT_ENDPOINT as DEFAULT_FACEBOOK_ENDPOINT;
use mks_sources::reddit::DEFAULT_USER_AGENT as DEFAULT_REDDIT_USER_AGENT;
use mks_sources::webdriver::DEFAULT_WEBDRIVER_URL;
use mks_sources::{FacebookQuery, RedditCredentials, RedditQuery, ScrapeOptions, TikTokQuery};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DaemonError, DaemonResult};
use crate::generate::SamplerConfig;
use crate::ingest::SourceFailurePolicy;

/// Main daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// HTTP timeout for every source request, in seconds
    #[serde(default = "default_source_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub failure_policy: SourceFailurePolicy,

    #[serde(default)]
    pub facebook: FacebookConfig,

    #[serde(default)]
    pub reddit: RedditConfig,

    #[serde(default)]
    pub tiktok: TikTokConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_source_timeout(),
            failure_policy: SourceFailurePolicy::default(),
            facebook: FacebookConfig::default(),
            reddit: RedditConfig::default(),
            tiktok: TikTokConfig::default(),
        }
    }
}

impl SourcesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookConfig {
    #[serde(default = "default_facebook_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_search_term")]
    pub search_term: String,

    #[serde(default = "default_sort_by")]
    pub sort_by: String,

    #[serde(default = "default_post_count")]
    pub count: usize,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            endpoint: default_facebook_endpoint(),
            search_term: default_search_term(),
            sort_by: default_sort_by(),
            count: default_post_count(),
        }
    }
}

impl FacebookConfig {
    pub fn query(&self) -> FacebookQuery {
        FacebookQuery {
            search_term: self.search_term.clone(),
            sort_by: self.sort_by.clone(),
            count: self.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditConfig {
    #[serde(default = "default_subreddit")]
    pub subreddit: String,

    #[serde(default = "default_post_count")]
    pub limit: usize,

    #[serde(default = "default_reddit_user_agent")]
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddit: default_subreddit(),
            limit: default_post_count(),
            user_agent: default_reddit_user_agent(),
        }
    }
}

impl RedditConfig {
    pub fn query(&self) -> RedditQuery {
        RedditQuery {
            subreddit: self.subreddit.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TikTokConfig {
    #[serde(default = "default_tag")]
    pub tag: String,

    #[serde(default = "default_video_count")]
    pub limit: usize,

    /// WebDriver endpoint (chromedriver or a selenium grid)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Bound on the wait for the top-video marker, in seconds
    #[serde(default = "default_marker_wait")]
    pub wait_timeout_secs: u64,

    #[serde(default = "default_scroll_steps")]
    pub scroll_steps: u32,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            tag: default_tag(),
            limit: default_video_count(),
            webdriver_url: default_webdriver_url(),
            headless: true,
            wait_timeout_secs: default_marker_wait(),
            scroll_steps: default_scroll_steps(),
        }
    }
}

impl TikTokConfig {
    pub fn query(&self) -> TikTokQuery {
        TikTokQuery {
            tag: self.tag.clone(),
            limit: self.limit,
        }
    }

    pub fn scrape_options(&self) -> ScrapeOptions {
        ScrapeOptions {
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
            scroll_steps: self.scroll_steps,
            ..ScrapeOptions::default()
        }
    }
}

/// Text-generation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Most-recent trends eligible for sampling
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; unset leaves the endpoint's default
    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// User prompt; `{text}` is replaced by the sampled trend
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_model_endpoint(),
            timeout_secs: default_model_timeout(),
            window_size: default_window_size(),
            max_tokens: default_max_tokens(),
            temperature: None,
            system_prompt: default_system_prompt(),
            prompt_template: default_prompt_template(),
        }
    }
}

impl GenerationConfig {
    pub fn sampler(&self) -> SamplerConfig {
        SamplerConfig {
            window_size: self.window_size,
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
            prompt_template: self.prompt_template.clone(),
        }
    }
}

/// Cycle loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Kernels generated per cycle
    #[serde(default = "default_kernel_batch")]
    pub kernel_batch: usize,

    /// Sleep between cycles, in minutes
    #[serde(default = "default_loop_minutes")]
    pub loop_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            kernel_batch: default_kernel_batch(),
            loop_minutes: default_loop_minutes(),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.loop_minutes.saturating_mul(60))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage; the URL comes from `DATABASE_URL`
    Postgres {
        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl StorageConfig {
    pub fn postgres() -> Self {
        StorageConfig::Postgres {
            max_connections: default_pool_size(),
            connect_timeout_secs: default_connection_timeout(),
        }
    }

    pub fn is_postgres(&self) -> bool {
        matches!(self, StorageConfig::Postgres { .. })
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Command-line flags win over the file/environment layers.
    pub fn with_overrides(&self, level: Option<&str>, json: bool) -> Self {
        Self {
            level: level.map_or_else(|| self.level.clone(), str::to_string),
            json: self.json || json,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_source_timeout() -> u64 {
    30
}

fn default_facebook_endpoint() -> String {
    DEFAULT_FACEBOOK_ENDPOINT.to_string()
}

fn default_search_term() -> String {
    "meme".to_string()
}

fn default_sort_by() -> String {
    "overperforming".to_string()
}

fn default_post_count() -> usize {
    20
}

fn default_subreddit() -> String {
    "memes".to_string()
}

fn default_reddit_user_agent() -> String {
    DEFAULT_REDDIT_USER_AGENT.to_string()
}

fn default_tag() -> String {
    "viral".to_string()
}

fn default_video_count() -> usize {
    10
}

fn default_webdriver_url() -> String {
    DEFAULT_WEBDRIVER_URL.to_string()
}

fn default_marker_wait() -> u64 {
    20
}

fn default_scroll_steps() -> u32 {
    3
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_model_endpoint() -> String {
    DEFAULT_MODEL_ENDPOINT.to_string()
}

fn default_model_timeout() -> u64 {
    60
}

fn default_window_size() -> usize {
    50
}

fn default_max_tokens() -> u32 {
    40
}

fn default_system_prompt() -> String {
    "You are a meme copywriter.".to_string()
}

fn default_prompt_template() -> String {
    "Write a 120-char meme caption inspired by:\n{text}".to_string()
}

fn default_kernel_batch() -> usize {
    20
}

fn default_loop_minutes() -> u64 {
    10
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SwarmConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SwarmConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // MKS__SCHEDULE__LOOP_MINUTES=5
        builder = builder.add_source(
            config::Environment::with_prefix("MKS")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject values the cycle cannot run with
    pub fn validate(&self) -> DaemonResult<()> {
        if self.schedule.loop_minutes == 0 {
            return Err(DaemonError::Config(
                "loop interval must be at least one minute".to_string(),
            ));
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(DaemonError::Config(format!(
                    "temperature {t} is outside 0.0-2.0"
                )));
            }
        }
        if self.generation.window_size == 0 {
            return Err(DaemonError::Config(
                "generation window must hold at least one trend".to_string(),
            ));
        }
        for (name, value) in [
            ("facebook search term", &self.sources.facebook.search_term),
            ("reddit subreddit", &self.sources.reddit.subreddit),
            ("tiktok tag", &self.sources.tiktok.tag),
        ] {
            if value.trim().is_empty() {
                return Err(DaemonError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// The five launch parameters shared by the CLI and the interactive form.
/// `None` keeps whatever the layered configuration already holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    pub fb_query: Option<String>,
    pub reddit_sub: Option<String>,
    pub tiktok_tag: Option<String>,
    pub kernel_batch: Option<usize>,
    pub loop_minutes: Option<u64>,
}

impl LaunchParams {
    pub fn apply(&self, config: &mut SwarmConfig) {
        if let Some(query) = &self.fb_query {
            config.sources.facebook.search_term = query.clone();
        }
        if let Some(sub) = &self.reddit_sub {
            config.sources.reddit.subreddit = sub.clone();
        }
        if let Some(tag) = &self.tiktok_tag {
            config.sources.tiktok.tag = tag.clone();
        }
        if let Some(batch) = self.kernel_batch {
            config.schedule.kernel_batch = batch;
        }
        if let Some(minutes) = self.loop_minutes {
            config.schedule.loop_minutes = minutes;
        }
    }
}

pub const OPENAI_KEY_VAR: &str = mks_model_openai::AUTH_ENV_VAR;
pub const CROWDTANGLE_TOKEN_VAR: &str = "CT_API_KEY";
pub const REDDIT_ID_VAR: &str = "REDDIT_ID";
pub const REDDIT_SECRET_VAR: &str = "REDDIT_SECRET";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Secrets read once at startup
#[derive(Clone)]
pub struct Credentials {
    pub openai_key: String,
    pub crowdtangle_token: String,
    pub reddit: RedditCredentials,
    pub database_url: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("reddit", &self.reddit)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env(storage: &StorageConfig) -> DaemonResult<Self> {
        Self::from_lookup(storage, |name| std::env::var(name).ok())
    }

    /// Resolve every credential through `lookup`; all missing names are
    /// reported together.
    pub fn from_lookup<F>(storage: &StorageConfig, lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut require = |name: &'static str| {
            let value = lookup(name).filter(|v| !v.trim().is_empty());
            if value.is_none() {
                missing.push(name);
            }
            value.unwrap_or_default()
        };

        let openai_key = require(OPENAI_KEY_VAR);
        let crowdtangle_token = require(CROWDTANGLE_TOKEN_VAR);
        let client_id = require(REDDIT_ID_VAR);
        let client_secret = require(REDDIT_SECRET_VAR);
        let database_url = storage.is_postgres().then(|| require(DATABASE_URL_VAR));

        if !missing.is_empty() {
            return Err(DaemonError::Config(format!(
                "Missing environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            openai_key,
            crowdtangle_token,
            reddit: RedditCredentials {
                client_id,
                client_secret,
            },
            database_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("OPENAI_KEY", "sk-test"),
        ("CT_API_KEY", "ct"),
        ("REDDIT_ID", "id"),
        ("REDDIT_SECRET", "secret"),
    ];

    #[test]
    fn test_default_config() {
        let config = SwarmConfig::default();
        assert_eq!(config.sources.facebook.search_term, "meme");
        assert_eq!(config.sources.reddit.subreddit, "memes");
        assert_eq!(config.sources.tiktok.tag, "viral");
        assert_eq!(config.schedule.kernel_batch, 20);
        assert_eq!(config.schedule.loop_minutes, 10);
        assert_eq!(config.generation.window_size, 50);
        assert_eq!(config.sources.failure_policy, SourceFailurePolicy::Isolate);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = SwarmConfig::load(None).unwrap();
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.sources.tiktok.scroll_steps, 3);
    }

    #[test]
    fn test_launch_params_override_only_given_fields() {
        let mut config = SwarmConfig::default();
        LaunchParams {
            reddit_sub: Some("dankmemes".to_string()),
            loop_minutes: Some(3),
            ..LaunchParams::default()
        }
        .apply(&mut config);

        assert_eq!(config.sources.reddit.subreddit, "dankmemes");
        assert_eq!(config.schedule.loop_minutes, 3);
        assert_eq!(config.sources.facebook.search_term, "meme");
        assert_eq!(config.schedule.kernel_batch, 20);
        assert_eq!(config.schedule.interval(), Duration::from_secs(180));
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_blank_tag() {
        let mut config = SwarmConfig::default();
        config.schedule.loop_minutes = 0;
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));

        let mut config = SwarmConfig::default();
        config.sources.tiktok.tag = "  ".to_string();
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_out_of_range_temperature_is_rejected() {
        let mut config = SwarmConfig::default();
        config.generation.temperature = Some(0.7);
        assert!(config.validate().is_ok());
        config.generation.temperature = Some(3.0);
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_logging_flags_override_config() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: true,
        };
        assert_eq!(config.with_overrides(None, false), config);

        let overridden = LoggingConfig::default().with_overrides(Some("warn"), true);
        assert_eq!(overridden.level, "warn");
        assert!(overridden.json);
    }

    #[test]
    fn test_credentials_resolve() {
        let creds = Credentials::from_lookup(&StorageConfig::Memory, env(FULL)).unwrap();
        assert_eq!(creds.openai_key, "sk-test");
        assert_eq!(creds.reddit.client_secret, "secret");
        assert!(creds.database_url.is_none());
        assert!(!format!("{creds:?}").contains("sk-test"));
    }

    #[test]
    fn test_missing_credentials_are_all_reported() {
        let err = Credentials::from_lookup(
            &StorageConfig::postgres(),
            env(&[("OPENAI_KEY", "sk-test"), ("REDDIT_ID", "id")]),
        )
        .unwrap_err();

        let message = err.to_string();
        for name in ["CT_API_KEY", "REDDIT_SECRET", "DATABASE_URL"] {
            assert!(message.contains(name), "{message} should name {name}");
        }
        assert!(!message.contains("OPENAI_KEY"));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let mut pairs = FULL.to_vec();
        pairs.push(("DATABASE_URL", "postgres://localhost/mks"));
        let creds = Credentials::from_lookup(&StorageConfig::postgres(), env(&pairs)).unwrap();
        assert_eq!(
            creds.database_url.as_deref(),
            Some("postgres://localhost/mks")
        );
    }
}
