//! Wiring: config + credentials into storage, sources, backend and scheduler.

use std::sync::Arc;

use mks_model_openai::{OpenAiChatBackend, OpenAiConfig};
use mks_sources::{FacebookSource, RedditSource, TikTokSource, TrendSource, WebDriverLauncher};
use mks_storage::{InMemorySwarmStorage, SwarmStorage};

use crate::config::{Credentials, StorageConfig, SwarmConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::generate::Sampler;
use crate::ingest::Ingestor;
use crate::scheduler::CycleScheduler;

/// Open the configured store once for the life of the process.
pub async fn connect_storage(
    config: &StorageConfig,
    credentials: &Credentials,
) -> DaemonResult<Arc<dyn SwarmStorage>> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(InMemorySwarmStorage::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            max_connections,
            connect_timeout_secs,
        } => {
            let url = credentials.database_url.as_deref().ok_or_else(|| {
                DaemonError::Config("postgres storage requires DATABASE_URL".to_string())
            })?;
            let store = mks_storage::postgres::PostgresSwarmStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!(max_connections, "Connected to PostgreSQL storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => {
            let _ = credentials;
            Err(DaemonError::Config(
                "postgres storage requested but mksd was built without the `postgres` feature"
                    .to_string(),
            ))
        }
    }
}

/// The three platform adapters in canonical order.
pub fn build_sources(
    config: &SwarmConfig,
    credentials: &Credentials,
) -> DaemonResult<Vec<Arc<dyn TrendSource>>> {
    let sources = &config.sources;
    let timeout = sources.request_timeout();

    let facebook = FacebookSource::new(
        sources.facebook.endpoint.clone(),
        credentials.crowdtangle_token.clone(),
        sources.facebook.query(),
        timeout,
    )?;

    let reddit = RedditSource::new(credentials.reddit.clone(), sources.reddit.query(), timeout)?
        .with_user_agent(sources.reddit.user_agent.clone());

    let mut launcher = WebDriverLauncher::new(sources.tiktok.webdriver_url.clone(), timeout)?;
    if !sources.tiktok.headless {
        launcher = launcher.headed();
    }
    let tiktok = TikTokSource::new(
        Arc::new(launcher),
        sources.tiktok.query(),
        sources.tiktok.scrape_options(),
    );

    let built: Vec<Arc<dyn TrendSource>> =
        vec![Arc::new(facebook), Arc::new(reddit), Arc::new(tiktok)];
    Ok(built)
}

pub fn build_sampler(config: &SwarmConfig, credentials: &Credentials) -> DaemonResult<Sampler> {
    let generation = &config.generation;
    let mut backend_config = OpenAiConfig::new(credentials.openai_key.clone())
        .with_model(generation.model.clone())
        .with_endpoint(generation.endpoint.clone())
        .with_temperature(generation.temperature);
    backend_config.timeout_secs = generation.timeout_secs;

    let backend = OpenAiChatBackend::new(backend_config)
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    Ok(Sampler::new(Arc::new(backend), generation.sampler()))
}

/// Build the full cycle from a validated configuration.
pub async fn build_scheduler(
    config: &SwarmConfig,
    credentials: &Credentials,
) -> DaemonResult<CycleScheduler> {
    config.validate()?;

    let storage = connect_storage(&config.storage, credentials).await?;
    let ingestor = Ingestor::new(
        build_sources(config, credentials)?,
        config.sources.failure_policy,
    );
    let sampler = build_sampler(config, credentials)?;

    tracing::info!(
        platforms = ?ingestor.platforms(),
        policy = ?ingestor.policy(),
        "Swarm assembled"
    );
    Ok(CycleScheduler::new(
        storage,
        ingestor,
        sampler,
        config.schedule.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mks_sources::RedditCredentials;
    use mks_storage::Platform;

    fn credentials() -> Credentials {
        Credentials {
            openai_key: "sk-test".to_string(),
            crowdtangle_token: "ct".to_string(),
            reddit: RedditCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            database_url: None,
        }
    }

    #[test]
    fn sources_are_built_in_platform_order() {
        let sources = build_sources(&SwarmConfig::default(), &credentials()).unwrap();
        let platforms: Vec<_> = sources.iter().map(|s| s.platform()).collect();
        assert_eq!(platforms, Platform::ALL.to_vec());
    }

    #[test]
    fn sampler_rejects_blank_key() {
        let mut creds = credentials();
        creds.openai_key = " ".to_string();
        assert!(matches!(
            build_sampler(&SwarmConfig::default(), &creds),
            Err(DaemonError::Config(_))
        ));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_connecting() {
        let mut config = SwarmConfig::default();
        config.schedule.loop_minutes = 0;
        assert!(matches!(
            build_scheduler(&config, &credentials()).await,
            Err(DaemonError::Config(_))
        ));
    }
}
