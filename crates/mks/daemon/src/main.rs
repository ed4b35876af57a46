//! mksd - Meme-Kernel Swarm agent
//!
//! Harvests trends from three platforms on a fixed interval and turns a
//! random sample of them into short generated captions ("kernels").

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mks_daemon::config::StorageConfig;
use mks_daemon::form::prompt_launch_params;
use mks_daemon::{swarm, Credentials, LaunchParams, SwarmConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageKind {
    Memory,
    Postgres,
}

/// MKS agent CLI
#[derive(Parser)]
#[command(name = "mksd")]
#[command(about = "Meme-Kernel Swarm - trend ingestion and kernel generation loop", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MKS_CONFIG")]
    config: Option<String>,

    /// Facebook search term
    #[arg(long)]
    fb_query: Option<String>,

    /// Reddit community to read the hot listing from
    #[arg(long)]
    reddit_sub: Option<String>,

    /// TikTok tag page to scrape
    #[arg(long)]
    tiktok_tag: Option<String>,

    /// Kernels generated per cycle
    #[arg(long)]
    kernel_batch: Option<usize>,

    /// Minutes to sleep between cycles
    #[arg(long)]
    loop_minutes: Option<u64>,

    /// Storage backend
    #[arg(long, value_enum, env = "MKS_STORAGE")]
    storage: Option<StorageKind>,

    /// Prompt for the launch parameters in the terminal
    #[arg(short, long)]
    interactive: bool,

    /// Log level (overrides `logging.level`)
    #[arg(long, env = "MKS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging (overrides `logging.json`)
    #[arg(long, env = "MKS_LOG_JSON")]
    json: bool,
}

impl Cli {
    fn launch_params(&self) -> LaunchParams {
        LaunchParams {
            fb_query: self.fb_query.clone(),
            reddit_sub: self.reddit_sub.clone(),
            tiktok_tag: self.tiktok_tag.clone(),
            kernel_batch: self.kernel_batch,
            loop_minutes: self.loop_minutes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        SwarmConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Initialize tracing
    let logging = config
        .logging
        .with_overrides(cli.log_level.as_deref(), cli.json);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Override with CLI args
    match cli.storage {
        Some(StorageKind::Memory) => config.storage = StorageConfig::Memory,
        Some(StorageKind::Postgres) if !config.storage.is_postgres() => {
            config.storage = StorageConfig::postgres()
        }
        _ => {}
    }
    cli.launch_params().apply(&mut config);

    if cli.interactive {
        prompt_launch_params(&config)?.apply(&mut config);
    }

    // Credentials are fatal before any cycle runs
    let credentials = Credentials::from_env(&config.storage)?;

    println!(
        r#"
  Meme-Kernel Swarm
  Version: {}
  Sources: facebook "{}", reddit r/{}, tiktok #{}
  Kernels per cycle: {}, every {} min
  MKS agent running... Ctrl+C to exit.
"#,
        env!("CARGO_PKG_VERSION"),
        config.sources.facebook.search_term,
        config.sources.reddit.subreddit,
        config.sources.tiktok.tag,
        config.schedule.kernel_batch,
        config.schedule.loop_minutes,
    );

    let scheduler = swarm::build_scheduler(&config, &credentials).await?;
    scheduler.run().await?;
    Ok(())
}
