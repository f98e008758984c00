//! # Larder — perishable inventory tracker
//!
//! Items with expiration timestamps are registered per Telegram chat; the
//! scheduler sends a daily digest, a one-hour warning, and expired alerts
//! until the user writes the item off.
//!
//! Usage:
//!   larder                 # run the scheduler loop (tick every 60s)
//!   larder --once          # run a single tick and exit (external cron)
//!   larder -c larder.toml  # custom config path

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use larder_core::clock::SystemClock;
use larder_core::config::LarderConfig;
use larder_scheduler::{EngineSettings, ExpiryEngine, spawn_scheduler};
use larder_store::SqliteStore;
use larder_telegram::TelegramNotifier;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Perishable inventory tracker — expiry reminders over Telegram"
)]
struct Cli {
    /// Config file (default: ~/.larder/config.toml)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Run a single scheduler tick and exit. Lets a platform cron trigger
    /// drive the scheduler instead of the internal interval loop.
    #[arg(long)]
    once: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Everything in here is startup configuration — the only phase where an
    // error is allowed to be fatal. Once the loop is running, failures are
    // contained to a single tick.
    let config = match &cli.config {
        Some(path) => LarderConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LarderConfig::load().context("loading config")?,
    };
    let settings = EngineSettings::from_config(&config.scheduler)?;

    let db_path = config.store.resolved_db_path();
    let store = Arc::new(SqliteStore::open(&db_path)?);
    tracing::info!("Item store: {}", db_path.display());

    if !config.telegram.enabled {
        anyhow::bail!("telegram channel is disabled; enable [telegram] in the config");
    }
    let token = config
        .telegram
        .resolved_token()
        .context("telegram bot token not configured (set [telegram].bot_token or LARDER_BOT_TOKEN)")?;
    let notifier = Arc::new(TelegramNotifier::new(token));
    let me = notifier
        .get_me()
        .await
        .context("telegram token check failed")?;
    tracing::info!(
        "Telegram bot: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    let engine = Arc::new(ExpiryEngine::new(
        store.clone(),
        store,
        notifier,
        Arc::new(SystemClock),
        settings,
    ));

    if cli.once {
        let outcome = engine.run_tick().await;
        tracing::info!(
            "Tick complete: {} sent, {} errors",
            outcome.total_sent(),
            outcome.total_errors()
        );
        return Ok(());
    }

    spawn_scheduler(engine, config.scheduler.tick_secs).await;
    Ok(())
}
