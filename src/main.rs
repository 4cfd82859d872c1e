use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hoardify::background_jobs::jobs::{
    LivePlaybackPollJob, MetadataBackfillJob, RecentlyPlayedBackstopJob, LIVE_PLAYBACK_POLL_JOB_ID,
};
use hoardify::background_jobs::{create_scheduler, SelfReschedulingTimer};
use hoardify::config::{AppConfig, CliConfig, FileConfig};
use hoardify::listening::{ListeningDeps, PlaybackPoller, RecentlyPlayedBackstop};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite listening history database.
    #[clap(value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the JSON file holding the upstream access token.
    /// Defaults to token.json next to the database.
    #[clap(long, value_parser = parse_path)]
    pub token_path: Option<PathBuf>,

    /// OAuth client id, needed to refresh expired tokens.
    #[clap(long)]
    pub client_id: Option<String>,

    /// OAuth client secret, needed to refresh expired tokens.
    #[clap(long)]
    pub client_secret: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            token_path: self.token_path.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let deps = ListeningDeps::from_config(&app_config)?;
    let syncer = Arc::new(deps.metadata_syncer());

    let shutdown_token = CancellationToken::new();
    let (mut scheduler, scheduler_handle) = create_scheduler(shutdown_token.clone());

    let poller = PlaybackPoller::new(
        deps.clone(),
        Arc::clone(&syncer),
        app_config.polling.interval_policy.clone(),
    )
    .with_timer(SelfReschedulingTimer::new(
        scheduler_handle.clone(),
        LIVE_PLAYBACK_POLL_JOB_ID,
    ));
    info!(
        "Live polling with {:?} interval policy",
        app_config.polling.interval_policy
    );
    scheduler
        .register_job(Arc::new(LivePlaybackPollJob::new(
            Arc::new(poller),
            app_config.polling.initial_delay,
            deps.rate_limiter.max_interval(),
        )))
        .await;

    let backstop = RecentlyPlayedBackstop::new(
        deps.clone(),
        Arc::clone(&syncer),
        app_config.polling.backstop_limit,
    );
    scheduler
        .register_job(Arc::new(RecentlyPlayedBackstopJob::new(
            Arc::new(backstop),
            app_config.polling.backstop_interval,
        )))
        .await;

    match app_config.polling.metadata_backfill_interval {
        Some(interval) => {
            scheduler
                .register_job(Arc::new(MetadataBackfillJob::new(
                    Arc::clone(&syncer),
                    interval,
                )))
                .await;
        }
        None => info!("Periodic metadata backfill disabled"),
    }

    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count().await
    );
    for job in scheduler_handle.list_jobs().await {
        info!(
            "  {} ({}): next run in {:?}s",
            job.id, job.schedule.schedule_type, job.next_run_in_secs
        );
    }

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => error!("Failed to listen for Ctrl+C, shutting down: {}", e),
    }
    shutdown_token.cancel();

    scheduler_task
        .await
        .context("Scheduler task terminated abnormally")?;
    info!("Bye");
    Ok(())
}
