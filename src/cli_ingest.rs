use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hoardify::config::{AppConfig, CliConfig, FileConfig, MAX_BACKSTOP_LIMIT};
use hoardify::credentials::{AccessToken, CredentialStore, FileCredentialStore};
use hoardify::listening::{ListeningDeps, PlaybackPoller, RecentlyPlayedBackstop};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// Manual ingestion triggers. Every command prints a JSON result.
///
/// Commands run in this process only: they get their own rate window, cache
/// and poll lock, and do not coordinate with a running `hoardify` daemon.
/// The play log's uniqueness keeps a manual poll from double counting a
/// listen the daemon already stored.
#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite listening history database.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the JSON file holding the upstream access token.
    #[clap(long, value_parser = parse_path)]
    pub token_path: Option<PathBuf>,

    #[clap(long)]
    pub client_id: Option<String>,

    #[clap(long)]
    pub client_secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one live playback poll cycle. Does not schedule a next cycle.
    PollNow,

    /// Reconcile the play log with the recently played history.
    PollRecent {
        /// How many recent listens to fetch (at most 50).
        #[clap(long)]
        limit: Option<usize>,
    },

    /// Fetch every artist and album referenced by stored tracks but missing locally.
    SyncMetadata,

    /// Store an access token obtained elsewhere.
    SaveToken {
        access_token: String,

        #[clap(long)]
        refresh_token: Option<String>,

        /// Lifetime of the access token in seconds.
        #[clap(long)]
        expires_in: Option<i64>,
    },

    /// Show store counters, the configured rate limits and token status.
    Stats,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        token_path: cli_args.token_path.clone(),
        client_id: cli_args.client_id.clone(),
        client_secret: cli_args.client_secret.clone(),
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    // Saving a token must work before anything else can.
    if let Command::SaveToken {
        access_token,
        refresh_token,
        expires_in,
    } = &cli_args.command
    {
        let store = FileCredentialStore::new(&app_config.token_path);
        let token = AccessToken {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            expires_at: expires_in.map(|secs| Utc::now().timestamp() + secs),
            scope: None,
        };
        store.save_token(&token)?;
        return print_json(&json!({
            "saved": true,
            "token_path": app_config.token_path,
            "expires_at": token.expires_at,
        }));
    }

    let deps = ListeningDeps::from_config(&app_config)?;
    let syncer = Arc::new(deps.metadata_syncer());

    match cli_args.command {
        Command::PollNow => {
            let poller = PlaybackPoller::new(
                deps.clone(),
                syncer,
                app_config.polling.interval_policy.clone(),
            );
            print_json(&poller.poll_current_playback().await)
        }
        Command::PollRecent { limit } => {
            let limit = limit
                .unwrap_or(app_config.polling.backstop_limit)
                .clamp(1, MAX_BACKSTOP_LIMIT);
            let backstop = RecentlyPlayedBackstop::new(deps.clone(), syncer, limit);
            print_json(&backstop.poll_recently_played().await)
        }
        Command::SyncMetadata => print_json(&syncer.sync_all_missing_metadata().await?),
        Command::Stats => {
            let token = deps.credentials.get_cached_token()?;
            print_json(&json!({
                "store": deps.store.get_stats()?,
                "rate_limits": {
                    "window_seconds": app_config.rate_limiter.window_seconds,
                    "max_requests": app_config.rate_limiter.max_requests,
                },
                "token": {
                    "present": token.is_some(),
                    "expired": token.as_ref().map(|t| t.is_expired()),
                    "refreshable": token.as_ref().map(|t| t.refresh_token.is_some()),
                },
            }))
        }
        Command::SaveToken { .. } => Ok(()),
    }
}
