use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use floodgate::config::{FloodgateConfig, StoreConfig};
use floodgate::ratelimit::{Lock, RateLimiter};

/// Inspect and exercise fixed-window rate limits.
#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// Configuration file (YAML); `FLOODGATE__*` variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether one more event is allowed for a key
    Check(LimitArgs),
    /// Record one event for a key
    Hit(LimitArgs),
    /// Show the counter and remaining window for a key
    Status(LimitArgs),
    /// Drop the window for a key
    Reset {
        /// Rate limit key
        key: String,
    },
    /// Send a series of events through the limiter and print each decision
    Simulate {
        #[command(flatten)]
        limit: LimitArgs,
        /// Number of events to send
        #[arg(long, default_value_t = 10)]
        events: u32,
        /// Delay between events in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

#[derive(Debug, Args)]
struct LimitArgs {
    /// Rate limit key, e.g. `login:1.2.3.4`
    key: String,
    /// Named limit from the configuration file
    #[arg(long, conflicts_with_all = ["allowed", "window"])]
    rule: Option<String>,
    /// Events allowed per window, 0 for unlimited
    #[arg(long, default_value_t = 0)]
    allowed: u64,
    /// Window length in seconds
    #[arg(long, default_value_t = 60)]
    window: u64,
}

impl Command {
    /// Whether the command reads or changes state left by earlier runs.
    fn uses_earlier_state(&self) -> bool {
        !matches!(self, Command::Simulate { .. })
    }
}

impl LimitArgs {
    async fn lock(&self, limiter: &RateLimiter) -> floodgate::error::Result<Lock> {
        match &self.rule {
            Some(rule) => limiter.new_lock_for_rule(rule, &self.key).await,
            None => {
                limiter
                    .new_lock(&self.key, self.allowed, Duration::from_secs(self.window))
                    .await
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = FloodgateConfig::load(cli.config.as_deref())?;
    info!(store = ?config.store, "Configuration loaded");

    if config.store == StoreConfig::Memory && cli.command.uses_earlier_state() {
        warn!("Using the in-memory store: windows do not persist between runs");
    }

    let limiter = RateLimiter::from_config(&config).await?;

    match cli.command {
        Command::Check(args) => {
            let lock = args.lock(&limiter).await?;
            if lock.is_allowed().await {
                println!("allowed");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("denied");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Hit(args) => {
            let lock = args.lock(&limiter).await?;
            lock.hit().await?;
            println!("{}", lock.hits().await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Status(args) => {
            let lock = args.lock(&limiter).await?;
            let hits = lock.hits().await?;
            let ttl = lock.get_ttl().await?;
            println!(
                "key={} hits={} allowed={} ttl={}s",
                lock.key(),
                hits,
                lock.allowed(),
                ttl.as_secs()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Reset { key } => {
            limiter.remove_lock(&key).await?;
            println!("reset {}", key);
            Ok(ExitCode::SUCCESS)
        }
        Command::Simulate {
            limit,
            events,
            interval_ms,
        } => {
            let mut denied = 0u32;
            for i in 0..events {
                let lock = limit.lock(&limiter).await?;
                if lock.is_allowed().await {
                    lock.hit().await?;
                    println!("event {}: allowed", i);
                } else {
                    denied += 1;
                    let ttl = lock.get_ttl().await?;
                    println!("event {}: denied (window resets in {}s)", i, ttl.as_secs());
                }
                if interval_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
            println!("{} allowed, {} denied", events - denied, denied);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Install the global tracing subscriber; `RUST_LOG` overrides the level.
fn init_tracing(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
