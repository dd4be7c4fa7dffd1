mod config;
mod database;
mod monitoring;
mod pool;
mod registry;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::database::{Database, MonitorUpdate};
use crate::monitoring::{HttpChecker, PingService, ReliabilityAggregator, RetentionCleanup, RetentionPolicy};
use crate::registry::Registry;

#[derive(Debug, Parser)]
#[command(name = "dxmonitor", version, about = "Uptime monitoring for HTTP(S) endpoints")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/dxmonitor/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler and history cleanup until Ctrl-C
    Run,
    /// Register a monitor
    Add {
        name: String,
        url: String,
        /// Minutes between checks (1-60)
        #[arg(long, default_value_t = database::models::DEFAULT_INTERVAL_MINUTES)]
        interval: u32,
        /// Password required to remove the monitor later
        #[arg(long)]
        password: String,
    },
    /// List monitors and their uptime
    List,
    /// Show recent checks, for one monitor or all of them
    History { id: Option<Uuid> },
    /// Edit a monitor
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        interval: Option<u32>,
    },
    /// Remove a monitor and its history
    Remove {
        id: Uuid,
        #[arg(long)]
        password: String,
    },
    /// Check one monitor right now
    Check { id: Uuid },
    /// Run a one-off deep analysis of a URL and print it as JSON
    Test { url: String },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(error = %format!("{error:#}"), "dxmonitor terminated with error");
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Everything the subcommands share
struct App {
    db: Arc<dyn Database>,
    service: Arc<PingService>,
    registry: Registry,
}

impl App {
    async fn open(config: &Config) -> anyhow::Result<Self> {
        let db: Arc<dyn Database> = Arc::new(
            database::open(&config.database.path, config.database.max_connections)
                .await
                .with_context(|| format!("failed to open database {}", config.database.path))?,
        );

        let checker = Arc::new(HttpChecker::new(config.probe.timeout(), &config.probe.user_agent)?);
        let aggregator = Arc::new(ReliabilityAggregator::new(db.clone()));
        let service = Arc::new(PingService::new(db.clone(), checker, aggregator, config.scheduler.tick()));
        let registry = Registry::new(db.clone(), service.clone(), config.history.display_limit);

        Ok(Self { db, service, registry })
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref()).context("failed to load configuration")?;

    logger::init(&config.logging);

    match cli.command {
        Command::Config => {
            print!("{config}");
        }
        Command::Test { url } => {
            sitescan::validate_target(&url)?;
            let analyzer = sitescan::Analyzer::new(sitescan::AnalyzerOptions {
                fetch_timeout: config.probe.timeout(),
                user_agent: config.probe.user_agent.clone(),
                ..Default::default()
            });
            let report = analyzer.analyze(&url).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Run => {
            let app = App::open(&config).await?;
            serve(app, &config).await?;
        }
        Command::Add { name, url, interval, password } => {
            let app = App::open(&config).await?;
            let (monitor, initial_check) = app.registry.create(&name, &url, interval, &password).await?;
            initial_check.await.context("initial check panicked")?;
            let monitor = app.registry.get(monitor.id).await?;
            println!("{}", serde_json::to_string_pretty(&monitor)?);
        }
        Command::List => {
            let app = App::open(&config).await?;
            for monitor in app.registry.list().await? {
                println!(
                    "{}  {:<8} {:>3}%  {:>6}  every {:>2}m  {}  {}",
                    monitor.id,
                    monitor.status,
                    monitor.uptime_percentage,
                    monitor.response_time.map(|ms| format!("{ms}ms")).unwrap_or_else(|| "-".into()),
                    monitor.interval,
                    monitor.name,
                    monitor.url,
                );
            }
        }
        Command::History { id } => {
            let app = App::open(&config).await?;
            let json = match id {
                Some(id) => serde_json::to_string_pretty(&app.registry.history(id).await?)?,
                None => serde_json::to_string_pretty(&app.registry.all_history().await?)?,
            };
            println!("{json}");
        }
        Command::Update { id, name, url, interval } => {
            let app = App::open(&config).await?;
            let update = MonitorUpdate { name, url, interval };
            if update.is_empty() {
                anyhow::bail!("nothing to update, pass --name, --url or --interval");
            }
            let (monitor, recheck) = app.registry.update(id, update).await?;
            if let Some(recheck) = recheck {
                recheck.await.context("re-check panicked")?;
            }
            println!("{}", serde_json::to_string_pretty(&app.registry.get(monitor.id).await?)?);
        }
        Command::Remove { id, password } => {
            let app = App::open(&config).await?;
            app.registry.delete(id, &password).await?;
            println!("removed {id}");
        }
        Command::Check { id } => {
            let app = App::open(&config).await?;
            let result = app.service.check_existing(id).await?;
            println!(
                "{} {} {}",
                id,
                result.status,
                result.response_time.map(|ms| format!("{ms}ms")).unwrap_or_else(|| "-".into())
            );
        }
    }

    Ok(())
}

/// Long-running mode: scheduler plus history retention.
async fn serve(app: App, config: &Config) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), database = %config.database.path, "starting dxmonitor");

    let cleanup = Arc::new(RetentionCleanup::new(
        app.db.clone(),
        RetentionPolicy {
            keep_per_monitor: config.history.retain_per_monitor,
            interval: config.history.cleanup_interval(),
        },
    ));
    let cleanup_handle = cleanup.start_periodic_cleanup();

    app.service.start().await;

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");

    app.service.stop().await;
    cleanup_handle.abort();
    Ok(())
}
