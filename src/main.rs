#![allow(dead_code)]

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::select;
use tracing_subscriber::EnvFilter;

mod api;
mod error;
mod executor;
mod id;
mod recorder;
mod scheduler;
mod store;

#[derive(Debug, Clone, Parser)]
#[command(
    version,
    about,
    subcommand_required = false,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(flatten)]
    serve: ServeOptions,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Runs the API surface and the scheduler engine together
    Serve(ServeOptions),
    /// Runs only the control/query API
    Api(ApiOptions),
    /// Runs only the scheduler engine
    Scheduler(SchedulerOptions),
    /// Applies pending store migrations and exits
    Migrate(MigrateOptions),
}

#[derive(Debug, Clone, Parser)]
pub struct ServeOptions {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:///./api_scheduler.db")]
    database_url: String,
    #[arg(long, env = "SCHEDULER_POLL_SECONDS", default_value_t = 1.0)]
    scheduler_poll_seconds: f64,
    #[arg(long, env = "DEFAULT_REQUEST_TIMEOUT", default_value_t = 30)]
    default_request_timeout: u64,
    #[arg(long, env = "MAX_CONCURRENT_EXECUTIONS", default_value_t = 50)]
    max_concurrent_executions: usize,
}

#[derive(Debug, Clone, Parser)]
pub struct ApiOptions {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "DEFAULT_REQUEST_TIMEOUT", default_value_t = 30)]
    default_request_timeout: u64,
}

impl TryFrom<ServeOptions> for ApiOptions {
    type Error = anyhow::Error;

    fn try_from(value: ServeOptions) -> Result<Self, Self::Error> {
        Ok(Self {
            port: value.port,
            database_url: value.database_url,
            default_request_timeout: value.default_request_timeout,
        })
    }
}

#[derive(Debug, Clone, Parser)]
pub struct SchedulerOptions {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "SCHEDULER_POLL_SECONDS", default_value_t = 1.0)]
    scheduler_poll_seconds: f64,
    #[arg(long, env = "DEFAULT_REQUEST_TIMEOUT", default_value_t = 30)]
    default_request_timeout: u64,
    #[arg(long, env = "MAX_CONCURRENT_EXECUTIONS", default_value_t = 50)]
    max_concurrent_executions: usize,
}

impl TryFrom<ServeOptions> for SchedulerOptions {
    type Error = anyhow::Error;

    fn try_from(value: ServeOptions) -> Result<Self, Self::Error> {
        Ok(Self {
            database_url: value.database_url,
            scheduler_poll_seconds: value.scheduler_poll_seconds,
            default_request_timeout: value.default_request_timeout,
            max_concurrent_executions: value.max_concurrent_executions,
        })
    }
}

#[derive(Debug, Clone, Parser)]
pub struct MigrateOptions {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv_override();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Serve(_)) => {
            let serve_options = cli
                .command
                .and_then(|cmd| match cmd {
                    Commands::Serve(opts) => Some(opts),
                    _ => None,
                })
                .unwrap_or(cli.serve);

            if serve_options.database_url.is_empty() {
                return Err(anyhow!("No database url provided!"));
            }

            let db = store::Store::connect(&serve_options.database_url).await?;
            db.migrate().await?;
            db.sweep_stale_runs().await?;

            let api_config = api::Config::from_cli(serve_options.clone().try_into()?, db.clone()).await;
            let scheduler_config =
                scheduler::Config::from_cli(serve_options.clone().try_into()?, db.clone()).await;

            select! {
              api_res = api::start(api_config) => {
                tracing::info!("api service stopped");
                api_res?;
              },
              scheduler_res = scheduler::start(scheduler_config) => {
                tracing::info!("scheduler service stopped");
                scheduler_res?;
              },
              _ = tokio::signal::ctrl_c() => tracing::info!("received ctrl-c"),
            }
        }
        Some(Commands::Api(api_options)) => {
            let db = store::Store::connect(&api_options.database_url).await?;
            db.migrate().await?;
            let config = api::Config::from_cli(api_options, db).await;
            api::start(config).await?;
            tracing::info!("api service stopped");
        }
        Some(Commands::Scheduler(scheduler_options)) => {
            let db = store::Store::connect(&scheduler_options.database_url).await?;
            db.migrate().await?;
            db.sweep_stale_runs().await?;
            let config = scheduler::Config::from_cli(scheduler_options, db).await;
            scheduler::start(config).await?;
            tracing::info!("scheduler service stopped");
        }
        Some(Commands::Migrate(migrate_options)) => {
            let db = store::Store::connect(&migrate_options.database_url).await?;
            db.migrate().await?;
            tracing::info!("migrations applied");
        }
    }

    tracing::info!("program stopped");

    Ok(())
}
