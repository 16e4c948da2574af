mod discount;
mod schedule;
mod sync;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use plansync_core::{AppConfig, EntityType};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "plansync")]
#[command(about = "Normalize subscription discounts and push local records to Shopify")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Normalize a raw discount and print its customer-facing label
    Discount {
        /// PERCENTAGE, FIXED_AMOUNT or PRICE
        #[arg(long)]
        kind: String,

        /// Raw magnitude as received upstream, e.g. 0.10, -10.0, 5
        #[arg(long, allow_hyphen_values = true)]
        value: String,

        /// ISO currency code used for amounts
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Print the label and Shopify adjustment value as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a payload locally; it is pushed by the next `push` or scheduled sweep
    Save {
        #[arg(long)]
        entity_type: EntityType,

        /// JSON file holding the entity's fields
        #[arg(long)]
        file: PathBuf,

        /// Existing record to update; a new id is assigned when omitted
        #[arg(long)]
        local_id: Option<Uuid>,
    },
    /// Push every record that owes a push
    Push {
        #[command(flatten)]
        filter: SweepArgs,

        /// List what would be pushed without calling Shopify
        #[arg(long)]
        dry_run: bool,
    },
    /// Stop tracking a record, deleting it on Shopify where policy allows
    Delete {
        #[arg(long)]
        local_id: Uuid,
    },
    /// Show record counts per entity type and sync state
    Status,
    /// Run the push sweep on a cron schedule until interrupted
    Schedule {
        /// Six-field cron expression with seconds, e.g. "0 */5 * * * *"
        #[arg(long)]
        cron: String,

        #[command(flatten)]
        filter: SweepArgs,
    },
    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

/// Which pending records a sweep picks up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub(crate) struct SweepArgs {
    /// Only push records of this type
    #[arg(long)]
    pub entity_type: Option<EntityType>,

    /// Only retry records whose last push failed
    #[arg(long)]
    pub only_failed: bool,

    /// Maximum number of records to push
    #[arg(long)]
    pub limit: Option<i64>,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

/// Loads config, starts logging and opens the pool for commands that talk
/// to the database.
async fn connect() -> anyhow::Result<(AppConfig, PgPool)> {
    let config = plansync_core::load_app_config()?;
    init_tracing(&config.log_level)?;

    let pool_config = plansync_db::PoolConfig::from_app_config(&config);
    let pool = plansync_db::connect_pool(&config.database_url, pool_config).await?;
    Ok((config, pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("plansync: no command given, see `plansync --help`");
        return Ok(());
    };

    match command {
        Commands::Discount {
            kind,
            value,
            currency,
            json,
        } => {
            init_tracing("warn")?;
            discount::run(&kind, &value, &currency, json)
        }
        Commands::Save {
            entity_type,
            file,
            local_id,
        } => {
            let (_, pool) = connect().await?;
            sync::run_save(&pool, entity_type, &file, local_id).await
        }
        Commands::Push { filter, dry_run } => {
            let (config, pool) = connect().await?;
            if dry_run {
                return sync::run_dry_run(&pool, &filter).await;
            }
            let engine = sync::build_engine(&config)?;
            let summary = sync::run_sweep(&pool, &engine, &filter).await?;
            println!("{summary}");
            Ok(())
        }
        Commands::Delete { local_id } => {
            let (config, pool) = connect().await?;
            let engine = sync::build_engine(&config)?;
            sync::run_delete(&pool, &engine, local_id).await
        }
        Commands::Status => {
            let (_, pool) = connect().await?;
            sync::run_status(&pool).await
        }
        Commands::Schedule { cron, filter } => {
            let (config, pool) = connect().await?;
            let engine = sync::build_engine(&config)?;
            schedule::run(pool, engine, &cron, filter).await
        }
        Commands::Db { command } => {
            let (_, pool) = connect().await?;
            match command {
                DbCommands::Ping => {
                    plansync_db::ping(&pool).await?;
                    println!("database: ok");
                }
                DbCommands::Migrate => {
                    let applied = plansync_db::run_migrations(&pool).await?;
                    println!("migrations applied: {applied}");
                }
            }
            Ok(())
        }
    }
}
