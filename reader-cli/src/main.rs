//! reader CLI - maintenance tooling for the reader platform database
//!
//! This is the composition root: it loads configuration, builds the one
//! `Database` for the process, runs a single command and closes the pool.
//! - Connectivity check and schema migrations (`ping`, `migrate`)
//! - Category tree inspection (`categories`)
//! - Tag maintenance: cleanup, merge, popularity (`tags`)
//! - Article listing and status transitions (`articles`)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reader_store::{shutdown_signal, Database, StoreConfig};
use tracing::{debug, warn};

mod commands;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "reader",
    author,
    version,
    about = "Maintenance tooling for the reader platform database",
    long_about = "Inspect and maintain the reader platform's PostgreSQL database: run migrations, \
                  walk the category tree, clean up and merge tags, and move articles through \
                  their publishing lifecycle."
)]
struct Cli {
    /// TOML config file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// PostgreSQL connection URL
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending schema migrations
    Migrate(commands::migrate::MigrateArgs),
    /// Category tree operations (tree, ancestors)
    Categories(commands::categories::CategoriesArgs),
    /// Tag maintenance (cleanup, merge, popular)
    Tags(commands::tags::TagsArgs),
    /// Article listing and status changes (list, publish, archive)
    Articles(commands::articles::ArticlesArgs),
}

fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StoreConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid database settings in environment")?;
    if let Some(url) = &cli.database_url {
        config.database.url = Some(url.clone());
    }
    Ok(config)
}

async fn dispatch(db: &Database, command: Commands) -> Result<()> {
    match command {
        Commands::Ping => commands::run_ping(db).await,
        Commands::Migrate(args) => commands::run_migrate(db, args).await,
        Commands::Categories(args) => commands::run_categories(db, args).await,
        Commands::Tags(args) => commands::run_tags(db, args).await,
        Commands::Articles(args) => commands::run_articles(db, args).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    let config = load_config(&cli)?;
    let db = Database::connect_lazy(&config).context("Failed to configure database pool")?;
    debug!(command = ?cli.command, "dispatching");

    let result = tokio::select! {
        result = dispatch(&db, cli.command) => result,
        _ = shutdown_signal() => {
            warn!("interrupted, shutting down");
            Ok(())
        }
    };

    db.close().await;
    result
}
