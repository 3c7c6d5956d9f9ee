//! Migrate command - apply schema migrations and optional default rows

use anyhow::{Context, Result};
use clap::Parser;
use reader_store::{run_migrations, seed_defaults, Database};

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Also insert default categories and tags (safe to repeat)
    #[arg(long)]
    pub seed: bool,
}

pub async fn run_migrate(db: &Database, args: MigrateArgs) -> Result<()> {
    let applied = run_migrations(db).await.context("Failed to run migrations")?;
    if applied.is_empty() {
        println!("schema up to date");
    } else {
        println!("applied migrations: {}", applied.join(", "));
    }

    if args.seed {
        seed_defaults(db).await.context("Failed to seed defaults")?;
        println!("default categories and tags seeded");
    }
    Ok(())
}
