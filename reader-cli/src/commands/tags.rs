//! Tags command - tag maintenance

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reader_store::{Database, TagRepo};

#[derive(Parser, Debug)]
pub struct TagsArgs {
    #[command(subcommand)]
    pub command: TagsCommand,
}

#[derive(Subcommand, Debug)]
pub enum TagsCommand {
    /// Deactivate every tag no article uses
    Cleanup {
        /// List the unused tags without deactivating them
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Fold one tag into another and deactivate it
    Merge {
        /// Tag to fold away (ID)
        source: i32,
        /// Tag that receives its articles (ID)
        target: i32,
    },
    /// Show the most used tags across published articles
    Popular {
        /// Number of tags to show
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run_tags(db: &Database, args: TagsArgs) -> Result<()> {
    let repo = TagRepo::new(db);
    match args.command {
        TagsCommand::Cleanup { dry_run: true } => {
            let unused = repo.unused().await.context("Failed to list unused tags")?;
            for tag in &unused {
                println!("{:>6}  {} ({})", tag.id, tag.name, tag.slug);
            }
            println!("{} unused tags", unused.len());
        }
        TagsCommand::Cleanup { dry_run: false } => {
            let deactivated = repo
                .cleanup_unused()
                .await
                .context("Failed to clean up unused tags")?;
            println!("deactivated {deactivated} unused tags");
        }
        TagsCommand::Merge { source, target } => {
            let outcome = repo
                .merge(source, target)
                .await
                .with_context(|| format!("Failed to merge tag {source} into {target}"))?;
            println!(
                "moved {} articles, dropped {} duplicate links, source {}",
                outcome.reassigned,
                outcome.dropped_duplicates,
                if outcome.source_deactivated {
                    "deactivated"
                } else {
                    "was already inactive"
                }
            );
        }
        TagsCommand::Popular { limit, json } => {
            let tags = repo.popular(limit).await.context("Failed to load popular tags")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                for tag in &tags {
                    println!("{:>5}  {}", tag.article_count.unwrap_or(0), tag.name);
                }
            }
        }
    }
    Ok(())
}
