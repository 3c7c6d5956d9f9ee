//! Articles command - listing and lifecycle transitions

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reader_store::models::{
    Article, ArticleFilter, ArticleInclude, ArticleQuery, ArticleSort, ArticleStatus, Pagination,
};
use reader_store::{ArticleRepo, Database, SortDirection};

#[derive(Parser, Debug)]
pub struct ArticlesArgs {
    #[command(subcommand)]
    pub command: ArticlesCommand,
}

#[derive(Subcommand, Debug)]
pub enum ArticlesCommand {
    /// List articles, newest first
    List(ListArgs),
    /// Publish a draft
    Publish {
        /// Article ID
        id: i32,
    },
    /// Archive a draft or published article
    Archive {
        /// Article ID
        id: i32,
    },
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Filter by status (draft, published, archived)
    #[arg(long)]
    pub status: Option<ArticleStatus>,

    /// Case-insensitive text search in title, content and summary
    #[arg(long)]
    pub search: Option<String>,

    /// Only articles carrying any of these tag IDs (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<i32>,

    /// Sort column (created_at, updated_at, published_at, title, view_count, like_count)
    #[arg(long, default_value = "created_at")]
    pub sort: ArticleSort,

    /// Sort direction (asc, desc)
    #[arg(long, default_value = "desc")]
    pub direction: SortDirection,

    /// Page number
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Articles per page (max 100)
    #[arg(long, default_value_t = 20)]
    pub per_page: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    fn query(&self) -> ArticleQuery {
        ArticleQuery {
            filter: ArticleFilter {
                status: self.status,
                search: self.search.clone(),
                tag_ids: self.tags.clone(),
                ..ArticleFilter::default()
            },
            sort: self.sort,
            direction: self.direction,
            page: Pagination::new(self.page, self.per_page),
            include: ArticleInclude::all(),
        }
    }
}

pub async fn run_articles(db: &Database, args: ArticlesArgs) -> Result<()> {
    let repo = ArticleRepo::new(db);
    match args.command {
        ArticlesCommand::List(list) => {
            let page = repo
                .find_page(&list.query())
                .await
                .context("Failed to list articles")?;
            if list.json {
                println!("{}", serde_json::to_string_pretty(&page)?);
                return Ok(());
            }
            for article in &page.items {
                println!("{}", summary_line(article));
            }
            println!(
                "page {}/{} ({} articles)",
                page.page,
                page.total_pages(),
                page.total
            );
        }
        ArticlesCommand::Publish { id } => {
            match repo.publish(id).await.context("Failed to publish article")? {
                Some(article) => println!("published: {}", summary_line(&article)),
                None => bail!("article {id} is not a draft (or does not exist)"),
            }
        }
        ArticlesCommand::Archive { id } => {
            match repo.archive(id).await.context("Failed to archive article")? {
                Some(article) => println!("archived: {}", summary_line(&article)),
                None => bail!("article {id} is already archived (or does not exist)"),
            }
        }
    }
    Ok(())
}

fn summary_line(article: &Article) -> String {
    let mut line = format!(
        "{:>6}  {:<9}  {} ({})",
        article.id, article.status.as_str(), article.title, article.slug
    );
    if let Some(author) = &article.author {
        line.push_str(&format!(" by {}", author.username));
    }
    if let Some(tags) = article.tags.as_deref().filter(|t| !t.is_empty()) {
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        line.push_str(&format!(" [{}]", names.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        list: ListArgs,
    }

    #[test]
    fn list_flags_build_query() {
        let harness = Harness::parse_from([
            "reader", "--status", "published", "--tag", "3", "--tag", "5", "--page", "2",
            "--per-page", "500", "--sort", "title", "--direction", "asc",
        ]);
        let query = harness.list.query();
        assert_eq!(query.filter.status, Some(ArticleStatus::Published));
        assert_eq!(query.filter.tag_ids, vec![3, 5]);
        assert_eq!(query.page, Pagination::new(2, 100));
        assert_eq!(query.sort, ArticleSort::Title);
        assert_eq!(query.direction, SortDirection::Asc);
        assert!(query.include.tags);
    }

    #[test]
    fn defaults_match_repository_defaults() {
        let harness = Harness::parse_from(["reader"]);
        let query = harness.list.query();
        let defaults = ArticleQuery::default();
        assert_eq!(query.sort, defaults.sort);
        assert_eq!(query.direction, defaults.direction);
        assert_eq!(query.page, defaults.page);
    }
}
