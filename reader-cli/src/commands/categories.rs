//! Categories command - inspect the category hierarchy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reader_store::models::CategoryNode;
use reader_store::{CategoryRepo, Database};

#[derive(Parser, Debug)]
pub struct CategoriesArgs {
    #[command(subcommand)]
    pub command: CategoriesCommand,
}

#[derive(Subcommand, Debug)]
pub enum CategoriesCommand {
    /// Print every active category as a tree
    Tree {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the path from the root down to a category
    Ancestors {
        /// Category ID
        id: i32,
    },
}

pub async fn run_categories(db: &Database, args: CategoriesArgs) -> Result<()> {
    let repo = CategoryRepo::new(db);
    match args.command {
        CategoriesCommand::Tree { json } => {
            let tree = repo.get_tree().await.context("Failed to load category tree")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else if tree.is_empty() {
                println!("no categories");
            } else {
                let mut out = String::new();
                for root in &tree {
                    render_node(root, 0, &mut out);
                }
                print!("{out}");
            }
        }
        CategoriesCommand::Ancestors { id } => {
            let chain = repo
                .ancestors(id)
                .await
                .with_context(|| format!("Failed to walk ancestors of category {id}"))?;
            let mut names: Vec<String> = chain.into_iter().map(|c| c.name).collect();
            match repo.find_by_id(id, Default::default()).await? {
                Some(category) => names.push(category.name),
                None => anyhow::bail!("category {id} not found"),
            }
            println!("{}", names.join(" > "));
        }
    }
    Ok(())
}

fn render_node(node: &CategoryNode, depth: usize, out: &mut String) {
    let count = node.category.article_count.unwrap_or(0);
    out.push_str(&format!(
        "{}{} ({}) [{} published]\n",
        "  ".repeat(depth),
        node.category.name,
        node.category.slug,
        count
    ));
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}
