//! Category tree walks
//!
//! Trees are fetched one level per query (`parent_id = ANY($1)`) until a
//! level comes back empty, then assembled in memory. Every walk keeps a
//! visited set and a depth cap, so a corrupted `parent_id` chain ends in
//! [`DbError::HierarchyCycle`] or [`DbError::HierarchyTooDeep`] instead of
//! looping forever.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::categories::{category_from_row, ARTICLE_COUNT_COLUMN, SELECT_COLUMNS};
use crate::config::HierarchyLimits;
use crate::db::{Database, SqlParam, Statement};
use crate::error::{DbError, Result};
use crate::models::{Category, CategoryInclude, CategoryNode};

const LEVEL_ORDER: &str = " ORDER BY c.sort_order ASC, c.name ASC, c.id ASC";

fn tree_include() -> CategoryInclude {
    CategoryInclude {
        article_count: true,
        ..CategoryInclude::default()
    }
}

fn build_roots() -> Statement {
    Statement::raw(format!(
        "SELECT {SELECT_COLUMNS}, {ARTICLE_COUNT_COLUMN} FROM categories c \
         WHERE c.is_active = TRUE AND c.parent_id IS NULL{LEVEL_ORDER}"
    ))
}

fn build_level(parent_ids: &[i32]) -> Statement {
    Statement::new(
        format!(
            "SELECT {SELECT_COLUMNS}, {ARTICLE_COUNT_COLUMN} FROM categories c \
             WHERE c.is_active = TRUE AND c.parent_id = ANY($1){LEVEL_ORDER}"
        ),
        vec![SqlParam::from(parent_ids)],
    )
}

fn build_parent_of(id: i32) -> Statement {
    Statement::new(
        format!(
            "SELECT {SELECT_COLUMNS} FROM categories c \
             WHERE c.id = (SELECT parent_id FROM categories WHERE id = $1)"
        ),
        vec![SqlParam::from(id)],
    )
}

async fn fetch(db: &Database, stmt: &Statement) -> Result<Vec<Category>> {
    db.execute_query(stmt)
        .await?
        .iter()
        .map(|row| category_from_row(row, tree_include()))
        .collect()
}

/// Fetch every level below `start`, nearest first.
///
/// `start` ids count as visited and sit at depth `base_depth`.
async fn walk_down(
    db: &Database,
    start: Vec<i32>,
    base_depth: usize,
    limits: HierarchyLimits,
) -> Result<Vec<Vec<Category>>> {
    let mut visited: HashSet<i32> = start.iter().copied().collect();
    let mut frontier = start;
    let mut levels = Vec::new();

    while !frontier.is_empty() {
        let level = fetch(db, &build_level(&frontier)).await?;
        if level.is_empty() {
            break;
        }
        if base_depth + levels.len() + 1 > limits.max_depth {
            return Err(DbError::HierarchyTooDeep {
                max_depth: limits.max_depth,
            });
        }

        frontier = Vec::with_capacity(level.len());
        for category in &level {
            if !visited.insert(category.id) {
                return Err(DbError::HierarchyCycle {
                    category_id: category.id,
                });
            }
            frontier.push(category.id);
        }
        debug!(depth = base_depth + levels.len() + 1, nodes = level.len(), "category level fetched");
        levels.push(level);
    }
    Ok(levels)
}

/// All active roots with their active descendants.
pub(crate) async fn tree(db: &Database) -> Result<Vec<CategoryNode>> {
    let limits = db.hierarchy_limits();
    let roots = fetch(db, &build_roots()).await?;
    if roots.is_empty() {
        return Ok(Vec::new());
    }
    let levels = walk_down(db, roots.iter().map(|c| c.id).collect(), 1, limits).await?;
    assemble_tree(roots, levels.into_iter().flatten().collect(), limits)
}

/// Active subtree strictly below `id`.
pub(crate) async fn subtree(db: &Database, id: i32) -> Result<Vec<CategoryNode>> {
    let limits = db.hierarchy_limits();
    let mut levels = walk_down(db, vec![id], 0, limits).await?.into_iter();
    let Some(first) = levels.next() else {
        return Ok(Vec::new());
    };
    assemble_tree(first, levels.flatten().collect(), limits)
}

/// Ids of every active category below `id`.
pub(crate) async fn descendant_ids(db: &Database, id: i32) -> Result<HashSet<i32>> {
    let levels = walk_down(db, vec![id], 0, db.hierarchy_limits()).await?;
    Ok(levels.iter().flatten().map(|c| c.id).collect())
}

/// Parents of `id`, root first. Empty for a root or an unknown id.
pub(crate) async fn ancestors(db: &Database, id: i32) -> Result<Vec<Category>> {
    let limits = db.hierarchy_limits();
    let mut visited = HashSet::from([id]);
    let mut chain = Vec::new();
    let mut current = id;

    loop {
        let Some(row) = db.fetch_optional(&build_parent_of(current)).await? else {
            break;
        };
        let parent = category_from_row(&row, CategoryInclude::default())?;
        if !visited.insert(parent.id) {
            return Err(DbError::HierarchyCycle {
                category_id: parent.id,
            });
        }
        if chain.len() + 1 >= limits.max_depth {
            return Err(DbError::HierarchyTooDeep {
                max_depth: limits.max_depth,
            });
        }
        current = parent.id;
        chain.push(parent);
    }

    chain.reverse();
    Ok(chain)
}

/// Build nested nodes from `roots` and a flat list of their descendants.
///
/// Sibling order follows the input order. Descendants whose parent is not
/// part of the tree are dropped. A category reached twice is a cycle.
pub fn assemble_tree(
    roots: Vec<Category>,
    descendants: Vec<Category>,
    limits: HierarchyLimits,
) -> Result<Vec<CategoryNode>> {
    let mut by_parent: HashMap<i32, Vec<Category>> = HashMap::new();
    for category in descendants {
        if let Some(parent_id) = category.parent_id {
            by_parent.entry(parent_id).or_default().push(category);
        }
    }

    let mut visited = HashSet::new();
    roots
        .into_iter()
        .map(|root| build_node(root, 1, &mut by_parent, &mut visited, limits))
        .collect()
}

fn build_node(
    category: Category,
    depth: usize,
    by_parent: &mut HashMap<i32, Vec<Category>>,
    visited: &mut HashSet<i32>,
    limits: HierarchyLimits,
) -> Result<CategoryNode> {
    if depth > limits.max_depth {
        return Err(DbError::HierarchyTooDeep {
            max_depth: limits.max_depth,
        });
    }
    if !visited.insert(category.id) {
        return Err(DbError::HierarchyCycle {
            category_id: category.id,
        });
    }

    let children = by_parent
        .remove(&category.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_node(child, depth + 1, by_parent, visited, limits))
        .collect::<Result<Vec<_>>>()?;

    Ok(CategoryNode { category, children })
}
