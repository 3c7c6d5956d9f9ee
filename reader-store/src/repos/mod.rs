//! Entity repositories
//!
//! Each repository borrows the shared [`Database`] and owns all SQL for one
//! entity. Statement construction lives in plain `build_*` functions so the
//! generated SQL can be checked without a database.

mod articles;
mod categories;
mod hierarchy;
mod tag_graph;
mod tags;
mod users;

pub use articles::ArticleRepo;
pub use categories::CategoryRepo;
pub use hierarchy::assemble_tree;
pub use tags::TagRepo;
pub use users::UserRepo;

use std::collections::HashSet;

use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::db::query::escape_like;
use crate::db::{Bindings, Database, Statement, WhereClause};
use crate::error::Result;
use crate::models::slug::with_suffix;

/// Tables that carry a `slug` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlugScope {
    Articles,
    Categories,
    Tags,
}

impl SlugScope {
    fn table(&self) -> &'static str {
        match self {
            Self::Articles => "articles",
            Self::Categories => "categories",
            Self::Tags => "tags",
        }
    }

    /// Soft-deletable tables only enforce slug uniqueness among active rows.
    fn active_only(&self) -> bool {
        !matches!(self, Self::Articles)
    }
}

/// `SELECT EXISTS(...)` probe on `column = value`, optionally excluding one id.
pub(crate) fn build_exists(
    table: &str,
    column: &str,
    value: &str,
    exclude_id: Option<i32>,
    active_only: bool,
) -> Statement {
    let mut binds = Bindings::new();
    let mut filter = WhereClause::new();
    filter.push(format!("{column} = {}", binds.push(value)));
    if active_only {
        filter.push("is_active = TRUE");
    }
    if let Some(id) = exclude_id {
        filter.push(format!("id <> {}", binds.push(id)));
    }
    binds.finish(format!("SELECT EXISTS(SELECT 1 FROM {table}{filter})"))
}

fn build_slug_probe(scope: SlugScope, base: &str, exclude_id: Option<i32>) -> Statement {
    let mut binds = Bindings::new();
    let mut filter = WhereClause::new();
    let exact = binds.push(base);
    let suffixed = binds.push(format!("{}-%", escape_like(base)));
    filter.push(format!("(slug = {exact} OR slug LIKE {suffixed})"));
    if scope.active_only() {
        filter.push("is_active = TRUE");
    }
    if let Some(id) = exclude_id {
        filter.push(format!("id <> {}", binds.push(id)));
    }
    binds.finish(format!("SELECT slug FROM {}{filter}", scope.table()))
}

/// `base`, or `base-N` for the smallest N >= 2 not in `taken`.
pub(crate) fn next_free_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = with_suffix(base, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Probe existing slugs and pick a free one.
///
/// Racing writers can still collide; the unique index has the final word.
pub(crate) async fn unique_slug(
    db: &Database,
    scope: SlugScope,
    base: &str,
    exclude_id: Option<i32>,
) -> Result<String> {
    let rows = db
        .execute_query(&build_slug_probe(scope, base, exclude_id))
        .await?;
    let taken = rows
        .iter()
        .map(|row| row.try_get::<String, _>("slug"))
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(next_free_slug(base, &taken))
}

/// `RETURNING id` row-sets mean "a row matched".
pub(crate) fn matched(rows: &[PgRow]) -> bool {
    !rows.is_empty()
}
