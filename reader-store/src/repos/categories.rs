//! Category repository
//!
//! Categories are soft-deleted and form a tree through `parent_id`. Tree
//! walks live in [`super::hierarchy`]; this module owns the flat CRUD and
//! the guards that keep the tree consistent.

use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, info};

use super::hierarchy;
use super::{build_exists, matched, unique_slug, SlugScope};
use crate::db::query::order_by;
use crate::db::{Bindings, Database, SetClause, SqlParam, Statement, WhereClause};
use crate::error::{DbError, Result};
use crate::models::slug::slugify_or;
use crate::models::validation::required;
use crate::models::{
    Category, CategoryFilter, CategoryInclude, CategoryNode, CategoryQuery, CategorySort,
    NewCategory, Paginated, ParentFilter, ParentSummary, UpdateCategory,
};

const MAX_NAME_LEN: usize = 100;

const RETURNING_COLUMNS: &str =
    "id, name, description, slug, parent_id, sort_order, is_active, created_at, updated_at";

pub(crate) const SELECT_COLUMNS: &str = "c.id, c.name, c.description, c.slug, c.parent_id, \
    c.sort_order, c.is_active, c.created_at, c.updated_at";

/// Published articles filed under `c`
pub(crate) const ARTICLE_COUNT_COLUMN: &str = "(SELECT COUNT(*) FROM articles a \
    WHERE a.category_id = c.id AND a.status = 'published') AS article_count";

pub struct CategoryRepo<'a> {
    db: &'a Database,
}

impl<'a> CategoryRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a category. A given `parent_id` must name an active category.
    pub async fn create(&self, input: NewCategory) -> Result<Category> {
        let name = required("name", &input.name, MAX_NAME_LEN)?;
        if let Some(parent_id) = input.parent_id {
            self.require_active(parent_id).await?;
        }

        let base = match input.slug.as_deref() {
            Some(slug) => slugify_or(slug, "category"),
            None => slugify_or(&name, "category"),
        };
        let slug = unique_slug(self.db, SlugScope::Categories, &base, None).await?;

        let stmt = Statement::new(
            format!(
                "INSERT INTO categories (name, description, slug, parent_id, sort_order) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {RETURNING_COLUMNS}"
            ),
            vec![
                SqlParam::from(name),
                SqlParam::from(input.description),
                SqlParam::from(slug),
                SqlParam::from(input.parent_id),
                SqlParam::from(input.sort_order),
            ],
        );
        let rows = self.db.execute_once(&stmt).await?;
        let row = rows.first().ok_or(sqlx::Error::RowNotFound)?;
        let category = category_from_row(row, CategoryInclude::default())?;

        debug!(id = category.id, slug = %category.slug, "category created");
        Ok(category)
    }

    /// Active category by id.
    pub async fn find_by_id(&self, id: i32, include: CategoryInclude) -> Result<Option<Category>> {
        let mut binds = Bindings::new();
        let sql = format!(
            "{} WHERE c.id = {} AND c.is_active = TRUE",
            select_sql(include),
            binds.push(id)
        );
        self.find_one(binds.finish(sql), include).await
    }

    /// Active category by slug.
    pub async fn find_by_slug(&self, slug: &str, include: CategoryInclude) -> Result<Option<Category>> {
        let mut binds = Bindings::new();
        let sql = format!(
            "{} WHERE c.slug = {} AND c.is_active = TRUE",
            select_sql(include),
            binds.push(slug)
        );
        self.find_one(binds.finish(sql), include).await
    }

    async fn find_one(&self, stmt: Statement, include: CategoryInclude) -> Result<Option<Category>> {
        let Some(row) = self.db.fetch_optional(&stmt).await? else {
            return Ok(None);
        };
        let mut categories = vec![category_from_row(&row, include)?];
        if include.children {
            self.attach_children(&mut categories).await?;
        }
        Ok(categories.pop())
    }

    pub async fn find_all(&self, query: &CategoryQuery) -> Result<Vec<Category>> {
        let rows = self.db.execute_query(&build_find_all(query)).await?;
        let mut categories = rows
            .iter()
            .map(|row| category_from_row(row, query.include))
            .collect::<Result<Vec<_>>>()?;
        if query.include.children && !categories.is_empty() {
            self.attach_children(&mut categories).await?;
        }
        Ok(categories)
    }

    pub async fn count(&self, filter: &CategoryFilter) -> Result<i64> {
        self.db.fetch_count(&build_count(filter)).await
    }

    pub async fn find_page(&self, query: &CategoryQuery) -> Result<Paginated<Category>> {
        let items = self.find_all(query).await?;
        let total = self.count(&query.filter).await?;
        Ok(Paginated::new(items, total, query.page))
    }

    /// Direct active children for every category in the slice, one query.
    async fn attach_children(&self, categories: &mut [Category]) -> Result<()> {
        let ids: Vec<i32> = categories.iter().map(|c| c.id).collect();
        let stmt = Statement::new(
            format!(
                "SELECT {SELECT_COLUMNS} FROM categories c \
                 WHERE c.parent_id = ANY($1) AND c.is_active = TRUE \
                 ORDER BY c.sort_order ASC, c.name ASC, c.id ASC"
            ),
            vec![SqlParam::from(ids)],
        );
        let rows = self.db.execute_query(&stmt).await?;

        let mut by_parent: HashMap<i32, Vec<Category>> = HashMap::new();
        for row in &rows {
            let child = category_from_row(row, CategoryInclude::default())?;
            if let Some(parent_id) = child.parent_id {
                by_parent.entry(parent_id).or_default().push(child);
            }
        }
        for category in categories.iter_mut() {
            category.children = Some(by_parent.remove(&category.id).unwrap_or_default());
        }
        Ok(())
    }

    /// Apply the present fields to an active category.
    ///
    /// Moving a category under itself or one of its descendants fails with
    /// [`DbError::InvalidParent`]. The slug only changes when one is given.
    pub async fn update_by_id(&self, id: i32, input: UpdateCategory) -> Result<Option<Category>> {
        let name = match &input.name {
            Some(name) => Some(required("name", name, MAX_NAME_LEN)?),
            None => None,
        };
        if let Some(Some(parent_id)) = input.parent_id {
            self.check_reparent(id, parent_id).await?;
        }
        let slug = match &input.slug {
            Some(slug) => {
                let base = slugify_or(slug, "category");
                Some(unique_slug(self.db, SlugScope::Categories, &base, Some(id)).await?)
            }
            None => None,
        };

        let stmt = build_update(id, &input, name, slug);
        match self.db.execute_query(&stmt).await?.first() {
            Some(row) => Ok(Some(category_from_row(row, CategoryInclude::default())?)),
            None => Ok(None),
        }
    }

    async fn check_reparent(&self, id: i32, parent_id: i32) -> Result<()> {
        if parent_id == id {
            return Err(DbError::InvalidParent { id, parent_id });
        }
        self.require_active(parent_id).await?;
        let below = hierarchy::descendant_ids(self.db, id).await?;
        if below.contains(&parent_id) {
            return Err(DbError::InvalidParent { id, parent_id });
        }
        Ok(())
    }

    async fn require_active(&self, id: i32) -> Result<()> {
        let probe = Statement::new(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1 AND is_active = TRUE)",
            vec![SqlParam::from(id)],
        );
        if self.db.fetch_exists(&probe).await? {
            Ok(())
        } else {
            Err(DbError::not_found("category", id))
        }
    }

    /// Soft delete. Refused while active children or any articles remain.
    pub async fn delete_by_id(&self, id: i32) -> Result<bool> {
        let children = self
            .db
            .fetch_count(&Statement::new(
                "SELECT COUNT(*) FROM categories WHERE parent_id = $1 AND is_active = TRUE",
                vec![SqlParam::from(id)],
            ))
            .await?;
        if children > 0 {
            return Err(DbError::CategoryHasChildren { id, children });
        }

        let articles = self
            .db
            .fetch_count(&Statement::new(
                "SELECT COUNT(*) FROM articles WHERE category_id = $1",
                vec![SqlParam::from(id)],
            ))
            .await?;
        if articles > 0 {
            return Err(DbError::CategoryHasArticles { id, articles });
        }

        let rows = self
            .db
            .execute_query(&Statement::new(
                "UPDATE categories SET is_active = FALSE, updated_at = NOW() \
                 WHERE id = $1 AND is_active = TRUE RETURNING id",
                vec![SqlParam::from(id)],
            ))
            .await?;
        let deleted = matched(&rows);
        if deleted {
            info!(id, "category deactivated");
        }
        Ok(deleted)
    }

    pub async fn is_name_exists(&self, name: &str, exclude_id: Option<i32>) -> Result<bool> {
        self.db
            .fetch_exists(&build_exists("categories", "name", name.trim(), exclude_id, true))
            .await
    }

    pub async fn is_slug_exists(&self, slug: &str, exclude_id: Option<i32>) -> Result<bool> {
        self.db
            .fetch_exists(&build_exists("categories", "slug", slug, exclude_id, true))
            .await
    }

    /// Reorder several categories at once. Returns how many rows changed.
    pub async fn update_sort_order(&self, orders: &[(i32, i32)]) -> Result<u64> {
        if orders.is_empty() {
            return Ok(0);
        }
        let statements: Vec<Statement> = orders
            .iter()
            .map(|&(id, sort_order)| {
                Statement::new(
                    "UPDATE categories SET sort_order = $1, updated_at = NOW() \
                     WHERE id = $2 AND is_active = TRUE RETURNING id",
                    vec![SqlParam::from(sort_order), SqlParam::from(id)],
                )
            })
            .collect();
        let results = self.db.execute_transaction(&statements).await?;
        Ok(results.iter().filter(|rows| matched(rows)).count() as u64)
    }

    /// Every active root with its active descendants.
    pub async fn get_tree(&self) -> Result<Vec<CategoryNode>> {
        hierarchy::tree(self.db).await
    }

    /// Active subtree below `id`, without `id` itself.
    pub async fn descendants(&self, id: i32) -> Result<Vec<CategoryNode>> {
        hierarchy::subtree(self.db, id).await
    }

    /// Breadcrumb from the root down to the direct parent of `id`.
    pub async fn ancestors(&self, id: i32) -> Result<Vec<Category>> {
        hierarchy::ancestors(self.db, id).await
    }
}

fn select_sql(include: CategoryInclude) -> String {
    let mut fields = String::from(SELECT_COLUMNS);
    let mut joins = String::new();
    if include.parent {
        fields.push_str(", p.name AS parent_name, p.slug AS parent_slug");
        joins.push_str(" LEFT JOIN categories p ON p.id = c.parent_id");
    }
    if include.article_count {
        fields.push_str(", ");
        fields.push_str(ARTICLE_COUNT_COLUMN);
    }
    format!("SELECT {fields} FROM categories c{joins}")
}

fn filter_clause(filter: &CategoryFilter, binds: &mut Bindings) -> WhereClause {
    let mut clause = WhereClause::new();
    if let Some(is_active) = filter.is_active {
        clause.push(format!("c.is_active = {}", binds.push(is_active)));
    }
    match filter.parent {
        ParentFilter::Any => {}
        ParentFilter::Root => {
            clause.push("c.parent_id IS NULL");
        }
        ParentFilter::Id(parent_id) => {
            clause.push(format!("c.parent_id = {}", binds.push(parent_id)));
        }
    }
    clause
}

fn order_clause(sort: CategorySort, direction: crate::db::SortDirection) -> String {
    match sort {
        CategorySort::Name => order_by(sort.column(), direction, "c.id"),
        _ => format!(
            " ORDER BY {} {}, c.name ASC, c.id ASC",
            sort.column(),
            direction.as_sql()
        ),
    }
}

pub(crate) fn build_find_all(query: &CategoryQuery) -> Statement {
    let mut binds = Bindings::new();
    let filter = filter_clause(&query.filter, &mut binds);
    let order = order_clause(query.sort, query.direction);
    let limit = binds.push(query.page.limit());
    let offset = binds.push(query.page.offset());
    let sql = format!(
        "{}{filter}{order} LIMIT {limit} OFFSET {offset}",
        select_sql(query.include)
    );
    binds.finish(sql)
}

pub(crate) fn build_count(filter: &CategoryFilter) -> Statement {
    let mut binds = Bindings::new();
    let filter = filter_clause(filter, &mut binds);
    binds.finish(format!("SELECT COUNT(*) FROM categories c{filter}"))
}

fn build_update(
    id: i32,
    input: &UpdateCategory,
    name: Option<String>,
    slug: Option<String>,
) -> Statement {
    let mut binds = Bindings::new();
    let mut set = SetClause::new();
    if let Some(name) = name {
        set.set("name", binds.push(name));
    }
    if let Some(description) = &input.description {
        set.set("description", binds.push(description.clone()));
    }
    if let Some(slug) = slug {
        set.set("slug", binds.push(slug));
    }
    if let Some(parent_id) = input.parent_id {
        set.set("parent_id", binds.push(parent_id));
    }
    if let Some(sort_order) = input.sort_order {
        set.set("sort_order", binds.push(sort_order));
    }
    set.raw("updated_at = NOW()");

    let id = binds.push(id);
    binds.finish(format!(
        "UPDATE categories SET {set} WHERE id = {id} AND is_active = TRUE RETURNING {RETURNING_COLUMNS}"
    ))
}

/// Map a `categories` row. Optional columns are read only when requested.
pub(crate) fn category_from_row(row: &PgRow, include: CategoryInclude) -> Result<Category> {
    let parent_id: Option<i32> = row.try_get("parent_id")?;
    let parent = match (include.parent, parent_id) {
        (true, Some(id)) => match row.try_get::<Option<String>, _>("parent_name")? {
            Some(name) => Some(ParentSummary {
                id,
                name,
                slug: row.try_get("parent_slug")?,
            }),
            None => None,
        },
        _ => None,
    };
    let article_count = if include.article_count {
        Some(row.try_get::<i64, _>("article_count")?)
    } else {
        None
    };

    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        slug: row.try_get("slug")?,
        parent_id,
        sort_order: row.try_get("sort_order")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        parent,
        children: None,
        article_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SortDirection;
    use crate::models::Pagination;

    #[test]
    fn default_listing_is_active_by_sort_order_then_name() {
        let stmt = build_find_all(&CategoryQuery::default());
        assert_eq!(
            stmt.sql,
            format!(
                "SELECT {SELECT_COLUMNS} FROM categories c WHERE c.is_active = $1 \
                 ORDER BY c.sort_order ASC, c.name ASC, c.id ASC LIMIT $2 OFFSET $3"
            )
        );
        assert_eq!(
            stmt.params,
            vec![SqlParam::Bool(true), SqlParam::BigInt(50), SqlParam::BigInt(0)]
        );
    }

    #[test]
    fn parent_filters() {
        let root = build_count(&CategoryFilter {
            is_active: None,
            parent: ParentFilter::Root,
        });
        assert_eq!(root.sql, "SELECT COUNT(*) FROM categories c WHERE c.parent_id IS NULL");
        assert!(root.params.is_empty());

        let under = build_count(&CategoryFilter {
            is_active: Some(true),
            parent: ParentFilter::Id(7),
        });
        assert!(under.sql.ends_with("c.is_active = $1 AND c.parent_id = $2"));
        assert_eq!(under.params[1], SqlParam::Int(7));
    }

    #[test]
    fn includes_add_join_and_count() {
        let stmt = build_find_all(&CategoryQuery {
            sort: CategorySort::Name,
            direction: SortDirection::Desc,
            page: Pagination::new(3, 10),
            include: CategoryInclude::all(),
            ..CategoryQuery::default()
        });
        assert!(stmt.sql.contains("LEFT JOIN categories p ON p.id = c.parent_id"));
        assert!(stmt.sql.contains("AS article_count"));
        assert!(stmt.sql.contains("ORDER BY c.name DESC NULLS LAST, c.id DESC"));
        assert_eq!(stmt.params[2], SqlParam::BigInt(20));
    }

    #[test]
    fn update_can_detach_from_parent() {
        let input = UpdateCategory {
            parent_id: Some(None),
            sort_order: Some(4),
            ..UpdateCategory::default()
        };
        let stmt = build_update(2, &input, None, None);
        assert!(stmt.sql.starts_with(
            "UPDATE categories SET parent_id = $1, sort_order = $2, updated_at = NOW() \
             WHERE id = $3 AND is_active = TRUE"
        ));
        assert_eq!(stmt.params[0], SqlParam::NullableInt(None));
    }

    #[test]
    fn update_with_new_name_and_slug() {
        let stmt = build_update(
            5,
            &UpdateCategory::default(),
            Some("Rust".into()),
            Some("rust-2".into()),
        );
        assert!(stmt.sql.contains("SET name = $1, slug = $2, updated_at = NOW()"));
        assert_eq!(stmt.params.len(), 3);
    }
}
