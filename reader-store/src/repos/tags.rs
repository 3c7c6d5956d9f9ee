//! Tag repository
//!
//! Flat CRUD and lookups. Operations that span several tags and the join
//! table (find-or-create, merge, cleanup) live in [`super::tag_graph`].

use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, info};

use super::{build_exists, matched, unique_slug, SlugScope};
use crate::db::query::{like_pattern, order_by};
use crate::db::{Bindings, Database, SetClause, SqlParam, Statement, WhereClause};
use crate::error::Result;
use crate::models::slug::slugify_or;
use crate::models::validation::{color, required};
use crate::models::{
    NewTag, Paginated, Tag, TagFilter, TagInclude, TagQuery, TagSort, UpdateTag,
};

pub(crate) const MAX_NAME_LEN: usize = 50;

pub(crate) const RETURNING_COLUMNS: &str =
    "id, name, description, slug, color, is_active, created_at, updated_at";

pub(crate) const SELECT_COLUMNS: &str =
    "t.id, t.name, t.description, t.slug, t.color, t.is_active, t.created_at, t.updated_at";

/// Published articles carrying `t`
const ARTICLE_COUNT_COLUMN: &str = "(SELECT COUNT(*) FROM article_tags atj \
    JOIN articles a ON a.id = atj.article_id \
    WHERE atj.tag_id = t.id AND a.status = 'published') AS article_count";

pub struct TagRepo<'a> {
    pub(super) db: &'a Database,
}

impl<'a> TagRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewTag) -> Result<Tag> {
        let stmt = self.prepare_insert(&input, "").await?;
        let rows = self.db.execute_once(&stmt).await?;
        let row = rows.first().ok_or(sqlx::Error::RowNotFound)?;
        let tag = tag_from_row(row, false)?;
        debug!(id = tag.id, slug = %tag.slug, "tag created");
        Ok(tag)
    }

    /// Validate `input`, resolve a free slug and build the INSERT.
    /// `conflict` is appended before RETURNING.
    pub(super) async fn prepare_insert(&self, input: &NewTag, conflict: &str) -> Result<Statement> {
        let name = required("name", &input.name, MAX_NAME_LEN)?;
        if let Some(value) = &input.color {
            color(value)?;
        }
        let base = match input.slug.as_deref() {
            Some(slug) => slugify_or(slug, "tag"),
            None => slugify_or(&name, "tag"),
        };
        let slug = unique_slug(self.db, SlugScope::Tags, &base, None).await?;

        Ok(Statement::new(
            format!(
                "INSERT INTO tags (name, description, slug, color) VALUES ($1, $2, $3, $4)\
                 {conflict} RETURNING {RETURNING_COLUMNS}"
            ),
            vec![
                SqlParam::from(name),
                SqlParam::from(input.description.clone()),
                SqlParam::from(slug),
                SqlParam::from(input.color.clone()),
            ],
        ))
    }

    pub async fn find_by_id(&self, id: i32, include: TagInclude) -> Result<Option<Tag>> {
        self.find_one("t.id", SqlParam::from(id), include).await
    }

    pub async fn find_by_slug(&self, slug: &str, include: TagInclude) -> Result<Option<Tag>> {
        self.find_one("t.slug", SqlParam::from(slug), include).await
    }

    /// Exact, case-sensitive name match among active tags.
    pub async fn find_by_name(&self, name: &str, include: TagInclude) -> Result<Option<Tag>> {
        self.find_one("t.name", SqlParam::from(name.trim()), include).await
    }

    async fn find_one(&self, column: &str, value: SqlParam, include: TagInclude) -> Result<Option<Tag>> {
        match self.db.fetch_optional(&build_find_one(column, value, include)).await? {
            Some(row) => Ok(Some(tag_from_row(&row, include.article_count)?)),
            None => Ok(None),
        }
    }

    /// Active tags among `ids`, by name.
    pub async fn find_by_ids(&self, ids: &[i32]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_tags(&Statement::new(
            format!(
                "SELECT {SELECT_COLUMNS} FROM tags t \
                 WHERE t.id = ANY($1) AND t.is_active = TRUE ORDER BY t.name ASC"
            ),
            vec![SqlParam::from(ids)],
        ))
        .await
    }

    /// Active tags attached to an article, by name.
    pub async fn find_by_article_id(&self, article_id: i32) -> Result<Vec<Tag>> {
        self.fetch_tags(&Statement::new(
            format!(
                "SELECT {SELECT_COLUMNS} FROM tags t JOIN article_tags atj ON atj.tag_id = t.id \
                 WHERE atj.article_id = $1 AND t.is_active = TRUE ORDER BY t.name ASC"
            ),
            vec![SqlParam::from(article_id)],
        ))
        .await
    }

    pub(super) async fn fetch_tags(&self, stmt: &Statement) -> Result<Vec<Tag>> {
        self.db
            .execute_query(stmt)
            .await?
            .iter()
            .map(|row| tag_from_row(row, false))
            .collect()
    }

    pub async fn find_all(&self, query: &TagQuery) -> Result<Vec<Tag>> {
        let with_count = counts_articles(query);
        self.db
            .execute_query(&build_find_all(query))
            .await?
            .iter()
            .map(|row| tag_from_row(row, with_count))
            .collect()
    }

    pub async fn count(&self, filter: &TagFilter) -> Result<i64> {
        self.db.fetch_count(&build_count(filter)).await
    }

    pub async fn find_page(&self, query: &TagQuery) -> Result<Paginated<Tag>> {
        let items = self.find_all(query).await?;
        let total = self.count(&query.filter).await?;
        Ok(Paginated::new(items, total, query.page))
    }

    /// Active tags used by at least one published article, most used first.
    pub async fn popular(&self, limit: u32) -> Result<Vec<Tag>> {
        let stmt = Statement::new(
            format!(
                "SELECT {SELECT_COLUMNS}, COUNT(atj.article_id) AS article_count FROM tags t \
                 JOIN article_tags atj ON atj.tag_id = t.id \
                 JOIN articles a ON a.id = atj.article_id \
                 WHERE t.is_active = TRUE AND a.status = 'published' \
                 GROUP BY t.id ORDER BY article_count DESC, t.name ASC, t.id ASC LIMIT $1"
            ),
            vec![SqlParam::from(i64::from(limit))],
        );
        self.db
            .execute_query(&stmt)
            .await?
            .iter()
            .map(|row| tag_from_row(row, true))
            .collect()
    }

    /// Apply the present fields to an active tag. The slug only changes
    /// when one is given.
    pub async fn update_by_id(&self, id: i32, input: UpdateTag) -> Result<Option<Tag>> {
        let name = match &input.name {
            Some(name) => Some(required("name", name, MAX_NAME_LEN)?),
            None => None,
        };
        if let Some(Some(value)) = &input.color {
            color(value)?;
        }
        let slug = match &input.slug {
            Some(slug) => {
                let base = slugify_or(slug, "tag");
                Some(unique_slug(self.db, SlugScope::Tags, &base, Some(id)).await?)
            }
            None => None,
        };

        let stmt = build_update(id, &input, name, slug);
        match self.db.execute_query(&stmt).await?.first() {
            Some(row) => Ok(Some(tag_from_row(row, false)?)),
            None => Ok(None),
        }
    }

    /// Detach from every article and deactivate, atomically.
    pub async fn delete_by_id(&self, id: i32) -> Result<bool> {
        let results = self
            .db
            .execute_transaction(&[
                Statement::new(
                    "DELETE FROM article_tags WHERE tag_id = $1",
                    vec![SqlParam::from(id)],
                ),
                Statement::new(
                    "UPDATE tags SET is_active = FALSE, updated_at = NOW() \
                     WHERE id = $1 AND is_active = TRUE RETURNING id",
                    vec![SqlParam::from(id)],
                ),
            ])
            .await?;
        let deleted = results.get(1).is_some_and(|rows| matched(rows));
        if deleted {
            info!(id, "tag deactivated");
        }
        Ok(deleted)
    }

    pub async fn is_name_exists(&self, name: &str, exclude_id: Option<i32>) -> Result<bool> {
        self.db
            .fetch_exists(&build_exists("tags", "name", name.trim(), exclude_id, true))
            .await
    }

    pub async fn is_slug_exists(&self, slug: &str, exclude_id: Option<i32>) -> Result<bool> {
        self.db
            .fetch_exists(&build_exists("tags", "slug", slug, exclude_id, true))
            .await
    }
}

fn build_find_one(column: &str, value: SqlParam, include: TagInclude) -> Statement {
    let mut fields = String::from(SELECT_COLUMNS);
    if include.article_count {
        fields.push_str(", ");
        fields.push_str(ARTICLE_COUNT_COLUMN);
    }
    Statement::new(
        format!("SELECT {fields} FROM tags t WHERE {column} = $1 AND t.is_active = TRUE"),
        vec![value],
    )
}

/// Sorting by usage needs the count column even when not requested.
fn counts_articles(query: &TagQuery) -> bool {
    query.include_article_count || query.sort == TagSort::ArticleCount
}

fn filter_clause(filter: &TagFilter, binds: &mut Bindings) -> WhereClause {
    let mut clause = WhereClause::new();
    if let Some(is_active) = filter.is_active {
        clause.push(format!("t.is_active = {}", binds.push(is_active)));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = binds.push(like_pattern(search));
        clause.push(format!("(t.name ILIKE {pattern} OR t.description ILIKE {pattern})"));
    }
    clause
}

pub(crate) fn build_find_all(query: &TagQuery) -> Statement {
    let mut binds = Bindings::new();
    let mut fields = String::from(SELECT_COLUMNS);
    if counts_articles(query) {
        fields.push_str(", ");
        fields.push_str(ARTICLE_COUNT_COLUMN);
    }
    let filter = filter_clause(&query.filter, &mut binds);
    let order = order_by(query.sort.column(), query.direction, "t.id");
    let limit = binds.push(query.page.limit());
    let offset = binds.push(query.page.offset());
    binds.finish(format!(
        "SELECT {fields} FROM tags t{filter}{order} LIMIT {limit} OFFSET {offset}"
    ))
}

pub(crate) fn build_count(filter: &TagFilter) -> Statement {
    let mut binds = Bindings::new();
    let filter = filter_clause(filter, &mut binds);
    binds.finish(format!("SELECT COUNT(*) FROM tags t{filter}"))
}

fn build_update(id: i32, input: &UpdateTag, name: Option<String>, slug: Option<String>) -> Statement {
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
    if let Some(color) = &input.color {
        set.set("color", binds.push(color.clone()));
    }
    set.raw("updated_at = NOW()");

    let id = binds.push(id);
    binds.finish(format!(
        "UPDATE tags SET {set} WHERE id = {id} AND is_active = TRUE RETURNING {RETURNING_COLUMNS}"
    ))
}

pub(crate) fn tag_from_row(row: &PgRow, with_count: bool) -> Result<Tag> {
    let article_count = if with_count {
        Some(row.try_get::<i64, _>("article_count")?)
    } else {
        None
    };
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        slug: row.try_get("slug")?,
        color: row.try_get("color")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        article_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SortDirection;

    #[test]
    fn default_listing() {
        let stmt = build_find_all(&TagQuery::default());
        assert_eq!(
            stmt.sql,
            format!(
                "SELECT {SELECT_COLUMNS} FROM tags t WHERE t.is_active = $1 \
                 ORDER BY t.name ASC NULLS FIRST, t.id ASC LIMIT $2 OFFSET $3"
            )
        );
        assert_eq!(stmt.params[1], SqlParam::BigInt(50));
    }

    #[test]
    fn lookup_selects_count_only_when_asked() {
        let plain = build_find_one("t.slug", SqlParam::from("rust"), TagInclude::default());
        assert_eq!(
            plain.sql,
            format!("SELECT {SELECT_COLUMNS} FROM tags t WHERE t.slug = $1 AND t.is_active = TRUE")
        );

        let counted = build_find_one("t.id", SqlParam::from(7), TagInclude::all());
        assert!(counted.sql.contains(", (SELECT COUNT(*) FROM article_tags atj"));
        assert!(counted.sql.ends_with("WHERE t.id = $1 AND t.is_active = TRUE"));
        assert_eq!(counted.params, vec![SqlParam::Int(7)]);
    }

    #[test]
    fn sorting_by_usage_selects_the_count() {
        let query = TagQuery {
            sort: TagSort::ArticleCount,
            direction: SortDirection::Desc,
            ..TagQuery::default()
        };
        assert!(counts_articles(&query));
        let stmt = build_find_all(&query);
        assert!(stmt.sql.contains("AS article_count"));
        assert!(stmt.sql.contains("ORDER BY article_count DESC NULLS LAST, t.id DESC"));
    }

    #[test]
    fn search_matches_name_or_description() {
        let filter = TagFilter {
            is_active: None,
            search: Some("post_gres".into()),
        };
        let stmt = build_count(&filter);
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM tags t WHERE (t.name ILIKE $1 OR t.description ILIKE $1)"
        );
        assert_eq!(stmt.params, vec![SqlParam::Text("%post\\_gres%".into())]);
    }

    #[test]
    fn update_clears_color() {
        let input = UpdateTag {
            color: Some(None),
            ..UpdateTag::default()
        };
        let stmt = build_update(8, &input, None, None);
        assert!(stmt.sql.starts_with(
            "UPDATE tags SET color = $1, updated_at = NOW() WHERE id = $2 AND is_active = TRUE"
        ));
        assert_eq!(stmt.params[0], SqlParam::NullableText(None));
    }
}
