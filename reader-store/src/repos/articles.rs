//! Article repository
//!
//! Handles article CRUD with:
//! - Atomic create/update/delete together with `article_tags` rows
//! - Filtered listing whose `count` shares the exact same WHERE clause
//! - Tags for a whole page loaded in one query (no N+1)
//! - Status transitions guarded in the UPDATE's WHERE clause

use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::debug;

use super::{matched, unique_slug, SlugScope};
use crate::db::query::{like_pattern, order_by};
use crate::db::{Bindings, Database, SetClause, SqlParam, Statement, WhereClause};
use crate::error::Result;
use crate::models::slug::slugify_or;
use crate::models::validation::{bounded, required};
use crate::models::{
    Article, ArticleFilter, ArticleInclude, ArticleQuery, ArticleStatus, AuthorSummary,
    CategorySummary, NewArticle, Paginated, TagSummary, UpdateArticle,
};

const MAX_TITLE_LEN: usize = 200;
const MAX_IMAGE_LEN: usize = 500;

/// Stored columns, unqualified (INSERT/UPDATE ... RETURNING)
const RETURNING_COLUMNS: &str = "id, title, content, summary, slug, author_id, category_id, \
    status, featured_image, view_count, like_count, is_public, published_at, created_at, updated_at";

/// Stored columns, qualified for SELECT ... FROM articles a
const SELECT_COLUMNS: &str = "a.id, a.title, a.content, a.summary, a.slug, a.author_id, \
    a.category_id, a.status, a.featured_image, a.view_count, a.like_count, a.is_public, \
    a.published_at, a.created_at, a.updated_at";

/// Article repository
pub struct ArticleRepo<'a> {
    db: &'a Database,
}

impl<'a> ArticleRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert an article and its tag links in one transaction.
    ///
    /// The slug is derived from the title unless supplied. An unknown tag
    /// id fails the foreign key and nothing is written.
    pub async fn create(&self, input: NewArticle) -> Result<Article> {
        let title = required("title", &input.title, MAX_TITLE_LEN)?;
        if input.content.trim().is_empty() {
            return Err(crate::models::ValidationError::Empty { field: "content" }.into());
        }
        if let Some(image) = &input.featured_image {
            bounded("featured_image", image, MAX_IMAGE_LEN)?;
        }

        let base = match input.slug.as_deref() {
            Some(slug) => slugify_or(slug, "article"),
            None => slugify_or(&title, "article"),
        };
        let slug = unique_slug(self.db, SlugScope::Articles, &base, None).await?;
        let tag_ids = dedup_ids(&input.tag_ids);

        let mut statements = vec![build_insert(&input, &title, &slug)];
        if !tag_ids.is_empty() {
            statements.push(build_attach_tags_by_slug(&slug, &tag_ids));
        }

        let results = self.db.execute_transaction(&statements).await?;
        let row = results
            .first()
            .and_then(|rows| rows.first())
            .ok_or(sqlx::Error::RowNotFound)?;
        let article = article_from_row(row, ArticleInclude::default())?;

        debug!(id = article.id, slug = %article.slug, tags = tag_ids.len(), "article created");
        Ok(article)
    }

    /// Find by id regardless of status.
    pub async fn find_by_id(&self, id: i32, include: ArticleInclude) -> Result<Option<Article>> {
        let mut binds = Bindings::new();
        let sql = format!("{} WHERE a.id = {}", select_sql(include), binds.push(id));
        self.find_one(binds.finish(sql), include).await
    }

    /// Find a published article by slug.
    ///
    /// Reading never counts a view; callers pair this with [`record_view`].
    ///
    /// [`record_view`]: ArticleRepo::record_view
    pub async fn find_by_slug(&self, slug: &str, include: ArticleInclude) -> Result<Option<Article>> {
        let mut binds = Bindings::new();
        let sql = format!(
            "{} WHERE a.slug = {} AND a.status = 'published'",
            select_sql(include),
            binds.push(slug)
        );
        self.find_one(binds.finish(sql), include).await
    }

    async fn find_one(&self, stmt: Statement, include: ArticleInclude) -> Result<Option<Article>> {
        let Some(row) = self.db.fetch_optional(&stmt).await? else {
            return Ok(None);
        };
        let mut article = article_from_row(&row, include)?;
        if include.tags {
            article.tags = Some(self.tags_for(article.id).await?);
        }
        Ok(Some(article))
    }

    /// Filtered, ordered, paginated listing.
    pub async fn find_all(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let rows = self.db.execute_query(&build_find_all(query)).await?;
        let mut articles = rows
            .iter()
            .map(|row| article_from_row(row, query.include))
            .collect::<Result<Vec<_>>>()?;

        if query.include.tags && !articles.is_empty() {
            let ids: Vec<i32> = articles.iter().map(|a| a.id).collect();
            let mut by_article = self.tags_for_many(&ids).await?;
            for article in &mut articles {
                article.tags = Some(by_article.remove(&article.id).unwrap_or_default());
            }
        }
        Ok(articles)
    }

    /// Number of rows `find_all` would return across all pages.
    pub async fn count(&self, filter: &ArticleFilter) -> Result<i64> {
        self.db.fetch_count(&build_count(filter)).await
    }

    /// `find_all` plus `count`, packaged for pagination metadata.
    pub async fn find_page(&self, query: &ArticleQuery) -> Result<Paginated<Article>> {
        let items = self.find_all(query).await?;
        let total = self.count(&query.filter).await?;
        Ok(Paginated::new(items, total, query.page))
    }

    /// Apply the present fields and optionally replace the tag set, atomically.
    ///
    /// Returns the article with author, category and tags, or `None` when no
    /// article has this id.
    pub async fn update_by_id(&self, id: i32, input: UpdateArticle) -> Result<Option<Article>> {
        if let Some(title) = &input.title {
            required("title", title, MAX_TITLE_LEN)?;
        }
        if let Some(content) = &input.content {
            if content.trim().is_empty() {
                return Err(crate::models::ValidationError::Empty { field: "content" }.into());
            }
        }
        if let Some(Some(image)) = &input.featured_image {
            bounded("featured_image", image, MAX_IMAGE_LEN)?;
        }

        let mut statements = vec![build_update(id, &input)];
        if let Some(tag_ids) = &input.tag_ids {
            statements.extend(build_replace_tags(id, &dedup_ids(tag_ids)));
        }

        let results = self.db.execute_transaction(&statements).await?;
        if !results.first().is_some_and(|rows| matched(rows)) {
            return Ok(None);
        }
        self.find_by_id(id, ArticleInclude::all()).await
    }

    /// Hard delete: join rows first, then the article, in one transaction.
    pub async fn delete_by_id(&self, id: i32) -> Result<bool> {
        let results = self
            .db
            .execute_transaction(&[
                Statement::new(
                    "DELETE FROM article_tags WHERE article_id = $1",
                    vec![SqlParam::from(id)],
                ),
                Statement::new(
                    "DELETE FROM articles WHERE id = $1 RETURNING id",
                    vec![SqlParam::from(id)],
                ),
            ])
            .await?;
        Ok(results.get(1).is_some_and(|rows| matched(rows)))
    }

    /// `draft -> published`, stamping `published_at`. `None` from any other state.
    pub async fn publish(&self, id: i32) -> Result<Option<Article>> {
        let stmt = Statement::new(
            format!(
                "UPDATE articles SET status = 'published', published_at = NOW(), updated_at = NOW() \
                 WHERE id = $1 AND status = 'draft' RETURNING {RETURNING_COLUMNS}"
            ),
            vec![SqlParam::from(id)],
        );
        self.transition(stmt).await
    }

    /// `draft | published -> archived`. `published_at` is kept.
    pub async fn archive(&self, id: i32) -> Result<Option<Article>> {
        let stmt = Statement::new(
            format!(
                "UPDATE articles SET status = 'archived', updated_at = NOW() \
                 WHERE id = $1 AND status IN ('draft', 'published') RETURNING {RETURNING_COLUMNS}"
            ),
            vec![SqlParam::from(id)],
        );
        self.transition(stmt).await
    }

    async fn transition(&self, stmt: Statement) -> Result<Option<Article>> {
        match self.db.execute_once(&stmt).await?.first() {
            Some(row) => Ok(Some(article_from_row(row, ArticleInclude::default())?)),
            None => Ok(None),
        }
    }

    /// Count one read. Returns whether the article exists.
    pub async fn record_view(&self, id: i32) -> Result<bool> {
        self.bump(id, "view_count = view_count + 1").await
    }

    pub async fn increment_like_count(&self, id: i32) -> Result<bool> {
        self.bump(id, "like_count = like_count + 1").await
    }

    /// Never drops below zero.
    pub async fn decrement_like_count(&self, id: i32) -> Result<bool> {
        self.bump(id, "like_count = GREATEST(like_count - 1, 0)").await
    }

    // Counters run once: a retried increment could double count.
    async fn bump(&self, id: i32, assignment: &str) -> Result<bool> {
        let stmt = Statement::new(
            format!("UPDATE articles SET {assignment} WHERE id = $1 RETURNING id"),
            vec![SqlParam::from(id)],
        );
        Ok(matched(&self.db.execute_once(&stmt).await?))
    }

    /// Active tags attached to one article, by name.
    pub async fn tags_for(&self, article_id: i32) -> Result<Vec<TagSummary>> {
        Ok(self
            .tags_for_many(&[article_id])
            .await?
            .remove(&article_id)
            .unwrap_or_default())
    }

    async fn tags_for_many(&self, article_ids: &[i32]) -> Result<HashMap<i32, Vec<TagSummary>>> {
        let rows = self.db.execute_query(&build_tags_for(article_ids)).await?;
        let mut by_article: HashMap<i32, Vec<TagSummary>> = HashMap::new();
        for row in &rows {
            let article_id: i32 = row.try_get("article_id")?;
            by_article.entry(article_id).or_default().push(TagSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                color: row.try_get("color")?,
            });
        }
        Ok(by_article)
    }

    pub async fn is_slug_exists(&self, slug: &str, exclude_id: Option<i32>) -> Result<bool> {
        self.db
            .fetch_exists(&super::build_exists("articles", "slug", slug, exclude_id, false))
            .await
    }
}

fn dedup_ids(ids: &[i32]) -> Vec<i32> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn select_sql(include: ArticleInclude) -> String {
    let mut fields = String::from(SELECT_COLUMNS);
    let mut joins = String::new();
    if include.author {
        fields.push_str(", u.username AS author_username, u.avatar AS author_avatar");
        joins.push_str(" LEFT JOIN users u ON u.id = a.author_id");
    }
    if include.category {
        fields.push_str(", c.name AS category_name, c.slug AS category_slug");
        joins.push_str(" LEFT JOIN categories c ON c.id = a.category_id");
    }
    format!("SELECT {fields} FROM articles a{joins}")
}

fn filter_clause(filter: &ArticleFilter, binds: &mut Bindings) -> WhereClause {
    let mut clause = WhereClause::new();
    if let Some(status) = filter.status {
        clause.push(format!("a.status = {}", binds.push(status)));
    }
    if let Some(author_id) = filter.author_id {
        clause.push(format!("a.author_id = {}", binds.push(author_id)));
    }
    if let Some(category_id) = filter.category_id {
        clause.push(format!("a.category_id = {}", binds.push(category_id)));
    }
    if let Some(is_public) = filter.is_public {
        clause.push(format!("a.is_public = {}", binds.push(is_public)));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = binds.push(like_pattern(search));
        clause.push(format!(
            "(a.title ILIKE {pattern} OR a.content ILIKE {pattern} OR a.summary ILIKE {pattern})"
        ));
    }
    if !filter.tag_ids.is_empty() {
        // EXISTS rather than JOIN: an article matching several tags stays one row
        let tags = binds.push(dedup_ids(&filter.tag_ids));
        clause.push(format!(
            "EXISTS (SELECT 1 FROM article_tags atj WHERE atj.article_id = a.id AND atj.tag_id = ANY({tags}))"
        ));
    }
    clause
}

pub(crate) fn build_find_all(query: &ArticleQuery) -> Statement {
    let mut binds = Bindings::new();
    let filter = filter_clause(&query.filter, &mut binds);
    let order = order_by(query.sort.column(), query.direction, "a.id");
    let limit = binds.push(query.page.limit());
    let offset = binds.push(query.page.offset());
    let sql = format!(
        "{}{filter}{order} LIMIT {limit} OFFSET {offset}",
        select_sql(query.include)
    );
    binds.finish(sql)
}

pub(crate) fn build_count(filter: &ArticleFilter) -> Statement {
    let mut binds = Bindings::new();
    let filter = filter_clause(filter, &mut binds);
    binds.finish(format!("SELECT COUNT(*) FROM articles a{filter}"))
}

fn build_insert(input: &NewArticle, title: &str, slug: &str) -> Statement {
    let mut binds = Bindings::new();
    let values = [
        binds.push(title),
        binds.push(input.content.as_str()),
        binds.push(input.summary.clone()),
        binds.push(slug),
        binds.push(input.author_id),
        binds.push(input.category_id),
        binds.push(input.status),
        binds.push(input.featured_image.clone()),
        binds.push(input.is_public),
    ];
    let placeholders = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let published_at = if input.status == ArticleStatus::Published {
        "NOW()"
    } else {
        "NULL"
    };
    binds.finish(format!(
        "INSERT INTO articles (title, content, summary, slug, author_id, category_id, status, \
         featured_image, is_public, published_at) VALUES ({placeholders}, {published_at}) \
         RETURNING {RETURNING_COLUMNS}"
    ))
}

/// Links resolved through the slug, since the id is not known until the
/// INSERT in the same transaction has run.
fn build_attach_tags_by_slug(slug: &str, tag_ids: &[i32]) -> Statement {
    Statement::new(
        "INSERT INTO article_tags (article_id, tag_id) \
         SELECT a.id, t.tag_id FROM articles a CROSS JOIN UNNEST($2::int[]) AS t(tag_id) \
         WHERE a.slug = $1 ON CONFLICT DO NOTHING",
        vec![SqlParam::from(slug), SqlParam::from(tag_ids)],
    )
}

pub(crate) fn build_update(id: i32, input: &UpdateArticle) -> Statement {
    let mut binds = Bindings::new();
    let mut set = SetClause::new();

    if let Some(title) = &input.title {
        set.set("title", binds.push(title.trim()));
    }
    if let Some(content) = &input.content {
        set.set("content", binds.push(content.as_str()));
    }
    if let Some(summary) = &input.summary {
        set.set("summary", binds.push(summary.clone()));
    }
    if let Some(category_id) = input.category_id {
        set.set("category_id", binds.push(category_id));
    }
    if let Some(status) = input.status {
        set.set("status", binds.push(status));
        if status == ArticleStatus::Published {
            // right-hand `status` is the pre-update value
            set.raw("published_at = CASE WHEN status = 'draft' THEN NOW() ELSE published_at END");
        }
    }
    if let Some(image) = &input.featured_image {
        set.set("featured_image", binds.push(image.clone()));
    }
    if let Some(is_public) = input.is_public {
        set.set("is_public", binds.push(is_public));
    }
    set.raw("updated_at = NOW()");

    let id = binds.push(id);
    binds.finish(format!("UPDATE articles SET {set} WHERE id = {id} RETURNING id"))
}

/// Clear then re-link. The INSERT selects through `articles` so a missing
/// article links nothing instead of failing the foreign key.
fn build_replace_tags(id: i32, tag_ids: &[i32]) -> Vec<Statement> {
    let mut statements = vec![Statement::new(
        "DELETE FROM article_tags WHERE article_id = $1",
        vec![SqlParam::from(id)],
    )];
    if !tag_ids.is_empty() {
        statements.push(Statement::new(
            "INSERT INTO article_tags (article_id, tag_id) \
             SELECT a.id, t.tag_id FROM articles a CROSS JOIN UNNEST($2::int[]) AS t(tag_id) \
             WHERE a.id = $1 ON CONFLICT DO NOTHING",
            vec![SqlParam::from(id), SqlParam::from(tag_ids)],
        ));
    }
    statements
}

fn build_tags_for(article_ids: &[i32]) -> Statement {
    Statement::new(
        "SELECT atj.article_id, t.id, t.name, t.slug, t.color \
         FROM article_tags atj JOIN tags t ON t.id = atj.tag_id \
         WHERE atj.article_id = ANY($1) AND t.is_active = TRUE \
         ORDER BY atj.article_id, t.name",
        vec![SqlParam::from(article_ids)],
    )
}

fn article_from_row(row: &PgRow, include: ArticleInclude) -> Result<Article> {
    let status: String = row.try_get("status")?;
    let author_id: i32 = row.try_get("author_id")?;
    let category_id: Option<i32> = row.try_get("category_id")?;

    let author = if include.author {
        match row.try_get::<Option<String>, _>("author_username")? {
            Some(username) => Some(AuthorSummary {
                id: author_id,
                username,
                avatar: row.try_get("author_avatar")?,
            }),
            None => None,
        }
    } else {
        None
    };

    let category = match (include.category, category_id) {
        (true, Some(id)) => match row.try_get::<Option<String>, _>("category_name")? {
            Some(name) => Some(CategorySummary {
                id,
                name,
                slug: row.try_get("category_slug")?,
            }),
            None => None,
        },
        _ => None,
    };

    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        slug: row.try_get("slug")?,
        author_id,
        category_id,
        status: status.parse::<ArticleStatus>()?,
        featured_image: row.try_get("featured_image")?,
        view_count: row.try_get("view_count")?,
        like_count: row.try_get("like_count")?,
        is_public: row.try_get("is_public")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        author,
        category,
        tags: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SortDirection;
    use crate::models::{ArticleSort, Pagination};

    #[test]
    fn find_all_without_filters() {
        let stmt = build_find_all(&ArticleQuery::default());
        assert!(stmt.sql.starts_with("SELECT a.id, a.title"));
        assert!(!stmt.sql.contains("WHERE"));
        assert!(stmt
            .sql
            .ends_with(" ORDER BY a.created_at DESC NULLS LAST, a.id DESC LIMIT $1 OFFSET $2"));
        assert_eq!(stmt.params, vec![SqlParam::BigInt(20), SqlParam::BigInt(0)]);
    }

    #[test]
    fn find_all_with_every_filter() {
        let query = ArticleQuery {
            filter: ArticleFilter {
                status: Some(ArticleStatus::Published),
                author_id: Some(3),
                category_id: Some(5),
                is_public: Some(true),
                search: Some("rust".into()),
                tag_ids: vec![2, 1, 2],
            },
            sort: ArticleSort::Title,
            direction: SortDirection::Asc,
            page: Pagination::new(2, 10),
            include: ArticleInclude::all(),
        };
        let stmt = build_find_all(&query);

        assert!(stmt.sql.contains("LEFT JOIN users u ON u.id = a.author_id"));
        assert!(stmt.sql.contains("LEFT JOIN categories c ON c.id = a.category_id"));
        assert!(stmt.sql.contains(
            " WHERE a.status = $1 AND a.author_id = $2 AND a.category_id = $3 AND a.is_public = $4 \
             AND (a.title ILIKE $5 OR a.content ILIKE $5 OR a.summary ILIKE $5) \
             AND EXISTS (SELECT 1 FROM article_tags atj WHERE atj.article_id = a.id AND atj.tag_id = ANY($6))"
        ));
        assert!(stmt.sql.ends_with("ORDER BY a.title ASC NULLS FIRST, a.id ASC LIMIT $7 OFFSET $8"));
        assert_eq!(stmt.params[4], SqlParam::Text("%rust%".into()));
        assert_eq!(stmt.params[5], SqlParam::IntArray(vec![1, 2]));
        assert_eq!(stmt.params[7], SqlParam::BigInt(10));
    }

    #[test]
    fn count_mirrors_find_all_filter() {
        let filter = ArticleFilter {
            status: Some(ArticleStatus::Draft),
            search: Some("  ".into()),
            tag_ids: vec![4],
            ..ArticleFilter::default()
        };
        let count = build_count(&filter);
        let list = build_find_all(&ArticleQuery {
            filter: filter.clone(),
            ..ArticleQuery::default()
        });

        let where_of = |sql: &str| {
            let start = sql.find(" WHERE ").unwrap();
            let end = sql.find(" ORDER BY ").unwrap_or(sql.len());
            sql[start..end].to_string()
        };
        assert_eq!(where_of(&count.sql), where_of(&list.sql));
        // blank search is ignored
        assert!(!count.sql.contains("ILIKE"));
        assert_eq!(count.params.len(), 2);
    }

    #[test]
    fn update_only_touches_present_fields() {
        let stmt = build_update(
            9,
            &UpdateArticle {
                title: Some("  New title ".into()),
                summary: Some(None),
                ..UpdateArticle::default()
            },
        );
        assert_eq!(
            stmt.sql,
            "UPDATE articles SET title = $1, summary = $2, updated_at = NOW() WHERE id = $3 RETURNING id"
        );
        assert_eq!(
            stmt.params,
            vec![
                SqlParam::Text("New title".into()),
                SqlParam::NullableText(None),
                SqlParam::Int(9)
            ]
        );
    }

    #[test]
    fn empty_update_only_stamps_timestamp() {
        let stmt = build_update(1, &UpdateArticle::default());
        assert_eq!(
            stmt.sql,
            "UPDATE articles SET updated_at = NOW() WHERE id = $1 RETURNING id"
        );
    }

    #[test]
    fn publishing_through_update_stamps_published_at_from_draft_only() {
        let stmt = build_update(
            1,
            &UpdateArticle {
                status: Some(ArticleStatus::Published),
                ..UpdateArticle::default()
            },
        );
        assert!(stmt
            .sql
            .contains("published_at = CASE WHEN status = 'draft' THEN NOW() ELSE published_at END"));

        let stmt = build_update(
            1,
            &UpdateArticle {
                status: Some(ArticleStatus::Archived),
                ..UpdateArticle::default()
            },
        );
        assert!(!stmt.sql.contains("published_at"));
    }

    #[test]
    fn insert_stamps_published_at_only_when_published() {
        let mut input = NewArticle::new("Hello", "Body", 1);
        let stmt = build_insert(&input, "Hello", "hello");
        assert!(stmt.sql.contains("$9, NULL)"));
        assert_eq!(stmt.params.len(), 9);

        input.status = ArticleStatus::Published;
        let stmt = build_insert(&input, "Hello", "hello");
        assert!(stmt.sql.contains("$9, NOW())"));
    }

    #[test]
    fn replacing_tags_with_empty_set_only_clears() {
        assert_eq!(build_replace_tags(3, &[]).len(), 1);
        let stmts = build_replace_tags(3, &[1, 2]);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].params[1], SqlParam::IntArray(vec![1, 2]));
    }

    #[test]
    fn dedup_sorts_and_removes_duplicates() {
        assert_eq!(dedup_ids(&[3, 1, 3, 2, 1]), vec![1, 2, 3]);
    }
}
