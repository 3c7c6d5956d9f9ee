//! Operations spanning several tags and the `article_tags` join table

use tracing::{debug, info};

use super::tags::{tag_from_row, SELECT_COLUMNS};
use super::TagRepo;
use crate::db::{SqlParam, Statement};
use crate::error::{DbError, Result};
use crate::models::{MergeOutcome, NewTag, Tag, TagInclude};

const ON_CONFLICT_NOTHING: &str = " ON CONFLICT DO NOTHING";

impl TagRepo<'_> {
    /// Return the active tag named `input.name`, creating it if needed.
    ///
    /// The insert yields to a concurrent writer through the unique index and
    /// the winner's row is re-read, so two callers racing on the same name
    /// both get the same tag.
    pub async fn find_or_create(&self, input: NewTag) -> Result<Tag> {
        if let Some(existing) = self.find_by_name(&input.name, TagInclude::default()).await? {
            return Ok(existing);
        }

        let stmt = self.prepare_insert(&input, ON_CONFLICT_NOTHING).await?;
        if let Some(row) = self.db.execute_once(&stmt).await?.first() {
            let tag = tag_from_row(row, false)?;
            debug!(id = tag.id, name = %tag.name, "tag created on demand");
            return Ok(tag);
        }

        self.find_by_name(&input.name, TagInclude::default())
            .await?
            .ok_or_else(|| DbError::not_found("tag", input.name.trim()))
    }

    /// `find_or_create` for each distinct non-blank name, in first-seen order.
    pub async fn find_or_create_many<I, S>(&self, names: I) -> Result<Vec<Tag>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = Vec::new();
        for name in distinct_names(names) {
            tags.push(self.find_or_create(NewTag::new(name)).await?);
        }
        Ok(tags)
    }

    /// Fold `source` into `target`.
    ///
    /// Articles tagged with `source` end up tagged with `target` exactly
    /// once, and `source` is deactivated. `target` must be active.
    pub async fn merge(&self, source_id: i32, target_id: i32) -> Result<MergeOutcome> {
        if source_id == target_id {
            return Err(DbError::MergeIntoSelf { id: source_id });
        }
        if self.find_by_id(target_id, TagInclude::default()).await?.is_none() {
            return Err(DbError::not_found("tag", target_id));
        }

        let results = self
            .db
            .execute_transaction(&build_merge(source_id, target_id))
            .await?;
        let rows_in = |index: usize| results.get(index).map_or(0, |rows| rows.len() as u64);
        let outcome = MergeOutcome {
            reassigned: rows_in(0),
            dropped_duplicates: rows_in(1),
            source_deactivated: rows_in(2) > 0,
        };

        info!(
            source_id,
            target_id,
            reassigned = outcome.reassigned,
            dropped = outcome.dropped_duplicates,
            "tags merged"
        );
        Ok(outcome)
    }

    /// Active tags attached to no article, newest first.
    pub async fn unused(&self) -> Result<Vec<Tag>> {
        self.fetch_tags(&Statement::raw(format!(
            "SELECT {SELECT_COLUMNS} FROM tags t \
             WHERE t.is_active = TRUE AND {UNUSED} \
             ORDER BY t.created_at DESC, t.id DESC"
        )))
        .await
    }

    /// Deactivate every unused tag. Returns how many were deactivated.
    pub async fn cleanup_unused(&self) -> Result<u64> {
        let stmt = Statement::raw(format!(
            "UPDATE tags t SET is_active = FALSE, updated_at = NOW() \
             WHERE t.is_active = TRUE AND {UNUSED}"
        ));
        let deactivated = self.db.execute(&stmt).await?;
        info!(deactivated, "unused tags cleaned up");
        Ok(deactivated)
    }
}

const UNUSED: &str = "NOT EXISTS (SELECT 1 FROM article_tags atj WHERE atj.tag_id = t.id)";

fn build_merge(source_id: i32, target_id: i32) -> Vec<Statement> {
    let params = || vec![SqlParam::from(source_id), SqlParam::from(target_id)];
    vec![
        Statement::new(
            "UPDATE article_tags SET tag_id = $2 WHERE tag_id = $1 \
             AND article_id NOT IN (SELECT article_id FROM article_tags WHERE tag_id = $2) \
             RETURNING article_id",
            params(),
        ),
        // whatever is left already carried the target
        Statement::new(
            "DELETE FROM article_tags WHERE tag_id = $1 RETURNING article_id",
            vec![SqlParam::from(source_id)],
        ),
        Statement::new(
            "UPDATE tags SET is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND is_active = TRUE RETURNING id",
            vec![SqlParam::from(source_id)],
        ),
    ]
}

fn distinct_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = Vec::<String>::new();
    for name in names {
        let name = name.as_ref().trim();
        if !name.is_empty() && !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_deduplicated() {
        let names = distinct_names(["rust", " Rust", "rust ", "", "  ", "sql"]);
        assert_eq!(names, vec!["rust", "Rust", "sql"]);
    }

    #[test]
    fn merge_reassigns_then_drops_then_deactivates() {
        let stmts = build_merge(3, 7);
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].sql.starts_with("UPDATE article_tags SET tag_id = $2"));
        assert_eq!(stmts[0].params, vec![SqlParam::Int(3), SqlParam::Int(7)]);
        assert!(stmts[1].sql.starts_with("DELETE FROM article_tags"));
        assert!(stmts[2].sql.starts_with("UPDATE tags SET is_active = FALSE"));
        assert_eq!(stmts[2].params, vec![SqlParam::Int(3)]);
    }
}
