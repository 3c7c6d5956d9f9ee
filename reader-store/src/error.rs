/// Structured error types for reader-store.
///
/// Repositories return `DbError`; the CLI wraps it with `anyhow` context.
/// "Not found" is never an error here: lookups return `Option`, deletes
/// return `bool`.
use thiserror::Error;

use crate::models::ValidationError;

#[derive(Debug, Error)]
pub enum DbError {
    /// Statement failed for a non-transient reason (constraint, syntax, ...)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Transient failure persisted through every retry attempt
    #[error("query failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// A precondition referenced a row that does not exist
    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("category {id} still has {children} active child categories")]
    CategoryHasChildren { id: i32, children: i64 },

    #[error("category {id} is still referenced by {articles} articles")]
    CategoryHasArticles { id: i32, articles: i64 },

    /// Re-parenting would make a category its own ancestor
    #[error("category {id} cannot be moved under {parent_id}")]
    InvalidParent { id: i32, parent_id: i32 },

    #[error("cannot merge tag {id} into itself")]
    MergeIntoSelf { id: i32 },

    /// Category graph revisited a node while walking the hierarchy
    #[error("category hierarchy contains a cycle at category {category_id}")]
    HierarchyCycle { category_id: i32 },

    #[error("category hierarchy exceeds maximum depth of {max_depth}")]
    HierarchyTooDeep { max_depth: usize },

    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("blocking task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// Result type alias for reader-store operations
pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a not-found error for a precondition lookup
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// SQLSTATE of the underlying database error, if any.
    pub fn sql_state(&self) -> Option<String> {
        let source = match self {
            Self::Sqlx(err) | Self::RetriesExhausted { source: err, .. } => err,
            _ => return None,
        };
        source
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned())
    }

    /// True when the statement was rejected by a unique index.
    pub fn is_unique_violation(&self) -> bool {
        self.sql_state().as_deref() == Some("23505")
    }

    /// True when the statement was rejected by a foreign key.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sql_state().as_deref() == Some("23503")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DbError::CategoryHasChildren { id: 4, children: 2 };
        assert_eq!(
            err.to_string(),
            "category 4 still has 2 active child categories"
        );

        let err = DbError::RetriesExhausted {
            attempts: 3,
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(err.to_string().starts_with("query failed after 3 attempts"));
    }

    #[test]
    fn not_found_helper() {
        let err = DbError::not_found("tag", 12);
        assert_eq!(err.to_string(), "not found: tag '12'");
        assert!(err.sql_state().is_none());
    }

    #[test]
    fn validation_converts() {
        let err: DbError = ValidationError::Empty { field: "title" }.into();
        assert_eq!(err.to_string(), "invalid input: title cannot be empty");
    }
}
