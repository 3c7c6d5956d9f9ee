//! Query and transaction executors
//!
//! Every call checks out its own pooled connection. `PoolConnection` and
//! `Transaction` hand the connection back when dropped, so release holds
//! on success, error, and cancellation alike.

use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, error, warn};

use super::pool::Database;
use super::query::Statement;
use super::retry::with_retry;
use crate::error::Result;

impl Database {
    /// Run one statement with the configured retry policy and return its rows.
    pub async fn execute_query(&self, stmt: &Statement) -> Result<Vec<PgRow>> {
        let pool = self.pool();
        with_retry(self.retry_policy(), stmt.verb(), |attempt| async move {
            let mut conn = pool.acquire().await?;
            debug!(attempt, sql = %stmt.sql, params = stmt.params.len(), "executing statement");
            stmt.query().fetch_all(&mut *conn).await
        })
        .await
    }

    /// Run one statement exactly once.
    ///
    /// For non-idempotent writes (counter bumps) where a retry after an
    /// ambiguous failure could apply the change twice.
    pub async fn execute_once(&self, stmt: &Statement) -> Result<Vec<PgRow>> {
        let mut conn = self.pool().acquire().await?;
        debug!(sql = %stmt.sql, params = stmt.params.len(), "executing statement once");
        Ok(stmt.query().fetch_all(&mut *conn).await?)
    }

    /// Run one statement with retry and return the number of rows affected.
    pub async fn execute(&self, stmt: &Statement) -> Result<u64> {
        let pool = self.pool();
        with_retry(self.retry_policy(), stmt.verb(), |attempt| async move {
            let mut conn = pool.acquire().await?;
            debug!(attempt, sql = %stmt.sql, params = stmt.params.len(), "executing statement");
            stmt.query()
                .execute(&mut *conn)
                .await
                .map(|done| done.rows_affected())
        })
        .await
    }

    /// First row, if any.
    pub async fn fetch_optional(&self, stmt: &Statement) -> Result<Option<PgRow>> {
        Ok(self.execute_query(stmt).await?.into_iter().next())
    }

    /// Single `BIGINT` in the first column of the first row (0 when empty).
    pub async fn fetch_count(&self, stmt: &Statement) -> Result<i64> {
        match self.fetch_optional(stmt).await? {
            Some(row) => Ok(row.try_get::<i64, _>(0)?),
            None => Ok(0),
        }
    }

    /// Single `BOOLEAN` in the first column of the first row.
    pub async fn fetch_exists(&self, stmt: &Statement) -> Result<bool> {
        match self.fetch_optional(stmt).await? {
            Some(row) => Ok(row.try_get::<bool, _>(0)?),
            None => Ok(false),
        }
    }

    /// Run `statements` in order inside one transaction.
    ///
    /// Returns one row-set per statement. On the first failure the
    /// transaction is rolled back and that failure is returned; a rollback
    /// error is only logged. Never retried.
    pub async fn execute_transaction(&self, statements: &[Statement]) -> Result<Vec<Vec<PgRow>>> {
        let mut tx = self.pool().begin().await?;
        let mut results = Vec::with_capacity(statements.len());

        for (index, stmt) in statements.iter().enumerate() {
            debug!(index, sql = %stmt.sql, params = stmt.params.len(), "executing transaction statement");
            match stmt.query().fetch_all(&mut *tx).await {
                Ok(rows) => results.push(rows),
                Err(err) => {
                    warn!(index, error = %err, "transaction statement failed, rolling back");
                    if let Err(rollback_err) = tx.rollback().await {
                        error!(error = %rollback_err, "transaction rollback failed");
                    }
                    return Err(err.into());
                }
            }
        }

        tx.commit().await?;
        Ok(results)
    }
}
