//! Bounded retry for standalone statements
//!
//! Only transient failures are retried. Never wrap a transaction in this:
//! re-running a partially applied statement list breaks atomicity.

use std::future::Future;

use tracing::{error, warn};

use crate::config::RetryPolicy;
use crate::error::{DbError, Result};

/// SQLSTATE codes that indicate the statement may succeed if re-sent.
///
/// Class 08 (connection exception) is matched by prefix.
const TRANSIENT_CODES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "53300", // too_many_connections
    "57P01", // admin_shutdown
    "57P02", // crash_shutdown
    "57P03", // cannot_connect_now
];

/// Connectivity-class failures worth another attempt.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_code(&code)),
        _ => false,
    }
}

pub fn is_transient_code(code: &str) -> bool {
    code.starts_with("08") || TRANSIENT_CODES.contains(&code)
}

/// Run `op` until it succeeds, fails permanently, or the policy's attempts
/// are used up. `op` receives the 1-indexed attempt number and must acquire
/// (and drop) its own connection, so a failed attempt never holds one
/// across the backoff sleep.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !is_transient(&err) => return Err(DbError::Sqlx(err)),
            Err(err) if attempt >= max_attempts => {
                error!(label, attempts = attempt, error = %err, "query failed, retries exhausted");
                return Err(DbError::RetriesExhausted {
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient query failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = with_retry(policy(), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(sqlx::Error::PoolTimedOut)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1 x base + 2 x base
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts() {
        let calls = AtomicU32::new(0);

        let err = with_retry(policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(sqlx::Error::PoolTimedOut) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            DbError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, sqlx::Error::PoolTimedOut));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let err = with_retry(policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(sqlx::Error::RowNotFound) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::RowNotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy() {
        let err = with_retry(RetryPolicy::none(), "test", |_| async {
            Err::<(), _>(sqlx::Error::WorkerCrashed)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, DbError::RetriesExhausted { attempts: 1, .. }));
    }

    #[test]
    fn transient_codes() {
        assert!(is_transient_code("08006"));
        assert!(is_transient_code("40P01"));
        assert!(is_transient_code("57P01"));
        assert!(!is_transient_code("23505"));
        assert!(!is_transient_code("42P01"));
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }
}
