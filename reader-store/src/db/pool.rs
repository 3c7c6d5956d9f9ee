//! Connection manager
//!
//! [`Database`] owns the sqlx `PgPool`. It is built once by the
//! composition root and handed to repositories by reference. The pool
//! connects lazily: no socket is opened until the first statement runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error, info};

use crate::config::{HierarchyLimits, RetryPolicy, StoreConfig};
use crate::error::Result;

/// Pooled PostgreSQL handle plus the execution policies that go with it.
///
/// Cheap to clone; clones share the pool and the closed flag.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    retry: RetryPolicy,
    limits: HierarchyLimits,
    closed: Arc<AtomicBool>,
}

impl Database {
    /// Build the pool from configuration without connecting.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` if the configuration is invalid.
    pub fn connect_lazy(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let db = &config.database;
        let options = db.connect_options()?;

        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .min_connections(db.min_connections)
            .idle_timeout(Some(db.idle_timeout()))
            .acquire_timeout(db.connect_timeout())
            .connect_lazy_with(options);

        info!(
            max_connections = db.max_connections,
            ssl = db.ssl,
            "database pool configured"
        );

        Ok(Self::from_pool(pool, config.retry, config.hierarchy))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, retry: RetryPolicy, limits: HierarchyLimits) -> Self {
        Self {
            pool,
            retry,
            limits,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn hierarchy_limits(&self) -> HierarchyLimits {
        self.limits
    }

    /// Probe connectivity with a trivial query.
    ///
    /// Failure is logged and reported as `false` so the caller can decide
    /// whether to keep running degraded.
    pub async fn ping(&self) -> bool {
        match sqlx::query("SELECT NOW()").execute(&self.pool).await {
            Ok(_) => {
                info!("database connection ok");
                true
            }
            Err(err) => {
                error!(error = %err, "database connection check failed");
                false
            }
        }
    }

    /// Drain and close the pool. Only the first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("database pool already closed");
            return;
        }
        self.pool.close().await;
        info!("database pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.pool.is_closed()
    }

    /// Connections currently checked out of the pool.
    pub fn held_connections(&self) -> u32 {
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        self.pool.size().saturating_sub(idle)
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting shutdown");
        }
    }
}
