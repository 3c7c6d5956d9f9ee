//! Store configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Every field has a default so an empty file is valid.
//!
//! ```toml
//! [database]
//! url = "postgres://postgres@localhost/reader_db"
//! max_connections = 10
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{DbError, Result};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_TREE_DEPTH: usize = 32;

/// Top-level configuration for the data-access layer
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub database: DbConfig,
    pub retry: RetryPolicy,
    pub hierarchy: HierarchyLimits,
}

/// Connection settings. `url` wins over the discrete fields when set.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DbConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Require TLS for every connection
    pub ssl: bool,
    /// Schema search path applied to every pooled connection
    pub search_path: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "reader_db".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            ssl: false,
            search_path: None,
        }
    }
}

impl DbConfig {
    /// Config pointing at a connection string, everything else default.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Build sqlx connect options from either the URL or the discrete fields.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let mut options = match &self.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|err| DbError::config(format!("invalid database url: {err}")))?,
            None => {
                let options = PgConnectOptions::new()
                    .host(&self.host)
                    .port(self.port)
                    .username(&self.user)
                    .database(&self.database);
                match &self.password {
                    Some(password) => options.password(password),
                    None => options,
                }
            }
        };

        if self.ssl {
            options = options.ssl_mode(PgSslMode::Require);
        }
        if let Some(search_path) = &self.search_path {
            options = options.options([("search_path", search_path.as_str())]);
        }
        Ok(options)
    }
}

/// Bounded retry with linear backoff.
///
/// The wait before attempt `n + 1` is `n * base_delay_ms`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
        }
    }

    /// Delay after the given failed attempt (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Guards for walking the category hierarchy
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HierarchyLimits {
    pub max_depth: usize,
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

impl StoreConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| DbError::config(format!("invalid config: {err}")))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DbError::config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests pass a map).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(url) = lookup("DATABASE_URL") {
            db.url = Some(url);
        }
        if let Some(host) = lookup("POSTGRES_HOST") {
            db.host = host;
        }
        if let Some(port) = lookup("POSTGRES_PORT") {
            db.port = parse_env("POSTGRES_PORT", &port)?;
        }
        if let Some(user) = lookup("POSTGRES_USER") {
            db.user = user;
        }
        if let Some(password) = lookup("POSTGRES_PASSWORD") {
            db.password = Some(password);
        }
        if let Some(database) = lookup("POSTGRES_DB") {
            db.database = database;
        }
        if let Some(max) = lookup("POSTGRES_MAX_CONNECTIONS") {
            db.max_connections = parse_env("POSTGRES_MAX_CONNECTIONS", &max)?;
        }
        if let Some(ssl) = lookup("POSTGRES_SSL") {
            db.ssl = matches!(ssl.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(search_path) = lookup("POSTGRES_SEARCH_PATH") {
            db.search_path = Some(search_path);
        }
        if let Some(attempts) = lookup("DB_RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_env("DB_RETRY_ATTEMPTS", &attempts)?;
        }
        if let Some(delay) = lookup("DB_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_env("DB_RETRY_BASE_DELAY_MS", &delay)?;
        }
        Ok(())
    }

    /// Reject settings the pool or executor cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::config("max_connections must be at least 1"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(DbError::config(
                "min_connections cannot exceed max_connections",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(DbError::config("retry.max_attempts must be at least 1"));
        }
        if self.hierarchy.max_depth == 0 {
            return Err(DbError::config("hierarchy.max_depth must be at least 1"));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DbError::config(format!("{key} has invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn parses_partial_toml() {
        let config = StoreConfig::from_toml_str(
            r#"
            [database]
            host = "db.internal"
            ssl = true

            [retry]
            base_delay_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert!(config.database.ssl);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.retry.base_delay_ms, 50);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.toml");
        std::fs::write(&path, "[hierarchy]\nmax_depth = 4\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.hierarchy.max_depth, 4);

        let err = StoreConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn rejects_unknown_types() {
        let err = StoreConfig::from_toml_str("[database]\nport = \"abc\"").unwrap_err();
        assert!(matches!(err, DbError::Config { .. }));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("POSTGRES_HOST", "pg"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_SSL", "true"),
            ("DB_RETRY_ATTEMPTS", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = StoreConfig::default();
        config
            .apply_env_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.host, "pg");
        assert_eq!(config.database.port, 6543);
        assert!(config.database.ssl);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn env_rejects_bad_number() {
        let mut config = StoreConfig::default();
        let err = config
            .apply_env_with(|key| (key == "POSTGRES_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("POSTGRES_PORT"));
    }

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(RetryPolicy::none().delay_for(1), Duration::ZERO);
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut config = StoreConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn connect_options_from_fields() {
        let mut db = DbConfig::default();
        db.search_path = Some("test_schema".to_string());
        assert!(db.connect_options().is_ok());

        let db = DbConfig::from_url("not a url");
        assert!(matches!(db.connect_options(), Err(DbError::Config { .. })));
    }
}
