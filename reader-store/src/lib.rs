//! reader-store: PostgreSQL data access for the reader platform
//!
//! A pooled connection manager with retrying and transactional executors,
//! plus one repository per entity (articles, categories, tags, users).
//! The composition root builds one [`Database`] and hands references to
//! the repositories; nothing here holds global state.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repos;

pub use config::{DbConfig, HierarchyLimits, RetryPolicy, StoreConfig};
pub use db::{run_migrations, seed_defaults, shutdown_signal, Database, SortDirection, Statement};
pub use error::{DbError, Result};
pub use repos::{assemble_tree, ArticleRepo, CategoryRepo, TagRepo, UserRepo};
