//! Database layer - connection manager, executors and schema
//!
//! # Design Principles
//!
//! - One injected `Database` per process - no global pool
//! - Each call checks out its own connection and always returns it
//! - Retry only standalone statements, only on transient failures
//! - Multi-step writes go through `execute_transaction`

pub mod executor;
pub mod pool;
pub mod query;
pub mod retry;
pub mod schema;

pub use pool::{shutdown_signal, Database};
pub use query::{Bindings, Placeholder, SetClause, SortDirection, SqlParam, Statement, WhereClause};
pub use retry::is_transient;
pub use schema::{run_migrations, seed_defaults};
