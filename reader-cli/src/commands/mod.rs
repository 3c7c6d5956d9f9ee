//! Command implementations for the reader CLI

pub mod articles;
pub mod categories;
pub mod migrate;
pub mod ping;
pub mod tags;

// Re-export dispatcher functions for flat access from main.rs
pub use articles::run_articles;
pub use categories::run_categories;
pub use migrate::run_migrate;
pub use ping::run_ping;
pub use tags::run_tags;
