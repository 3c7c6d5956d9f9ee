//! Shared fixtures for database integration tests
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p reader-store -- --ignored
//!
//! Every test gets its own schema, so tests can run in parallel against one
//! database and leave nothing behind.

#![allow(dead_code)]

use std::time::Duration;

use reader_store::models::{NewArticle, NewUser};
use reader_store::{
    run_migrations, ArticleRepo, Database, DbConfig, RetryPolicy, StoreConfig, UserRepo,
};
use uuid::Uuid;

pub struct TestDb {
    pub db: Database,
    admin: Database,
    schema: String,
}

impl TestDb {
    /// Fresh schema with every migration applied.
    pub async fn new() -> Self {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let schema = format!("reader_test_{}", Uuid::new_v4().simple());

        let admin = Database::connect_lazy(&config(&url, None)).expect("admin pool");
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(admin.pool())
            .await
            .expect("create schema");

        let db = Database::connect_lazy(&config(&url, Some(&schema))).expect("test pool");
        run_migrations(&db).await.expect("migrations");

        Self { db, admin, schema }
    }

    /// Drop the schema and close both pools.
    pub async fn teardown(self) {
        self.db.close().await;
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(self.admin.pool())
            .await
            .expect("drop schema");
        self.admin.close().await;
    }

    /// Wait for pooled connections to drain back to idle.
    ///
    /// sqlx returns a connection on a background task after the guard drops.
    pub async fn settled_held_connections(&self) -> u32 {
        for _ in 0..50 {
            if self.db.held_connections() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.db.held_connections()
    }

    pub async fn user(&self, username: &str) -> i32 {
        UserRepo::new(&self.db)
            .create(NewUser::new(username, "secret-password"))
            .await
            .expect("create user")
            .id
    }

    pub async fn article(&self, author_id: i32, title: &str) -> i32 {
        ArticleRepo::new(&self.db)
            .create(NewArticle::new(title, "Body text", author_id))
            .await
            .expect("create article")
            .id
    }
}

fn config(url: &str, schema: Option<&str>) -> StoreConfig {
    StoreConfig {
        database: DbConfig {
            max_connections: 5,
            search_path: schema.map(str::to_string),
            ..DbConfig::from_url(url)
        },
        retry: RetryPolicy::none(),
        ..StoreConfig::default()
    }
}
