//! Schema bootstrap: versioned migrations and default rows
//!
//! Each migration runs together with its `migrations` bookkeeping insert in
//! one transaction, so a failed migration leaves no trace and is retried on
//! the next run.

use sqlx::Row;
use tracing::info;

use super::pool::Database;
use super::query::{SqlParam, Statement};
use crate::error::Result;

/// A schema change, applied once.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS migrations (
        id SERIAL PRIMARY KEY,
        version VARCHAR(50) NOT NULL UNIQUE,
        name VARCHAR(255) NOT NULL,
        executed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "create_users_table",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id SERIAL PRIMARY KEY,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                avatar VARCHAR(500),
                bio TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                last_login_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_users_is_active ON users(is_active)",
        ],
    },
    Migration {
        version: "002",
        name: "create_categories_table",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id SERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                slug VARCHAR(100) NOT NULL,
                parent_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_categories_name_active ON categories(name) WHERE is_active",
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_categories_slug_active ON categories(slug) WHERE is_active",
            "CREATE INDEX IF NOT EXISTS idx_categories_parent_id ON categories(parent_id)",
        ],
    },
    Migration {
        version: "003",
        name: "create_articles_table",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id SERIAL PRIMARY KEY,
                title VARCHAR(200) NOT NULL,
                content TEXT NOT NULL,
                summary TEXT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                author_id INTEGER NOT NULL REFERENCES users(id),
                category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft'
                    CHECK (status IN ('draft', 'published', 'archived')),
                featured_image VARCHAR(500),
                view_count INTEGER NOT NULL DEFAULT 0 CHECK (view_count >= 0),
                like_count INTEGER NOT NULL DEFAULT 0 CHECK (like_count >= 0),
                is_public BOOLEAN NOT NULL DEFAULT TRUE,
                published_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_articles_author_id ON articles(author_id)",
            "CREATE INDEX IF NOT EXISTS idx_articles_category_id ON articles(category_id)",
            "CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status)",
            "CREATE INDEX IF NOT EXISTS idx_articles_created_at ON articles(created_at)",
        ],
    },
    Migration {
        version: "004",
        name: "create_tags_tables",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id SERIAL PRIMARY KEY,
                name VARCHAR(50) NOT NULL,
                description TEXT,
                slug VARCHAR(100) NOT NULL,
                color VARCHAR(7),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_tags_name_active ON tags(name) WHERE is_active",
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_tags_slug_active ON tags(slug) WHERE is_active",
            r#"
            CREATE TABLE IF NOT EXISTS article_tags (
                article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (article_id, tag_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_article_tags_tag_id ON article_tags(tag_id)",
        ],
    },
];

/// Apply every migration not yet recorded. Returns the versions applied.
pub async fn run_migrations(db: &Database) -> Result<Vec<&'static str>> {
    info!("Running reader migrations...");
    db.execute(&Statement::raw(CREATE_MIGRATIONS_TABLE)).await?;

    let rows = db
        .execute_query(&Statement::raw("SELECT version FROM migrations"))
        .await?;
    let applied = rows
        .iter()
        .map(|row| row.try_get::<String, _>("version"))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut newly_applied = Vec::new();
    for migration in pending(&applied) {
        info!(version = migration.version, name = migration.name, "applying migration");
        db.execute_transaction(&migration_statements(migration)).await?;
        newly_applied.push(migration.version);
    }

    info!(applied = newly_applied.len(), "migrations complete");
    Ok(newly_applied)
}

/// Migrations whose version is not in `applied`, in order.
pub fn pending<'a>(applied: &'a [String]) -> impl Iterator<Item = &'static Migration> + 'a {
    MIGRATIONS
        .iter()
        .filter(move |m| !applied.iter().any(|v| v == m.version))
}

fn migration_statements(migration: &Migration) -> Vec<Statement> {
    let mut statements: Vec<Statement> = migration
        .statements
        .iter()
        .map(|sql| Statement::raw(*sql))
        .collect();
    statements.push(Statement::new(
        "INSERT INTO migrations (version, name) VALUES ($1, $2)",
        vec![
            SqlParam::from(migration.version),
            SqlParam::from(migration.name),
        ],
    ));
    statements
}

const SEED_CATEGORIES: &str = r#"
    INSERT INTO categories (name, description, slug, sort_order) VALUES
    ('Technology', 'Articles about technology', 'technology', 1),
    ('Life', 'Life notes and shared experience', 'life', 2),
    ('Study', 'Study notes', 'study', 3),
    ('Notes', 'Loose thoughts', 'notes', 4)
    ON CONFLICT DO NOTHING
"#;

const SEED_TAGS: &str = r#"
    INSERT INTO tags (name, description, slug, color) VALUES
    ('JavaScript', 'JavaScript content', 'javascript', '#f7df1e'),
    ('Node.js', 'Node.js content', 'nodejs', '#339933'),
    ('PostgreSQL', 'PostgreSQL database content', 'postgresql', '#336791'),
    ('API', 'API development', 'api', '#ff6b6b'),
    ('Tutorial', 'Tutorials', 'tutorial', '#4ecdc4'),
    ('Experience', 'Shared experience', 'experience', '#45b7d1')
    ON CONFLICT DO NOTHING
"#;

/// Insert default categories and tags. Safe to run repeatedly.
pub async fn seed_defaults(db: &Database) -> Result<()> {
    db.execute_transaction(&[Statement::raw(SEED_CATEGORIES), Statement::raw(SEED_TAGS)])
        .await?;
    info!("default categories and tags seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_ordered_and_unique() {
        let versions: Vec<_> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn pending_skips_applied() {
        let applied = vec!["001".to_string(), "003".to_string()];
        let versions: Vec<_> = pending(&applied).map(|m| m.version).collect();
        assert_eq!(versions, vec!["002", "004"]);
    }

    #[test]
    fn bookkeeping_insert_is_last() {
        let stmts = migration_statements(&MIGRATIONS[0]);
        let last = stmts.last().unwrap();
        assert!(last.sql.starts_with("INSERT INTO migrations"));
        assert_eq!(last.params.len(), 2);
    }
}
