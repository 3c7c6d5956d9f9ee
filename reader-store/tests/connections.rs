//! Connection release and transaction atomicity against a live database

mod common;

use common::TestDb;
use reader_store::db::{SqlParam, Statement};

#[tokio::test]
#[ignore = "requires database"]
async fn connections_return_after_success_and_failure() {
    let t = TestDb::new().await;
    assert!(t.db.ping().await);

    t.db.execute_query(&Statement::raw("SELECT 1")).await.unwrap();
    assert_eq!(t.settled_held_connections().await, 0);

    let err = t
        .db
        .execute_query(&Statement::raw("SELECT * FROM no_such_table"))
        .await
        .unwrap_err();
    assert_eq!(err.sql_state().as_deref(), Some("42P01"));
    assert_eq!(t.settled_held_connections().await, 0);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn failed_transaction_leaves_no_trace() {
    let t = TestDb::new().await;
    let statements = [
        Statement::new(
            "INSERT INTO tags (name, slug) VALUES ($1, $2)",
            vec![SqlParam::from("Phantom"), SqlParam::from("phantom")],
        ),
        Statement::new(
            "INSERT INTO article_tags (article_id, tag_id) VALUES ($1, $2)",
            vec![SqlParam::from(99_999), SqlParam::from(99_999)],
        ),
    ];
    let err = t.db.execute_transaction(&statements).await.unwrap_err();
    assert!(err.is_foreign_key_violation(), "{err}");
    assert_eq!(t.settled_held_connections().await, 0);

    let remaining = t
        .db
        .fetch_count(&Statement::new(
            "SELECT COUNT(*) FROM tags WHERE name = $1",
            vec![SqlParam::from("Phantom")],
        ))
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn transaction_returns_rows_per_statement() {
    let t = TestDb::new().await;
    let results = t
        .db
        .execute_transaction(&[
            Statement::raw("INSERT INTO tags (name, slug) VALUES ('One', 'one') RETURNING id"),
            Statement::raw("INSERT INTO tags (name, slug) VALUES ('Two', 'two')"),
            Statement::raw("SELECT id FROM tags ORDER BY id"),
        ])
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].len(), 1);
    assert!(results[1].is_empty());
    assert_eq!(results[2].len(), 2);
    assert_eq!(t.settled_held_connections().await, 0);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn migrations_are_idempotent() {
    let t = TestDb::new().await;
    let applied = reader_store::run_migrations(&t.db).await.unwrap();
    assert!(applied.is_empty());

    reader_store::seed_defaults(&t.db).await.unwrap();
    reader_store::seed_defaults(&t.db).await.unwrap();
    let tags = t
        .db
        .fetch_count(&Statement::raw("SELECT COUNT(*) FROM tags"))
        .await
        .unwrap();
    assert_eq!(tags, 6);
    t.teardown().await;
}
