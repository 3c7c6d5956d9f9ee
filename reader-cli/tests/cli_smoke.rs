//! Smoke tests to verify command wiring (no database needed)

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_top_level_help_lists_commands() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("categories"))
        .stdout(predicate::str::contains("tags"))
        .stdout(predicate::str::contains("articles"));
}

#[test]
fn test_migrate_help() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("migrate").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("default categories and tags"));
}

// === Categories ===

#[test]
fn test_categories_ancestors_help() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("categories").arg("ancestors").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Category ID"));
}

// === Tags ===

#[test]
fn test_tags_merge_help() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("tags").arg("merge").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Tag that receives its articles"));
}

#[test]
fn test_tags_merge_requires_both_ids() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("tags").arg("merge").arg("3");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("<TARGET>"));
}

// === Articles ===

#[test]
fn test_articles_list_help() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("articles").arg("list").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Filter by status"));
}

#[test]
fn test_articles_list_rejects_unknown_status() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("articles").arg("list").arg("--status").arg("deleted");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid status value"));
}

#[test]
fn test_articles_list_rejects_unknown_sort() {
    let mut cmd = Command::cargo_bin("reader").unwrap();
    cmd.arg("articles").arg("list").arg("--sort").arg("author_id");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid order_by value"));
}
