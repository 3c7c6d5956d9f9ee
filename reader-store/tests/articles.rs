//! Article repository against a live database

mod common;

use std::collections::HashSet;

use common::TestDb;
use reader_store::models::{
    ArticleFilter, ArticleInclude, ArticleQuery, ArticleStatus, NewArticle, NewTag, Pagination,
    UpdateArticle,
};
use reader_store::{ArticleRepo, TagRepo};

#[tokio::test]
#[ignore = "requires database"]
async fn unknown_tag_rolls_back_create() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let articles = ArticleRepo::new(&t.db);

    let mut input = NewArticle::new("Doomed", "Body", author);
    input.tag_ids = vec![99_999];
    let err = articles.create(input).await.unwrap_err();
    assert!(err.is_foreign_key_violation(), "{err}");

    assert_eq!(articles.count(&ArticleFilter::default()).await.unwrap(), 0);
    assert!(!articles.is_slug_exists("doomed", None).await.unwrap());
    assert_eq!(t.settled_held_connections().await, 0);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn unknown_tag_rolls_back_update() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let tag = TagRepo::new(&t.db).create(NewTag::new("Rust")).await.unwrap();
    let articles = ArticleRepo::new(&t.db);

    let mut input = NewArticle::new("Original", "Body", author);
    input.tag_ids = vec![tag.id];
    let article = articles.create(input).await.unwrap();

    let err = articles
        .update_by_id(
            article.id,
            UpdateArticle {
                title: Some("Changed".into()),
                tag_ids: Some(vec![tag.id, 99_999]),
                ..UpdateArticle::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_foreign_key_violation(), "{err}");

    let stored = articles
        .find_by_id(article.id, ArticleInclude::all())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Original");
    let tags: Vec<i32> = stored.tags.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(tags, vec![tag.id]);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn create_derives_unique_slugs_and_links_tags() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let tags = TagRepo::new(&t.db);
    let a = tags.create(NewTag::new("Alpha")).await.unwrap();
    let b = tags.create(NewTag::new("Beta")).await.unwrap();
    let articles = ArticleRepo::new(&t.db);

    let mut input = NewArticle::new("Hello World", "Body", author);
    input.tag_ids = vec![b.id, a.id, b.id];
    let first = articles.create(input).await.unwrap();
    let second = articles
        .create(NewArticle::new("Hello, World!", "Body", author))
        .await
        .unwrap();

    assert_eq!(first.slug, "hello-world");
    assert_eq!(second.slug, "hello-world-2");
    assert_eq!(first.status, ArticleStatus::Draft);
    assert!(first.published_at.is_none());

    let names: Vec<String> = articles
        .tags_for(first.id)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["Alpha", "Beta"]);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn publish_and_archive_transitions() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let articles = ArticleRepo::new(&t.db);
    let id = t.article(author, "Lifecycle").await;

    let published = articles.publish(id).await.unwrap().expect("draft publishes");
    assert_eq!(published.status, ArticleStatus::Published);
    let stamped = published.published_at.expect("published_at stamped");

    assert!(articles.publish(id).await.unwrap().is_none());

    let archived = articles.archive(id).await.unwrap().expect("published archives");
    assert_eq!(archived.status, ArticleStatus::Archived);
    assert_eq!(archived.published_at, Some(stamped));

    assert!(articles.archive(id).await.unwrap().is_none());
    assert!(articles.publish(id).await.unwrap().is_none());
    assert!(articles.publish(99_999).await.unwrap().is_none());
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn slug_lookup_is_published_only_and_never_counts_views() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let articles = ArticleRepo::new(&t.db);
    let id = t.article(author, "Quiet Read").await;

    let include = ArticleInclude::all();
    assert!(articles.find_by_slug("quiet-read", include).await.unwrap().is_none());

    articles.publish(id).await.unwrap();
    let found = articles
        .find_by_slug("quiet-read", include)
        .await
        .unwrap()
        .expect("published article by slug");
    assert_eq!(found.view_count, 0);
    assert_eq!(found.author.as_ref().map(|a| a.username.as_str()), Some("writer"));
    assert_eq!(found.tags, Some(vec![]));

    assert!(articles.record_view(id).await.unwrap());
    let again = articles.find_by_slug("quiet-read", include).await.unwrap().unwrap();
    assert_eq!(again.view_count, 1);
    assert!(!articles.record_view(99_999).await.unwrap());
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn like_count_never_goes_negative() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let articles = ArticleRepo::new(&t.db);
    let id = t.article(author, "Likes").await;

    assert!(articles.decrement_like_count(id).await.unwrap());
    let article = articles.find_by_id(id, ArticleInclude::default()).await.unwrap().unwrap();
    assert_eq!(article.like_count, 0);

    assert!(articles.increment_like_count(id).await.unwrap());
    assert!(articles.increment_like_count(id).await.unwrap());
    assert!(articles.decrement_like_count(id).await.unwrap());
    let article = articles.find_by_id(id, ArticleInclude::default()).await.unwrap().unwrap();
    assert_eq!(article.like_count, 1);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn pages_cover_count_exactly() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    for i in 0..7 {
        t.article(author, &format!("Post {i}")).await;
    }
    let articles = ArticleRepo::new(&t.db);
    let filter = ArticleFilter {
        author_id: Some(author),
        ..ArticleFilter::default()
    };

    let total = articles.count(&filter).await.unwrap();
    assert_eq!(total, 7);

    let mut seen = HashSet::new();
    for page in 1..=3 {
        let result = articles
            .find_page(&ArticleQuery {
                filter: filter.clone(),
                page: Pagination::new(page, 3),
                ..ArticleQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(result.total, total);
        assert_eq!(result.total_pages(), 3);
        for article in result.items {
            assert!(seen.insert(article.id), "article {} on two pages", article.id);
        }
    }
    assert_eq!(seen.len() as i64, total);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn tag_filter_returns_each_article_once() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let tags = TagRepo::new(&t.db);
    let a = tags.create(NewTag::new("A")).await.unwrap();
    let b = tags.create(NewTag::new("B")).await.unwrap();
    let articles = ArticleRepo::new(&t.db);

    let mut both = NewArticle::new("Both", "Body", author);
    both.tag_ids = vec![a.id, b.id];
    let both = articles.create(both).await.unwrap();
    t.article(author, "Untagged").await;

    let filter = ArticleFilter {
        tag_ids: vec![a.id, b.id],
        ..ArticleFilter::default()
    };
    let found = articles
        .find_all(&ArticleQuery {
            filter: filter.clone(),
            include: ArticleInclude::all(),
            ..ArticleQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, both.id);
    assert_eq!(found[0].tags.as_ref().map(Vec::len), Some(2));
    assert_eq!(articles.count(&filter).await.unwrap(), 1);
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn delete_removes_article_and_links() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let tag = TagRepo::new(&t.db).create(NewTag::new("Gone")).await.unwrap();
    let articles = ArticleRepo::new(&t.db);

    let mut input = NewArticle::new("Short lived", "Body", author);
    input.tag_ids = vec![tag.id];
    let article = articles.create(input).await.unwrap();

    assert!(articles.delete_by_id(article.id).await.unwrap());
    assert!(!articles.delete_by_id(article.id).await.unwrap());
    assert!(articles
        .find_by_id(article.id, ArticleInclude::default())
        .await
        .unwrap()
        .is_none());
    assert!(TagRepo::new(&t.db).find_by_article_id(article.id).await.unwrap().is_empty());
    t.teardown().await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn publishing_through_update_stamps_once() {
    let t = TestDb::new().await;
    let author = t.user("writer").await;
    let articles = ArticleRepo::new(&t.db);
    let id = t.article(author, "Via update").await;

    let published = articles
        .update_by_id(
            id,
            UpdateArticle {
                status: Some(ArticleStatus::Published),
                ..UpdateArticle::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    let stamped = published.published_at.expect("stamped from draft");

    let touched = articles
        .update_by_id(
            id,
            UpdateArticle {
                status: Some(ArticleStatus::Published),
                summary: Some(Some("now with summary".into())),
                ..UpdateArticle::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(touched.published_at, Some(stamped));
    assert_eq!(touched.summary.as_deref(), Some("now with summary"));

    assert!(articles
        .update_by_id(99_999, UpdateArticle::default())
        .await
        .unwrap()
        .is_none());
    t.teardown().await;
}
