//! Article models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::ValidationError;
use super::{Pagination, TagSummary};
use crate::db::query::SortDirection;

/// Article lifecycle
///
/// `draft -> published` stamps `published_at`; `draft | published -> archived`
/// leaves it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            _ => Err(ValidationError::InvalidVariant {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// Author fields attached when `ArticleInclude::author` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: i32,
    pub username: String,
    pub avatar: Option<String>,
}

/// Category fields attached when `ArticleInclude::category` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
}

/// Stored article, plus whichever joins the caller asked for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub slug: String,
    pub author_id: i32,
    pub category_id: Option<i32>,
    pub status: ArticleStatus,
    pub featured_image: Option<String>,
    pub view_count: i32,
    pub like_count: i32,
    pub is_public: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategorySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagSummary>>,
}

/// Input for `ArticleRepo::create`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    /// Derived from the title when absent
    pub slug: Option<String>,
    pub author_id: i32,
    pub category_id: Option<i32>,
    #[serde(default)]
    pub status: ArticleStatus,
    pub featured_image: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub tag_ids: Vec<i32>,
}

fn default_true() -> bool {
    true
}

impl NewArticle {
    /// Public draft with no category or tags.
    pub fn new(title: impl Into<String>, content: impl Into<String>, author_id: i32) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author_id,
            is_public: true,
            ..Self::default()
        }
    }
}

/// Partial update for `ArticleRepo::update_by_id`.
///
/// `None` leaves a column untouched. Nullable columns use
/// `Some(None)` to clear the value. `tag_ids: Some(..)` replaces the
/// whole tag set. `author_id` is not updatable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticle {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<Option<String>>,
    pub category_id: Option<Option<i32>>,
    pub status: Option<ArticleStatus>,
    pub featured_image: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub tag_ids: Option<Vec<i32>>,
}

/// Joined sub-objects to attach to each returned article
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArticleInclude {
    pub author: bool,
    pub category: bool,
    pub tags: bool,
}

impl ArticleInclude {
    pub fn all() -> Self {
        Self {
            author: true,
            category: true,
            tags: true,
        }
    }
}

/// Filters shared by `find_all` and `count`
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub status: Option<ArticleStatus>,
    pub author_id: Option<i32>,
    pub category_id: Option<i32>,
    pub is_public: Option<bool>,
    /// Case-insensitive substring match on title, content and summary
    pub search: Option<String>,
    /// Article carries at least one of these tags
    pub tag_ids: Vec<i32>,
}

/// Whitelisted ORDER BY columns for article listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArticleSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    PublishedAt,
    Title,
    ViewCount,
    LikeCount,
}

impl ArticleSort {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "a.created_at",
            Self::UpdatedAt => "a.updated_at",
            Self::PublishedAt => "a.published_at",
            Self::Title => "a.title",
            Self::ViewCount => "a.view_count",
            Self::LikeCount => "a.like_count",
        }
    }
}

impl FromStr for ArticleSort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "published_at" => Ok(Self::PublishedAt),
            "title" => Ok(Self::Title),
            "view_count" => Ok(Self::ViewCount),
            "like_count" => Ok(Self::LikeCount),
            _ => Err(ValidationError::InvalidVariant {
                field: "order_by",
                value: s.to_string(),
            }),
        }
    }
}

/// Default page size for article listings
pub const ARTICLE_PAGE_SIZE: u32 = 20;

/// Listing query: filters, ordering, page and joins
#[derive(Debug, Clone)]
pub struct ArticleQuery {
    pub filter: ArticleFilter,
    pub sort: ArticleSort,
    pub direction: SortDirection,
    pub page: Pagination,
    pub include: ArticleInclude,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            filter: ArticleFilter::default(),
            sort: ArticleSort::CreatedAt,
            direction: SortDirection::Desc,
            page: Pagination::first(ARTICLE_PAGE_SIZE),
            include: ArticleInclude::default(),
        }
    }
}
