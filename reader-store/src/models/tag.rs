//! Tag models

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::ValidationError;
use super::Pagination;
use crate::db::query::SortDirection;

/// Tag fields attached to articles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    pub color: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Published articles carrying this tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_count: Option<i64>,
}

/// Computed fields to attach to a looked-up tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagInclude {
    pub article_count: bool,
}

impl TagInclude {
    pub fn all() -> Self {
        Self {
            article_count: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub description: Option<String>,
    /// Derived from the name when absent
    pub slug: Option<String>,
    pub color: Option<String>,
}

impl NewTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Partial update; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub slug: Option<String>,
    pub color: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct TagFilter {
    pub is_active: Option<bool>,
    /// Case-insensitive substring match on name and description
    pub search: Option<String>,
}

impl Default for TagFilter {
    fn default() -> Self {
        Self {
            is_active: Some(true),
            search: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagSort {
    #[default]
    Name,
    CreatedAt,
    ArticleCount,
}

impl TagSort {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "t.name",
            Self::CreatedAt => "t.created_at",
            Self::ArticleCount => "article_count",
        }
    }
}

impl FromStr for TagSort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "created_at" => Ok(Self::CreatedAt),
            "article_count" => Ok(Self::ArticleCount),
            _ => Err(ValidationError::InvalidVariant {
                field: "order_by",
                value: s.to_string(),
            }),
        }
    }
}

pub const TAG_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct TagQuery {
    pub filter: TagFilter,
    pub sort: TagSort,
    pub direction: SortDirection,
    pub page: Pagination,
    pub include_article_count: bool,
}

impl Default for TagQuery {
    fn default() -> Self {
        Self {
            filter: TagFilter::default(),
            sort: TagSort::Name,
            direction: SortDirection::Asc,
            page: Pagination::first(TAG_PAGE_SIZE),
            include_article_count: false,
        }
    }
}

/// What `TagRepo::merge` changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Join rows moved from source to target
    pub reassigned: u64,
    /// Source join rows dropped because the article already had the target
    pub dropped_duplicates: u64,
    pub source_deactivated: bool,
}
