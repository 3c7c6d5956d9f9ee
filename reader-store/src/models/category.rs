//! Category models

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::ValidationError;
use super::Pagination;
use crate::db::query::SortDirection;

/// Parent fields attached when `CategoryInclude::parent` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentSummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
    pub parent_id: Option<i32>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentSummary>,
    /// Direct active children only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Category>>,
    /// Published articles in this category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_count: Option<i64>,
}

/// A category with its full active subtree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// Number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CategoryNode::node_count).sum::<usize>()
    }

    /// Longest root-to-leaf path, counting this node as depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(CategoryNode::depth).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    /// Derived from the name when absent
    pub slug: Option<String>,
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub sort_order: i32,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_id: i32) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Partial update; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub slug: Option<String>,
    pub parent_id: Option<Option<i32>>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryInclude {
    pub parent: bool,
    pub children: bool,
    pub article_count: bool,
}

impl CategoryInclude {
    pub fn all() -> Self {
        Self {
            parent: true,
            children: true,
            article_count: true,
        }
    }
}

/// Which parent the listed categories hang from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentFilter {
    #[default]
    Any,
    Root,
    Id(i32),
}

#[derive(Debug, Clone)]
pub struct CategoryFilter {
    /// `None` lists active and inactive rows
    pub is_active: Option<bool>,
    pub parent: ParentFilter,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self {
            is_active: Some(true),
            parent: ParentFilter::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategorySort {
    #[default]
    SortOrder,
    Name,
    CreatedAt,
}

impl CategorySort {
    pub fn column(&self) -> &'static str {
        match self {
            Self::SortOrder => "c.sort_order",
            Self::Name => "c.name",
            Self::CreatedAt => "c.created_at",
        }
    }
}

impl FromStr for CategorySort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sort_order" => Ok(Self::SortOrder),
            "name" => Ok(Self::Name),
            "created_at" => Ok(Self::CreatedAt),
            _ => Err(ValidationError::InvalidVariant {
                field: "order_by",
                value: s.to_string(),
            }),
        }
    }
}

pub const CATEGORY_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct CategoryQuery {
    pub filter: CategoryFilter,
    pub sort: CategorySort,
    pub direction: SortDirection,
    pub page: Pagination,
    pub include: CategoryInclude,
}

impl Default for CategoryQuery {
    fn default() -> Self {
        Self {
            filter: CategoryFilter::default(),
            sort: CategorySort::SortOrder,
            direction: SortDirection::Asc,
            page: Pagination::first(CATEGORY_PAGE_SIZE),
            include: CategoryInclude::default(),
        }
    }
}
