//! User models

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::ValidationError;
use super::Pagination;
use crate::db::query::SortDirection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
    /// bcrypt hash; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Default, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    /// Plaintext; hashed before it reaches the database
    pub password: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Partial update; `Some(None)` clears a nullable column. A new
/// password is re-hashed.
#[derive(Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<Option<String>>,
    pub password: Option<String>,
    pub avatar: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

impl std::fmt::Debug for UpdateUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserSort {
    #[default]
    CreatedAt,
    Username,
    LastLoginAt,
}

impl UserSort {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Username => "username",
            Self::LastLoginAt => "last_login_at",
        }
    }
}

impl FromStr for UserSort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "username" => Ok(Self::Username),
            "last_login_at" => Ok(Self::LastLoginAt),
            _ => Err(ValidationError::InvalidVariant {
                field: "order_by",
                value: s.to_string(),
            }),
        }
    }
}

pub const USER_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct UserQuery {
    pub is_active: Option<bool>,
    /// Case-insensitive substring match on username and email
    pub search: Option<String>,
    pub sort: UserSort,
    pub direction: SortDirection,
    pub page: Pagination,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            is_active: Some(true),
            search: None,
            sort: UserSort::CreatedAt,
            direction: SortDirection::Desc,
            page: Pagination::first(USER_PAGE_SIZE),
        }
    }
}
