//! User repository
//!
//! Passwords are only ever stored as bcrypt hashes. Hashing and verifying
//! are CPU-bound and run on the blocking pool.

use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, info};

use super::{build_exists, matched};
use crate::db::query::{like_pattern, order_by};
use crate::db::{Bindings, Database, SetClause, SqlParam, Statement, WhereClause};
use crate::error::Result;
use crate::models::validation::{bounded, email, required};
use crate::models::{NewUser, Paginated, UpdateUser, User, UserQuery, ValidationError};

const HASH_COST: u32 = 10;
const MAX_USERNAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 255;
const MAX_AVATAR_LEN: usize = 500;

const COLUMNS: &str = "id, username, email, password_hash, avatar, bio, is_active, \
    last_login_at, created_at, updated_at";

pub struct UserRepo<'a> {
    db: &'a Database,
}

impl<'a> UserRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewUser) -> Result<User> {
        let username = required("username", &input.username, MAX_USERNAME_LEN)?;
        let address = match input.email.as_deref().map(str::trim) {
            Some(value) => {
                check_email(value)?;
                Some(value.to_string())
            }
            None => None,
        };
        if let Some(avatar) = &input.avatar {
            bounded("avatar", avatar, MAX_AVATAR_LEN)?;
        }
        let password_hash = hash_password(input.password).await?;

        let stmt = Statement::new(
            format!(
                "INSERT INTO users (username, email, password_hash, avatar, bio) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
            ),
            vec![
                SqlParam::from(username),
                SqlParam::from(address),
                SqlParam::from(password_hash),
                SqlParam::from(input.avatar),
                SqlParam::from(input.bio),
            ],
        );
        let rows = self.db.execute_once(&stmt).await?;
        let row = rows.first().ok_or(sqlx::Error::RowNotFound)?;
        let user = user_from_row(row)?;
        debug!(id = user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<User>> {
        self.find_one("id", SqlParam::from(id)).await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", SqlParam::from(username.trim())).await
    }

    pub async fn find_by_email(&self, address: &str) -> Result<Option<User>> {
        self.find_one("email", SqlParam::from(address.trim())).await
    }

    /// Active users only.
    async fn find_one(&self, column: &str, value: SqlParam) -> Result<Option<User>> {
        let stmt = Statement::new(
            format!("SELECT {COLUMNS} FROM users WHERE {column} = $1 AND is_active = TRUE"),
            vec![value],
        );
        match self.db.fetch_optional(&stmt).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_all(&self, query: &UserQuery) -> Result<Vec<User>> {
        self.db
            .execute_query(&build_find_all(query))
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    /// Rows matching the query's filters, ignoring its page.
    pub async fn count(&self, query: &UserQuery) -> Result<i64> {
        self.db.fetch_count(&build_count(query)).await
    }

    pub async fn find_page(&self, query: &UserQuery) -> Result<Paginated<User>> {
        let items = self.find_all(query).await?;
        let total = self.count(query).await?;
        Ok(Paginated::new(items, total, query.page))
    }

    /// Apply the present fields to an active user. A new password is re-hashed.
    pub async fn update_by_id(&self, id: i32, input: UpdateUser) -> Result<Option<User>> {
        let username = match &input.username {
            Some(username) => Some(required("username", username, MAX_USERNAME_LEN)?),
            None => None,
        };
        let address = match &input.email {
            Some(Some(value)) => {
                let value = value.trim();
                check_email(value)?;
                Some(Some(value.to_string()))
            }
            Some(None) => Some(None),
            None => None,
        };
        if let Some(Some(avatar)) = &input.avatar {
            bounded("avatar", avatar, MAX_AVATAR_LEN)?;
        }
        let password_hash = match input.password.clone() {
            Some(password) => Some(hash_password(password).await?),
            None => None,
        };

        let stmt = build_update(
            id,
            UserChanges {
                username,
                email: address,
                password_hash,
                avatar: input.avatar,
                bio: input.bio,
            },
        );
        match self.db.execute_query(&stmt).await?.first() {
            Some(row) => Ok(Some(user_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Stamp `last_login_at`. Returns whether an active user matched.
    pub async fn update_last_login(&self, id: i32) -> Result<bool> {
        let rows = self
            .db
            .execute_query(&Statement::new(
                "UPDATE users SET last_login_at = NOW() WHERE id = $1 AND is_active = TRUE RETURNING id",
                vec![SqlParam::from(id)],
            ))
            .await?;
        Ok(matched(&rows))
    }

    /// Check `plain` against the stored hash.
    pub async fn verify_password(user: &User, plain: &str) -> Result<bool> {
        let plain = plain.to_string();
        let hash = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash)).await??;
        Ok(ok)
    }

    /// Usernames stay reserved after a soft delete.
    pub async fn is_username_exists(&self, username: &str, exclude_id: Option<i32>) -> Result<bool> {
        self.db
            .fetch_exists(&build_exists("users", "username", username.trim(), exclude_id, false))
            .await
    }

    pub async fn is_email_exists(&self, address: &str, exclude_id: Option<i32>) -> Result<bool> {
        self.db
            .fetch_exists(&build_exists("users", "email", address.trim(), exclude_id, false))
            .await
    }

    /// Soft delete.
    pub async fn delete_by_id(&self, id: i32) -> Result<bool> {
        let rows = self
            .db
            .execute_query(&Statement::new(
                "UPDATE users SET is_active = FALSE, updated_at = NOW() \
                 WHERE id = $1 AND is_active = TRUE RETURNING id",
                vec![SqlParam::from(id)],
            ))
            .await?;
        let deleted = matched(&rows);
        if deleted {
            info!(id, "user deactivated");
        }
        Ok(deleted)
    }
}

fn check_email(value: &str) -> std::result::Result<(), ValidationError> {
    bounded("email", value, MAX_EMAIL_LEN)?;
    email(value)
}

async fn hash_password(password: String) -> Result<String> {
    if password.is_empty() {
        return Err(ValidationError::Empty { field: "password" }.into());
    }
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, HASH_COST)).await??;
    Ok(hash)
}

/// Validated, hashed column values for an UPDATE
#[derive(Debug, Default)]
struct UserChanges {
    username: Option<String>,
    email: Option<Option<String>>,
    password_hash: Option<String>,
    avatar: Option<Option<String>>,
    bio: Option<Option<String>>,
}

fn build_update(id: i32, changes: UserChanges) -> Statement {
    let mut binds = Bindings::new();
    let mut set = SetClause::new();
    if let Some(username) = changes.username {
        set.set("username", binds.push(username));
    }
    if let Some(address) = changes.email {
        set.set("email", binds.push(address));
    }
    if let Some(hash) = changes.password_hash {
        set.set("password_hash", binds.push(hash));
    }
    if let Some(avatar) = changes.avatar {
        set.set("avatar", binds.push(avatar));
    }
    if let Some(bio) = changes.bio {
        set.set("bio", binds.push(bio));
    }
    set.raw("updated_at = NOW()");

    let id = binds.push(id);
    binds.finish(format!(
        "UPDATE users SET {set} WHERE id = {id} AND is_active = TRUE RETURNING {COLUMNS}"
    ))
}

fn filter_clause(query: &UserQuery, binds: &mut Bindings) -> WhereClause {
    let mut clause = WhereClause::new();
    if let Some(is_active) = query.is_active {
        clause.push(format!("is_active = {}", binds.push(is_active)));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = binds.push(like_pattern(search));
        clause.push(format!("(username ILIKE {pattern} OR email ILIKE {pattern})"));
    }
    clause
}

fn build_find_all(query: &UserQuery) -> Statement {
    let mut binds = Bindings::new();
    let filter = filter_clause(query, &mut binds);
    let order = order_by(query.sort.column(), query.direction, "id");
    let limit = binds.push(query.page.limit());
    let offset = binds.push(query.page.offset());
    binds.finish(format!(
        "SELECT {COLUMNS} FROM users{filter}{order} LIMIT {limit} OFFSET {offset}"
    ))
}

fn build_count(query: &UserQuery) -> Statement {
    let mut binds = Bindings::new();
    let filter = filter_clause(query, &mut binds);
    binds.finish(format!("SELECT COUNT(*) FROM users{filter}"))
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        avatar: row.try_get("avatar")?,
        bio: row.try_get("bio")?,
        is_active: row.try_get("is_active")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
