//! Typed statement building
//!
//! Placeholders are handed out by [`Bindings`], so a conditionally appended
//! clause can never reference the wrong `$n`:
//!
//! ```ignore
//! let mut binds = Bindings::new();
//! let mut filter = WhereClause::new();
//! if let Some(status) = status {
//!     filter.push(format!("a.status = {}", binds.push(status)));
//! }
//! let sql = format!("SELECT * FROM articles a{filter}");
//! let stmt = binds.finish(sql);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

use crate::models::{ArticleStatus, ValidationError};

/// Owned bind value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Text(String),
    NullableInt(Option<i32>),
    NullableText(Option<String>),
    IntArray(Vec<i32>),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
}

impl SqlParam {
    fn bind_to<'q>(
        self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            Self::Bool(v) => query.bind(v),
            Self::Int(v) => query.bind(v),
            Self::BigInt(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
            Self::NullableInt(v) => query.bind(v),
            Self::NullableText(v) => query.bind(v),
            Self::IntArray(v) => query.bind(v),
            Self::TextArray(v) => query.bind(v),
            Self::Timestamp(v) => query.bind(v),
        }
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Option<i32>> for SqlParam {
    fn from(v: Option<i32>) -> Self {
        Self::NullableInt(v)
    }
}

impl From<Option<String>> for SqlParam {
    fn from(v: Option<String>) -> Self {
        Self::NullableText(v)
    }
}

impl From<Option<&str>> for SqlParam {
    fn from(v: Option<&str>) -> Self {
        Self::NullableText(v.map(str::to_string))
    }
}

impl From<Vec<i32>> for SqlParam {
    fn from(v: Vec<i32>) -> Self {
        Self::IntArray(v)
    }
}

impl From<&[i32]> for SqlParam {
    fn from(v: &[i32]) -> Self {
        Self::IntArray(v.to_vec())
    }
}

impl From<Vec<String>> for SqlParam {
    fn from(v: Vec<String>) -> Self {
        Self::TextArray(v)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<ArticleStatus> for SqlParam {
    fn from(v: ArticleStatus) -> Self {
        Self::Text(v.as_str().to_string())
    }
}

/// A `$n` positional placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder(usize);

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Ordered bind values; each push returns the next placeholder
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    params: Vec<SqlParam>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<SqlParam>) -> Placeholder {
        self.params.push(value.into());
        Placeholder(self.params.len())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn finish(self, sql: impl Into<String>) -> Statement {
        Statement {
            sql: sql.into(),
            params: self.params,
        }
    }
}

/// AND-joined predicates; renders as ` WHERE ...` or nothing
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    conditions: Vec<String>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: impl Into<String>) -> &mut Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return Ok(());
        }
        write!(f, " WHERE {}", self.conditions.join(" AND "))
    }
}

/// `col = $n` assignments for UPDATE
#[derive(Debug, Clone, Default)]
pub struct SetClause {
    assignments: Vec<String>,
}

impl SetClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a bound value to `column`.
    pub fn set(&mut self, column: &str, placeholder: Placeholder) -> &mut Self {
        self.assignments.push(format!("{column} = {placeholder}"));
        self
    }

    /// Assign a raw SQL expression, e.g. `updated_at = NOW()`.
    pub fn raw(&mut self, assignment: impl Into<String>) -> &mut Self {
        self.assignments.push(assignment.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl fmt::Display for SetClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.assignments.join(", "))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(ValidationError::InvalidVariant {
                field: "order_direction",
                value: s.to_string(),
            }),
        }
    }
}

/// ORDER BY fragment with an id tie-breaker, so LIMIT/OFFSET pages never
/// overlap when the sort column has duplicates.
pub fn order_by(column: &str, direction: SortDirection, id_column: &str) -> String {
    let dir = direction.as_sql();
    let nulls = match direction {
        SortDirection::Asc => "NULLS FIRST",
        SortDirection::Desc => "NULLS LAST",
    };
    format!(" ORDER BY {column} {dir} {nulls}, {id_column} {dir}")
}

/// Escape LIKE metacharacters (`%`, `_`, `\`).
pub fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// `%needle%` with LIKE metacharacters escaped.
pub fn like_pattern(needle: &str) -> String {
    format!("%{}%", escape_like(needle))
}

/// SQL text plus its bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// Statement with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Statement with positional parameters already numbered in `sql`.
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Leading SQL keyword, used as a log label.
    pub fn verb(&self) -> &str {
        self.sql.split_whitespace().next().unwrap_or("")
    }

    /// sqlx query with every parameter bound. Values are cloned so the
    /// statement can be re-run on retry.
    pub fn query(&self) -> Query<'_, Postgres, PgArguments> {
        self.params
            .iter()
            .cloned()
            .fold(sqlx::query(&self.sql), |query, param| param.bind_to(query))
    }
}
