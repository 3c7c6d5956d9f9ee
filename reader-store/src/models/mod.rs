//! Domain models returned by and passed into the repositories

pub mod article;
pub mod category;
pub mod pagination;
pub mod slug;
pub mod tag;
pub mod user;
pub mod validation;

pub use article::{
    Article, ArticleFilter, ArticleInclude, ArticleQuery, ArticleSort, ArticleStatus,
    AuthorSummary, CategorySummary, NewArticle, UpdateArticle,
};
pub use category::{
    Category, CategoryFilter, CategoryInclude, CategoryNode, CategoryQuery, CategorySort,
    NewCategory, ParentFilter, ParentSummary, UpdateCategory,
};
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use tag::{
    MergeOutcome, NewTag, Tag, TagFilter, TagInclude, TagQuery, TagSort, TagSummary, UpdateTag,
};
pub use user::{NewUser, UpdateUser, User, UserQuery, UserSort};
pub use validation::ValidationError;
