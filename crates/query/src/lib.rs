//! `tourbook-query`: the Query Modifier.
//!
//! Turns a flat set of request parameters (`?sort=-price&duration[gte]=5&page=2`)
//! into a [`QueryDirectives`] value and applies it, stage by stage, to any
//! not-yet-executed query that implements [`QueryHandle`].
//!
//! The crate has no knowledge of entities or storage. [`eval`] provides the
//! reference semantics of every directive over JSON documents, which the
//! in-memory entity store uses directly.

pub mod directive;
pub mod error;
pub mod eval;
pub mod handle;
pub mod params;

pub use directive::{
    Comparison, Filter, Pagination, Predicate, Projection, QueryDirectives, SortDirection, SortKey,
    DEFAULT_LIMIT, DEFAULT_PAGE, DEFAULT_SORT, RESERVED_PARAMS,
};
pub use error::QueryError;
pub use handle::{QueryHandle, QueryModifier};
pub use params::{ParamValue, RawParams};

/// Identifier field present on every stored document.
pub const ID_FIELD: &str = "id";

/// Internal document version field, maintained by the store.
pub const VERSION_FIELD: &str = "__v";

/// Creation timestamp field used by the default sort.
pub const CREATED_AT_FIELD: &str = "createdAt";
