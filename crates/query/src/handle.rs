//! Staged application of directives to a not-yet-executed query.

use crate::directive::{Filter, Pagination, Projection, QueryDirectives, SortKey};
use crate::error::QueryError;
use crate::params::RawParams;

/// A deferred query that the modifier refines stage by stage.
///
/// Implementations only record what they are asked for; nothing executes
/// until the caller runs the final handle.
pub trait QueryHandle: Sized {
    /// Narrow the result set; called at most once per stage, conjunctive
    /// with any base filter already present.
    fn filter(self, filter: Filter) -> Self;
    fn sort(self, keys: Vec<SortKey>) -> Self;
    fn select(self, projection: Projection) -> Self;
    fn skip(self, count: u64) -> Self;
    fn limit(self, count: u64) -> Self;
}

/// Wraps a query handle together with the request parameters that shape it.
///
/// ```ignore
/// let query = QueryModifier::new(store.query(), &params)
///     .filter()?
///     .sort()
///     .limit_fields()?
///     .paginate()
///     .into_query();
/// ```
#[derive(Debug)]
pub struct QueryModifier<'p, Q> {
    query: Q,
    params: &'p RawParams,
}

impl<'p, Q: QueryHandle> QueryModifier<'p, Q> {
    pub fn new(query: Q, params: &'p RawParams) -> Self {
        Self { query, params }
    }

    /// Stage 1: non-reserved parameters become predicates.
    pub fn filter(self) -> Result<Self, QueryError> {
        let filter = Filter::from_params(self.params)?;
        Ok(self.map(|query| query.filter(filter)))
    }

    /// Stage 2: requested order, or newest first.
    pub fn sort(self) -> Self {
        let keys = SortKey::parse_list(self.params.get_last("sort"));
        self.map(|query| query.sort(keys))
    }

    /// Stage 3: field inclusion or exclusion.
    pub fn limit_fields(self) -> Result<Self, QueryError> {
        let projection = Projection::parse(self.params.get_last("fields"))?;
        Ok(self.map(|query| query.select(projection)))
    }

    /// Stage 4: skip and limit.
    pub fn paginate(self) -> Self {
        let pagination = Pagination::parse(self.params.get_last("page"), self.params.get_last("limit"));
        self.map(|query| query.skip(pagination.skip()).limit(pagination.page_size()))
    }

    /// All four stages in order.
    pub fn apply_all(self) -> Result<Self, QueryError> {
        Ok(self.filter()?.sort().limit_fields()?.paginate())
    }

    pub fn into_query(self) -> Q {
        self.query
    }

    fn map(self, stage: impl FnOnce(Q) -> Q) -> Self {
        Self {
            query: stage(self.query),
            params: self.params,
        }
    }
}

impl QueryDirectives {
    /// Apply an already-built directive set in stage order.
    pub fn apply<Q: QueryHandle>(self, query: Q) -> Q {
        let skip = self.pagination.skip();
        let limit = self.pagination.page_size();
        query
            .filter(self.filter)
            .sort(self.sort)
            .select(self.projection)
            .skip(skip)
            .limit(limit)
    }
}
