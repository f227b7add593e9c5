//! The Query Directive Set and the four parsing stages that build it.

use std::collections::BTreeSet;

use serde_json::{Number, Value};

use crate::error::QueryError;
use crate::params::{ParamValue, RawParams};
use crate::{CREATED_AT_FIELD, VERSION_FIELD};

/// Parameter names consumed by sort/projection/pagination, never filters.
pub const RESERVED_PARAMS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_SORT: &str = "-createdAt";

// -------------------------
// Filters
// -------------------------

/// A typed comparison against one document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
}

impl Comparison {
    /// Build a range comparison from its request operator name.
    pub fn from_operator(operator: &str, operand: Value) -> Option<Self> {
        match operator {
            "gt" => Some(Self::Gt(operand)),
            "gte" => Some(Self::Gte(operand)),
            "lt" => Some(Self::Lt(operand)),
            "lte" => Some(Self::Lte(operand)),
            _ => None,
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            Self::Eq(_) => "eq",
            Self::Ne(_) => "ne",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::In(_) => "in",
        }
    }
}

/// `field <comparison>`; `field` may be a dotted path into nested objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub comparison: Comparison,
}

impl Predicate {
    pub fn new(field: impl Into<String>, comparison: Comparison) -> Self {
        Self {
            field: field.into(),
            comparison,
        }
    }
}

/// Conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Vec<Predicate>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Predicate::new(field, Comparison::Eq(value.into())))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Predicate::new(field, Comparison::Ne(value.into())))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Predicate::new(field, Comparison::Gt(value.into())))
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.0.push(predicate);
        self
    }

    /// Append every predicate of `other`.
    pub fn merge(mut self, other: Filter) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stage 1: every non-reserved parameter becomes a predicate.
    ///
    /// Nested operator keys (`gte`, `gt`, `lte`, `lt`) become typed
    /// comparisons on the enclosing path; other nested keys extend the path
    /// (`startLocation[address]=x` filters `startLocation.address`).
    /// Repeated scalar keys become an `in` predicate.
    pub fn from_params(params: &RawParams) -> Result<Self, QueryError> {
        let mut filter = Self::new();
        for (name, value) in params.iter() {
            if RESERVED_PARAMS.contains(&name) {
                continue;
            }
            collect_predicates(&mut filter.0, name, value)?;
        }
        Ok(filter)
    }
}

fn collect_predicates(
    out: &mut Vec<Predicate>,
    path: &str,
    value: &ParamValue,
) -> Result<(), QueryError> {
    match value {
        ParamValue::Single(raw) => {
            require_field(path, "eq")?;
            out.push(Predicate::new(path, Comparison::Eq(coerce_operand(raw))));
        }
        ParamValue::Many(raws) => {
            require_field(path, "in")?;
            let values = raws.iter().map(|raw| coerce_operand(raw)).collect();
            out.push(Predicate::new(path, Comparison::In(values)));
        }
        ParamValue::Nested(entries) => {
            for (key, inner) in entries {
                match inner.last() {
                    Some(raw) if Comparison::from_operator(key, Value::Null).is_some() => {
                        require_field(path, key)?;
                        if let Some(comparison) = Comparison::from_operator(key, coerce_operand(raw)) {
                            out.push(Predicate::new(path, comparison));
                        }
                    }
                    _ => {
                        let nested = if path.is_empty() {
                            key.clone()
                        } else {
                            format!("{path}.{key}")
                        };
                        collect_predicates(out, &nested, inner)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn require_field(path: &str, operator: &str) -> Result<(), QueryError> {
    if path.is_empty() {
        Err(QueryError::MissingField(operator.to_string()))
    } else {
        Ok(())
    }
}

/// Interpret a request string as the JSON value it most plausibly denotes.
///
/// Integers and finite floats become numbers, `true`/`false` booleans,
/// everything else stays a string.
pub fn coerce_operand(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

// -------------------------
// Sorting
// -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Stage 2: `sort=-ratingsAverage,price`, order preserved. Falls back to
    /// `createdAt` descending when absent or blank.
    pub fn parse_list(sort: Option<&str>) -> Vec<SortKey> {
        let keys: Vec<SortKey> = sort
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter_map(|segment| match segment.strip_prefix('-') {
                Some(field) if !field.is_empty() => Some(Self::desc(field)),
                Some(_) => None,
                None if segment.is_empty() => None,
                None => Some(Self::asc(segment)),
            })
            .collect();

        if keys.is_empty() {
            vec![Self::desc(CREATED_AT_FIELD)]
        } else {
            keys
        }
    }
}

// -------------------------
// Projection
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only these fields (plus the identifier).
    Include(BTreeSet<String>),
    /// Every field except these.
    Exclude(BTreeSet<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Self::Exclude(BTreeSet::from([VERSION_FIELD.to_string()]))
    }
}

impl Projection {
    /// Stage 3: `fields=name,price` includes; `fields=-summary,-images`
    /// excludes. Mixing the two is a caller error.
    pub fn parse(fields: Option<&str>) -> Result<Self, QueryError> {
        let Some(fields) = fields else {
            return Ok(Self::default());
        };

        let mut included = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        for segment in fields.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match segment.strip_prefix('-') {
                Some(field) if !field.is_empty() => {
                    excluded.insert(field.to_string());
                }
                Some(_) => {}
                None => {
                    included.insert(segment.to_string());
                }
            }
        }

        match (included.is_empty(), excluded.is_empty()) {
            (true, true) => Ok(Self::default()),
            (false, true) => Ok(Self::Include(included)),
            (true, false) => Ok(Self::Exclude(excluded)),
            (false, false) => Err(QueryError::MixedProjection(fields.to_string())),
        }
    }
}

// -------------------------
// Pagination
// -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u64,
    page_size: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    /// Construct from already-validated values; zeroes fall back to defaults.
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: if page == 0 { DEFAULT_PAGE } else { page },
            page_size: if page_size == 0 { DEFAULT_LIMIT } else { page_size },
        }
    }

    /// Stage 4: coerce `page` and `limit`; missing, non-numeric or
    /// non-positive values take the defaults.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        Self::new(positive_or(page, DEFAULT_PAGE), positive_or(limit, DEFAULT_LIMIT))
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// `page_size × (page − 1)`, saturating on overflow.
    pub fn skip(&self) -> u64 {
        self.page_size.saturating_mul(self.page - 1)
    }
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

// -------------------------
// Directive set
// -------------------------

/// Everything a list request asks of the store, derived once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDirectives {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub pagination: Pagination,
}

impl Default for QueryDirectives {
    fn default() -> Self {
        Self {
            filter: Filter::default(),
            sort: SortKey::parse_list(None),
            projection: Projection::default(),
            pagination: Pagination::default(),
        }
    }
}

impl QueryDirectives {
    pub fn from_params(params: &RawParams) -> Result<Self, QueryError> {
        Ok(Self {
            filter: Filter::from_params(params)?,
            sort: SortKey::parse_list(params.get_last("sort")),
            projection: Projection::parse(params.get_last("fields"))?,
            pagination: Pagination::parse(params.get_last("page"), params.get_last("limit")),
        })
    }
}
