//! Reference semantics of the directives over JSON documents.
//!
//! Values order by type first (missing < null < bool < number < string <
//! array < object), then within the type. Strings that both parse as
//! RFC 3339 timestamps or ISO dates compare chronologically.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::directive::{Comparison, Filter, Pagination, Predicate, Projection, SortDirection, SortKey};
use crate::ID_FIELD;

/// Resolve a dotted path (`startLocation.address`) inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(doc, |current, segment| current.as_object()?.get(segment))
}

impl Filter {
    /// True when every predicate holds for `doc`.
    pub fn matches(&self, doc: &Value) -> bool {
        self.predicates().iter().all(|predicate| predicate.matches(doc))
    }
}

impl Predicate {
    pub fn matches(&self, doc: &Value) -> bool {
        let field = lookup(doc, &self.field);
        match &self.comparison {
            Comparison::Eq(operand) => field.is_some_and(|value| any_element(value, |v| loose_eq(v, operand))),
            Comparison::Ne(operand) => !field.is_some_and(|value| any_element(value, |v| loose_eq(v, operand))),
            Comparison::In(operands) => field.is_some_and(|value| {
                any_element(value, |v| operands.iter().any(|operand| loose_eq(v, operand)))
            }),
            Comparison::Gt(operand) => range(field, operand, Ordering::is_gt),
            Comparison::Gte(operand) => range(field, operand, Ordering::is_ge),
            Comparison::Lt(operand) => range(field, operand, Ordering::is_lt),
            Comparison::Lte(operand) => range(field, operand, Ordering::is_le),
        }
    }
}

/// Array fields match when any element does.
fn any_element(value: &Value, test: impl Fn(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => test(value) || items.iter().any(&test),
        _ => test(value),
    }
}

fn range(field: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    field.is_some_and(|value| {
        any_element(value, |v| {
            comparable(v, operand) && accept(compare_values(v, operand))
        })
    })
}

/// Range operators only relate values of the same kind.
fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

/// Equality tolerant of how the operand was coerced from the request
/// (`name=5` still matches a stored `"5"`).
fn loose_eq(stored: &Value, operand: &Value) -> bool {
    if stored == operand {
        return true;
    }
    match (stored, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) => *s == n.to_string(),
        (Value::String(s), Value::Bool(b)) => *s == b.to_string(),
        (Value::String(a), Value::String(b)) => {
            matches!((parse_instant(a), parse_instant(b)), (Some(x), Some(y)) if x == y)
        }
        _ => false,
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    compare_optional(Some(a), Some(b))
}

fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => compare_strings(x, y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Some(Value::Object(x)), Some(Value::Object(y))) => {
            Value::Object(x.clone()).to_string().cmp(&Value::Object(y.clone()).to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Strings that read as instants order chronologically and rank before
/// plain strings; the raw text breaks ties so the order stays total.
fn compare_strings(x: &str, y: &str) -> Ordering {
    let key = |raw: &str| (parse_instant(raw).is_none(), parse_instant(raw));
    key(x).cmp(&key(y)).then_with(|| x.cmp(y))
}

/// Stable multi-key sort; ties keep their incoming order.
pub fn sort_documents(docs: &mut [Value], keys: &[SortKey]) {
    docs.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ordering = compare_optional(lookup(a, &key.field), lookup(b, &key.field));
                match key.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

impl Projection {
    /// Shape one document. Inclusion always keeps the identifier.
    pub fn apply(&self, doc: Value) -> Value {
        let Value::Object(source) = doc else {
            return doc;
        };
        match self {
            Self::Include(fields) => {
                let mut shaped = Map::new();
                if let Some(id) = source.get(ID_FIELD) {
                    shaped.insert(ID_FIELD.to_string(), id.clone());
                }
                for field in fields {
                    copy_path(&source, &mut shaped, field);
                }
                Value::Object(shaped)
            }
            Self::Exclude(fields) => {
                let mut shaped = source;
                for field in fields {
                    remove_path(&mut shaped, field);
                }
                Value::Object(shaped)
            }
        }
    }
}

fn copy_path(source: &Map<String, Value>, target: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            if let Some(value) = source.get(path) {
                target.insert(path.to_string(), value.clone());
            }
        }
        Some((head, rest)) => {
            let Some(Value::Object(inner)) = source.get(head) else {
                return;
            };
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(nested) = entry {
                copy_path(inner, nested, rest);
            }
        }
    }
}

fn remove_path(target: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            target.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = target.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

impl Pagination {
    /// Window a sorted result set. Pages past the end are empty.
    pub fn window<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = usize::try_from(self.skip()).unwrap_or(usize::MAX);
        let take = usize::try_from(self.page_size()).unwrap_or(usize::MAX);
        items.into_iter().skip(skip).take(take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RawParams;
    use crate::QueryDirectives;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn tours() -> Vec<Value> {
        vec![
            json!({"id": "a", "name": "Forest Hiker", "price": 397, "duration": 5, "difficulty": "easy",
                   "ratingsAverage": 4.7, "startLocation": {"address": "Banff"},
                   "startDates": ["2021-04-25T09:00:00Z", "2021-07-20T09:00:00Z"],
                   "createdAt": "2024-01-01T00:00:00Z", "__v": 0}),
            json!({"id": "b", "name": "Sea Explorer", "price": 497, "duration": 7, "difficulty": "medium",
                   "ratingsAverage": 4.8, "startLocation": {"address": "Miami"},
                   "startDates": ["2021-06-19T09:00:00Z"],
                   "createdAt": "2024-02-01T00:00:00Z", "__v": 0}),
            json!({"id": "c", "name": "Snow Adventurer", "price": 997, "duration": 4, "difficulty": "difficult",
                   "ratingsAverage": 4.5, "startLocation": {"address": "Aspen"},
                   "startDates": ["2022-01-05T10:00:00Z"],
                   "createdAt": "2024-03-01T00:00:00Z", "__v": 2}),
        ]
    }

    fn run(query: &str) -> Vec<Value> {
        let directives = QueryDirectives::from_params(&RawParams::from_query_str(query)).unwrap();
        let mut docs: Vec<Value> = tours().into_iter().filter(|d| directives.filter.matches(d)).collect();
        sort_documents(&mut docs, &directives.sort);
        directives
            .pagination
            .window(docs)
            .into_iter()
            .map(|d| directives.projection.apply(d))
            .collect()
    }

    fn ids(docs: &[Value]) -> Vec<&str> {
        docs.iter().filter_map(|d| d["id"].as_str()).collect()
    }

    #[test]
    fn default_sort_is_newest_first_and_hides_version() {
        let docs = run("");
        assert_eq!(ids(&docs), vec!["c", "b", "a"]);
        assert!(docs.iter().all(|d| d.get("__v").is_none()));
    }

    #[test]
    fn equality_and_range_filters_combine() {
        assert_eq!(ids(&run("difficulty=easy&duration[gte]=5")), vec!["a"]);
        assert_eq!(ids(&run("duration[gte]=5&price[lt]=1000&sort=price")), vec!["a", "b"]);
        assert!(run("difficulty=easy&duration[gt]=5").is_empty());
    }

    #[test]
    fn nested_paths_and_in_lists_filter() {
        assert_eq!(ids(&run("startLocation[address]=Miami")), vec!["b"]);
        assert_eq!(ids(&run("difficulty=easy&difficulty=difficult&sort=price")), vec!["a", "c"]);
    }

    #[test]
    fn dates_compare_chronologically_against_array_fields() {
        assert_eq!(ids(&run("startDates[gte]=2021-07-01&sort=price")), vec!["a", "c"]);
    }

    #[test]
    fn multi_key_sort_and_inclusion_projection() {
        let docs = run("sort=-ratingsAverage,price&limit=2&fields=name,price");
        assert_eq!(ids(&docs), vec!["b", "a"]);
        assert_eq!(docs[0], json!({"id": "b", "name": "Sea Explorer", "price": 497}));
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        assert_eq!(ids(&run("limit=2&page=2")), vec!["a"]);
        assert!(run("limit=2&page=9").is_empty());
    }

    #[test]
    fn ne_matches_missing_fields() {
        let filter = Filter::new().ne("secretTour", true);
        assert!(filter.matches(&json!({"name": "x"})));
        assert!(filter.matches(&json!({"secretTour": false})));
        assert!(!filter.matches(&json!({"secretTour": true})));
    }

    #[test]
    fn range_operators_ignore_mismatched_types() {
        let filter = Filter::new().gt("price", 5);
        assert!(!filter.matches(&json!({"price": "cheap"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn type_order_puts_missing_first() {
        let mut docs = vec![json!({"v": "s"}), json!({"v": 1}), json!({}), json!({"v": null})];
        sort_documents(&mut docs, &[SortKey::asc("v")]);
        assert_eq!(docs, vec![json!({}), json!({"v": null}), json!({"v": 1}), json!({"v": "s"})]);
    }

    #[test]
    fn instants_rank_before_plain_strings() {
        let mut docs = vec![
            json!({"v": "2020-12-31T21"}),
            json!({"v": "2021-01-01T00:00:00+05:00"}),
            json!({"v": "2020-12-31T20:00:00Z"}),
            json!({"v": "2020-12-31"}),
        ];
        sort_documents(&mut docs, &[SortKey::asc("v")]);
        let order: Vec<&str> = docs.iter().filter_map(|d| d["v"].as_str()).collect();
        assert_eq!(
            order,
            vec!["2020-12-31", "2021-01-01T00:00:00+05:00", "2020-12-31T20:00:00Z", "2020-12-31T21"]
        );
    }

    fn mixed_string() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z0-9 :T-]{0,12}",
            (2019i32..2022, 1u32..13, 1u32..29, 0u32..24)
                .prop_map(|(y, m, d, h)| format!("{y:04}-{m:02}-{d:02}T{h:02}:00:00Z")),
            (2019i32..2022, 1u32..13, 1u32..29, 0u32..24)
                .prop_map(|(y, m, d, h)| format!("{y:04}-{m:02}-{d:02}T{h:02}:00:00+05:00")),
            (2019i32..2022, 1u32..13, 1u32..29).prop_map(|(y, m, d)| format!("{y:04}-{m:02}-{d:02}")),
            (2019i32..2022, 1u32..13, 1u32..29, 0u32..24)
                .prop_map(|(y, m, d, h)| format!("{y:04}-{m:02}-{d:02}T{h:02}")),
        ]
    }

    proptest! {
        #[test]
        fn string_order_is_transitive(a in mixed_string(), b in mixed_string(), c in mixed_string()) {
            let (a, b, c) = (json!(a), json!(b), json!(c));
            if compare_values(&a, &b).is_le() && compare_values(&b, &c).is_le() {
                prop_assert!(compare_values(&a, &c).is_le());
            }
            prop_assert_eq!(compare_values(&a, &b), compare_values(&b, &a).reverse());
        }

        #[test]
        fn mixed_strings_sort_into_order(values in prop::collection::vec(mixed_string(), 20..120)) {
            let mut docs: Vec<Value> = values.into_iter().map(|v| json!({"review": v})).collect();
            sort_documents(&mut docs, &[SortKey::asc("review")]);
            for pair in docs.windows(2) {
                prop_assert!(compare_values(&pair[0]["review"], &pair[1]["review"]).is_le());
            }
        }
    }

    #[test]
    fn dotted_projection_copies_and_removes_nested_fields() {
        let doc = json!({"id": "a", "startLocation": {"address": "Banff", "description": "Alberta"}});
        let include = Projection::Include(BTreeSet::from(["startLocation.address".to_string()]));
        assert_eq!(include.apply(doc.clone()), json!({"id": "a", "startLocation": {"address": "Banff"}}));

        let exclude = Projection::Exclude(BTreeSet::from(["startLocation.description".to_string()]));
        assert_eq!(exclude.apply(doc), json!({"id": "a", "startLocation": {"address": "Banff"}}));
    }
}
