//! Raw request parameters as the query string delivers them.
//!
//! Bracketed keys nest (`duration[gte]=5` → `{duration: {gte: "5"}}`) and
//! repeated keys accumulate (`difficulty=easy&difficulty=medium` → a list).

use std::collections::BTreeMap;

/// One parameter value: a string, a list of strings, or a nested map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
    Nested(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// The last scalar value given for this parameter.
    ///
    /// Repeated scalar parameters resolve to the last occurrence; nested maps
    /// have no scalar value.
    pub fn last(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Many(values) => values.last().map(String::as_str),
            Self::Nested(_) => None,
        }
    }

    fn merge(self, other: ParamValue) -> ParamValue {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => Self::Many(vec![a, b]),
            (Self::Many(mut a), Self::Single(b)) => {
                a.push(b);
                Self::Many(a)
            }
            (Self::Single(a), Self::Many(b)) => {
                Self::Many(std::iter::once(a).chain(b).collect())
            }
            (Self::Many(mut a), Self::Many(b)) => {
                a.extend(b);
                Self::Many(a)
            }
            (Self::Nested(mut a), Self::Nested(b)) => {
                for (key, value) in b {
                    insert_merged(&mut a, key, value);
                }
                Self::Nested(a)
            }
            // Shape conflict (`price=5&price[gte]=3`): the later occurrence wins.
            (_, other) => other,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

/// Mapping from parameter name to value, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams(BTreeMap<String, ParamValue>);

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query string.
    pub fn from_query_str(query: &str) -> Self {
        let mut params = Self::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.push(&key, value.into_owned());
        }
        params
    }

    /// Add one `key=value` pair, honouring bracket nesting and repetition.
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        let (name, path) = split_key(key);
        if name.is_empty() && path.is_empty() {
            return;
        }
        let leaf = path
            .into_iter()
            .rev()
            .fold(ParamValue::Single(value.into()), |acc, segment| {
                ParamValue::Nested(BTreeMap::from([(segment, acc)]))
            });
        insert_merged(&mut self.0, name, leaf);
    }

    /// Replace any existing value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Scalar value of `key`, last occurrence winning.
    pub fn get_last(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(ParamValue::last)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawParams
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.push(key.as_ref(), value);
        }
        params
    }
}

fn insert_merged(map: &mut BTreeMap<String, ParamValue>, key: String, value: ParamValue) {
    let merged = match map.remove(&key) {
        Some(existing) => existing.merge(value),
        None => value,
    };
    map.insert(key, merged);
}

/// `a[b][c]` → (`a`, [`b`, `c`]); `a[]` → (`a`, []); anything malformed is a plain key.
fn split_key(key: &str) -> (String, Vec<String>) {
    match key.find('[') {
        Some(open) if key.ends_with(']') => {
            let name = key[..open].to_string();
            let inner = &key[open + 1..key.len() - 1];
            let path = inner
                .split("][")
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect();
            (name, path)
        }
        _ => (key.to_string(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracketed_operators_into_nested_maps() {
        let params = RawParams::from_query_str("duration[gte]=5&duration[lt]=10&difficulty=easy");

        let expected = ParamValue::Nested(BTreeMap::from([
            ("gte".to_string(), ParamValue::from("5")),
            ("lt".to_string(), ParamValue::from("10")),
        ]));
        assert_eq!(params.get("duration"), Some(&expected));
        assert_eq!(params.get_last("difficulty"), Some("easy"));
    }

    #[test]
    fn repeated_keys_accumulate_and_last_wins_for_scalars() {
        let params = RawParams::from_query_str("sort=price&sort=-price&difficulty=easy&difficulty[]=medium");

        assert_eq!(
            params.get("sort"),
            Some(&ParamValue::Many(vec!["price".into(), "-price".into()]))
        );
        assert_eq!(params.get_last("sort"), Some("-price"));
        assert_eq!(
            params.get("difficulty"),
            Some(&ParamValue::Many(vec!["easy".into(), "medium".into()]))
        );
    }

    #[test]
    fn decodes_percent_and_plus() {
        let params = RawParams::from_query_str("name=The+Forest%20Hiker&fields=name%2Cprice");
        assert_eq!(params.get_last("name"), Some("The Forest Hiker"));
        assert_eq!(params.get_last("fields"), Some("name,price"));
    }

    #[test]
    fn malformed_brackets_are_plain_keys() {
        let params = RawParams::from_query_str("a[b=1&=2");
        assert_eq!(params.get_last("a[b"), Some("1"));
        assert_eq!(params.iter().count(), 1);
    }

    #[test]
    fn set_replaces_existing_values() {
        let mut params = RawParams::from_query_str("limit=50&limit=60");
        params.set("limit", "5");
        assert_eq!(params.get("limit"), Some(&ParamValue::from("5")));
    }
}
