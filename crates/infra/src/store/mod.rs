//! Entity storage behind a uniform CRUD contract.
//!
//! Stores keep each entity as a JSON document (its serde form plus the
//! `__v` version field) and evaluate list queries with the Query Modifier's
//! document semantics.

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};

use tourbook_core::{DomainError, ID_FIELD, Resource, VERSION_FIELD};
use tourbook_query::eval::sort_documents;
use tourbook_query::{Filter, Projection, QueryHandle, SortKey};

pub use error::StoreError;
pub use memory::InMemoryEntityStore;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresEntityStore, ensure_schema};

/// Fields a client patch can never overwrite.
const IMMUTABLE_FIELDS: [&str; 3] = [ID_FIELD, VERSION_FIELD, "createdAt"];

/// A deferred list query over one collection.
///
/// Built up through [`QueryHandle`] and executed by [`EntityStore::find`].
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    filter: Filter,
    sort: Vec<SortKey>,
    projection: Option<Projection>,
    skip: u64,
    limit: Option<u64>,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentQuery {
    /// Everything, in storage order, unshaped.
    pub fn new() -> Self {
        Self {
            filter: Filter::new(),
            sort: Vec::new(),
            projection: None,
            skip: 0,
            limit: None,
        }
    }

    pub fn matching(filter: Filter) -> Self {
        Self::new().filter(filter)
    }

    pub fn filter_ref(&self) -> &Filter {
        &self.filter
    }

    /// Run the query over documents given in storage order.
    pub fn evaluate(&self, docs: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut matched: Vec<Value> = docs.into_iter().filter(|doc| self.filter.matches(doc)).collect();
        sort_documents(&mut matched, &self.sort);

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let take = self
            .limit
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(usize::MAX);

        matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|doc| match &self.projection {
                Some(projection) => projection.apply(doc),
                None => doc,
            })
            .collect()
    }
}

impl QueryHandle for DocumentQuery {
    fn filter(mut self, filter: Filter) -> Self {
        self.filter = self.filter.merge(filter);
        self
    }

    fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    fn skip(mut self, count: u64) -> Self {
        self.skip = count;
        self
    }

    fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }
}

/// Persistence for one entity type.
///
/// Every read applies [`Resource::base_filter`]; records it hides are
/// invisible to lookups, updates and deletes alike. Writes run
/// [`Resource::prepare`] and [`Resource::validate`] and enforce
/// [`Resource::unique_keys`] across the whole collection.
#[async_trait]
pub trait EntityStore<T: Resource>: Send + Sync {
    /// Matching documents, shaped by the query.
    async fn find(&self, query: DocumentQuery) -> Result<Vec<Value>, StoreError>;

    /// Matching entities in storage order.
    async fn find_entities(&self, filter: Filter) -> Result<Vec<T>, StoreError>;

    async fn find_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError>;

    async fn insert(&self, entity: T) -> Result<T, StoreError>;

    /// Replace a stored entity with `entity`; `None` when it is not visible.
    async fn save(&self, entity: T) -> Result<Option<T>, StoreError>;

    /// Merge a JSON patch onto the stored document and re-validate.
    async fn update_by_id(&self, id: T::Id, patch: Value) -> Result<Option<T>, StoreError>;

    async fn delete_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError>;

    async fn find_one(&self, filter: Filter) -> Result<Option<T>, StoreError> {
        Ok(self.find_entities(filter).await?.into_iter().next())
    }
}

/// The stored document of `entity` at `version`.
pub fn to_document<T: Resource>(entity: &T, version: u64) -> Result<Value, StoreError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(mut fields)) => {
            fields.insert(VERSION_FIELD.to_string(), Value::from(version));
            Ok(Value::Object(fields))
        }
        Ok(other) => Err(StoreError::Corrupt(format!(
            "{} serialized to a non-object: {other}",
            T::COLLECTION
        ))),
        Err(e) => Err(StoreError::Corrupt(e.to_string())),
    }
}

/// Decode client-supplied JSON into an entity; shape errors are validation failures.
pub fn decode_input<T: Resource>(doc: Value) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|e| DomainError::validation(e.to_string()).into())
}

pub(crate) fn decode_stored<T: Resource>(doc: Value) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Corrupt(format!("{}: {e}", T::COLLECTION)))
}

/// Overlay `patch` onto `doc`. `null` clears a field; identity and
/// bookkeeping fields are ignored.
pub fn merge_patch(doc: Value, patch: Value) -> Result<Value, StoreError> {
    let Value::Object(patch) = patch else {
        return Err(DomainError::validation("Update body must be a JSON object").into());
    };
    let mut fields = match doc {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    for (key, value) in patch {
        if IMMUTABLE_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if value.is_null() {
            fields.remove(&key);
        } else {
            fields.insert(key, value);
        }
    }
    Ok(Value::Object(fields))
}

/// Run derived-field preparation and validation before a write.
pub(crate) fn admit<T: Resource>(mut entity: T) -> Result<T, StoreError> {
    entity.prepare();
    entity.validate()?;
    Ok(entity)
}

/// Reject `candidate` when another entity already holds one of its unique values.
pub(crate) fn ensure_unique<'a, T: Resource>(
    candidate: &T,
    others: impl IntoIterator<Item = &'a T>,
) -> Result<(), StoreError> {
    let keys = candidate.unique_keys();
    if keys.is_empty() {
        return Ok(());
    }
    let id = candidate.id();
    for other in others.into_iter().filter(|other| other.id() != id) {
        let taken = other.unique_keys();
        if let Some(key) = keys.iter().find(|key| taken.contains(key)) {
            return Err(key.clone().into_error().into());
        }
    }
    Ok(())
}

/// True when `entity` passes its type's base filter.
pub(crate) fn visible<T: Resource>(entity: &T) -> Result<bool, StoreError> {
    Ok(T::base_filter().matches(&to_document(entity, 0)?))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tourbook_core::{DomainResult, TourId, UniqueKey, Violations};

    /// Minimal entity used to exercise the stores.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(crate) struct Widget {
        #[serde(default)]
        pub id: TourId,
        #[serde(default)]
        pub name: String,
        #[serde(default)]
        pub slug: String,
        #[serde(default)]
        pub price: i64,
        #[serde(default)]
        pub hidden: bool,
    }

    impl Resource for Widget {
        type Id = TourId;
        const COLLECTION: &'static str = "widgets";

        fn id(&self) -> TourId {
            self.id
        }

        fn prepare(&mut self) {
            self.slug = tourbook_core::slugify(&self.name);
        }

        fn validate(&self) -> DomainResult<()> {
            let mut v = Violations::new();
            v.check(self.name.is_empty(), "A widget must have a name");
            v.check(self.price < 0, "Price must not be negative");
            v.into_result()
        }

        fn unique_keys(&self) -> Vec<UniqueKey> {
            vec![UniqueKey::new("name", self.name.clone())]
        }

        fn base_filter() -> Filter {
            Filter::new().ne("hidden", true)
        }
    }

    pub(crate) fn widget(name: &str, price: i64) -> Widget {
        Widget {
            id: TourId::new(),
            name: name.to_string(),
            slug: String::new(),
            price,
            hidden: false,
        }
    }

    #[test]
    fn patches_skip_identity_and_clear_nulls() {
        let doc = json!({"id": "a", "__v": 3, "name": "x", "price": 5, "note": "n"});
        let merged = merge_patch(doc, json!({"id": "b", "__v": 0, "price": 7, "note": null})).unwrap();
        assert_eq!(merged, json!({"id": "a", "__v": 3, "name": "x", "price": 7}));

        assert!(matches!(
            merge_patch(json!({}), json!([1, 2])),
            Err(StoreError::Domain(DomainError::Validation(_)))
        ));
    }

    #[test]
    fn documents_carry_the_version() {
        let doc = to_document(&widget("Anvil", 3), 2).unwrap();
        assert_eq!(doc["__v"], 2);
        assert_eq!(doc["name"], "Anvil");
    }

    #[test]
    fn queries_filter_sort_window_and_project() {
        let docs = vec![
            json!({"id": "1", "name": "a", "price": 30}),
            json!({"id": "2", "name": "b", "price": 10}),
            json!({"id": "3", "name": "c", "price": 20}),
            json!({"id": "4", "name": "d", "price": 40}),
        ];
        let query = DocumentQuery::matching(Filter::new().gt("price", 10))
            .sort(vec![SortKey::desc("price")])
            .skip(1)
            .limit(1)
            .select(Projection::Include(["name".to_string()].into()));

        assert_eq!(query.evaluate(docs), vec![json!({"id": "1", "name": "a"})]);
    }

    #[test]
    fn unique_values_conflict_only_with_other_records() {
        let a = widget("Anvil", 1);
        let mut same = a.clone();
        same.price = 2;
        assert!(ensure_unique(&same, [&a]).is_ok());

        let b = widget("Anvil", 1);
        let err = ensure_unique(&b, [&a]).unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Duplicate { .. })));
    }
}
