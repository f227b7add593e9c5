use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use tourbook_core::Resource;
use tourbook_query::{Filter, QueryHandle};

use super::{
    DocumentQuery, EntityStore, StoreError, admit, decode_input, ensure_unique, merge_patch, to_document,
    visible,
};

#[derive(Debug, Clone)]
struct Stored<T> {
    /// Insertion order; storage order for unsorted reads.
    seq: u64,
    version: u64,
    entity: T,
}

#[derive(Debug)]
struct Inner<T: Resource> {
    next_seq: u64,
    records: HashMap<T::Id, Stored<T>>,
}

impl<T: Resource> Inner<T> {
    fn ordered(&self) -> Vec<&Stored<T>> {
        let mut records: Vec<&Stored<T>> = self.records.values().collect();
        records.sort_by_key(|stored| stored.seq);
        records
    }

    fn entities(&self) -> impl Iterator<Item = &T> {
        self.records.values().map(|stored| &stored.entity)
    }

    fn get_visible(&self, id: &T::Id) -> Result<Option<&Stored<T>>, StoreError> {
        match self.records.get(id) {
            Some(stored) if visible(&stored.entity)? => Ok(Some(stored)),
            _ => Ok(None),
        }
    }
}

/// In-memory entity store for tests/dev.
///
/// Each operation takes the lock once, so every call is atomic.
#[derive(Debug)]
pub struct InMemoryEntityStore<T: Resource> {
    inner: RwLock<Inner<T>>,
}

impl<T: Resource> InMemoryEntityStore<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_seq: 0,
                records: HashMap::new(),
            }),
        }
    }

    /// Number of stored records, hidden ones included.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Resource> Default for InMemoryEntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Resource> EntityStore<T> for InMemoryEntityStore<T> {
    async fn find(&self, query: DocumentQuery) -> Result<Vec<Value>, StoreError> {
        let query = query.filter(T::base_filter());
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        let docs = inner
            .ordered()
            .into_iter()
            .map(|stored| to_document(&stored.entity, stored.version))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(query.evaluate(docs))
    }

    async fn find_entities(&self, filter: Filter) -> Result<Vec<T>, StoreError> {
        let filter = T::base_filter().merge(filter);
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        let mut out = Vec::new();
        for stored in inner.ordered() {
            if filter.matches(&to_document(&stored.entity, stored.version)?) {
                out.push(stored.entity.clone());
            }
        }
        Ok(out)
    }

    async fn find_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(inner.get_visible(&id)?.map(|stored| stored.entity.clone()))
    }

    async fn insert(&self, entity: T) -> Result<T, StoreError> {
        let entity = admit(entity)?;
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if inner.records.contains_key(&entity.id()) {
            return Err(StoreError::Corrupt(format!(
                "{} id {} already exists",
                T::COLLECTION,
                entity.id()
            )));
        }
        ensure_unique(&entity, inner.entities())?;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.records.insert(
            entity.id(),
            Stored {
                seq,
                version: 0,
                entity: entity.clone(),
            },
        );
        tracing::debug!(collection = T::COLLECTION, id = %entity.id(), "inserted");
        Ok(entity)
    }

    async fn save(&self, entity: T) -> Result<Option<T>, StoreError> {
        let entity = admit(entity)?;
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if inner.get_visible(&entity.id())?.is_none() {
            return Ok(None);
        }
        ensure_unique(&entity, inner.entities())?;

        let Some(stored) = inner.records.get_mut(&entity.id()) else {
            return Ok(None);
        };
        stored.version += 1;
        stored.entity = entity.clone();
        Ok(Some(entity))
    }

    async fn update_by_id(&self, id: T::Id, patch: Value) -> Result<Option<T>, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let Some(current) = inner.get_visible(&id)? else {
            return Ok(None);
        };

        let merged = merge_patch(to_document(&current.entity, current.version)?, patch)?;
        let updated = admit(decode_input::<T>(merged)?)?;
        ensure_unique(&updated, inner.entities())?;

        let Some(stored) = inner.records.get_mut(&id) else {
            return Ok(None);
        };
        stored.version += 1;
        stored.entity = updated.clone();
        tracing::debug!(collection = T::COLLECTION, id = %id, version = stored.version, "updated");
        Ok(Some(updated))
    }

    async fn delete_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if inner.get_visible(&id)?.is_none() {
            return Ok(None);
        }
        Ok(inner.records.remove(&id).map(|stored| stored.entity))
    }
}
