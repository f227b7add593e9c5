//! The capability set every stored entity provides.

use core::fmt::{Debug, Display};
use core::hash::Hash;
use core::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DomainError, DomainResult};

pub use tourbook_query::{Filter, ID_FIELD, VERSION_FIELD};

/// A field (or field combination) whose value must not repeat within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
    pub field: String,
    pub value: String,
}

impl UniqueKey {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// A key spanning several fields, e.g. one review per `(tour, user)`.
    pub fn compound(parts: &[(&str, String)]) -> Self {
        let field = parts.iter().map(|(f, _)| *f).collect::<Vec<_>>().join(", ");
        let value = parts.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>().join(", ");
        Self { field, value }
    }

    pub fn into_error(self) -> DomainError {
        DomainError::duplicate(self.field, self.value)
    }
}

/// A record with a unique identifier that the generic handlers and entity
/// stores can manage.
///
/// The serialized form is the stored document: camelCase fields, `id`
/// and `createdAt` assigned by serde defaults on creation.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Debug + Display + FromStr<Err = DomainError> + Send + Sync + 'static;

    /// Collection (table) name.
    const COLLECTION: &'static str;

    /// Fields stored but never returned by the API.
    const HIDDEN_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> Self::Id;

    /// Recompute derived fields (slug, rounding, normalization) before validation.
    fn prepare(&mut self) {}

    fn validate(&self) -> DomainResult<()> {
        Ok(())
    }

    /// Values that must be unique across the collection.
    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }

    /// Filter applied to every read; hides soft-deleted or secret records.
    fn base_filter() -> Filter {
        Filter::new()
    }

    /// Parse a path identifier into this resource's id type.
    fn parse_id(raw: &str) -> DomainResult<Self::Id> {
        raw.parse()
    }
}
