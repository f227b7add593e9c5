//! `tourbook-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, the `Resource` capability trait shared
//! by every stored entity, and slug derivation.

pub mod error;
pub mod id;
pub mod resource;
pub mod slug;

pub use error::{DomainError, DomainResult, Violations};
pub use id::{BookingId, ReviewId, TourId, UserId};
pub use resource::{ID_FIELD, Resource, UniqueKey, VERSION_FIELD};
pub use slug::{is_valid_slug, slugify};
