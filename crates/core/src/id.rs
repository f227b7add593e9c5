//! Document identifiers.
//!
//! Every stored document is keyed by a UUIDv7, so ids sort by creation time.
//! On the wire an id is its hyphenated string form.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! document_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// A fresh time-ordered id.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        /// Documents decoded without an `id` get a fresh one.
        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            /// Malformed ids are caller errors: `Invalid tour id: abc`.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<Uuid>()
                    .map(Self)
                    .map_err(|_| DomainError::invalid_id(format!("Invalid {}: {}", $label, s)))
            }
        }
    };
}

document_id!(
    /// Identifier of a tour.
    TourId,
    "tour id"
);
document_id!(
    /// Identifier of a user account.
    UserId,
    "user id"
);
document_id!(ReviewId, "review id");
document_id!(BookingId, "booking id");
