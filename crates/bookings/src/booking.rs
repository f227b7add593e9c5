use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tourbook_core::{BookingId, DomainResult, Resource, TourId, UserId, Violations};

/// A user's booking of a tour at the price paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(default)]
    pub id: BookingId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour: Option<TourId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_paid")]
    pub paid: bool,
}

fn default_paid() -> bool {
    true
}

impl Booking {
    /// A paid booking, as recorded after a completed checkout.
    pub fn paid(tour: TourId, user: UserId, price: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: BookingId::new(),
            tour: Some(tour),
            user: Some(user),
            price: Some(price),
            created_at: now,
            paid: true,
        }
    }
}

impl Resource for Booking {
    type Id = BookingId;

    const COLLECTION: &'static str = "bookings";

    fn id(&self) -> BookingId {
        self.id
    }

    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(self.tour.is_none(), "Booking must belong to a tour");
        v.check(self.user.is_none(), "Booking must belong to a user");
        match self.price {
            None => v.push("Booking must have a price"),
            Some(price) => v.check(price < 0.0, "Price must not be negative"),
        }
        v.into_result()
    }
}
