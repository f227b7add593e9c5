use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tourbook_core::{DomainResult, Resource, ReviewId, TourId, UniqueKey, UserId, Violations};

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

/// A user's review of a tour. One review per `(tour, user)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default)]
    pub id: ReviewId,
    #[serde(default)]
    pub review: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour: Option<TourId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
}

impl Resource for Review {
    type Id = ReviewId;

    const COLLECTION: &'static str = "reviews";

    fn id(&self) -> ReviewId {
        self.id
    }

    fn prepare(&mut self) {
        self.review = self.review.trim().to_string();
    }

    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(self.review.is_empty(), "Review cannot be empty");
        if let Some(rating) = self.rating {
            v.check(rating < MIN_RATING, "Rating must be above 0");
            v.check(rating > MAX_RATING, "Rating must be below 5.0");
        }
        v.check(self.tour.is_none(), "Review must belong to a tour");
        v.check(self.user.is_none(), "Review must belong to a user");
        v.into_result()
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        match (self.tour, self.user) {
            (Some(tour), Some(user)) => vec![UniqueKey::compound(&[
                ("tour", tour.to_string()),
                ("user", user.to_string()),
            ])],
            _ => Vec::new(),
        }
    }
}
