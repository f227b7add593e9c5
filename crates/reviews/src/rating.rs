//! Aggregate rating of a tour, recomputed from its reviews on every review write.

use serde::Serialize;

use crate::review::Review;

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    /// Number of reviews, rated or not.
    pub ratings_quantity: u64,
    /// Mean of the present ratings, one decimal; 0 when none.
    pub ratings_average: f64,
}

impl RatingSummary {
    pub fn from_reviews<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> Self {
        let mut quantity = 0u64;
        let mut rated = 0u64;
        let mut total = 0.0;
        for review in reviews {
            quantity += 1;
            if let Some(rating) = review.rating {
                rated += 1;
                total += rating;
            }
        }

        let average = if rated == 0 { 0.0 } else { total / rated as f64 };
        Self {
            ratings_quantity: quantity,
            ratings_average: (average * 10.0).round() / 10.0,
        }
    }
}
