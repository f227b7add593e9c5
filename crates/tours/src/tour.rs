use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tourbook_core::{DomainResult, Resource, TourId, UniqueKey, UserId, Violations, slugify};
use tourbook_query::Filter;

use crate::geo::{GeoPoint, Location};

pub const NAME_MIN_CHARS: usize = 10;
pub const NAME_MAX_CHARS: usize = 40;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }
}

/// A bookable tour.
///
/// Required numeric fields are optional at the type level so a missing value
/// surfaces as a validation message rather than a decoding failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    #[serde(default)]
    pub id: TourId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_group_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub guides: Vec<UserId>,
    /// Derived from `duration`; recomputed on every write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_weeks: Option<f64>,
}

/// Round to one decimal place, halves away from zero.
pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Tour {
    /// Price before discount, zero when unset.
    pub fn price_or_zero(&self) -> f64 {
        self.price.unwrap_or(0.0)
    }
}

impl Resource for Tour {
    type Id = TourId;

    const COLLECTION: &'static str = "tours";

    fn id(&self) -> TourId {
        self.id
    }

    fn prepare(&mut self) {
        self.name = self.name.trim().to_string();
        self.slug = slugify(&self.name);
        self.summary = self.summary.trim().to_string();
        self.description = self
            .description
            .take()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.ratings_average = round_rating(self.ratings_average);
        self.duration_weeks = self.duration.map(|days| f64::from(days) / 7.0);
    }

    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        let name_chars = self.name.chars().count();

        v.check(self.name.is_empty(), "A tour must have a name");
        v.check(
            name_chars > NAME_MAX_CHARS,
            format!("A tour name must have at most {NAME_MAX_CHARS} characters"),
        );
        v.check(
            !self.name.is_empty() && name_chars < NAME_MIN_CHARS,
            format!("A tour name must have at least {NAME_MIN_CHARS} characters"),
        );

        match self.duration {
            None => v.push("A tour must have a duration"),
            Some(0) => v.push("Duration must be positive"),
            Some(_) => {}
        }
        match self.max_group_size {
            None => v.push("A tour must have a group size"),
            Some(0) => v.push("Group size must be positive"),
            Some(_) => {}
        }
        v.check(self.difficulty.is_none(), "A tour must have a difficulty");

        v.check(self.ratings_average < 0.0, "Rating must be above 0");
        v.check(self.ratings_average > 5.0, "Rating must be below 5.0");

        match self.price {
            None => v.push("A tour must have a price"),
            Some(price) if price < 0.0 => v.push("Price must not be negative"),
            Some(_) => {}
        }
        if let (Some(discount), Some(price)) = (self.price_discount, self.price) {
            v.check(
                discount >= price,
                format!("Discount price ({discount}) should be below the regular price"),
            );
        }

        v.check(self.summary.is_empty(), "A tour must have a summary");
        v.check(self.image_cover.trim().is_empty(), "A tour must have a cover image");

        if let Some(start) = &self.start_location {
            start.check(&mut v);
        }
        for location in &self.locations {
            location.point.check(&mut v);
        }

        v.into_result()
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new("name", self.name.clone())]
    }

    fn base_filter() -> Filter {
        Filter::new().ne("secretTour", true)
    }
}
