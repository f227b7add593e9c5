//! `tourbook-reviews`: tour reviews and the rating summary they feed.

pub mod rating;
pub mod review;

pub use rating::RatingSummary;
pub use review::Review;
