//! `tourbook-tours`: the tour catalogue.
//!
//! The `Tour` entity with its validation and derived fields, plus the pure
//! computations behind the reporting and geo endpoints.

pub mod geo;
pub mod stats;
pub mod tour;

pub use geo::{DistanceUnit, GeoKind, GeoPoint, LatLng, Location, TourDistance, distances_from, within_radius};
pub use stats::{MonthlyPlanEntry, TourStats, monthly_plan, tour_stats};
pub use tour::{Difficulty, Tour};
