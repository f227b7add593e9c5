//! GeoJSON points and great-circle computations for the geo endpoints.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use tourbook_core::{DomainError, TourId, Violations};

use crate::tour::Tour;

/// Earth radius used for both the search radius and reported distances.
pub const EARTH_RADIUS_KM: f64 = 6378.1;
pub const EARTH_RADIUS_MI: f64 = 3963.2;

const METERS_TO_MILES: f64 = 0.000621371;
const METERS_TO_KM: f64 = 0.001;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeoKind {
    #[default]
    Point,
}

/// A GeoJSON point; `coordinates` are `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default)]
    pub kind: GeoKind,
    #[serde(default)]
    pub coordinates: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GeoPoint {
    pub fn lat_lng(&self) -> Option<LatLng> {
        match self.coordinates.as_slice() {
            [lng, lat] => Some(LatLng { lat: *lat, lng: *lng }),
            _ => None,
        }
    }

    pub(crate) fn check(&self, v: &mut Violations) {
        v.check(
            !self.coordinates.is_empty() && self.lat_lng().is_none(),
            "Coordinates must be [longitude, latitude]",
        );
    }
}

/// A stop on the itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl FromStr for LatLng {
    type Err = DomainError;

    /// `"34.111745,-118.113491"`: latitude first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation("Please provide latitude and longitude in the format lat,lng.");
        let (lat, lng) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(invalid());
        }
        Ok(Self { lat, lng })
    }
}

impl LatLng {
    /// Central angle to `other` in radians (haversine).
    pub fn angle_to(&self, other: &LatLng) -> f64 {
        let (phi1, phi2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lng - self.lng).to_radians();
        let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        2.0 * h.sqrt().min(1.0).asin()
    }

    pub fn meters_to(&self, other: &LatLng) -> f64 {
        self.angle_to(other) * EARTH_RADIUS_KM * 1000.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl FromStr for DistanceUnit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mi" => Ok(Self::Miles),
            "km" => Ok(Self::Kilometers),
            other => Err(DomainError::validation(format!("Unit must be 'mi' or 'km' (got '{other}')"))),
        }
    }
}

impl DistanceUnit {
    pub fn earth_radius(&self) -> f64 {
        match self {
            Self::Miles => EARTH_RADIUS_MI,
            Self::Kilometers => EARTH_RADIUS_KM,
        }
    }

    pub fn from_meters(&self, meters: f64) -> f64 {
        match self {
            Self::Miles => meters * METERS_TO_MILES,
            Self::Kilometers => meters * METERS_TO_KM,
        }
    }
}

/// Tours whose start location lies within `distance` of `center`.
pub fn within_radius<'a>(
    tours: impl IntoIterator<Item = &'a Tour>,
    center: LatLng,
    distance: f64,
    unit: DistanceUnit,
) -> Vec<&'a Tour> {
    let radius = distance / unit.earth_radius();
    tours
        .into_iter()
        .filter(|tour| {
            tour.start_location
                .as_ref()
                .and_then(GeoPoint::lat_lng)
                .is_some_and(|start| center.angle_to(&start) <= radius)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourDistance {
    pub id: TourId,
    pub name: String,
    pub distance: f64,
}

/// Distance from `center` to every tour with a start location, nearest first.
pub fn distances_from<'a>(
    tours: impl IntoIterator<Item = &'a Tour>,
    center: LatLng,
    unit: DistanceUnit,
) -> Vec<TourDistance> {
    let mut out: Vec<TourDistance> = tours
        .into_iter()
        .filter_map(|tour| {
            let start = tour.start_location.as_ref()?.lat_lng()?;
            Some(TourDistance {
                id: tour.id,
                name: tour.name.clone(),
                distance: unit.from_meters(center.meters_to(&start)),
            })
        })
        .collect();
    out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    out
}
