//! Catalogue reports: per-difficulty statistics and the monthly start plan.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;

use crate::tour::{Difficulty, Tour};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TourStats {
    /// Upper-cased difficulty (`"EASY"`).
    pub difficulty: String,
    pub num_tours: u64,
    pub num_ratings: u64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Group tours by difficulty, cheapest group (by average price) first.
pub fn tour_stats<'a>(tours: impl IntoIterator<Item = &'a Tour>) -> Vec<TourStats> {
    let mut groups: BTreeMap<&'static str, Vec<&Tour>> = BTreeMap::new();
    for tour in tours {
        let key = tour.difficulty.as_ref().map_or("", Difficulty::as_str);
        groups.entry(key).or_default().push(tour);
    }

    let mut stats: Vec<TourStats> = groups
        .into_iter()
        .map(|(difficulty, members)| {
            let count = members.len() as f64;
            let prices: Vec<f64> = members.iter().map(|t| t.price_or_zero()).collect();
            TourStats {
                difficulty: difficulty.to_uppercase(),
                num_tours: members.len() as u64,
                num_ratings: members.iter().map(|t| t.ratings_quantity).sum(),
                avg_rating: members.iter().map(|t| t.ratings_average).sum::<f64>() / count,
                avg_price: prices.iter().sum::<f64>() / count,
                min_price: prices.iter().copied().fold(f64::INFINITY, f64::min),
                max_price: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect();

    stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    stats
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlanEntry {
    /// 1 = January.
    pub month: u32,
    pub num_tour_starts: u64,
    pub tours: Vec<String>,
}

/// For each month of `year`, how many tour starts fall in it and which
/// tours they are. Busiest month first; ties by calendar order.
pub fn monthly_plan<'a>(tours: impl IntoIterator<Item = &'a Tour>, year: i32) -> Vec<MonthlyPlanEntry> {
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for tour in tours {
        for start in tour.start_dates.iter().filter(|d| d.year() == year) {
            months.entry(start.month()).or_default().push(tour.name.clone());
        }
    }

    let mut plan: Vec<MonthlyPlanEntry> = months
        .into_iter()
        .map(|(month, tours)| MonthlyPlanEntry {
            month,
            num_tour_starts: tours.len() as u64,
            tours,
        })
        .collect();

    // Stable sort keeps calendar order among equal counts.
    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts));
    plan
}
