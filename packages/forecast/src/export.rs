//! Prediction tables handed to the dashboard.

use std::collections::BTreeMap;

use burglary_map_crime_models::YearMonth;
use burglary_map_geography_models::{AreaWardMapping, Ward};
use serde::Serialize;

/// Clips a regression output to a non-negative whole count, rounding half
/// away from zero. Non-finite values become 0.
#[must_use]
pub fn clip_round(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = value.round().min(f64::from(u32::MAX)) as u32;
    count
}

/// Next-month forecast of one area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionRow {
    pub lsoa_code: String,
    pub year_month: YearMonth,
    pub predicted_burglary: u32,
}

/// [`PredictionRow`] with the count min-max scaled to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPredictionRow {
    pub lsoa_code: String,
    pub year_month: YearMonth,
    pub predicted_burglary: u32,
    pub predicted_burglary_norm: f64,
}

/// Next-month forecast summed over a ward's areas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WardPredictionRow {
    pub ward_code: String,
    pub ward_name: Option<String>,
    pub year_month: YearMonth,
    pub predicted_burglary: u64,
}

/// Raw model output against the observed count, for the test split.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestPredictionRow {
    pub lsoa_code: String,
    pub year_month: YearMonth,
    pub burglary_count: u32,
    pub pred: f64,
}

/// Min-max normalizes the predicted counts. When every count is equal the
/// normalized value is 0.
#[must_use]
pub fn normalize(rows: &[PredictionRow]) -> Vec<NormalizedPredictionRow> {
    let min = rows.iter().map(|r| r.predicted_burglary).min().unwrap_or(0);
    let max = rows.iter().map(|r| r.predicted_burglary).max().unwrap_or(0);
    let range = f64::from(max - min);

    rows.iter()
        .map(|row| NormalizedPredictionRow {
            lsoa_code: row.lsoa_code.clone(),
            year_month: row.year_month,
            predicted_burglary: row.predicted_burglary,
            predicted_burglary_norm: if max == min {
                0.0
            } else {
                f64::from(row.predicted_burglary - min) / range
            },
        })
        .collect()
}

/// Ward totals plus the areas that had no ward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WardPredictions {
    /// Sorted by ward, then month.
    pub rows: Vec<WardPredictionRow>,
    pub unmapped_areas: Vec<String>,
}

/// Sums area forecasts per ward.
#[must_use]
pub fn ward_predictions(rows: &[PredictionRow], mapping: &AreaWardMapping) -> WardPredictions {
    let mut totals: BTreeMap<(&str, YearMonth), (&Ward, u64)> = BTreeMap::new();
    let mut unmapped_areas = Vec::new();
    for row in rows {
        match mapping.ward_for(&row.lsoa_code) {
            Some(ward) => {
                totals
                    .entry((ward.code.as_str(), row.year_month))
                    .or_insert((ward, 0))
                    .1 += u64::from(row.predicted_burglary);
            }
            None => unmapped_areas.push(row.lsoa_code.clone()),
        }
    }

    if !unmapped_areas.is_empty() {
        log::warn!(
            "{} forecast areas have no ward and are excluded from ward totals",
            unmapped_areas.len()
        );
    }

    WardPredictions {
        rows: totals
            .into_iter()
            .map(|((_, year_month), (ward, predicted_burglary))| WardPredictionRow {
                ward_code: ward.code.clone(),
                ward_name: ward.name.clone(),
                year_month,
                predicted_burglary,
            })
            .collect(),
        unmapped_areas,
    }
}
