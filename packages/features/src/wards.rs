//! Ward-level monthly totals.

use std::collections::BTreeMap;

use burglary_map_crime_models::YearMonth;
use burglary_map_geography_models::{AreaWardMapping, Ward};
use serde::Serialize;

use crate::grid::MonthlyGrid;

/// Monthly counts summed over every mapped area of one ward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WardMonthCount {
    pub ward_code: String,
    pub ward_name: Option<String>,
    pub month: YearMonth,
    pub burglary_count: u64,
    pub crime_count: u64,
}

/// Ward totals plus the areas that could not contribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WardCounts {
    /// Sorted by ward, then month.
    pub rows: Vec<WardMonthCount>,
    /// Grid areas with no ward in the mapping.
    pub skipped_areas: Vec<String>,
}

/// Sums grid cells per (ward, month). Areas the mapping does not assign
/// are skipped and listed in the result.
#[must_use]
pub fn ward_month_counts(grid: &MonthlyGrid, mapping: &AreaWardMapping) -> WardCounts {
    let mut wards: BTreeMap<&str, &Ward> = BTreeMap::new();
    let mut totals: BTreeMap<(&str, YearMonth), (u64, u64)> = BTreeMap::new();
    let mut skipped_areas = Vec::new();

    for cells in grid.area_series() {
        let Some(first) = cells.first() else {
            continue;
        };
        let Some(ward) = mapping.ward_for(&first.lsoa_code) else {
            skipped_areas.push(first.lsoa_code.clone());
            continue;
        };
        wards.insert(&ward.code, ward);
        for cell in cells {
            let entry = totals.entry((ward.code.as_str(), cell.month)).or_default();
            entry.0 += u64::from(cell.burglary_count);
            entry.1 += u64::from(cell.crime_count);
        }
    }

    if !skipped_areas.is_empty() {
        log::warn!(
            "{} areas have no ward and are excluded from ward totals",
            skipped_areas.len()
        );
    }

    let rows = totals
        .into_iter()
        .map(|((ward_code, month), (burglary_count, crime_count))| WardMonthCount {
            ward_code: ward_code.to_owned(),
            ward_name: wards.get(ward_code).and_then(|w| w.name.clone()),
            month,
            burglary_count,
            crime_count,
        })
        .collect();

    WardCounts {
        rows,
        skipped_areas,
    }
}
