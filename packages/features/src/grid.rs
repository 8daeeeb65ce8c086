//! Monthly aggregation of incidents into a dense area-month grid.

use std::collections::{BTreeMap, BTreeSet};

use burglary_map_crime_models::{Incident, StopSearchCounts, YearMonth, normalize_crime_type};

use crate::FeatureError;

/// Counts for one (area, month).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaMonthCell {
    pub lsoa_code: String,
    pub month: YearMonth,
    /// Incidents of the target category.
    pub burglary_count: u32,
    /// Incidents of every category.
    pub crime_count: u32,
    /// Per non-target category, aligned with [`MonthlyGrid::categories`].
    pub category_counts: Vec<u32>,
    pub stop_and_search_count: u32,
}

/// Dense area × month cross product, sorted by area then month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyGrid {
    pub target_category: String,
    /// Distinct area codes, sorted.
    pub areas: Vec<String>,
    /// Every month from the earliest to the latest observed, inclusive.
    pub months: Vec<YearMonth>,
    /// Non-target categories, sorted.
    pub categories: Vec<String>,
    pub cells: Vec<AreaMonthCell>,
    /// Mean `(longitude, latitude)` of each area's located incidents.
    pub coordinates: BTreeMap<String, (f64, f64)>,
}

impl MonthlyGrid {
    /// Cells of each area in turn, each slice in month order.
    pub fn area_series(&self) -> impl Iterator<Item = &[AreaMonthCell]> {
        self.cells.chunks(self.months.len().max(1))
    }

    /// Checks that `cells` is exactly `areas × months` in (area, month)
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::UnsortedGrid`] at the first cell out of
    /// place, or at the end of `cells` if it is too short or too long.
    pub fn validate(&self) -> Result<(), FeatureError> {
        let expected = self
            .areas
            .iter()
            .flat_map(|area| self.months.iter().map(move |month| (area, month)));
        let mut count = 0;
        for (index, (area, month)) in expected.enumerate() {
            let Some(cell) = self.cells.get(index) else {
                return Err(FeatureError::UnsortedGrid { index });
            };
            if &cell.lsoa_code != area || cell.month != *month {
                return Err(FeatureError::UnsortedGrid { index });
            }
            count += 1;
        }
        if self.cells.len() == count {
            Ok(())
        } else {
            Err(FeatureError::UnsortedGrid { index: count })
        }
    }

    /// Sum of `crime_count` over every cell.
    #[must_use]
    pub fn total_incidents(&self) -> u64 {
        self.cells.iter().map(|c| u64::from(c.crime_count)).sum()
    }
}

#[derive(Default)]
struct Tally {
    target: u32,
    total: u32,
    by_category: BTreeMap<usize, u32>,
}

/// Collapses `incidents` into a dense grid.
///
/// Incidents outside `area_prefix` are dropped. Every observed area gets a
/// row for every month between the earliest and latest incident; absent
/// counts, including stop-and-search, are zero.
///
/// # Errors
///
/// Returns [`FeatureError::EmptyInput`] if no incident is left after
/// filtering.
pub fn aggregate_monthly(
    incidents: &[Incident],
    area_prefix: &str,
    target_category: &str,
    stop_search: Option<&StopSearchCounts>,
) -> Result<MonthlyGrid, FeatureError> {
    let target = normalize_crime_type(target_category);
    let kept: Vec<(&Incident, String)> = incidents
        .iter()
        .filter(|i| i.lsoa_code.starts_with(area_prefix))
        .map(|i| (i, normalize_crime_type(&i.crime_type)))
        .collect();
    if kept.len() < incidents.len() {
        log::debug!(
            "Dropped {} incidents outside area prefix '{area_prefix}'",
            incidents.len() - kept.len()
        );
    }

    let (Some(first), Some(last)) = (
        kept.iter().map(|(i, _)| i.month).min(),
        kept.iter().map(|(i, _)| i.month).max(),
    ) else {
        return Err(FeatureError::EmptyInput);
    };

    let categories: Vec<String> = kept
        .iter()
        .map(|(_, c)| c.as_str())
        .filter(|c| *c != target)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let category_index: BTreeMap<&str, usize> = categories
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let mut tallies: BTreeMap<(&str, YearMonth), Tally> = BTreeMap::new();
    let mut located: BTreeMap<&str, (f64, f64, u32)> = BTreeMap::new();
    for (incident, crime_type) in &kept {
        let tally = tallies
            .entry((incident.lsoa_code.as_str(), incident.month))
            .or_default();
        tally.total += 1;
        if *crime_type == target {
            tally.target += 1;
        } else if let Some(&i) = category_index.get(crime_type.as_str()) {
            *tally.by_category.entry(i).or_default() += 1;
        }

        if let Some((lng, lat)) = incident.coordinates() {
            let sums = located.entry(incident.lsoa_code.as_str()).or_default();
            sums.0 += lng;
            sums.1 += lat;
            sums.2 += 1;
        }
    }

    let areas: Vec<String> = kept
        .iter()
        .map(|(i, _)| i.lsoa_code.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let months = YearMonth::range_inclusive(first, last);

    let mut cells = Vec::with_capacity(areas.len() * months.len());
    for area in &areas {
        for &month in &months {
            let tally = tallies.get(&(area.as_str(), month));
            let mut category_counts = vec![0; categories.len()];
            if let Some(tally) = tally {
                for (&i, &count) in &tally.by_category {
                    category_counts[i] = count;
                }
            }
            let stop_and_search_count = stop_search
                .and_then(|s| s.get(&(area.clone(), month)))
                .copied()
                .unwrap_or(0);
            cells.push(AreaMonthCell {
                lsoa_code: area.clone(),
                month,
                burglary_count: tally.map_or(0, |t| t.target),
                crime_count: tally.map_or(0, |t| t.total),
                category_counts,
                stop_and_search_count,
            });
        }
    }

    let coordinates = located
        .into_iter()
        .map(|(area, (lng, lat, n))| {
            let n = f64::from(n);
            (area.to_owned(), (lng / n, lat / n))
        })
        .collect();

    log::info!(
        "Aggregated {} incidents into {} areas x {} months ({first} to {last}), {} other categories",
        kept.len(),
        areas.len(),
        months.len(),
        categories.len()
    );

    Ok(MonthlyGrid {
        target_category: target,
        areas,
        months,
        categories,
        cells,
        coordinates,
    })
}

#[cfg(test)]
mod tests {
    use burglary_map_crime_models::BURGLARY;

    use super::*;

    fn incident(lsoa: &str, month: &str, crime_type: &str) -> Incident {
        Incident {
            lsoa_code: lsoa.to_owned(),
            month: month.parse().unwrap(),
            crime_type: crime_type.to_owned(),
            longitude: None,
            latitude: None,
        }
    }

    fn located(lsoa: &str, month: &str, lng: f64, lat: f64) -> Incident {
        Incident {
            longitude: Some(lng),
            latitude: Some(lat),
            ..incident(lsoa, month, BURGLARY)
        }
    }

    fn sample() -> Vec<Incident> {
        vec![
            incident("E01000002", "2024-01", "burglary"),
            incident("E01000001", "2024-03", "Burglary"),
            incident("E01000001", "2024-03", "drugs"),
            incident("E01000001", "2024-03", "robbery"),
            incident("E01000002", "2024-03", "drugs"),
            incident("W01000001", "2024-02", "burglary"),
            located("E01000001", "2024-01", -0.1, 51.0),
            located("E01000001", "2024-02", -0.3, 52.0),
        ]
    }

    #[test]
    fn grid_is_dense_cross_product() {
        let grid = aggregate_monthly(&sample(), "E01", BURGLARY, None).unwrap();
        assert_eq!(grid.areas, vec!["E01000001", "E01000002"]);
        assert_eq!(grid.months.len(), 3);
        assert_eq!(grid.cells.len(), grid.areas.len() * grid.months.len());
        grid.validate().unwrap();

        let empty = &grid.cells[4];
        assert_eq!(empty.lsoa_code, "E01000002");
        assert_eq!(empty.month.to_string(), "2024-02");
        assert_eq!(empty.crime_count, 0);
        assert_eq!(empty.category_counts, vec![0, 0]);
    }

    #[test]
    fn counts_sum_to_filtered_incidents() {
        let incidents = sample();
        let grid = aggregate_monthly(&incidents, "E01", BURGLARY, None).unwrap();
        assert_eq!(grid.total_incidents(), 7);
        assert_eq!(grid.categories, vec!["drugs", "robbery"]);
        for cell in &grid.cells {
            let others: u32 = cell.category_counts.iter().sum();
            assert_eq!(cell.burglary_count + others, cell.crime_count);
        }

        let march = &grid.cells[2];
        assert_eq!(march.burglary_count, 1);
        assert_eq!(march.crime_count, 3);
        assert_eq!(march.category_counts, vec![1, 1]);
    }

    #[test]
    fn averages_coordinates_per_area() {
        let grid = aggregate_monthly(&sample(), "E01", BURGLARY, None).unwrap();
        let (lng, lat) = grid.coordinates["E01000001"];
        assert!((lng + 0.2).abs() < 1e-12);
        assert!((lat - 51.5).abs() < 1e-12);
        assert!(!grid.coordinates.contains_key("E01000002"));
    }

    #[test]
    fn joins_stop_and_search() {
        let mut stops = StopSearchCounts::new();
        stops.insert(("E01000002".to_owned(), "2024-02".parse().unwrap()), 4);
        stops.insert(("E01999999".to_owned(), "2024-02".parse().unwrap()), 9);
        let grid = aggregate_monthly(&sample(), "E01", BURGLARY, Some(&stops)).unwrap();
        assert_eq!(grid.cells[4].stop_and_search_count, 4);
        let total: u32 = grid.cells.iter().map(|c| c.stop_and_search_count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn configurable_target_category() {
        let grid = aggregate_monthly(&sample(), "E01", "Drugs", None).unwrap();
        assert_eq!(grid.target_category, "drugs");
        assert_eq!(grid.categories, vec!["burglary", "robbery"]);
        let march = &grid.cells[2];
        assert_eq!(march.burglary_count, 1);
        assert_eq!(march.category_counts, vec![1, 1]);
    }

    #[test]
    fn no_incidents_is_an_error() {
        let outside = vec![incident("S01000001", "2024-01", BURGLARY)];
        assert!(matches!(
            aggregate_monthly(&outside, "E01", BURGLARY, None),
            Err(FeatureError::EmptyInput)
        ));
    }

    #[test]
    fn validate_detects_disorder() {
        let mut grid = aggregate_monthly(&sample(), "E01", BURGLARY, None).unwrap();
        grid.cells.swap(0, 1);
        assert!(matches!(
            grid.validate(),
            Err(FeatureError::UnsortedGrid { index: 0 })
        ));

        let mut grid = aggregate_monthly(&sample(), "E01", BURGLARY, None).unwrap();
        grid.cells.pop();
        assert!(matches!(
            grid.validate(),
            Err(FeatureError::UnsortedGrid { index: 5 })
        ));
    }
}
