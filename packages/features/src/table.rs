//! The engineered feature table.
//!
//! One [`FeatureRow`] per (area, month). Lag and rolling columns are
//! computed with true missingness and zero-filled only when the row is
//! assembled; this biases the first year of each area towards low risk
//! and is a known approximation. Population-derived columns stay missing
//! (empty cells) for areas absent from the population table.

use std::collections::BTreeMap;

use burglary_map_crime_models::YearMonth;
use burglary_map_geography_models::{AreaProfile, Decile, DeprivationDomain, ReferenceIndices};

use crate::FeatureError;
use crate::calendar::MonthFeatures;
use crate::grid::{AreaMonthCell, MonthlyGrid};
use crate::series::{History, LAGS, WINDOWS};

/// Zero-filled rolling statistics of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rolling {
    pub mean: f64,
    pub std: f64,
    pub sum: f64,
}

/// Decile × calendar interaction terms of one deprivation domain.
///
/// Uses the decile's categorical code (`decile - 1`); an area with no
/// decile contributes 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecileInteraction {
    pub x_sin: f64,
    pub x_cos: f64,
    pub x_quarter: f64,
}

/// One row of the feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub lsoa_code: String,
    pub month: YearMonth,
    pub burglary_count: u32,
    pub crime_count: u32,
    /// Aligned with [`FeatureTable::categories`].
    pub category_counts: Vec<u32>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub stop_and_search_count: u32,
    /// Aligned with [`LAGS`].
    pub lags: [f64; LAGS.len()],
    /// Aligned with [`WINDOWS`].
    pub rolling: [Rolling; WINDOWS.len()],
    pub calendar: MonthFeatures,
    pub deciles: BTreeMap<DeprivationDomain, Decile>,
    pub population: Option<f64>,
    /// `ln(1 + population)`.
    pub log_pop: Option<f64>,
    /// Unfilled one-month lag over `population + 1`.
    pub crime_per_capita: Option<f64>,
    /// Stop-and-search count over `population + 1`.
    pub stop_rate: Option<f64>,
    /// IMD decile × `log_pop`.
    pub imd_pop_interaction: Option<f64>,
    /// Aligned with [`DeprivationDomain::all`].
    pub interactions: Vec<DecileInteraction>,
}

impl FeatureRow {
    fn from_cell(
        cell: &AreaMonthCell,
        coordinates: Option<(f64, f64)>,
        profile: Option<&AreaProfile>,
        history: &History,
    ) -> Self {
        let mut row = Self {
            lsoa_code: cell.lsoa_code.clone(),
            month: cell.month,
            burglary_count: cell.burglary_count,
            crime_count: cell.crime_count,
            category_counts: cell.category_counts.clone(),
            longitude: coordinates.map(|c| c.0),
            latitude: coordinates.map(|c| c.1),
            stop_and_search_count: cell.stop_and_search_count,
            lags: [0.0; LAGS.len()],
            rolling: [Rolling::default(); WINDOWS.len()],
            calendar: MonthFeatures::of(cell.month),
            deciles: profile.map(|p| p.deciles.clone()).unwrap_or_default(),
            population: profile.and_then(|p| p.population),
            log_pop: None,
            crime_per_capita: None,
            stop_rate: None,
            imd_pop_interaction: None,
            interactions: Vec::new(),
        };
        row.derive(history);
        row
    }

    /// Recomputes every column that depends on the month or the burglary
    /// history. Counts, coordinates and the static profile are untouched.
    pub fn derive(&mut self, history: &History) {
        self.lags = history.lags.map(|lag| lag.unwrap_or(0.0));
        self.rolling = history.rolling.map(|stats| Rolling {
            mean: stats.mean.unwrap_or(0.0),
            std: stats.std.unwrap_or(0.0),
            sum: stats.sum.unwrap_or(0.0),
        });
        self.calendar = MonthFeatures::of(self.month);

        self.log_pop = self.population.map(f64::ln_1p);
        self.crime_per_capita = history
            .lag_1()
            .zip(self.population)
            .map(|(lag, pop)| lag / (pop + 1.0));
        self.stop_rate = self
            .population
            .map(|pop| f64::from(self.stop_and_search_count) / (pop + 1.0));
        self.imd_pop_interaction = self
            .decile(DeprivationDomain::Imd)
            .zip(self.log_pop)
            .map(|(imd, log_pop)| f64::from(imd.value()) * log_pop);

        let calendar = self.calendar;
        self.interactions = DeprivationDomain::all()
            .iter()
            .map(|&domain| {
                let code = f64::from(self.decile(domain).map_or(0, Decile::code));
                DecileInteraction {
                    x_sin: code * calendar.month_sin,
                    x_cos: code * calendar.month_cos,
                    x_quarter: code * f64::from(calendar.quarter),
                }
            })
            .collect();
    }

    /// This row carried into the following month, with time-dependent
    /// columns re-derived from `history` (the area's series seen from the
    /// new month).
    #[must_use]
    pub fn roll_forward(&self, history: &History) -> Self {
        let mut next = self.clone();
        next.month = self.month.succ();
        next.derive(history);
        next
    }

    #[must_use]
    pub fn decile(&self, domain: DeprivationDomain) -> Option<Decile> {
        self.deciles.get(&domain).copied()
    }

    /// The zero-filled lag of `months`, if it is one of [`LAGS`].
    #[must_use]
    pub fn lag(&self, months: usize) -> Option<f64> {
        LAGS.iter().position(|&l| l == months).map(|i| self.lags[i])
    }

    fn record(&self) -> Vec<String> {
        let mut record = vec![
            self.lsoa_code.clone(),
            self.month.to_string(),
            self.burglary_count.to_string(),
            self.crime_count.to_string(),
        ];
        record.extend(self.category_counts.iter().map(ToString::to_string));
        record.push(optional(self.longitude));
        record.push(optional(self.latitude));
        record.push(self.stop_and_search_count.to_string());
        record.extend(self.lags.iter().map(ToString::to_string));
        for rolling in &self.rolling {
            record.push(rolling.mean.to_string());
            record.push(rolling.std.to_string());
            record.push(rolling.sum.to_string());
        }

        let calendar = &self.calendar;
        record.push(calendar.month_num.to_string());
        record.push(calendar.quarter.to_string());
        record.push(calendar.month_sin.to_string());
        record.push(calendar.month_cos.to_string());
        record.push(u8::from(calendar.is_winter).to_string());
        record.push(u8::from(calendar.is_holiday_season).to_string());

        record.extend(
            DeprivationDomain::all()
                .iter()
                .map(|&d| self.decile(d).map_or_else(String::new, |v| v.value().to_string())),
        );
        record.push(optional(self.population));
        record.push(optional(self.log_pop));
        record.push(optional(self.crime_per_capita));
        record.push(optional(self.stop_rate));
        record.push(optional(self.imd_pop_interaction));

        for interaction in &self.interactions {
            record.push(interaction.x_sin.to_string());
            record.push(interaction.x_cos.to_string());
            record.push(interaction.x_quarter.to_string());
        }
        record
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

/// The complete feature table, sorted by (area, month).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Non-target category columns, in order.
    pub categories: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Column names, in the order [`Self::records`] writes them.
    #[must_use]
    pub fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = ["lsoa_code", "month", "burglary_count", "crime_count"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        headers.extend(self.categories.iter().cloned());
        headers.extend(
            ["longitude", "latitude", "stop_and_search_count"]
                .iter()
                .map(|s| (*s).to_owned()),
        );
        headers.extend(LAGS.iter().map(|l| format!("lag_{l}")));
        for window in WINDOWS {
            headers.push(format!("rolling_mean_{window}"));
            headers.push(format!("rolling_std_{window}"));
            headers.push(format!("rolling_sum_{window}"));
        }
        headers.extend(
            [
                "month_num",
                "quarter",
                "month_sin",
                "month_cos",
                "is_winter",
                "is_holiday_season",
            ]
            .iter()
            .map(|s| (*s).to_owned()),
        );
        headers.extend(DeprivationDomain::all().iter().map(|d| d.column().to_owned()));
        headers.extend(
            [
                "population",
                "log_pop",
                "crime_per_capita",
                "stop_rate",
                "imd_pop_interaction",
            ]
            .iter()
            .map(|s| (*s).to_owned()),
        );
        for domain in DeprivationDomain::all() {
            let column = domain.column();
            headers.push(format!("{column}_x_sin"));
            headers.push(format!("{column}_x_cos"));
            headers.push(format!("{column}_x_quarter"));
        }
        headers
    }

    /// Every row as strings. Floats use the shortest representation that
    /// round-trips, so equal tables give equal bytes.
    #[must_use]
    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(FeatureRow::record).collect()
    }

    /// Rows of each area in turn, each slice in month order.
    pub fn area_rows(&self) -> impl Iterator<Item = &[FeatureRow]> {
        self.rows.chunk_by(|a, b| a.lsoa_code == b.lsoa_code)
    }

    /// Latest month in the table.
    #[must_use]
    pub fn latest_month(&self) -> Option<YearMonth> {
        self.rows.iter().map(|r| r.month).max()
    }
}

/// Builds the feature table from a dense grid and the static reference
/// indices.
///
/// # Errors
///
/// Returns [`FeatureError::UnsortedGrid`] if the grid is not a dense
/// (area, month)-sorted cross product, or [`FeatureError::EmptyInput`] if
/// it has no cells.
pub fn build_features(
    grid: &MonthlyGrid,
    references: &ReferenceIndices,
) -> Result<FeatureTable, FeatureError> {
    grid.validate()?;
    if grid.cells.is_empty() {
        return Err(FeatureError::EmptyInput);
    }

    let mut rows = Vec::with_capacity(grid.cells.len());
    let mut without_profile = 0usize;
    for cells in grid.area_series() {
        let lsoa_code = &cells[0].lsoa_code;
        let profile = references.profile(lsoa_code);
        if profile.is_none() {
            without_profile += 1;
        }
        let coordinates = grid.coordinates.get(lsoa_code).copied();
        let series: Vec<f64> = cells.iter().map(|c| f64::from(c.burglary_count)).collect();

        for (i, cell) in cells.iter().enumerate() {
            let history = History::at(&series, i);
            rows.push(FeatureRow::from_cell(cell, coordinates, profile, &history));
        }
    }

    if without_profile > 0 {
        log::warn!(
            "{without_profile} of {} areas have no deprivation or population data; their \
             population-derived features are left empty",
            grid.areas.len()
        );
    }
    log::info!("Built {} feature rows", rows.len());

    Ok(FeatureTable {
        categories: grid.categories.clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use burglary_map_crime_models::{BURGLARY, Incident};

    use super::*;
    use crate::grid::aggregate_monthly;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn burglaries(lsoa: &str, counts: &[u32]) -> Vec<Incident> {
        let mut month = YearMonth::new(2024, 1).unwrap();
        let mut incidents = Vec::new();
        for &count in counts {
            for _ in 0..count {
                incidents.push(Incident {
                    lsoa_code: lsoa.to_owned(),
                    month,
                    crime_type: BURGLARY.to_owned(),
                    longitude: None,
                    latitude: None,
                });
            }
            // Keep every month observed so the grid spans the full range.
            incidents.push(Incident {
                lsoa_code: "E01999999".to_owned(),
                month,
                crime_type: "drugs".to_owned(),
                longitude: None,
                latitude: None,
            });
            month = month.succ();
        }
        incidents
    }

    fn references() -> ReferenceIndices {
        let mut refs = ReferenceIndices::default();
        refs.set_deciles(
            "E0100001",
            BTreeMap::from([
                (DeprivationDomain::Imd, Decile::new(3).unwrap()),
                (DeprivationDomain::Crime, Decile::new(1).unwrap()),
            ]),
        );
        refs.set_population("E0100001", 999.0);
        refs
    }

    fn table(counts: &[u32]) -> FeatureTable {
        let grid = aggregate_monthly(&burglaries("E0100001", counts), "E01", BURGLARY, None).unwrap();
        build_features(&grid, &references()).unwrap()
    }

    fn area<'a>(table: &'a FeatureTable, lsoa: &str) -> Vec<&'a FeatureRow> {
        table.rows.iter().filter(|r| r.lsoa_code == lsoa).collect()
    }

    #[test]
    fn six_month_scenario() {
        let table = table(&[1, 0, 0, 2, 1, 0]);
        let rows = area(&table, "E0100001");
        assert_eq!(rows.len(), 6);

        let month6 = rows[5];
        // Month 5 had one burglary.
        assert_eq!(month6.lag(1), Some(1.0));
        assert!(close(month6.rolling[0].mean, 1.0));
        assert!(close(month6.rolling[0].sum, 3.0));
        assert!(close(month6.rolling[0].std, 1.0));
        // Six months of history are needed for the 6-month window.
        assert_eq!(month6.rolling[1], Rolling::default());
        assert_eq!(month6.lag(6), Some(0.0));
    }

    #[test]
    fn missing_history_is_zero_filled() {
        let table = table(&[1, 0, 0, 2, 1, 0]);
        let first = area(&table, "E0100001")[0];
        assert_eq!(first.lags, [0.0; 5]);
        assert_eq!(first.rolling, [Rolling::default(); 3]);
        // Per-capita uses the unfilled lag.
        assert_eq!(first.crime_per_capita, None);

        let second = area(&table, "E0100001")[1];
        assert!(close(second.crime_per_capita.unwrap(), 1.0 / 1000.0));
    }

    #[test]
    fn population_and_decile_features() {
        let table = table(&[1, 0, 0, 2, 1, 0]);
        let row = area(&table, "E0100001")[3];
        assert_eq!(row.population, Some(999.0));
        assert!(close(row.log_pop.unwrap(), 1000f64.ln()));
        assert!(close(row.stop_rate.unwrap(), 0.0));
        assert!(close(row.imd_pop_interaction.unwrap(), 3.0 * 1000f64.ln()));

        // April: quarter 2, sin(2π·4/12).
        let imd = row.interactions[0];
        assert!(close(imd.x_quarter, 2.0 * 2.0));
        assert!(close(imd.x_sin, 2.0 * (std::f64::consts::TAU * 4.0 / 12.0).sin()));
        // Crime decile 1 has code 0; income has no decile.
        assert_eq!(row.interactions[3], DecileInteraction::default());
        assert_eq!(row.interactions[1], DecileInteraction::default());
    }

    #[test]
    fn unknown_area_has_empty_profile_columns() {
        let table = table(&[1, 0, 0, 2, 1, 0]);
        let row = area(&table, "E01999999")[2];
        assert_eq!(row.population, None);
        assert_eq!(row.log_pop, None);
        assert!(row.deciles.is_empty());

        let headers = table.headers();
        let record = &table.records()[8];
        let column = |name: &str| headers.iter().position(|h| h == name).unwrap();
        assert_eq!(record[column("population")], "");
        assert_eq!(record[column("imd_decile_2019")], "");
        assert_eq!(record[column("lag_1")], "0");
        assert_eq!(record[column("drugs")], "1");
    }

    #[test]
    fn header_matches_record_width() {
        let table = table(&[1, 0, 2]);
        let headers = table.headers();
        assert_eq!(headers[4], "drugs");
        assert!(headers.contains(&"health_decile_2019_x_quarter".to_owned()));
        for record in table.records() {
            assert_eq!(record.len(), headers.len());
        }
    }

    #[test]
    fn building_twice_gives_identical_records() {
        let counts = [2, 0, 1, 3, 0, 2, 1, 4, 0, 1, 2, 3];
        assert_eq!(table(&counts).records(), table(&counts).records());
    }

    #[test]
    fn rejects_unsorted_grid() {
        let mut grid =
            aggregate_monthly(&burglaries("E0100001", &[1, 2]), "E01", BURGLARY, None).unwrap();
        grid.cells.reverse();
        assert!(matches!(
            build_features(&grid, &ReferenceIndices::default()),
            Err(FeatureError::UnsortedGrid { index: 0 })
        ));
    }

    #[test]
    fn roll_forward_crosses_year_end() {
        let counts = [1, 0, 0, 2, 1, 0, 0, 0, 0, 0, 0, 3];
        let table = table(&counts);
        let last = *area(&table, "E0100001").last().unwrap();
        assert_eq!(last.month.to_string(), "2024-12");

        let series: Vec<f64> = counts.iter().map(|&c| f64::from(c)).collect();
        let next = last.roll_forward(&History::at(&series, series.len()));
        assert_eq!(next.month.to_string(), "2025-01");
        assert_eq!(next.calendar.quarter, 1);
        assert!(next.calendar.is_winter);
        assert!(!next.calendar.is_holiday_season);
        assert_eq!(next.lag(1), Some(3.0));
        assert_eq!(next.lag(12), Some(1.0));
        assert!(close(next.rolling[0].sum, 3.0));
        assert_eq!(next.burglary_count, last.burglary_count);
    }
}
