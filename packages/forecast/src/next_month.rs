//! Rows for the month after the latest observation.
//!
//! Each area's latest row is carried forward one month. Calendar columns,
//! burglary lags and rolling statistics, crime-count lags, months since
//! the last burglary and every interaction term are re-derived; the
//! category mix, stop-and-search count, volatility and percentage changes
//! keep their latest values.

use burglary_map_crime_models::YearMonth;
use burglary_map_features::series::{self, History};
use burglary_map_features::table::{FeatureRow, FeatureTable};
use ndarray::Array2;

use crate::ForecastError;
use crate::inputs::{self, Dynamics};
use crate::matrix;

/// Unscaled model rows for the next month, one per area.
#[derive(Debug, Clone, PartialEq)]
pub struct NextMonthInput {
    pub month: YearMonth,
    pub lsoa_codes: Vec<String>,
    pub rows: Vec<FeatureRow>,
    pub x: Array2<f64>,
}

fn carry_forward(rows: &[FeatureRow]) -> Option<(FeatureRow, Dynamics)> {
    let latest = rows.last()?;
    let latest_dynamics = *inputs::area_dynamics(rows).last()?;

    let burglary: Vec<f64> = rows.iter().map(|r| f64::from(r.burglary_count)).collect();
    let crimes: Vec<f64> = rows.iter().map(|r| f64::from(r.crime_count)).collect();
    let n = rows.len();

    let next = latest.roll_forward(&History::at(&burglary, n));
    let dynamics = Dynamics {
        crime_count_lag_1m: series::lag_at(&crimes, n, 1).unwrap_or(0.0),
        crime_count_lag_3m: series::lag_at(&crimes, n, 3).unwrap_or(0.0),
        months_since_burglary: if latest.burglary_count > 0 {
            0.0
        } else {
            latest_dynamics.months_since_burglary + 1.0
        },
        ..latest_dynamics
    };
    Some((next, dynamics))
}

/// Builds the next-month rows of every area observed in the table's
/// latest month. `None` for an empty table.
///
/// # Errors
///
/// Returns [`ForecastError::DimensionMismatch`] if a row does not match
/// the table's categories.
pub fn next_month_input(table: &FeatureTable) -> Result<Option<NextMonthInput>, ForecastError> {
    let Some(latest_month) = table.latest_month() else {
        return Ok(None);
    };

    let mut lsoa_codes = Vec::new();
    let mut rows = Vec::new();
    let mut values = Vec::new();
    for area_rows in table.area_rows() {
        if area_rows.last().map(|r| r.month) != Some(latest_month) {
            continue;
        }
        let Some((row, dynamics)) = carry_forward(area_rows) else {
            continue;
        };
        values.push(inputs::feature_values(&row, &dynamics));
        lsoa_codes.push(row.lsoa_code.clone());
        rows.push(row);
    }

    let x = matrix::from_rows(inputs::feature_names(&table.categories).len(), values)?;
    let month = latest_month.succ();
    log::info!("Prepared {} next-month rows for {month}", lsoa_codes.len());

    Ok(Some(NextMonthInput {
        month,
        lsoa_codes,
        rows,
        x,
    }))
}

#[cfg(test)]
mod tests {
    use burglary_map_crime_models::{BURGLARY, Incident};
    use burglary_map_features::grid::aggregate_monthly;
    use burglary_map_features::table::build_features;
    use burglary_map_geography_models::ReferenceIndices;

    use super::*;

    fn table(burglaries: &[u32], others: &[u32]) -> FeatureTable {
        let mut month = YearMonth::new(2023, 9).unwrap();
        let mut incidents = Vec::new();
        for (&b, &o) in burglaries.iter().zip(others) {
            for (count, crime_type) in [(b, BURGLARY), (o, "drugs")] {
                for _ in 0..count {
                    incidents.push(Incident {
                        lsoa_code: "E01000001".to_owned(),
                        month,
                        crime_type: crime_type.to_owned(),
                        longitude: None,
                        latitude: None,
                    });
                }
            }
            month = month.succ();
        }
        let grid = aggregate_monthly(&incidents, "E01", BURGLARY, None).unwrap();
        build_features(&grid, &ReferenceIndices::default()).unwrap()
    }

    #[test]
    fn rolls_december_into_january() {
        // September to December 2023.
        let table = table(&[1, 0, 2, 3], &[1, 1, 1, 1]);
        let next = next_month_input(&table).unwrap().unwrap();
        assert_eq!(next.month.to_string(), "2024-01");
        assert_eq!(next.lsoa_codes, vec!["E01000001"]);

        let row = &next.rows[0];
        assert_eq!(row.month, next.month);
        assert_eq!(row.calendar.month_num, 1);
        assert_eq!(row.lag(1), Some(3.0));
        assert_eq!(row.lag(2), Some(2.0));
        assert_eq!(row.lag(3), Some(0.0));
        assert!((row.rolling[0].mean - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(next.x.nrows(), 1);
    }

    #[test]
    fn crime_lags_and_months_since_burglary() {
        // Crime counts 2, 1, 3, 1; no burglary in the latest month.
        let table = table(&[1, 0, 2, 0], &[1, 1, 1, 1]);
        let rows = &table.rows;
        let (_, dynamics) = carry_forward(rows).unwrap();
        assert!((dynamics.crime_count_lag_1m - 1.0).abs() < f64::EPSILON);
        assert!((dynamics.crime_count_lag_3m - 1.0).abs() < f64::EPSILON);
        assert!((dynamics.months_since_burglary - 2.0).abs() < f64::EPSILON);

        let table = self::table(&[0, 0, 0, 4], &[1, 1, 1, 1]);
        let (_, dynamics) = carry_forward(&table.rows).unwrap();
        assert!(dynamics.months_since_burglary.abs() < f64::EPSILON);
    }

    #[test]
    fn empty_table_has_no_next_month() {
        let table = FeatureTable {
            categories: Vec::new(),
            rows: Vec::new(),
        };
        assert!(next_month_input(&table).unwrap().is_none());
    }
}
