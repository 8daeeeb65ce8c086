//! Model inputs: the feature table widened with crime-count dynamics and
//! interaction terms, flattened into a numeric matrix.
//!
//! Identifiers, coordinates, the target and the raw crime count never
//! enter the matrix. Missing values (areas without population or
//! deciles) become 0.

use burglary_map_crime_models::YearMonth;
use burglary_map_features::series::{self, LAGS, WINDOWS};
use burglary_map_features::table::{FeatureRow, FeatureTable};
use burglary_map_geography_models::DeprivationDomain;
use ndarray::Array2;

use crate::ForecastError;
use crate::matrix;

/// Lags of the relative crime-count change, in months.
pub const PCT_CHANGE_LAGS: [usize; 4] = [1, 3, 6, 12];

/// Value used for months since the last burglary before any burglary has
/// been seen.
pub const NEVER_BURGLED: f64 = 100.0;

/// Crime-count dynamics of one area-month.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dynamics {
    /// Aligned with [`PCT_CHANGE_LAGS`]; 0 where undefined.
    pub crime_count_pct_change: [f64; PCT_CHANGE_LAGS.len()],
    pub crime_count_lag_1m: f64,
    pub crime_count_lag_3m: f64,
    /// Sample std of the crime count over the current and two previous
    /// months; 0 with fewer than two months.
    pub crime_volatility_3m: f64,
    /// Shannon entropy (natural log) of the non-target category mix.
    pub crime_entropy: f64,
    pub months_since_burglary: f64,
}

/// Entropy of the category proportions; 0 when every count is 0.
#[must_use]
pub fn category_entropy(counts: &[u32]) -> f64 {
    let total: f64 = counts.iter().map(|&c| f64::from(c)).sum();
    if total <= 0.0 {
        return 0.0;
    }
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = f64::from(c) / total;
            p * p.ln()
        })
        .sum::<f64>()
}

/// Months since the last month with a burglary, per position of `burglary`.
#[must_use]
pub fn months_since_burglary(burglary: &[f64]) -> Vec<f64> {
    let mut last_seen: Option<f64> = None;
    burglary
        .iter()
        .map(|&count| {
            last_seen = if count > 0.0 {
                Some(0.0)
            } else {
                last_seen.map(|m| m + 1.0)
            };
            last_seen.unwrap_or(NEVER_BURGLED)
        })
        .collect()
}

/// Dynamics of every row of one area, in month order.
#[must_use]
pub fn area_dynamics(rows: &[FeatureRow]) -> Vec<Dynamics> {
    let crimes: Vec<f64> = rows.iter().map(|r| f64::from(r.crime_count)).collect();
    let burglary: Vec<f64> = rows.iter().map(|r| f64::from(r.burglary_count)).collect();
    let since = months_since_burglary(&burglary);

    rows.iter()
        .enumerate()
        .map(|(i, row)| Dynamics {
            crime_count_pct_change: PCT_CHANGE_LAGS
                .map(|lag| series::pct_change(&crimes, i, lag).unwrap_or(0.0)),
            crime_count_lag_1m: series::lag_at(&crimes, i, 1).unwrap_or(0.0),
            crime_count_lag_3m: series::lag_at(&crimes, i, 3).unwrap_or(0.0),
            crime_volatility_3m: series::sample_std(series::window_ending_at(&crimes, i, 3))
                .unwrap_or(0.0),
            crime_entropy: category_entropy(&row.category_counts),
            months_since_burglary: since[i],
        })
        .collect()
}

/// Matrix column names for a table with the given non-target categories.
#[must_use]
pub fn feature_names(categories: &[String]) -> Vec<String> {
    let mut names: Vec<String> = categories.to_vec();
    names.push("stop_and_search_count".to_owned());
    names.extend(LAGS.iter().map(|l| format!("lag_{l}")));
    for window in WINDOWS {
        names.push(format!("rolling_mean_{window}"));
        names.push(format!("rolling_std_{window}"));
        names.push(format!("rolling_sum_{window}"));
    }
    names.extend(
        [
            "month_num",
            "quarter",
            "month_sin",
            "month_cos",
            "is_winter",
            "is_holiday_season",
        ]
        .map(str::to_owned),
    );
    names.extend(DeprivationDomain::all().iter().map(|d| d.column().to_owned()));
    names.extend(
        [
            "population",
            "log_pop",
            "crime_per_capita",
            "stop_rate",
            "imd_pop_interaction",
        ]
        .map(str::to_owned),
    );
    for domain in DeprivationDomain::all() {
        let column = domain.column();
        names.push(format!("{column}_x_sin"));
        names.push(format!("{column}_x_cos"));
        names.push(format!("{column}_x_quarter"));
    }
    names.extend(PCT_CHANGE_LAGS.iter().map(|l| format!("crime_count_pct_change_{l}m")));
    names.extend(
        [
            "crime_count_lag_1m",
            "crime_count_lag_3m",
            "is_holiday",
            "crime_volatility_3m",
            "crime_entropy",
            "months_since_burglary",
            "lag1_crime_x_pop",
            "lag3_crime_x_imd",
            "lag1_x_entropy",
            "lag3_x_entropy",
            "entropy_x_sin",
            "entropy_x_cos",
            "entropy_x_imd2019",
            "volatility_x_sin",
            "volatility_x_cos",
            "stop_x_imd2019",
            "imd2019_x_msb",
        ]
        .map(str::to_owned),
    );
    names
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// One matrix row, in [`feature_names`] order.
#[must_use]
pub fn feature_values(row: &FeatureRow, dynamics: &Dynamics) -> Vec<f64> {
    let or_zero = |value: Option<f64>| value.filter(|v| v.is_finite()).unwrap_or(0.0);
    let calendar = &row.calendar;
    let population = or_zero(row.population);
    let imd = row
        .decile(DeprivationDomain::Imd)
        .map_or(0.0, |d| f64::from(d.value()));
    let stops = f64::from(row.stop_and_search_count);

    let mut values: Vec<f64> = row.category_counts.iter().map(|&c| f64::from(c)).collect();
    values.push(stops);
    values.extend(row.lags);
    for rolling in &row.rolling {
        values.extend([rolling.mean, rolling.std, rolling.sum]);
    }
    values.extend([
        f64::from(calendar.month_num),
        f64::from(calendar.quarter),
        calendar.month_sin,
        calendar.month_cos,
        flag(calendar.is_winter),
        flag(calendar.is_holiday_season),
    ]);
    values.extend(
        DeprivationDomain::all()
            .iter()
            .map(|&d| row.decile(d).map_or(0.0, |v| f64::from(v.value()))),
    );
    values.extend([
        population,
        or_zero(row.log_pop),
        or_zero(row.crime_per_capita),
        or_zero(row.stop_rate),
        or_zero(row.imd_pop_interaction),
    ]);
    for interaction in &row.interactions {
        values.extend([interaction.x_sin, interaction.x_cos, interaction.x_quarter]);
    }

    let d = dynamics;
    values.extend(d.crime_count_pct_change);
    values.extend([
        d.crime_count_lag_1m,
        d.crime_count_lag_3m,
        flag(calendar.is_holiday_season),
        d.crime_volatility_3m,
        d.crime_entropy,
        d.months_since_burglary,
        d.crime_count_lag_1m * population,
        d.crime_count_lag_3m * imd,
        d.crime_count_lag_1m * d.crime_entropy,
        d.crime_count_lag_3m * d.crime_entropy,
        d.crime_entropy * calendar.month_sin,
        d.crime_entropy * calendar.month_cos,
        d.crime_entropy * imd,
        d.crime_volatility_3m * calendar.month_sin,
        d.crime_volatility_3m * calendar.month_cos,
        stops * imd,
        imd * d.months_since_burglary,
    ]);
    values
}

/// The model rows of a feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub feature_names: Vec<String>,
    pub lsoa_codes: Vec<String>,
    pub months: Vec<YearMonth>,
    /// Burglary count per row.
    pub target: Vec<f64>,
    pub x: Array2<f64>,
    /// Per row, aligned with `lsoa_codes`.
    pub dynamics: Vec<Dynamics>,
}

impl ModelInput {
    /// Widens every row of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::DimensionMismatch`] if a row's category
    /// counts do not match the table's categories.
    pub fn from_table(table: &FeatureTable) -> Result<Self, ForecastError> {
        let feature_names = feature_names(&table.categories);
        let mut lsoa_codes = Vec::with_capacity(table.rows.len());
        let mut months = Vec::with_capacity(table.rows.len());
        let mut target = Vec::with_capacity(table.rows.len());
        let mut values = Vec::with_capacity(table.rows.len());
        let mut all_dynamics = Vec::with_capacity(table.rows.len());

        for rows in table.area_rows() {
            for (row, dynamics) in rows.iter().zip(area_dynamics(rows)) {
                lsoa_codes.push(row.lsoa_code.clone());
                months.push(row.month);
                target.push(f64::from(row.burglary_count));
                values.push(feature_values(row, &dynamics));
                all_dynamics.push(dynamics);
            }
        }

        let x = matrix::from_rows(feature_names.len(), values)?;
        log::info!(
            "Model input: {} rows x {} features",
            x.nrows(),
            feature_names.len()
        );

        Ok(Self {
            feature_names,
            lsoa_codes,
            months,
            target,
            x,
            dynamics: all_dynamics,
        })
    }
}
