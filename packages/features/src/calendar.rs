//! Month-of-year features.

use std::f64::consts::TAU;

use burglary_map_crime_models::YearMonth;

/// Calendar features of one month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthFeatures {
    /// 1 = January.
    pub month_num: u32,
    pub quarter: u32,
    /// `sin(2π·month/12)`.
    pub month_sin: f64,
    /// `cos(2π·month/12)`.
    pub month_cos: f64,
    /// December, January or February.
    pub is_winter: bool,
    /// November or December.
    pub is_holiday_season: bool,
}

impl MonthFeatures {
    #[must_use]
    pub fn of(month: YearMonth) -> Self {
        let month_num = month.month();
        let angle = TAU * f64::from(month_num) / 12.0;
        Self {
            month_num,
            quarter: month.quarter(),
            month_sin: angle.sin(),
            month_cos: angle.cos(),
            is_winter: matches!(month_num, 12 | 1 | 2),
            is_holiday_season: matches!(month_num, 11 | 12),
        }
    }
}
