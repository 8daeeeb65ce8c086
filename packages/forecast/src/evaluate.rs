//! Month-based splits and regression metrics.

use std::fmt;

use burglary_map_crime_models::YearMonth;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// A partition of the model rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
    Test,
}

/// Month boundaries of the splits. Train is everything before
/// `train_end`, validation is `[train_end, validation_end)`, test is
/// everything from `test_start`. Months between `validation_end` and
/// `test_start` belong to no split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SplitConfig {
    pub train_end: YearMonth,
    pub validation_end: YearMonth,
    pub test_start: YearMonth,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_end: YearMonth::january(2023),
            validation_end: YearMonth::january(2024),
            test_start: YearMonth::january(2025),
        }
    }
}

impl SplitConfig {
    /// Every split `month` belongs to. Test may overlap the others when
    /// `test_start` is configured early.
    #[must_use]
    pub fn splits_of(&self, month: YearMonth) -> Vec<Split> {
        let mut splits = Vec::with_capacity(2);
        if month < self.train_end {
            splits.push(Split::Train);
        } else if month < self.validation_end {
            splits.push(Split::Validation);
        }
        if month >= self.test_start {
            splits.push(Split::Test);
        }
        splits
    }

    /// Row indices of `split`, given each row's month.
    #[must_use]
    pub fn indices(&self, months: &[YearMonth], split: Split) -> Vec<usize> {
        months
            .iter()
            .enumerate()
            .filter(|(_, m)| self.splits_of(**m).contains(&split))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Error metrics of one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub mae: f64,
    pub rmse: f64,
    /// Coefficient of determination; 0 when the targets have no variance.
    pub r2: f64,
    pub count: usize,
}

impl Metrics {
    /// Compares `predicted` with `actual`. `None` when there are no pairs.
    #[must_use]
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Option<Self> {
        let count = actual.len().min(predicted.len());
        if count == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        let pairs = || actual.iter().zip(predicted);

        let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
        let ss_res: f64 = pairs().map(|(a, p)| (a - p).powi(2)).sum();
        let mean = actual[..count].iter().sum::<f64>() / n;
        let ss_tot: f64 = actual[..count].iter().map(|a| (a - mean).powi(2)).sum();

        Some(Self {
            mae,
            rmse: (ss_res / n).sqrt(),
            r2: if ss_tot > 0.0 {
                1.0 - ss_res / ss_tot
            } else {
                0.0
            },
            count,
        })
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE: {:.3}, RMSE: {:.3}, R²: {:.3} ({} rows)",
            self.mae, self.rmse, self.r2, self.count
        )
    }
}
