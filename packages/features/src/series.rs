//! Lag and trailing-window statistics over one area's monthly series.
//!
//! All functions take an index `i` that may equal `series.len()`, which
//! asks for the value as it would be seen in the month after the last
//! observation.

/// Lag offsets, in months.
pub const LAGS: [usize; 5] = [1, 2, 3, 6, 12];

/// Trailing window lengths, in months.
pub const WINDOWS: [usize; 3] = [3, 6, 12];

/// The value `lag` months before `i`, or `None` if the series has not
/// started yet.
#[must_use]
pub fn lag_at(series: &[f64], i: usize, lag: usize) -> Option<f64> {
    i.checked_sub(lag).and_then(|j| series.get(j).copied())
}

/// The `window` values strictly before `i`. `None` unless all of them
/// exist.
#[must_use]
pub fn trailing_window(series: &[f64], i: usize, window: usize) -> Option<&[f64]> {
    let start = i.checked_sub(window)?;
    series.get(start..i)
}

/// Up to `window` values ending at and including `i`.
#[must_use]
pub fn window_ending_at(series: &[f64], i: usize, window: usize) -> &[f64] {
    let end = (i + 1).min(series.len());
    let start = (i + 1).saturating_sub(window).min(end);
    &series[start..end]
}

#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (`n - 1` denominator). `None` for fewer than
/// two values.
#[must_use]
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let squares: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    #[allow(clippy::cast_precision_loss)]
    Some((squares / (values.len() - 1) as f64).sqrt())
}

/// Relative change from `lag` months earlier. `None` before the series has
/// `lag` months of history or when the earlier value is zero.
#[must_use]
pub fn pct_change(series: &[f64], i: usize, lag: usize) -> Option<f64> {
    let previous = lag_at(series, i, lag)?;
    let current = *series.get(i)?;
    let change = (current - previous) / previous;
    change.is_finite().then_some(change)
}

/// Mean, standard deviation and sum over one trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub sum: Option<f64>,
}

impl RollingStats {
    #[must_use]
    pub fn trailing(series: &[f64], i: usize, window: usize) -> Self {
        trailing_window(series, i, window).map_or_else(Self::default, |values| Self {
            mean: mean(values),
            std: sample_std(values),
            sum: Some(values.iter().sum()),
        })
    }
}

/// Lags and rolling statistics of a burglary series at one index, before
/// any missing-value fill.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct History {
    /// Aligned with [`LAGS`].
    pub lags: [Option<f64>; LAGS.len()],
    /// Aligned with [`WINDOWS`].
    pub rolling: [RollingStats; WINDOWS.len()],
}

impl History {
    #[must_use]
    pub fn at(series: &[f64], i: usize) -> Self {
        Self {
            lags: LAGS.map(|lag| lag_at(series, i, lag)),
            rolling: WINDOWS.map(|window| RollingStats::trailing(series, i, window)),
        }
    }

    /// The one-month lag, still `None` at the start of a series.
    #[must_use]
    pub const fn lag_1(&self) -> Option<f64> {
        self.lags[0]
    }
}
