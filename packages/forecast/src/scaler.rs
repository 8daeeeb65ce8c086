//! Median/IQR feature scaling.

use ndarray::{Array1, Array2, Axis};

use crate::ForecastError;
use crate::matrix::expect_cols;

/// Linear-interpolated quantile of sorted values (`q` in `[0, 1]`).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let position = q * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = position - position.floor();
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Centers each column on its median and scales by its interquartile
/// range. Columns with zero IQR are only centered.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustScaler {
    centers: Array1<f64>,
    scales: Array1<f64>,
}

impl RobustScaler {
    #[must_use]
    pub fn fit(x: &Array2<f64>) -> Self {
        let mut centers = Array1::zeros(x.ncols());
        let mut scales = Array1::ones(x.ncols());
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            let mut sorted = column.to_vec();
            sorted.sort_by(f64::total_cmp);
            let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);
            centers[j] = quantile(&sorted, 0.5);
            if iqr > 0.0 {
                scales[j] = iqr;
            }
        }
        Self { centers, scales }
    }

    /// Scales `x` with the fitted statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::DimensionMismatch`] if `x` has a different
    /// column count than the matrix the scaler was fitted on.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ForecastError> {
        expect_cols(x, self.centers.len())?;
        Ok((x - &self.centers) / &self.scales)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn scales_by_median_and_iqr() {
        // Column 0: 1..=5, median 3, q1 2, q3 4. Column 1 constant.
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0], [4.0, 7.0], [5.0, 7.0]];
        let scaler = RobustScaler::fit(&x);
        let scaled = scaler.transform(&x).unwrap();

        assert_eq!(scaled.column(0).to_vec(), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert!(scaled.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn interpolates_quantiles() {
        let sorted = [0.0, 10.0];
        assert!((quantile(&sorted, 0.25) - 2.5).abs() < 1e-12);
        assert!((quantile(&sorted, 0.5) - 5.0).abs() < 1e-12);
        assert!((quantile(&[4.0], 0.75) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_other_widths() {
        let scaler = RobustScaler::fit(&array![[1.0]]);
        assert!(scaler.transform(&array![[1.0, 2.0]]).is_err());
    }
}
