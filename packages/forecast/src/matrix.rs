//! Feature matrices are `ndarray` arrays, one row per model row.

use ndarray::Array2;

use crate::ForecastError;

/// Stacks rows of equal width into an `n × cols` array.
///
/// # Errors
///
/// Returns [`ForecastError::DimensionMismatch`] if a row's width differs
/// from `cols`.
pub fn from_rows(cols: usize, rows: Vec<Vec<f64>>) -> Result<Array2<f64>, ForecastError> {
    if let Some(row) = rows.iter().find(|row| row.len() != cols) {
        return Err(ForecastError::DimensionMismatch {
            expected: cols,
            found: row.len(),
        });
    }
    let n = rows.len();
    Ok(Array2::from_shape_vec(
        (n, cols),
        rows.into_iter().flatten().collect(),
    )?)
}

/// Fails unless `x` has `cols` columns.
///
/// # Errors
///
/// Returns [`ForecastError::DimensionMismatch`].
pub fn expect_cols(x: &Array2<f64>, cols: usize) -> Result<(), ForecastError> {
    if x.ncols() == cols {
        Ok(())
    } else {
        Err(ForecastError::DimensionMismatch {
            expected: cols,
            found: x.ncols(),
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Axis, array};

    use super::*;

    #[test]
    fn stacks_rows_in_order() {
        let x = from_rows(2, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(x, array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        assert_eq!(x.select(Axis(0), &[2, 0]), array![[5.0, 6.0], [1.0, 2.0]]);
        assert_eq!(from_rows(3, Vec::new()).unwrap().dim(), (0, 3));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(matches!(
            from_rows(2, vec![vec![1.0, 2.0], vec![3.0]]),
            Err(ForecastError::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            expect_cols(&Array2::zeros((1, 2)), 3),
            Err(ForecastError::DimensionMismatch { expected: 3, found: 2 })
        ));
    }
}
