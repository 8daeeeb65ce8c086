//! The regression boundary and the built-in regressors.
//!
//! The pipeline only ever sees [`Regressor`] and [`Model`]; any learner
//! that can fit a matrix and predict from one plugs in here.

use gbdt::config::Config as GbdtConfig;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::ForecastError;
use crate::matrix::expect_cols;

/// A fitted predictor.
pub trait Model {
    fn name(&self) -> &str;

    /// Predicts one value per row of `x`.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::DimensionMismatch`] if `x` does not have the
    /// column count the model was fitted on.
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ForecastError>;

    /// Per-feature weights, aligned with the training columns, if the
    /// model has them.
    fn feature_weights(&self) -> Option<&[f64]> {
        None
    }
}

/// Something that can be trained into a [`Model`].
pub trait Regressor {
    /// Fits a model on `x` and targets `y`.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` and `y` disagree in length, if there are no
    /// rows, or if the learner cannot be fitted.
    fn fit(&self, x: &Array2<f64>, y: &[f64]) -> Result<Box<dyn Model>, ForecastError>;
}

fn check_training_shape(x: &Array2<f64>, y: &[f64]) -> Result<(), ForecastError> {
    if x.nrows() != y.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: x.nrows(),
            found: y.len(),
        });
    }
    if y.is_empty() {
        return Err(ForecastError::EmptySplit { split: "train" });
    }
    Ok(())
}

/// Built-in learners selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelKind {
    Mean,
    Ridge,
    #[default]
    Boosted,
}

impl ModelKind {
    /// Instantiates the learner. `ridge_alpha` only applies to ridge and
    /// `boosted` only to the tree ensemble.
    #[must_use]
    pub fn regressor(self, ridge_alpha: f64, boosted: &BoostedTreesConfig) -> Box<dyn Regressor> {
        match self {
            Self::Mean => Box::new(MeanRegressor),
            Self::Ridge => Box::new(RidgeRegressor::new(ridge_alpha)),
            Self::Boosted => Box::new(BoostedTreesRegressor::new(*boosted)),
        }
    }
}

/// Predicts the training mean for every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanRegressor;

struct MeanModel {
    cols: usize,
    mean: f64,
}

impl Model for MeanModel {
    fn name(&self) -> &str {
        "mean"
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ForecastError> {
        expect_cols(x, self.cols)?;
        Ok(vec![self.mean; x.nrows()])
    }
}

impl Regressor for MeanRegressor {
    fn fit(&self, x: &Array2<f64>, y: &[f64]) -> Result<Box<dyn Model>, ForecastError> {
        check_training_shape(x, y)?;
        #[allow(clippy::cast_precision_loss)]
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        Ok(Box::new(MeanModel {
            cols: x.ncols(),
            mean,
        }))
    }
}

/// Linear least squares with an L2 penalty on the coefficients (not the
/// intercept), solved in closed form.
#[derive(Debug, Clone, Copy)]
pub struct RidgeRegressor {
    alpha: f64,
}

impl RidgeRegressor {
    /// Negative penalties are treated as 0.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.max(0.0),
        }
    }
}

struct RidgeModel {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl Model for RidgeModel {
    fn name(&self) -> &str {
        "ridge"
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ForecastError> {
        expect_cols(x, self.coefficients.len())?;
        let predicted = x.dot(&ArrayView1::from(&self.coefficients)) + self.intercept;
        Ok(predicted.to_vec())
    }

    fn feature_weights(&self) -> Option<&[f64]> {
        Some(&self.coefficients)
    }
}

impl Regressor for RidgeRegressor {
    fn fit(&self, x: &Array2<f64>, y: &[f64]) -> Result<Box<dyn Model>, ForecastError> {
        check_training_shape(x, y)?;
        let p = x.ncols();
        let x_means = x
            .mean_axis(Axis(0))
            .ok_or(ForecastError::EmptySplit { split: "train" })?;
        let y = ArrayView1::from(y);
        let y_mean = y.mean().ok_or(ForecastError::EmptySplit { split: "train" })?;

        // Normal equations on centered data: (XᵀX + αI) w = Xᵀy.
        let centered = x - &x_means;
        let mut gram = centered.t().dot(&centered);
        gram.diag_mut().map_inplace(|v| *v += self.alpha);
        let rhs = centered.t().dot(&(&y - y_mean));

        let gram = DMatrix::from_row_iterator(p, p, gram.iter().copied());
        let rhs = DVector::from_iterator(p, rhs.iter().copied());
        let solution = gram.lu().solve(&rhs).ok_or(ForecastError::Singular)?;
        if solution.iter().any(|w| !w.is_finite()) {
            return Err(ForecastError::Singular);
        }

        let coefficients = Array1::from_iter(solution.iter().copied());
        let intercept = y_mean - x_means.dot(&coefficients);

        Ok(Box::new(RidgeModel {
            intercept,
            coefficients: coefficients.to_vec(),
        }))
    }
}

/// Hyperparameters of the gradient-boosted tree ensemble. The defaults
/// are the tuned values the forecast was calibrated with.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoostedTreesConfig {
    /// Boosting rounds.
    pub iterations: usize,
    pub max_depth: u32,
    /// Shrinkage applied to every tree.
    pub learning_rate: f64,
    /// Minimum number of rows in a leaf.
    pub min_leaf_size: usize,
    /// Fraction of rows sampled per round.
    pub data_sample_ratio: f64,
    /// Fraction of features sampled per round.
    pub feature_sample_ratio: f64,
}

impl Default for BoostedTreesConfig {
    fn default() -> Self {
        Self {
            iterations: 500,
            max_depth: 5,
            learning_rate: 0.219_444_014_415_443_7,
            min_leaf_size: 3,
            data_sample_ratio: 0.718_124_691_088_876,
            feature_sample_ratio: 0.774_372_952_290_252_2,
        }
    }
}

/// Rows used to measure feature importance after training.
const IMPORTANCE_SAMPLE: usize = 2_000;

/// Gradient-boosted regression trees (squared error) from the `gbdt`
/// crate. Feature weights are permutation importances on the training
/// rows, normalized to sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct BoostedTreesRegressor {
    config: BoostedTreesConfig,
}

impl BoostedTreesRegressor {
    #[must_use]
    pub const fn new(config: BoostedTreesConfig) -> Self {
        Self { config }
    }

    fn gbdt_config(&self, features: usize) -> GbdtConfig {
        let mut cfg = GbdtConfig::new();
        cfg.set_feature_size(features);
        cfg.set_max_depth(self.config.max_depth);
        cfg.set_iterations(self.config.iterations);
        #[allow(clippy::cast_possible_truncation)]
        let shrinkage = self.config.learning_rate as f32;
        cfg.set_shrinkage(shrinkage);
        cfg.set_min_leaf_size(self.config.min_leaf_size);
        cfg.set_data_sample_ratio(self.config.data_sample_ratio);
        cfg.set_feature_sample_ratio(self.config.feature_sample_ratio);
        cfg.set_loss("SquaredError");
        cfg.set_debug(false);
        cfg
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_features(row: ArrayView1<'_, f64>) -> Vec<f32> {
    row.iter().map(|&v| v as f32).collect()
}

struct BoostedTreesModel {
    cols: usize,
    gbdt: GBDT,
    importances: Vec<f64>,
}

impl Model for BoostedTreesModel {
    fn name(&self) -> &str {
        "boosted"
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ForecastError> {
        expect_cols(x, self.cols)?;
        let data: DataVec = x
            .outer_iter()
            .map(|row| Data::new_test_data(to_features(row), None))
            .collect();
        Ok(self.gbdt.predict(&data).into_iter().map(f64::from).collect())
    }

    fn feature_weights(&self) -> Option<&[f64]> {
        Some(&self.importances)
    }
}

impl Regressor for BoostedTreesRegressor {
    fn fit(&self, x: &Array2<f64>, y: &[f64]) -> Result<Box<dyn Model>, ForecastError> {
        check_training_shape(x, y)?;
        #[allow(clippy::cast_possible_truncation)]
        let mut data: DataVec = x
            .outer_iter()
            .zip(y)
            .map(|(row, &label)| Data::new_training_data(to_features(row), 1.0, label as f32, None))
            .collect();

        let mut gbdt = GBDT::new(&self.gbdt_config(x.ncols()));
        gbdt.fit(&mut data);
        log::debug!(
            "Fitted {} boosting rounds of depth {}",
            self.config.iterations,
            self.config.max_depth
        );

        let mut model = BoostedTreesModel {
            cols: x.ncols(),
            gbdt,
            importances: Vec::new(),
        };
        model.importances = permutation_importance(&model, x, y)?;
        Ok(Box::new(model))
    }
}

fn mean_squared_error(actual: ArrayView1<'_, f64>, predicted: &[f64]) -> f64 {
    let n = predicted.len().max(1);
    #[allow(clippy::cast_precision_loss)]
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n as f64;
    mse
}

/// Increase in training error when each column is shuffled, clipped at 0
/// and normalized to sum to 1 (all zeros if no column matters).
///
/// Shuffling rotates the column by one row, so the result is
/// deterministic. At most [`IMPORTANCE_SAMPLE`] evenly spaced rows are used.
fn permutation_importance(
    model: &dyn Model,
    x: &Array2<f64>,
    y: &[f64],
) -> Result<Vec<f64>, ForecastError> {
    let stride = x.nrows().div_ceil(IMPORTANCE_SAMPLE).max(1);
    let rows: Vec<usize> = (0..x.nrows()).step_by(stride).collect();
    let sample = x.select(Axis(0), &rows);
    let actual = ArrayView1::from(y).select(Axis(0), &rows);
    let baseline = mean_squared_error(actual.view(), &model.predict(&sample)?);

    let mut importances = Vec::with_capacity(x.ncols());
    for j in 0..x.ncols() {
        let mut permuted = sample.clone();
        let column = sample.column(j);
        let n = column.len();
        for (i, value) in permuted.column_mut(j).iter_mut().enumerate() {
            *value = column[(i + 1) % n];
        }
        let error = mean_squared_error(actual.view(), &model.predict(&permuted)?);
        importances.push((error - baseline).max(0.0));
    }

    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for importance in &mut importances {
            *importance /= total;
        }
    }
    Ok(importances)
}
