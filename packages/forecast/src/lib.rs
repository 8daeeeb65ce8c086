#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Burglary forecasting from the feature table.
//!
//! [`run_forecast`] widens the table into a numeric matrix, scales it,
//! trains whatever [`Regressor`](model::Regressor) it is given on the
//! training months, reports metrics per split, and predicts the month
//! after the latest observation for every area.

pub mod evaluate;
pub mod export;
pub mod inputs;
pub mod matrix;
pub mod model;
pub mod next_month;
pub mod scaler;

use burglary_map_features::table::FeatureTable;
use ndarray::Axis;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::evaluate::{Metrics, Split, SplitConfig};
use crate::export::{PredictionRow, TestPredictionRow, clip_round};
use crate::inputs::ModelInput;
use crate::model::Regressor;
use crate::next_month::next_month_input;
use crate::scaler::RobustScaler;

/// Number of feature weights reported after training.
const REPORTED_WEIGHTS: usize = 20;

/// Errors that can occur while training or applying a model.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A split required for training has no rows.
    #[error("The {split} split has no rows")]
    EmptySplit { split: &'static str },

    /// Matrix or vector lengths disagree.
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// The normal equations have no unique solution.
    #[error("Singular system; try a positive ridge penalty")]
    Singular,

    /// Rows could not be shaped into a matrix.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

/// The phases of [`run_forecast`], reported as each one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ForecastStage {
    Train,
    Evaluate,
    Predict,
}

/// Everything a forecast run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOutcome {
    pub model_name: String,
    /// Metrics of every non-empty split.
    pub metrics: Vec<(Split, Metrics)>,
    /// Sorted by descending magnitude. Empty for models without weights.
    pub feature_weights: Vec<(String, f64)>,
    pub test_predictions: Vec<TestPredictionRow>,
    pub next_month: Vec<PredictionRow>,
}

/// Trains `regressor` on `table` and forecasts the following month.
/// `on_stage` is called as each [`ForecastStage`] begins.
///
/// # Errors
///
/// * [`ForecastError::EmptySplit`] if no rows fall before
///   `splits.train_end`
/// * Any error of the regressor
pub fn run_forecast(
    table: &FeatureTable,
    splits: &SplitConfig,
    regressor: &dyn Regressor,
    on_stage: &mut dyn FnMut(ForecastStage),
) -> Result<ForecastOutcome, ForecastError> {
    on_stage(ForecastStage::Train);
    let input = ModelInput::from_table(table)?;
    let scaler = RobustScaler::fit(&input.x);
    let x = scaler.transform(&input.x)?;

    let train = splits.indices(&input.months, Split::Train);
    if train.is_empty() {
        return Err(ForecastError::EmptySplit { split: "train" });
    }
    let y_train: Vec<f64> = train.iter().map(|&i| input.target[i]).collect();
    let model = regressor.fit(&x.select(Axis(0), &train), &y_train)?;
    log::info!("Trained {} model on {} rows", model.name(), train.len());

    on_stage(ForecastStage::Evaluate);
    let mut metrics = Vec::new();
    let mut test_predictions = Vec::new();
    for split in [Split::Train, Split::Validation, Split::Test] {
        let indices = splits.indices(&input.months, split);
        if indices.is_empty() {
            log::warn!("The {split} split has no rows; skipping its metrics");
            continue;
        }
        let predicted = model.predict(&x.select(Axis(0), &indices))?;
        let actual: Vec<f64> = indices.iter().map(|&i| input.target[i]).collect();
        if let Some(m) = Metrics::compute(&actual, &predicted) {
            log::info!("{split}: {m}");
            metrics.push((split, m));
        }

        if split == Split::Test {
            test_predictions = indices
                .iter()
                .zip(predicted)
                .map(|(&i, pred)| TestPredictionRow {
                    lsoa_code: input.lsoa_codes[i].clone(),
                    year_month: input.months[i],
                    burglary_count: table.rows[i].burglary_count,
                    pred,
                })
                .collect();
        }
    }

    let feature_weights = ranked_weights(&input.feature_names, model.feature_weights());
    for (name, weight) in feature_weights.iter().take(REPORTED_WEIGHTS) {
        log::info!("  {name}: {weight:.4}");
    }

    on_stage(ForecastStage::Predict);
    let next_month = match next_month_input(table)? {
        Some(next) => {
            let predicted = model.predict(&scaler.transform(&next.x)?)?;
            next.lsoa_codes
                .into_iter()
                .zip(predicted)
                .map(|(lsoa_code, value)| PredictionRow {
                    lsoa_code,
                    year_month: next.month,
                    predicted_burglary: clip_round(value),
                })
                .collect()
        }
        None => Vec::new(),
    };
    log::info!("Forecast {} areas for the next month", next_month.len());

    Ok(ForecastOutcome {
        model_name: model.name().to_owned(),
        metrics,
        feature_weights,
        test_predictions,
        next_month,
    })
}

fn ranked_weights(names: &[String], weights: Option<&[f64]>) -> Vec<(String, f64)> {
    let Some(weights) = weights else {
        return Vec::new();
    };
    let mut ranked: Vec<(String, f64)> =
        names.iter().cloned().zip(weights.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    ranked
}
