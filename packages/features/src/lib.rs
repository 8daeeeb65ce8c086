#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area-month aggregation and feature engineering.
//!
//! [`grid::aggregate_monthly`] collapses incidents into a dense
//! [`grid::MonthlyGrid`]; [`table::build_features`] turns that grid and the
//! static reference indices into the wide [`table::FeatureTable`] the
//! forecaster trains on. Both are pure functions of their inputs: the same
//! incidents always produce the same table.

pub mod calendar;
pub mod grid;
pub mod series;
pub mod table;
pub mod wards;

/// Errors that can occur while aggregating or building features.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// No incidents survived filtering, so there is no month range.
    #[error("No incidents to aggregate")]
    EmptyInput,

    /// The grid is not a dense, (area, month)-sorted cross product.
    #[error("Grid row {index} is out of (area, month) order or the grid has gaps")]
    UnsortedGrid {
        /// Position of the first offending cell.
        index: usize,
    },
}
