#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reading and writing the pipeline's tabular files.
//!
//! Covers the monthly street-level extracts published by police.uk, the
//! static reference tables (deprivation deciles, population, stop-and-search
//! counts), the single-month cleaner, and atomic CSV output. Every reader
//! validates its header before touching a data row, so a file with a
//! missing column fails the run instead of silently producing zeros.

pub mod clean;
pub mod columns;
pub mod extracts;
pub mod output;
pub mod progress;
pub mod reference;

use std::path::PathBuf;

/// Errors that can occur while reading or writing pipeline tables.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from a table's header.
    #[error("{path}: missing required field '{column}'")]
    MissingColumn {
        /// File that was being read.
        path: PathBuf,
        /// Cleaned name of the missing column.
        column: String,
    },

    /// A cell could not be interpreted.
    #[error("{path}: row {row}: invalid {column} value '{value}'")]
    InvalidValue {
        /// File that was being read.
        path: PathBuf,
        /// 1-based data row number (header excluded).
        row: u64,
        /// Column the value came from.
        column: String,
        /// The offending cell.
        value: String,
    },

    /// The extract directory contains no CSV files.
    #[error("No extract CSV files found in {0}")]
    NoExtracts(PathBuf),
}
