//! Single-month extract cleaner.
//!
//! Turns one raw police.uk street-level CSV into a tidy file holding only
//! the study-area rows and the columns the pipeline uses.

use std::path::{Path, PathBuf};

use crate::IngestError;
use crate::columns::{HeaderIndex, cell};
use crate::extracts::{ExtractColumns, FilterStats};
use crate::output::write_records_atomic;

/// Columns every cleaned file carries, in order.
pub const CLEANED_COLUMNS: &[&str] = &["lsoa_code", "month", "crime_type", "longitude", "latitude"];

/// Descriptive columns copied through when the raw file has them.
pub const PASSTHROUGH_COLUMNS: &[&str] = &["falls_within", "context", "reported_by"];

/// What [`clean_single_month`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanSummary {
    pub output: PathBuf,
    pub stats: FilterStats,
    /// Cleaned names of the passthrough columns that were present.
    pub passthrough: Vec<String>,
}

/// Default output location: `processed_<file name>` next to the input.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map_or_else(|| "extract.csv".into(), |n| n.to_string_lossy().into_owned());
    input.with_file_name(format!("processed_{name}"))
}

/// Cleans one raw extract into `output`.
///
/// Rows outside `area_prefix` or missing an area code, month or category
/// are dropped; the category is lower-cased and the month written as
/// `YYYY-MM`.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if a required column is absent,
/// or any I/O or CSV error from reading or writing.
pub fn clean_single_month(
    input: &Path,
    output: &Path,
    area_prefix: &str,
) -> Result<CleanSummary, IngestError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(input)?;
    let header = HeaderIndex::new(input, reader.headers()?);
    let columns = ExtractColumns::resolve(&header)?;

    let passthrough: Vec<(String, usize)> = PASSTHROUGH_COLUMNS
        .iter()
        .filter_map(|name| header.optional(name).map(|i| ((*name).to_owned(), i)))
        .collect();

    let mut headers: Vec<String> = CLEANED_COLUMNS.iter().map(|c| (*c).to_owned()).collect();
    headers.extend(passthrough.iter().map(|(name, _)| name.clone()));

    let mut stats = FilterStats::default();
    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let outcome = columns.parse(&record, area_prefix);
        stats.record(outcome.as_ref().map(|_| ()).map_err(|r| *r));
        let Ok(incident) = outcome else {
            continue;
        };

        let coordinate = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
        let mut row = vec![
            incident.lsoa_code,
            incident.month.to_string(),
            incident.crime_type,
            coordinate(incident.longitude),
            coordinate(incident.latitude),
        ];
        row.extend(
            passthrough
                .iter()
                .map(|(_, i)| cell(&record, *i).unwrap_or_default().to_owned()),
        );
        records.push(row);
    }

    write_records_atomic(output, &headers, &records)?;

    log::info!(
        "Cleaned {}: kept {} of {} rows ({} outside area, {} missing fields) -> {}",
        input.display(),
        stats.kept,
        stats.rows_read,
        stats.outside_area,
        stats.missing_fields,
        output.display()
    );

    Ok(CleanSummary {
        output: output.to_path_buf(),
        stats,
        passthrough: passthrough.into_iter().map(|(name, _)| name).collect(),
    })
}
