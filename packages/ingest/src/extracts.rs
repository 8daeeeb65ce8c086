//! Monthly street-level crime extracts.
//!
//! One CSV per force per month, one row per incident. Only the LSOA code,
//! month and crime type are required; coordinates are kept when present.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use burglary_map_crime_models::{CrimeType, Incident, YearMonth, normalize_crime_type};

use crate::IngestError;
use crate::columns::{HeaderIndex, cell};
use crate::progress::ExtractProgress;

/// Resolved positions of the columns an extract must provide.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExtractColumns {
    lsoa_code: usize,
    crime_type: usize,
    /// `month` (`YYYY-MM`) or, in older exports, a full `date`.
    month: usize,
    longitude: Option<usize>,
    latitude: Option<usize>,
}

/// Why a row was not turned into an [`Incident`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowRejection {
    OutsideArea,
    MissingField,
}

impl ExtractColumns {
    pub(crate) fn resolve(header: &HeaderIndex) -> Result<Self, IngestError> {
        let lsoa_code = header.require("lsoa_code")?;
        let crime_type = header.require("crime_type")?;
        let month = header
            .first_of(&["month", "date"])
            .ok_or_else(|| header.missing("month"))?;

        Ok(Self {
            lsoa_code,
            crime_type,
            month,
            longitude: header.optional("longitude"),
            latitude: header.optional("latitude"),
        })
    }

    pub(crate) fn parse(
        &self,
        record: &csv::StringRecord,
        area_prefix: &str,
    ) -> Result<Incident, RowRejection> {
        let lsoa_code = cell(record, self.lsoa_code).ok_or(RowRejection::MissingField)?;
        if !lsoa_code.starts_with(area_prefix) {
            return Err(RowRejection::OutsideArea);
        }

        let month = cell(record, self.month)
            .and_then(|s| s.parse::<YearMonth>().ok())
            .ok_or(RowRejection::MissingField)?;

        let crime_type = cell(record, self.crime_type)
            .map(normalize_crime_type)
            .ok_or(RowRejection::MissingField)?;

        let coordinate = |index: Option<usize>| {
            index
                .and_then(|i| cell(record, i))
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        Ok(Incident {
            lsoa_code: lsoa_code.to_owned(),
            month,
            crime_type,
            longitude: coordinate(self.longitude),
            latitude: coordinate(self.latitude),
        })
    }
}

/// Row counts from the filtering steps, for reporting data loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub rows_read: u64,
    /// Rows whose area code is outside the configured namespace.
    pub outside_area: u64,
    /// Rows missing (or with unparseable) area code, month or category.
    pub missing_fields: u64,
    pub kept: u64,
}

impl FilterStats {
    pub(crate) fn record(&mut self, outcome: Result<(), RowRejection>) {
        self.rows_read += 1;
        match outcome {
            Ok(()) => self.kept += 1,
            Err(RowRejection::OutsideArea) => self.outside_area += 1,
            Err(RowRejection::MissingField) => self.missing_fields += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.rows_read += other.rows_read;
        self.outside_area += other.outside_area;
        self.missing_fields += other.missing_fields;
        self.kept += other.kept;
    }
}

/// Incidents read from one or more extracts.
#[derive(Debug, Clone, Default)]
pub struct ExtractBatch {
    pub incidents: Vec<Incident>,
    pub stats: FilterStats,
}

/// Lists the `.csv` files in `dir`, sorted by file name.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn list_extract_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads one extract, keeping rows inside `area_prefix` that have an area
/// code, month and category.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] before reading any row if the
/// header lacks `lsoa_code`, `crime_type`, or both `month` and `date`.
pub fn read_extract(path: &Path, area_prefix: &str) -> Result<ExtractBatch, IngestError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header = HeaderIndex::new(path, reader.headers()?);
    let columns = ExtractColumns::resolve(&header)?;

    let mut batch = ExtractBatch::default();
    for result in reader.records() {
        let record = result?;
        match columns.parse(&record, area_prefix) {
            Ok(incident) => {
                batch.stats.record(Ok(()));
                batch.incidents.push(incident);
            }
            Err(rejection) => batch.stats.record(Err(rejection)),
        }
    }

    log::debug!(
        "{}: kept {} of {} rows",
        path.display(),
        batch.stats.kept,
        batch.stats.rows_read
    );
    Ok(batch)
}

/// Reads and concatenates every extract in `dir`.
///
/// # Errors
///
/// Returns [`IngestError::NoExtracts`] if the directory has no CSV files,
/// or the first error from [`read_extract`].
pub fn read_extract_dir(
    dir: &Path,
    area_prefix: &str,
    progress: &dyn ExtractProgress,
) -> Result<ExtractBatch, IngestError> {
    let files = list_extract_files(dir)?;
    log::info!("Found {} CSV file(s) in {}", files.len(), dir.display());
    if files.is_empty() {
        return Err(IngestError::NoExtracts(dir.to_path_buf()));
    }

    progress.start(files.len());

    let mut combined = ExtractBatch::default();
    for path in &files {
        let batch = read_extract(path, area_prefix)?;
        progress.file_read(path, &batch.stats);
        combined.stats.merge(batch.stats);
        combined.incidents.extend(batch.incidents);
    }
    progress.finish(&combined.stats);

    let stats = combined.stats;
    log::info!(
        "Read {} rows: kept {}, {} outside area prefix '{area_prefix}', {} missing area/month/category",
        stats.rows_read,
        stats.kept,
        stats.outside_area,
        stats.missing_fields
    );
    if stats.missing_fields > 0 {
        log::warn!(
            "Dropped {} rows with a missing or unparseable area code, month or category",
            stats.missing_fields
        );
    }

    let unknown: BTreeSet<&str> = combined
        .incidents
        .iter()
        .map(|i| i.crime_type.as_str())
        .filter(|t| CrimeType::from_normalized(t).is_none())
        .collect();
    if !unknown.is_empty() {
        log::debug!("Categories outside the police.uk taxonomy: {unknown:?}");
    }

    Ok(combined)
}
