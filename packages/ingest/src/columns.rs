//! Header normalization and column lookup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::IngestError;

/// Normalizes a header cell: strips a UTF-8 BOM and surrounding
/// whitespace, lower-cases, turns spaces into underscores and drops any
/// character that is not alphanumeric or `_`.
///
/// `"LSOA code (2011)"` becomes `"lsoa_code_2011"`.
#[must_use]
pub fn clean_column_name(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Cleaned header names of one file, with positions.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    path: PathBuf,
    names: Vec<String>,
    positions: BTreeMap<String, usize>,
}

impl HeaderIndex {
    /// Cleans every header cell. When two cells clean to the same name the
    /// first one wins.
    #[must_use]
    pub fn new(path: &Path, headers: &csv::StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(clean_column_name).collect();
        let mut positions = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(i);
        }
        Self {
            path: path.to_path_buf(),
            names,
            positions,
        }
    }

    /// Cleaned names in file order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn optional(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// Position of the first of `candidates` that is present.
    #[must_use]
    pub fn first_of(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|c| self.optional(c))
    }

    /// Position of `column`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MissingColumn`] if the header lacks it.
    pub fn require(&self, column: &str) -> Result<usize, IngestError> {
        self.optional(column)
            .ok_or_else(|| self.missing(column))
    }

    /// Position of the first of `candidates` that is present.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MissingColumn`] naming the first candidate if
    /// none is present.
    pub fn require_any(&self, candidates: &[&str]) -> Result<usize, IngestError> {
        self.first_of(candidates)
            .ok_or_else(|| self.missing(candidates.first().copied().unwrap_or_default()))
    }

    /// Builds the error reported when `column` is absent.
    #[must_use]
    pub fn missing(&self, column: &str) -> IngestError {
        IngestError::MissingColumn {
            path: self.path.clone(),
            column: column.to_owned(),
        }
    }
}

/// Returns the trimmed cell at `index`, or `None` if it is absent or empty.
#[must_use]
pub fn cell(record: &csv::StringRecord, index: usize) -> Option<&str> {
    record
        .get(index)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_police_uk_headers() {
        assert_eq!(clean_column_name("LSOA code"), "lsoa_code");
        assert_eq!(clean_column_name(" Crime type "), "crime_type");
        assert_eq!(clean_column_name("\u{feff}Crime ID"), "crime_id");
        assert_eq!(clean_column_name("LSOA code (2011)"), "lsoa_code_2011");
        assert_eq!(
            clean_column_name(
                "Index of Multiple Deprivation (IMD) Decile (where 1 is most deprived 10% of LSOAs)"
            ),
            "index_of_multiple_deprivation_imd_decile_where_1_is_most_deprived_10_of_lsoas"
        );
    }

    #[test]
    fn missing_column_names_file_and_field() {
        let headers = csv::StringRecord::from(vec!["Month", "Crime type"]);
        let index = HeaderIndex::new(Path::new("jan.csv"), &headers);
        assert_eq!(index.require("month").unwrap(), 0);

        let err = index.require("lsoa_code").unwrap_err();
        assert_eq!(
            err.to_string(),
            "jan.csv: missing required field 'lsoa_code'"
        );
    }

    #[test]
    fn first_matching_candidate_wins() {
        let headers = csv::StringRecord::from(vec!["Date", "Month"]);
        let index = HeaderIndex::new(Path::new("x.csv"), &headers);
        assert_eq!(index.require_any(&["month", "date"]).unwrap(), 1);
        assert!(index.require_any(&["total", "population"]).is_err());
    }

    #[test]
    fn empty_cells_are_none() {
        let record = csv::StringRecord::from(vec!["E01000001", "  ", ""]);
        assert_eq!(cell(&record, 0), Some("E01000001"));
        assert_eq!(cell(&record, 1), None);
        assert_eq!(cell(&record, 2), None);
        assert_eq!(cell(&record, 5), None);
    }
}
