//! Static per-area reference tables.
//!
//! The English Indices of Deprivation 2019 file and the ONS mid-year
//! population estimates are both published as `;`-delimited exports with
//! long human-readable headers. Headers are cleaned with
//! [`clean_column_name`](crate::columns::clean_column_name) and matched
//! against the published names, with short aliases accepted so that
//! pre-processed files work too.

use std::collections::BTreeMap;
use std::path::Path;

use burglary_map_crime_models::{StopSearchCounts, YearMonth};
use burglary_map_geography_models::{Decile, DeprivationDomain, ReferenceIndices};

use crate::IngestError;
use crate::columns::{HeaderIndex, cell};

const DEPRIVATION_KEY_COLUMNS: &[&str] = &["lsoa_code_2011", "lsoa_code", "lsoa11cd"];
const POPULATION_KEY_COLUMNS: &[&str] = &["lsoa_2021_code", "lsoa_code", "lsoa21cd"];
const POPULATION_VALUE_COLUMNS: &[&str] = &["total", "population"];

fn reader(path: &Path, delimiter: u8) -> Result<csv::Reader<std::fs::File>, IngestError> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?)
}

fn invalid(path: &Path, row: u64, column: &str, value: &str) -> IngestError {
    IngestError::InvalidValue {
        path: path.to_path_buf(),
        row,
        column: column.to_owned(),
        value: value.to_owned(),
    }
}

/// Parses a decile cell such as `"3"` or `"3.0"`.
fn parse_decile(value: &str) -> Option<Decile> {
    let number = value.parse::<f64>().ok()?;
    if number.fract() != 0.0 || !(1.0..=10.0).contains(&number) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Decile::new(number as u8).ok()
}

/// Parses a count cell, tolerating thousands separators.
fn parse_number(value: &str) -> Option<f64> {
    value
        .replace([',', ' '], "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Reads the deprivation deciles for each LSOA.
///
/// Each domain is looked up under its short feature name first
/// (`imd_decile_2019`), then under the published long name. Every domain
/// must be present.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if the key or any domain column
/// is absent, or [`IngestError::InvalidValue`] for a decile outside 1-10.
pub fn read_deprivation(
    path: &Path,
    delimiter: u8,
) -> Result<BTreeMap<String, BTreeMap<DeprivationDomain, Decile>>, IngestError> {
    let mut reader = reader(path, delimiter)?;
    let header = HeaderIndex::new(path, reader.headers()?);
    let key = header.require_any(DEPRIVATION_KEY_COLUMNS)?;

    let mut domains = Vec::with_capacity(DeprivationDomain::all().len());
    for &domain in DeprivationDomain::all() {
        let index = header.require_any(&[domain.column(), domain.source_column()])?;
        domains.push((domain, index));
    }

    let mut table = BTreeMap::new();
    for (row, result) in (1u64..).zip(reader.records()) {
        let record = result?;
        let Some(lsoa_code) = cell(&record, key) else {
            continue;
        };

        let mut deciles = BTreeMap::new();
        for &(domain, index) in &domains {
            let Some(value) = cell(&record, index) else {
                continue;
            };
            let decile =
                parse_decile(value).ok_or_else(|| invalid(path, row, domain.column(), value))?;
            deciles.insert(domain, decile);
        }
        table.insert(lsoa_code.to_owned(), deciles);
    }

    log::info!("Loaded deprivation deciles for {} areas", table.len());
    Ok(table)
}

/// Reads the resident population of each LSOA.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if the key or total column is
/// absent, or [`IngestError::InvalidValue`] for a non-numeric total.
pub fn read_population(path: &Path, delimiter: u8) -> Result<BTreeMap<String, f64>, IngestError> {
    let mut reader = reader(path, delimiter)?;
    let header = HeaderIndex::new(path, reader.headers()?);
    let key = header.require_any(POPULATION_KEY_COLUMNS)?;
    let total = header.require_any(POPULATION_VALUE_COLUMNS)?;

    let mut table = BTreeMap::new();
    for (row, result) in (1u64..).zip(reader.records()) {
        let record = result?;
        let Some(lsoa_code) = cell(&record, key) else {
            continue;
        };
        let Some(value) = cell(&record, total) else {
            continue;
        };
        let population = parse_number(value).ok_or_else(|| invalid(path, row, "total", value))?;
        table.insert(lsoa_code.to_owned(), population);
    }

    log::info!("Loaded population for {} areas", table.len());
    Ok(table)
}

/// Loads both reference tables and merges them into one profile per area.
///
/// # Errors
///
/// Propagates errors from [`read_deprivation`] and [`read_population`].
pub fn load_reference_indices(
    deprivation_path: &Path,
    population_path: &Path,
    delimiter: u8,
) -> Result<ReferenceIndices, IngestError> {
    let mut indices = ReferenceIndices::default();
    for (lsoa_code, deciles) in read_deprivation(deprivation_path, delimiter)? {
        indices.set_deciles(&lsoa_code, deciles);
    }
    for (lsoa_code, population) in read_population(population_path, delimiter)? {
        indices.set_population(&lsoa_code, population);
    }
    Ok(indices)
}

/// Reads pre-aggregated stop-and-search counts
/// (`lsoa_code, month, stop_and_search_count`, comma-delimited).
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if a column is absent, or
/// [`IngestError::InvalidValue`] for an unparseable month or count.
pub fn read_stop_search(path: &Path) -> Result<StopSearchCounts, IngestError> {
    let mut reader = reader(path, b',')?;
    let header = HeaderIndex::new(path, reader.headers()?);
    let key = header.require("lsoa_code")?;
    let month = header.require("month")?;
    let count = header.require("stop_and_search_count")?;

    let mut counts = StopSearchCounts::new();
    for (row, result) in (1u64..).zip(reader.records()) {
        let record = result?;
        let Some(lsoa_code) = cell(&record, key) else {
            continue;
        };
        let month_value = cell(&record, month).unwrap_or_default();
        let parsed_month = month_value
            .parse::<YearMonth>()
            .map_err(|_| invalid(path, row, "month", month_value))?;
        let count_value = cell(&record, count).unwrap_or("0");
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let parsed_count = parse_number(count_value)
            .ok_or_else(|| invalid(path, row, "stop_and_search_count", count_value))?
            .round() as u32;

        *counts
            .entry((lsoa_code.to_owned(), parsed_month))
            .or_default() += parsed_count;
    }

    log::info!("Loaded {} stop-and-search area-months", counts.len());
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    const IOD_HEADER: &str = "LSOA code (2011);LSOA name (2011);\
        Index of Multiple Deprivation (IMD) Decile (where 1 is most deprived 10% of LSOAs);\
        Income Decile (where 1 is most deprived 10% of LSOAs);\
        Employment Decile (where 1 is most deprived 10% of LSOAs);\
        Crime Decile (where 1 is most deprived 10% of LSOAs);\
        Health Deprivation and Disability Decile (where 1 is most deprived 10% of LSOAs)\n";

    #[test]
    fn reads_published_deprivation_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "iod.csv",
            &format!("{IOD_HEADER}E01000001;City of London 001A;9;10;10;5;10\nE01000002;City of London 001B;3.0;4;;2;1\n"),
        );

        let table = read_deprivation(&path, b';').unwrap();
        assert_eq!(table.len(), 2);
        let first = &table["E01000001"];
        assert_eq!(first[&DeprivationDomain::Imd].value(), 9);
        assert_eq!(first[&DeprivationDomain::Crime].value(), 5);
        let second = &table["E01000002"];
        assert_eq!(second[&DeprivationDomain::Imd].value(), 3);
        assert!(!second.contains_key(&DeprivationDomain::Employment));
    }

    #[test]
    fn rejects_out_of_range_decile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "iod.csv",
            "lsoa_code;imd_decile_2019;income_decile_2019;employment_decile_2019;crime_decile_2019;health_decile_2019\n\
             E01000001;11;1;1;1;1\n",
        );
        let err = read_deprivation(&path, b';').unwrap_err();
        assert!(matches!(err, IngestError::InvalidValue { row: 1, .. }));
    }

    #[test]
    fn missing_domain_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "iod.csv", "lsoa_code;imd_decile_2019\nE01000001;3\n");
        assert!(matches!(
            read_deprivation(&path, b';'),
            Err(IngestError::MissingColumn { .. })
        ));
    }

    #[test]
    fn reads_population_with_separators() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "pop.csv",
            "LSOA 2021 Code;LSOA 2021 Name;Total\nE01000001;City 001A;1,612\nE01000002;City 001B;1400\n",
        );
        let table = read_population(&path, b';').unwrap();
        assert!((table["E01000001"] - 1612.0).abs() < f64::EPSILON);
        assert!((table["E01000002"] - 1400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merges_reference_tables() {
        let dir = tempfile::tempdir().unwrap();
        let iod = write(
            dir.path(),
            "iod.csv",
            &format!("{IOD_HEADER}E01000001;A;1;2;3;4;5\n"),
        );
        let pop = write(dir.path(), "pop.csv", "lsoa_code;population\nE01000002;900\n");

        let indices = load_reference_indices(&iod, &pop, b';').unwrap();
        let first = indices.profile("E01000001").unwrap();
        assert_eq!(first.population, None);
        assert_eq!(first.decile(DeprivationDomain::Health).unwrap().value(), 5);
        let second = indices.profile("E01000002").unwrap();
        assert_eq!(second.population, Some(900.0));
        assert!(second.deciles.is_empty());
    }

    #[test]
    fn sums_stop_search_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "stops.csv",
            "lsoa_code,month,stop_and_search_count\nE01000001,2024-01,3\nE01000001,2024-01-01,2\nE01000002,2024-02,1\n",
        );
        let counts = read_stop_search(&path).unwrap();
        let jan = YearMonth::new(2024, 1).unwrap();
        assert_eq!(counts[&("E01000001".to_owned(), jan)], 5);
        assert_eq!(counts.len(), 2);
    }
}
