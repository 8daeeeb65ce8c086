#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Small-area and ward geography types.
//!
//! Lower-layer super output areas (LSOAs) are the unit of aggregation;
//! electoral wards are the coarser geography the dashboard drills into.
//! This crate also carries the static per-area socioeconomic profile
//! (deprivation deciles and population) joined onto every feature row.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Code prefix of English LSOAs. Rows whose area code does not start with
/// this are outside the study area.
pub const LSOA_CODE_PREFIX: &str = "E01";

/// An electoral ward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ward {
    /// GSS ward code (e.g. "E05000026").
    pub code: String,
    pub name: Option<String>,
}

/// Result of assigning small areas to the ward containing their centroid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaWardMapping {
    /// LSOA code -> containing ward.
    pub assigned: BTreeMap<String, Ward>,
    /// LSOA codes whose centroid fell inside no ward, sorted.
    pub unmapped: Vec<String>,
}

impl AreaWardMapping {
    #[must_use]
    pub fn ward_for(&self, lsoa_code: &str) -> Option<&Ward> {
        self.assigned.get(lsoa_code)
    }

    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.assigned.len()
    }

    #[must_use]
    pub fn unmapped_count(&self) -> usize {
        self.unmapped.len()
    }

    /// Flattens the mapping into export rows, ordered by LSOA code.
    #[must_use]
    pub fn rows(&self) -> Vec<AreaWardRow> {
        self.assigned
            .iter()
            .map(|(lsoa, ward)| AreaWardRow {
                lsoa_code: lsoa.clone(),
                ward_code: ward.code.clone(),
                ward_name: ward.name.clone(),
            })
            .collect()
    }
}

/// One exported area-to-ward assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaWardRow {
    pub lsoa_code: String,
    pub ward_code: String,
    /// Empty when the boundary file carries no names.
    pub ward_name: Option<String>,
}

/// The English Indices of Deprivation domains used as features.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeprivationDomain {
    /// Overall Index of Multiple Deprivation
    Imd,
    Income,
    Employment,
    Crime,
    /// Health deprivation and disability
    Health,
}

impl DeprivationDomain {
    /// Feature column holding this domain's decile, e.g. `imd_decile_2019`.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Imd => "imd_decile_2019",
            Self::Income => "income_decile_2019",
            Self::Employment => "employment_decile_2019",
            Self::Crime => "crime_decile_2019",
            Self::Health => "health_decile_2019",
        }
    }

    /// Column name in the published IoD 2019 file after header cleaning.
    #[must_use]
    pub const fn source_column(self) -> &'static str {
        match self {
            Self::Imd => {
                "index_of_multiple_deprivation_imd_decile_where_1_is_most_deprived_10_of_lsoas"
            }
            Self::Income => "income_decile_where_1_is_most_deprived_10_of_lsoas",
            Self::Employment => "employment_decile_where_1_is_most_deprived_10_of_lsoas",
            Self::Crime => "crime_decile_where_1_is_most_deprived_10_of_lsoas",
            Self::Health => {
                "health_deprivation_and_disability_decile_where_1_is_most_deprived_10_of_lsoas"
            }
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Imd,
            Self::Income,
            Self::Employment,
            Self::Crime,
            Self::Health,
        ]
    }
}

/// A deprivation decile, 1 (most deprived 10%) to 10 (least deprived).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Decile(u8);

impl Decile {
    /// Creates a decile.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not in the range 1-10.
    pub const fn new(value: u8) -> Result<Self, InvalidDecileError> {
        if matches!(value, 1..=10) {
            Ok(Self(value))
        } else {
            Err(InvalidDecileError { value })
        }
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Zero-based categorical code used by the interaction features.
    #[must_use]
    pub const fn code(self) -> u8 {
        self.0 - 1
    }
}

impl TryFrom<u8> for Decile {
    type Error = InvalidDecileError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Decile> for u8 {
    fn from(decile: Decile) -> Self {
        decile.0
    }
}

/// Error returned when a decile value is outside 1-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidDecileError {
    /// The rejected value.
    pub value: u8,
}

impl std::fmt::Display for InvalidDecileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid decile {}: expected 1-10", self.value)
    }
}

impl std::error::Error for InvalidDecileError {}

/// Static socioeconomic profile of one LSOA.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaProfile {
    pub deciles: BTreeMap<DeprivationDomain, Decile>,
    /// Mid-year resident population estimate.
    pub population: Option<f64>,
}

impl AreaProfile {
    #[must_use]
    pub fn decile(&self, domain: DeprivationDomain) -> Option<Decile> {
        self.deciles.get(&domain).copied()
    }
}

/// Static per-area reference data, keyed by LSOA code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceIndices {
    pub profiles: BTreeMap<String, AreaProfile>,
}

impl ReferenceIndices {
    #[must_use]
    pub fn profile(&self, lsoa_code: &str) -> Option<&AreaProfile> {
        self.profiles.get(lsoa_code)
    }

    /// Inserts or updates the deciles for an area.
    pub fn set_deciles(
        &mut self,
        lsoa_code: &str,
        deciles: BTreeMap<DeprivationDomain, Decile>,
    ) {
        self.profiles
            .entry(lsoa_code.to_owned())
            .or_default()
            .deciles = deciles;
    }

    /// Inserts or updates the population for an area.
    pub fn set_population(&mut self, lsoa_code: &str, population: f64) {
        self.profiles
            .entry(lsoa_code.to_owned())
            .or_default()
            .population = Some(population);
    }
}
