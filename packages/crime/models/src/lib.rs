#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Incident record types, month arithmetic, and the police.uk crime
//! category taxonomy.
//!
//! Every other crate in the burglary-map workspace works in terms of
//! [`Incident`] rows bucketed by [`YearMonth`]. Category strings are kept
//! as normalized free text (lower-cased, trimmed) so that categories added
//! to future extracts still flow through the pivot; [`CrimeType`] names
//! the categories we know about.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike as _, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// The category the pipeline forecasts unless configured otherwise.
pub const BURGLARY: &str = "burglary";

/// A calendar month, the time granularity of every aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a month, returning `None` if `month` is not in `1..=12`.
    #[must_use]
    pub const fn new(year: i32, month: u32) -> Option<Self> {
        if matches!(month, 1..=12) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// January of `year`.
    #[must_use]
    pub const fn january(year: i32) -> Self {
        Self { year, month: 1 }
    }

    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// Month number, 1 = January.
    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// Calendar quarter, 1-4.
    #[must_use]
    pub const fn quarter(self) -> u32 {
        (self.month - 1) / 3 + 1
    }

    /// The following month.
    #[must_use]
    pub const fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month.
    #[must_use]
    pub const fn pred(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Every month from `start` to `end` inclusive, in order. Empty when
    /// `start > end`.
    #[must_use]
    pub fn range_inclusive(start: Self, end: Self) -> Vec<Self> {
        let mut months = Vec::new();
        let mut current = start;
        while current <= end {
            months.push(current);
            current = current.succ();
        }
        months
    }
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Error returned when a string cannot be read as a month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseYearMonthError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseYearMonthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid month '{}': expected YYYY-MM, YYYY-MM-DD or an ISO datetime",
            self.input
        )
    }
}

impl std::error::Error for ParseYearMonthError {}

impl FromStr for YearMonth {
    type Err = ParseYearMonthError;

    /// Accepts `YYYY-MM`, `YYYY-MM-DD`, and ISO datetimes; anything finer
    /// than a month is truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseYearMonthError {
            input: s.to_owned(),
        };

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(date.into());
        }
        for fmt in [
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
        ] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(dt.date().into());
            }
        }

        let (year, month) = s.split_once('-').ok_or_else(err)?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return Err(err());
        }
        let year = year.parse::<i32>().map_err(|_| err())?;
        let month = month.parse::<u32>().map_err(|_| err())?;
        Self::new(year, month).ok_or_else(err)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalizes a raw category string for matching: trimmed and lower-cased.
#[must_use]
pub fn normalize_crime_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// One reported incident from a monthly street-level extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Small-area (LSOA) code, e.g. `E01000001`.
    pub lsoa_code: String,
    pub month: YearMonth,
    /// Normalized category, see [`normalize_crime_type`].
    pub crime_type: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl Incident {
    /// Both coordinates, when present.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.longitude?, self.latitude?))
    }
}

/// Stop-and-search counts keyed by `(lsoa_code, month)`. Area-months
/// without an entry had no recorded searches.
pub type StopSearchCounts = BTreeMap<(String, YearMonth), u32>;

/// Street-level crime categories published by police.uk.
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
#[serde(rename_all = "kebab-case")]
pub enum CrimeType {
    #[strum(serialize = "anti-social behaviour")]
    AntiSocialBehaviour,
    #[strum(serialize = "bicycle theft")]
    BicycleTheft,
    #[strum(serialize = "burglary")]
    Burglary,
    #[strum(serialize = "criminal damage and arson")]
    CriminalDamageAndArson,
    #[strum(serialize = "drugs")]
    Drugs,
    #[strum(serialize = "other crime")]
    OtherCrime,
    #[strum(serialize = "other theft")]
    OtherTheft,
    #[strum(serialize = "possession of weapons")]
    PossessionOfWeapons,
    #[strum(serialize = "public order")]
    PublicOrder,
    #[strum(serialize = "robbery")]
    Robbery,
    #[strum(serialize = "shoplifting")]
    Shoplifting,
    #[strum(serialize = "theft from the person")]
    TheftFromThePerson,
    #[strum(serialize = "vehicle crime")]
    VehicleCrime,
    #[strum(serialize = "violence and sexual offences")]
    ViolenceAndSexualOffences,
}

impl CrimeType {
    /// Looks up a normalized category string. `None` for categories that
    /// are not part of the published taxonomy.
    #[must_use]
    pub fn from_normalized(crime_type: &str) -> Option<Self> {
        Self::from_str(crime_type).ok()
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::AntiSocialBehaviour,
            Self::BicycleTheft,
            Self::Burglary,
            Self::CriminalDamageAndArson,
            Self::Drugs,
            Self::OtherCrime,
            Self::OtherTheft,
            Self::PossessionOfWeapons,
            Self::PublicOrder,
            Self::Robbery,
            Self::Shoplifting,
            Self::TheftFromThePerson,
            Self::VehicleCrime,
            Self::ViolenceAndSexualOffences,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_month_formats() {
        let expected = YearMonth::new(2024, 3).unwrap();
        assert_eq!("2024-03".parse::<YearMonth>().unwrap(), expected);
        assert_eq!("2024-3".parse::<YearMonth>().unwrap(), expected);
        assert_eq!("2024-03-01".parse::<YearMonth>().unwrap(), expected);
        assert_eq!("2024-03-17T08:15:00".parse::<YearMonth>().unwrap(), expected);
        assert_eq!(
            "2024-03-17 08:15:00.000".parse::<YearMonth>().unwrap(),
            expected
        );
    }

    #[test]
    fn rejects_invalid_months() {
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("2024".parse::<YearMonth>().is_err());
        assert!("March 2024".parse::<YearMonth>().is_err());
        assert!("".parse::<YearMonth>().is_err());
    }

    #[test]
    fn succ_and_pred_roll_over_years() {
        let dec = YearMonth::new(2023, 12).unwrap();
        let jan = YearMonth::new(2024, 1).unwrap();
        assert_eq!(dec.succ(), jan);
        assert_eq!(jan.pred(), dec);
    }

    #[test]
    fn january_starts_the_year() {
        const START: YearMonth = YearMonth::january(2023);
        assert_eq!(START, YearMonth::new(2023, 1).unwrap());
        assert_eq!(START.pred().to_string(), "2022-12");
    }

    #[test]
    fn quarters() {
        let quarters: Vec<u32> = (1..=12)
            .map(|m| YearMonth::new(2024, m).unwrap().quarter())
            .collect();
        assert_eq!(quarters, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn inclusive_range_spans_year_boundary() {
        let months = YearMonth::range_inclusive(
            YearMonth::new(2023, 11).unwrap(),
            YearMonth::new(2024, 2).unwrap(),
        );
        let labels: Vec<String> = months.iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
        assert!(
            YearMonth::range_inclusive(
                YearMonth::new(2024, 2).unwrap(),
                YearMonth::new(2024, 1).unwrap()
            )
            .is_empty()
        );
    }

    #[test]
    fn normalizes_crime_types() {
        assert_eq!(normalize_crime_type("  Burglary "), BURGLARY);
        assert_eq!(
            CrimeType::from_normalized(&normalize_crime_type("Anti-social behaviour")),
            Some(CrimeType::AntiSocialBehaviour)
        );
        assert_eq!(CrimeType::from_normalized("jaywalking"), None);
    }

    #[test]
    fn crime_type_strings_are_normalized() {
        for crime_type in CrimeType::all() {
            let s = crime_type.to_string();
            assert_eq!(normalize_crime_type(&s), s);
        }
        assert_eq!(CrimeType::Burglary.as_ref(), BURGLARY);
    }
}
