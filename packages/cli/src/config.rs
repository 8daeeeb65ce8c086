//! Pipeline configuration.
//!
//! A default config is compiled into the binary; `--config` replaces it
//! with a TOML file of the same shape, and `--data-dir`/`--output-dir`
//! override the corresponding paths.

use std::path::{Path, PathBuf};

use burglary_map_crime_models::BURGLARY;
use burglary_map_forecast::evaluate::SplitConfig;
use burglary_map_forecast::model::{BoostedTreesConfig, ModelKind, Regressor};
use burglary_map_geography_models::LSOA_CODE_PREFIX;
use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Reference delimiter must be a single ASCII character, got '{0}'")]
    Delimiter(char),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    pub boundaries: BoundaryConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Directory of monthly street-level extracts.
    pub extracts_dir: PathBuf,
    pub lsoa_boundaries: PathBuf,
    pub ward_boundaries: PathBuf,
    pub deprivation: PathBuf,
    pub population: PathBuf,
    #[serde(default)]
    pub stop_search: Option<PathBuf>,
}

impl PathsConfig {
    /// Resolves a configured input path against `data_dir`. Absolute paths
    /// are returned unchanged.
    #[must_use]
    pub fn input(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }

    #[must_use]
    pub fn output(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub delimiter: char,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self { delimiter: ';' }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryConfig {
    pub lsoa_code_property: String,
    pub ward_code_property: String,
    /// Copied into the ward outputs when set.
    #[serde(default)]
    pub ward_name_property: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub area_prefix: String,
    pub target_category: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            area_prefix: LSOA_CODE_PREFIX.to_owned(),
            target_category: BURGLARY.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model: ModelKind,
    pub ridge_alpha: f64,
    pub boosted: BoostedTreesConfig,
    pub splits: SplitConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            ridge_alpha: 1.0,
            boosted: BoostedTreesConfig::default(),
            splits: SplitConfig::default(),
        }
    }
}

impl ForecastConfig {
    #[must_use]
    pub fn regressor(&self) -> Box<dyn Regressor> {
        self.model.regressor(self.ridge_alpha, &self.boosted)
    }
}

impl Config {
    /// Loads `path`, or the built-in defaults when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Self::parse(DEFAULT_CONFIG);
        };
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or a missing
    /// required key.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Applies command-line path overrides.
    #[must_use]
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, output_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.paths.data_dir = dir;
        }
        if let Some(dir) = output_dir {
            self.paths.output_dir = dir;
        }
        self
    }

    /// The reference table delimiter as a byte.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Delimiter`] for a non-ASCII delimiter.
    pub fn reference_delimiter(&self) -> Result<u8, ConfigError> {
        let delimiter = self.reference.delimiter;
        u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or(ConfigError::Delimiter(delimiter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [paths]
        data_dir = "/srv/data"
        output_dir = "out"
        extracts_dir = "monthly"
        lsoa_boundaries = "lsoa.geojson"
        ward_boundaries = "/boundaries/wards.geojson"
        deprivation = "iod.csv"
        population = "pop.csv"

        [boundaries]
        lsoa_code_property = "LSOA21CD"
        ward_code_property = "WD24CD"
    "#;

    #[test]
    fn built_in_defaults_parse() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.aggregate.area_prefix, "E01");
        assert_eq!(config.aggregate.target_category, "burglary");
        assert_eq!(config.forecast.model, ModelKind::Boosted);
        assert_eq!(config.forecast.boosted, BoostedTreesConfig::default());
        assert_eq!(config.forecast.splits, SplitConfig::default());
        assert_eq!(config.reference_delimiter().unwrap(), b';');
        assert!(config.paths.stop_search.is_none());
    }

    #[test]
    fn omitted_sections_take_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.aggregate.area_prefix, LSOA_CODE_PREFIX);
        assert_eq!(config.forecast.model, ModelKind::Boosted);
        assert_eq!(config.forecast.boosted.iterations, 500);
        assert!((config.forecast.ridge_alpha - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.boundaries.ward_name_property, None);
    }

    #[test]
    fn paths_resolve_against_data_dir() {
        let config = Config::parse(MINIMAL).unwrap();
        let paths = &config.paths;
        assert_eq!(
            paths.input(&paths.lsoa_boundaries),
            PathBuf::from("/srv/data/lsoa.geojson")
        );
        assert_eq!(
            paths.input(&paths.ward_boundaries),
            PathBuf::from("/boundaries/wards.geojson")
        );

        let config = config.with_overrides(Some(PathBuf::from("/other")), None);
        assert_eq!(
            config.paths.input(&config.paths.deprivation),
            PathBuf::from("/other/iod.csv")
        );
        assert_eq!(config.paths.output("a.csv"), PathBuf::from("out/a.csv"));
    }

    #[test]
    fn forecast_section_overrides() {
        let toml_str = format!(
            "{MINIMAL}\n[forecast]\nmodel = \"mean\"\n\n[forecast.boosted]\niterations = 50\nmax_depth = 3\n\n[forecast.splits]\ntrain_end = \"2020-01\"\nvalidation_end = \"2021-01\"\ntest_start = \"2021-06\"\n"
        );
        let config = Config::parse(&toml_str).unwrap();
        assert_eq!(config.forecast.model, ModelKind::Mean);
        assert_eq!(config.forecast.boosted.iterations, 50);
        assert_eq!(config.forecast.boosted.max_depth, 3);
        assert_eq!(
            config.forecast.boosted.min_leaf_size,
            BoostedTreesConfig::default().min_leaf_size
        );
        assert_eq!(config.forecast.splits.test_start.to_string(), "2021-06");
    }

    #[test]
    fn rejects_bad_config() {
        assert!(matches!(
            Config::parse("[paths]\ndata_dir = 3"),
            Err(ConfigError::Parse(_))
        ));

        let mut config = Config::parse(MINIMAL).unwrap();
        config.reference.delimiter = '§';
        assert!(matches!(
            config.reference_delimiter(),
            Err(ConfigError::Delimiter('§'))
        ));
    }
}
