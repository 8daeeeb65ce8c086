//! Pipeline orchestrator.
//!
//! Chains extract reading -> monthly aggregation -> feature building ->
//! ward attribution -> forecasting. Every stage materializes its table
//! before the next starts, and every output is replaced atomically.

use std::error::Error;
use std::path::Path;

use burglary_map_cli_utils::{ExtractBar, MultiProgress, Stage, StageBar};
use burglary_map_features::grid::{MonthlyGrid, aggregate_monthly};
use burglary_map_features::table::{FeatureTable, build_features};
use burglary_map_features::wards::ward_month_counts;
use burglary_map_forecast::evaluate::{Metrics, Split};
use burglary_map_forecast::export::{normalize, ward_predictions};
use burglary_map_forecast::{ForecastOutcome, ForecastStage, run_forecast};
use burglary_map_geography_models::AreaWardMapping;
use burglary_map_ingest::extracts::{ExtractBatch, read_extract_dir};
use burglary_map_ingest::output::{write_csv_atomic, write_records_atomic};
use burglary_map_ingest::reference::{load_reference_indices, read_stop_search};
use burglary_map_spatial::{WardIndex, assign_areas, load_boundaries};
use serde::Serialize;

use crate::config::Config;

pub const FEATURES_FILE: &str = "crime_fixed_dataset.csv";
pub const AREA_WARD_FILE: &str = "lsoa_to_ward.csv";
pub const WARD_COUNTS_FILE: &str = "ward_month_counts.csv";
pub const TEST_PREDICTIONS_FILE: &str = "burglary_pred_tuned.csv";
pub const NEXT_MONTH_FILE: &str = "burglary_next_month_forecast.csv";
pub const NEXT_MONTH_NORMALIZED_FILE: &str = "burglary_next_month_forecast_normalized.csv";
pub const WARD_FORECAST_FILE: &str = "ward_next_month_forecast.csv";
pub const SUMMARY_FILE: &str = "forecast_summary.json";

/// Number of feature weights kept in the run summary.
const SUMMARY_WEIGHTS: usize = 20;

/// What a pipeline run does after building the feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Write the feature table, the area-to-ward mapping and ward counts.
    pub write_tables: bool,
    /// Train, evaluate and export next-month predictions.
    pub forecast: bool,
}

impl Plan {
    pub const BUILD: Self = Self {
        write_tables: true,
        forecast: false,
    };
    pub const FORECAST: Self = Self {
        write_tables: false,
        forecast: true,
    };
    pub const RUN: Self = Self {
        write_tables: true,
        forecast: true,
    };

    fn stages(self) -> Vec<Stage> {
        let mut stages = Stage::BUILD.to_vec();
        if self.forecast {
            stages.extend_from_slice(Stage::FORECAST);
        }
        stages
    }
}

const fn bar_stage(stage: ForecastStage) -> Stage {
    match stage {
        ForecastStage::Train => Stage::Train,
        ForecastStage::Evaluate => Stage::Evaluate,
        ForecastStage::Predict => Stage::Forecast,
    }
}

/// Runs the pipeline described by `plan`.
///
/// # Errors
///
/// Returns the first error of any stage; nothing after it runs.
pub fn run(config: &Config, multi: &MultiProgress, plan: Plan) -> Result<(), Box<dyn Error>> {
    let steps = StageBar::new(multi, &plan.stages());

    steps.begin(Stage::ReadExtracts);
    let batch = read_extracts(config, multi)?;

    steps.begin(Stage::BuildGrid);
    let grid = build_grid(config, &batch)?;

    steps.begin(Stage::AssembleFeatures);
    let table = features(config, &grid, plan.write_tables)?;

    steps.begin(Stage::MapWards);
    let mapping = map_wards(config)?;
    if plan.write_tables {
        write_ward_mapping(config, &mapping)?;
    }

    steps.begin(Stage::AggregateWards);
    let ward_counts = ward_month_counts(&grid, &mapping);
    log::info!(
        "{} ward-month rows ({} areas without a ward)",
        ward_counts.rows.len(),
        ward_counts.skipped_areas.len()
    );
    if plan.write_tables {
        write_csv_atomic(&config.paths.output(WARD_COUNTS_FILE), &ward_counts.rows)?;
    }

    if plan.forecast {
        let regressor = config.forecast.regressor();
        let outcome = run_forecast(
            &table,
            &config.forecast.splits,
            regressor.as_ref(),
            &mut |stage| steps.begin(bar_stage(stage)),
        )?;

        steps.begin(Stage::Export);
        export_forecast(config, &outcome, &mapping)?;
    }

    steps.finish();
    Ok(())
}

fn read_extracts(config: &Config, multi: &MultiProgress) -> Result<ExtractBatch, Box<dyn Error>> {
    let paths = &config.paths;
    let bar = ExtractBar::new(multi);
    Ok(read_extract_dir(
        &paths.input(&paths.extracts_dir),
        &config.aggregate.area_prefix,
        &bar,
    )?)
}

/// Folds the incidents (and optional stop-and-search counts) into the
/// dense area-month grid.
fn build_grid(config: &Config, batch: &ExtractBatch) -> Result<MonthlyGrid, Box<dyn Error>> {
    let paths = &config.paths;
    let stop_search = paths
        .stop_search
        .as_deref()
        .map(|path| read_stop_search(&paths.input(path)))
        .transpose()?;

    let grid = aggregate_monthly(
        &batch.incidents,
        &config.aggregate.area_prefix,
        &config.aggregate.target_category,
        stop_search.as_ref(),
    )?;
    Ok(grid)
}

fn features(
    config: &Config,
    grid: &MonthlyGrid,
    write: bool,
) -> Result<FeatureTable, Box<dyn Error>> {
    let paths = &config.paths;
    let references = load_reference_indices(
        &paths.input(&paths.deprivation),
        &paths.input(&paths.population),
        config.reference_delimiter()?,
    )?;
    let table = build_features(grid, &references)?;
    log::info!(
        "Feature table: {} rows x {} columns",
        table.rows.len(),
        table.headers().len()
    );
    if write {
        write_records_atomic(
            &paths.output(FEATURES_FILE),
            &table.headers(),
            &table.records(),
        )?;
    }
    Ok(table)
}

/// Attributes every area boundary to a ward.
///
/// # Errors
///
/// Returns an error if either boundary file is unreadable or malformed.
pub fn map_wards(config: &Config) -> Result<AreaWardMapping, Box<dyn Error>> {
    let paths = &config.paths;
    let bounds = &config.boundaries;
    let wards = load_boundaries(
        &paths.input(&paths.ward_boundaries),
        &bounds.ward_code_property,
        bounds.ward_name_property.as_deref(),
    )?;
    let areas = load_boundaries(
        &paths.input(&paths.lsoa_boundaries),
        &bounds.lsoa_code_property,
        None,
    )?;

    let index = WardIndex::new(wards);
    log::info!("Indexed {} wards for {} areas", index.len(), areas.len());
    Ok(assign_areas(&index, &areas)?)
}

/// Writes the area-to-ward mapping table.
///
/// # Errors
///
/// Returns an error if the table cannot be written.
pub fn write_ward_mapping(config: &Config, mapping: &AreaWardMapping) -> Result<(), Box<dyn Error>> {
    write_csv_atomic(&config.paths.output(AREA_WARD_FILE), &mapping.rows())?;
    Ok(())
}

#[derive(Serialize)]
struct SplitSummary {
    split: Split,
    #[serde(flatten)]
    metrics: Metrics,
}

#[derive(Serialize)]
struct FeatureWeight<'a> {
    feature: &'a str,
    weight: f64,
}

/// Machine-readable record of a forecast run.
#[derive(Serialize)]
struct RunSummary<'a> {
    generated_at: String,
    model: &'a str,
    metrics: Vec<SplitSummary>,
    top_feature_weights: Vec<FeatureWeight<'a>>,
    forecast_areas: usize,
    unmapped_areas: usize,
}

fn export_forecast(
    config: &Config,
    outcome: &ForecastOutcome,
    mapping: &AreaWardMapping,
) -> Result<(), Box<dyn Error>> {
    let paths = &config.paths;
    write_csv_atomic(&paths.output(TEST_PREDICTIONS_FILE), &outcome.test_predictions)?;
    write_csv_atomic(&paths.output(NEXT_MONTH_FILE), &outcome.next_month)?;
    write_csv_atomic(
        &paths.output(NEXT_MONTH_NORMALIZED_FILE),
        &normalize(&outcome.next_month),
    )?;

    let wards = ward_predictions(&outcome.next_month, mapping);
    write_csv_atomic(&paths.output(WARD_FORECAST_FILE), &wards.rows)?;

    let summary = RunSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        model: &outcome.model_name,
        metrics: outcome
            .metrics
            .iter()
            .map(|&(split, metrics)| SplitSummary { split, metrics })
            .collect(),
        top_feature_weights: outcome
            .feature_weights
            .iter()
            .take(SUMMARY_WEIGHTS)
            .map(|(feature, weight)| FeatureWeight {
                feature,
                weight: *weight,
            })
            .collect(),
        forecast_areas: outcome.next_month.len(),
        unmapped_areas: wards.unmapped_areas.len(),
    };
    save_summary(&paths.output(SUMMARY_FILE), &summary)
}

fn save_summary(path: &Path, summary: &RunSummary<'_>) -> Result<(), Box<dyn Error>> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let contents = serde_json::to_string_pretty(summary)?;
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    log::info!("Saved run summary to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn square(code: &str, name: &str, x0: f64, x1: f64) -> String {
        format!(
            r#"{{"type": "Feature", "properties": {{"code": "{code}", "name": "{name}"}},
                "geometry": {{"type": "Polygon", "coordinates": [[[{x0},{x0}],[{x1},{x0}],[{x1},{x1}],[{x0},{x1}],[{x0},{x0}]]]}}}}"#
        )
    }

    /// Six months of extracts for two areas inside one ward, plus a third
    /// area outside every ward.
    fn fixture(dir: &Path) -> Config {
        for (i, month) in ["2024-01", "2024-02", "2024-03", "2024-04", "2024-05", "2024-06"]
            .iter()
            .enumerate()
        {
            let mut csv = "Crime ID,Month,Longitude,Latitude,LSOA code,Crime type\n".to_owned();
            for area in ["E01000001", "E01000002", "E01000003"] {
                writeln!(csv, ",{month},,,{area},Anti-social behaviour").unwrap();
                if i % 2 == 0 {
                    writeln!(csv, ",{month},,,{area},Burglary").unwrap();
                }
            }
            writeln!(csv, ",{month},,,W01000001,Burglary").unwrap();
            write(dir, &format!("monthly/{month}-street.csv"), &csv);
        }

        write(
            dir,
            "wards.geojson",
            &format!(
                r#"{{"type": "FeatureCollection", "features": [{}]}}"#,
                square("E05000001", "Holborn", 0.0, 10.0)
            ),
        );
        write(
            dir,
            "lsoa.geojson",
            &format!(
                r#"{{"type": "FeatureCollection", "features": [{}, {}, {}]}}"#,
                square("E01000001", "Camden 001A", 1.0, 2.0),
                square("E01000002", "Camden 001B", 5.0, 6.0),
                square("E01000003", "Camden 001C", 20.0, 21.0)
            ),
        );
        write(
            dir,
            "iod.csv",
            "lsoa_code;imd_decile_2019;income_decile_2019;employment_decile_2019;crime_decile_2019;health_decile_2019\n\
             E01000001;2;3;4;5;6\n",
        );
        write(dir, "population.csv", "lsoa_code;population\nE01000001;1,500\nE01000002;900\n");

        let toml_str = format!(
            r"
            [paths]
            data_dir = '{}'
            output_dir = '{}'
            extracts_dir = 'monthly'
            lsoa_boundaries = 'lsoa.geojson'
            ward_boundaries = 'wards.geojson'
            deprivation = 'iod.csv'
            population = 'population.csv'

            [boundaries]
            lsoa_code_property = 'code'
            ward_code_property = 'code'
            ward_name_property = 'name'

            [forecast]
            model = 'ridge'

            [forecast.splits]
            train_end = '2024-04'
            validation_end = '2024-05'
            test_start = '2024-05'
            ",
            dir.display(),
            dir.join("out").display()
        );
        Config::parse(&toml_str).unwrap()
    }

    #[test]
    fn full_run_writes_every_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let multi = MultiProgress::new();

        run(&config, &multi, Plan::RUN).unwrap();

        let out = dir.path().join("out");
        for file in [
            FEATURES_FILE,
            AREA_WARD_FILE,
            WARD_COUNTS_FILE,
            TEST_PREDICTIONS_FILE,
            NEXT_MONTH_FILE,
            NEXT_MONTH_NORMALIZED_FILE,
            WARD_FORECAST_FILE,
            SUMMARY_FILE,
        ] {
            assert!(out.join(file).is_file(), "{file} was not written");
            assert!(!out.join(format!("{file}.tmp")).exists());
        }

        let mapping = std::fs::read_to_string(out.join(AREA_WARD_FILE)).unwrap();
        assert_eq!(
            mapping.lines().collect::<Vec<_>>(),
            vec![
                "lsoa_code,ward_code,ward_name",
                "E01000001,E05000001,Holborn",
                "E01000002,E05000001,Holborn"
            ]
        );

        let forecast = std::fs::read_to_string(out.join(NEXT_MONTH_FILE)).unwrap();
        let lines: Vec<&str> = forecast.lines().collect();
        assert_eq!(lines[0], "lsoa_code,year_month,predicted_burglary");
        // One row per area, all for July.
        assert_eq!(lines.len(), 4);
        assert!(lines[1..].iter().all(|l| l.contains(",2024-07,")));

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["model"], "ridge");
        assert_eq!(summary["forecast_areas"], 3);
        assert_eq!(summary["unmapped_areas"], 1);
    }

    #[test]
    fn build_skips_forecast_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());

        run(&config, &MultiProgress::new(), Plan::BUILD).unwrap();

        let out = dir.path().join("out");
        assert!(out.join(FEATURES_FILE).is_file());
        assert!(out.join(WARD_COUNTS_FILE).is_file());
        assert!(!out.join(NEXT_MONTH_FILE).exists());

        let features = std::fs::read_to_string(out.join(FEATURES_FILE)).unwrap();
        // Header plus three areas over six months.
        assert_eq!(features.lines().count(), 1 + 3 * 6);
    }

    #[test]
    fn forecast_leaves_tables_unwritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());

        run(&config, &MultiProgress::new(), Plan::FORECAST).unwrap();

        let out = dir.path().join("out");
        assert!(out.join(NEXT_MONTH_FILE).is_file());
        assert!(out.join(WARD_FORECAST_FILE).is_file());
        for file in [FEATURES_FILE, AREA_WARD_FILE, WARD_COUNTS_FILE] {
            assert!(!out.join(file).exists(), "{file} should not be written");
        }
    }

    #[test]
    fn forecast_plans_add_the_model_stages() {
        assert_eq!(Plan::BUILD.stages(), Stage::BUILD);
        let run = Plan::RUN.stages();
        assert_eq!(run.len(), Stage::BUILD.len() + Stage::FORECAST.len());
        assert_eq!(run.last(), Some(&Stage::Export));
        assert_eq!(bar_stage(ForecastStage::Predict), Stage::Forecast);
    }

    #[test]
    fn missing_extract_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.paths.extracts_dir = "nowhere".into();
        assert!(run(&config, &MultiProgress::new(), Plan::BUILD).is_err());
    }
}
