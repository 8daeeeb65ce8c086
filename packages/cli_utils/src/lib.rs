#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal output for the burglary map toolchain.
//!
//! [`init_logger`] routes `log` through `indicatif-log-bridge` so log
//! lines are suspended while bars redraw. [`StageBar`] tracks a pipeline
//! run stage by stage and [`ExtractBar`] follows the extract reader file
//! by file.

use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};

use burglary_map_ingest::extracts::FilterStats;
use burglary_map_ingest::progress::ExtractProgress;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// The stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadExtracts,
    BuildGrid,
    AssembleFeatures,
    MapWards,
    AggregateWards,
    Train,
    Evaluate,
    Forecast,
    Export,
}

impl Stage {
    /// Stages that build the feature table and ward counts.
    pub const BUILD: &[Self] = &[
        Self::ReadExtracts,
        Self::BuildGrid,
        Self::AssembleFeatures,
        Self::MapWards,
        Self::AggregateWards,
    ];

    /// Stages that train, evaluate and export a forecast.
    pub const FORECAST: &[Self] = &[Self::Train, Self::Evaluate, Self::Forecast, Self::Export];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ReadExtracts => "Reading extracts",
            Self::BuildGrid => "Building the area-month grid",
            Self::AssembleFeatures => "Assembling features",
            Self::MapWards => "Mapping areas to wards",
            Self::AggregateWards => "Aggregating wards",
            Self::Train => "Training",
            Self::Evaluate => "Evaluating",
            Self::Forecast => "Forecasting next month",
            Self::Export => "Exporting forecasts",
        }
    }
}

/// One bar position per stage of a run. Each stage's duration is logged
/// when the next one begins.
pub struct StageBar {
    bar: ProgressBar,
    started: Instant,
    current: Cell<Option<(Stage, Instant)>>,
}

impl StageBar {
    #[must_use]
    pub fn new(multi: &MultiProgress, stages: &[Stage]) -> Self {
        let bar = multi.add(ProgressBar::new(stages.len() as u64));
        bar.set_style(
            ProgressStyle::with_template(
                "{msg:30} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        Self {
            bar,
            started: Instant::now(),
            current: Cell::new(None),
        }
    }

    /// Closes the running stage, if any, and starts `stage`.
    pub fn begin(&self, stage: Stage) {
        self.complete_current();
        self.bar.set_message(stage.label());
        self.current.set(Some((stage, Instant::now())));
    }

    /// Closes the last stage and leaves the bar showing the total time.
    pub fn finish(&self) {
        self.complete_current();
        self.bar.finish_with_message(format!(
            "Pipeline complete in {:.1}s",
            self.started.elapsed().as_secs_f64()
        ));
    }

    fn complete_current(&self) {
        if let Some((stage, since)) = self.current.take() {
            log::info!(
                "{} done in {:.1}s",
                stage.label(),
                since.elapsed().as_secs_f64()
            );
            self.bar.inc(1);
        }
    }
}

/// A per-file bar for [`read_extract_dir`]. It spins while the directory
/// is listed, then counts files and the rows kept so far.
///
/// [`read_extract_dir`]: burglary_map_ingest::extracts::read_extract_dir
pub struct ExtractBar {
    bar: ProgressBar,
    kept: Cell<u64>,
}

impl ExtractBar {
    #[must_use]
    pub fn new(multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Listing extracts");
        Self {
            bar,
            kept: Cell::new(0),
        }
    }
}

impl ExtractProgress for ExtractBar {
    fn start(&self, files: usize) {
        self.bar.set_length(files as u64);
        self.bar.set_position(0);
        self.bar.set_style(
            ProgressStyle::with_template(
                "  {msg:40} {wide_bar:.cyan/dim} {pos}/{len} files [{eta}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
    }

    fn file_read(&self, path: &Path, stats: &FilterStats) {
        self.kept.set(self.kept.get() + stats.kept);
        let name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        self.bar
            .set_message(format!("{name} ({} rows kept)", self.kept.get()));
        self.bar.inc(1);
    }

    fn finish(&self, stats: &FilterStats) {
        self.bar.finish_with_message(format!(
            "Kept {} of {} rows",
            stats.kept, stats.rows_read
        ));
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Already set in tests

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn stage_bar_advances_when_a_stage_closes() {
        let stages: Vec<Stage> = [Stage::BUILD, Stage::FORECAST].concat();
        let steps = StageBar::new(&hidden(), &stages);
        assert_eq!(steps.bar.length(), Some(9));

        steps.begin(Stage::ReadExtracts);
        assert_eq!(steps.bar.position(), 0);
        steps.begin(Stage::BuildGrid);
        assert_eq!(steps.bar.position(), 1);
        assert_eq!(steps.bar.message(), Stage::BuildGrid.label());

        steps.finish();
        assert_eq!(steps.bar.position(), 2);
        assert!(steps.bar.is_finished());
    }

    #[test]
    fn extract_bar_counts_files_and_kept_rows() {
        let bar = ExtractBar::new(&hidden());
        bar.start(2);
        let stats = FilterStats {
            rows_read: 5,
            outside_area: 1,
            missing_fields: 0,
            kept: 4,
        };
        bar.file_read(Path::new("monthly/2024-01-street.csv"), &stats);
        bar.file_read(Path::new("monthly/2024-02-street.csv"), &stats);

        assert_eq!(bar.bar.length(), Some(2));
        assert_eq!(bar.bar.position(), 2);
        assert_eq!(bar.bar.message(), "2024-02-street.csv (8 rows kept)");

        bar.finish(&FilterStats {
            rows_read: 10,
            outside_area: 2,
            missing_fields: 0,
            kept: 8,
        });
        assert_eq!(bar.bar.message(), "Kept 8 of 10 rows");
    }
}
