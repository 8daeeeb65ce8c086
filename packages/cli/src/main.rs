#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the burglary map pipeline.
//!
//! Each stage is available as a subcommand; without one, an interactive
//! menu asks which to run. Logging goes through
//! [`burglary_map_cli_utils::init_logger`] so log lines and progress bars
//! never fight for the terminal.

mod config;
mod pipeline;

use std::path::{Path, PathBuf};

use burglary_map_cli_utils::MultiProgress;
use burglary_map_ingest::clean::{clean_single_month, default_output_path};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Select};

use crate::config::Config;
use crate::pipeline::Plan;

#[derive(Parser)]
#[command(name = "burglary_map", about = "Burglary feature pipeline and forecaster")]
struct Cli {
    /// TOML config file (defaults to the built-in config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory that relative input paths resolve against
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Directory outputs are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a single raw monthly extract
    CleanMonth {
        /// Raw police.uk street-level CSV
        #[arg(long)]
        input: PathBuf,
        /// Output path (defaults to `processed_<name>` next to the input)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Aggregate extracts, build the feature table and ward counts
    Build,
    /// Build features in memory, train, evaluate and export forecasts
    Forecast,
    /// Build and write every table, then forecast
    Run,
    /// Map areas to wards only
    Wards,
}

/// Actions offered by the interactive menu.
enum Action {
    Run,
    Build,
    Forecast,
    Wards,
    CleanMonth,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Run,
        Self::Build,
        Self::Forecast,
        Self::Wards,
        Self::CleanMonth,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Run full pipeline",
            Self::Build => "Build feature table",
            Self::Forecast => "Train and forecast",
            Self::Wards => "Map areas to wards",
            Self::CleanMonth => "Clean a single monthly extract",
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = burglary_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let config =
        Config::load(cli.config.as_deref())?.with_overrides(cli.data_dir, cli.output_dir);

    let command = match cli.command {
        Some(command) => command,
        None => prompt()?,
    };

    execute(&config, &multi, command)
}

fn prompt() -> Result<Commands, Box<dyn std::error::Error>> {
    println!("Burglary Map Toolchain");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(match Action::ALL[idx] {
        Action::Run => Commands::Run,
        Action::Build => Commands::Build,
        Action::Forecast => Commands::Forecast,
        Action::Wards => Commands::Wards,
        Action::CleanMonth => {
            let input: String = Input::new()
                .with_prompt("Path to the raw monthly CSV")
                .interact_text()?;
            Commands::CleanMonth {
                input: PathBuf::from(input),
                output: None,
            }
        }
    })
}

fn execute(
    config: &Config,
    multi: &MultiProgress,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::CleanMonth { input, output } => clean_month(config, &input, output)?,
        Commands::Build => pipeline::run(config, multi, Plan::BUILD)?,
        Commands::Forecast => pipeline::run(config, multi, Plan::FORECAST)?,
        Commands::Run => pipeline::run(config, multi, Plan::RUN)?,
        Commands::Wards => {
            let mapping = pipeline::map_wards(config)?;
            pipeline::write_ward_mapping(config, &mapping)?;
            println!(
                "{} areas mapped, {} unmapped",
                mapping.mapped_count(),
                mapping.unmapped_count()
            );
        }
    }
    Ok(())
}

fn clean_month(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = output.unwrap_or_else(|| default_output_path(input));
    let summary = clean_single_month(input, &output, &config.aggregate.area_prefix)?;
    let stats = summary.stats;
    log::info!(
        "Kept {} of {} rows ({} outside {}, {} missing fields)",
        stats.kept,
        stats.rows_read,
        stats.outside_area,
        config.aggregate.area_prefix,
        stats.missing_fields
    );
    println!("Wrote {}", summary.output.display());
    Ok(())
}
