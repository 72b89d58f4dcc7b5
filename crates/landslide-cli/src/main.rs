/// Command-line runner for the landslide susceptibility pipeline.
///
/// Reads a JSON input bundle and labelled points, runs the baseline and
/// forecast surfaces, and writes a JSON report, a point query or the legend.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use landslide_core::config::PipelineConfig;
use landslide_core::coords::LatLon;
use landslide_core::pipeline::{describe_surfaces, PipelineRun, SusceptibilityPipeline};
use landslide_core::samples::LabeledPoint;
use landslide_core::sources::{load_points, InputBundle};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "landslide", about = "Landslide susceptibility overlay and forecast runner", version)]
struct Args {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct Inputs {
    /// Input bundle (region, elevation, daily rainfall, scenes, forecast assets).
    #[arg(long)]
    inputs: PathBuf,

    /// Labelled points as a JSON array.
    #[arg(long)]
    points: PathBuf,

    /// Pipeline configuration; defaults apply to anything omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Forecast issue date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    issued: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage and write the area / validation report.
    Run {
        #[command(flatten)]
        inputs: Inputs,

        /// Report destination; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Buffered means of every layer around one coordinate.
    Inspect {
        #[command(flatten)]
        inputs: Inputs,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Band names, ranges and class semantics of every surface.
    Legend {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    match execute(args.command) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn execute(command: Command) -> Result<ExitCode> {
    match command {
        Command::Run { inputs, output } => {
            let (cfg, run) = run_pipeline(&inputs)?;
            let report = run.report(&cfg.aggregation)?;
            emit(&report, output.as_deref())?;
            // Overlay figures are written either way; a missing model is still a failed run.
            if let Some(reason) = &report.training.error {
                error!(%reason, "classifier training failed");
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { inputs, lat, lon } => {
            let (cfg, run) = run_pipeline(&inputs)?;
            let query = run.inspect(LatLon::new(lat, lon), &cfg.aggregation);
            emit(&query, None)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Legend { config } => {
            let cfg = load_config(config.as_deref())?;
            emit(&describe_surfaces(&cfg), None)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_pipeline(inputs: &Inputs) -> Result<(PipelineConfig, PipelineRun)> {
    let cfg = load_config(inputs.config.as_deref())?;
    let bundle = InputBundle::from_json_file(&inputs.inputs)
        .with_context(|| format!("loading input bundle {}", inputs.inputs.display()))?;
    let points: Vec<LabeledPoint> =
        load_points(&inputs.points).with_context(|| format!("loading points {}", inputs.points.display()))?;
    let issued = inputs.issued.unwrap_or_else(|| Local::now().date_naive());
    info!(region = %bundle.region.name, points = points.len(), %issued, "inputs loaded");

    let pipeline = SusceptibilityPipeline::new(cfg.clone())?;
    let run = pipeline.run(&bundle, &points, issued)?;
    Ok((cfg, run))
}

fn emit<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(p) => {
            fs::write(p, json).with_context(|| format!("writing {}", p.display()))?;
            info!(path = %p.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
