//! boxtrack library - dataset loading and command execution
//!
//! The binary parses arguments, sets up logging and prints the JSON value
//! returned by [`run`]. Batch jobs are CPU-bound (rayon inside) and run on
//! the blocking pool so the runtime stays free for file I/O.

use anyhow::{bail, Context, Result};
use boxtrack_common::batch::{
    apply_milestone_updates, apply_scan_updates, correct_and_recalculate, recalculate_all, reindex_all,
    CoordinateCorrection,
};
use boxtrack_common::config::{ConfigResolver, TomlConfig};
use boxtrack_common::geo::{bounds, center, zoom_level, Bounds};
use boxtrack_common::models::{Coordinates, ProgressLabel, Scan, Shipment};
use boxtrack_common::report::report_rows;
use boxtrack_common::time::{self, parse_cutoff};
use boxtrack_common::insights::MAX_TIMELINE_WINDOW_DAYS;
use boxtrack_common::compute_insights;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Shipments and their scans, as exported by the field app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub boxes: Vec<Shipment>,
    #[serde(default)]
    pub scans: Vec<Scan>,
}

impl Dataset {
    pub async fn load(path: &Path) -> Result<Self> {
        let dataset: Dataset = read_json(path).await?;
        info!(
            shipments = dataset.boxes.len(),
            scans = dataset.scans.len(),
            "Loaded dataset from {}",
            path.display()
        );
        Ok(dataset)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize dataset")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote updated dataset to {}", path.display());
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "boxtrack")]
#[command(about = "Delivery progress inference for tracked shipments")]
#[command(version)]
pub struct Cli {
    /// Dataset file ({ "boxes": [...], "scans": [...] })
    #[arg(short, long, env = "BOXTRACK_INPUT")]
    pub input: PathBuf,

    /// Config file (overrides BOXTRACK_CONFIG and the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the updated dataset here after a batch job
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Re-derive milestones and progress for every shipment
    Reindex,

    /// Re-check every scan against its destination, then reindex
    Recalculate {
        /// Base tolerance in metres (default from config)
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Apply destination corrections, then recalculate affected shipments
    Correct {
        /// JSON array of { schoolCode, schoolLatitude, schoolLongitude }
        #[arg(long)]
        corrections: PathBuf,

        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Repartition, timeline and content totals
    Insights {
        /// One payload over all shipments instead of one per project
        #[arg(long)]
        ungrouped: bool,

        /// Keep only these projects (repeatable)
        #[arg(long = "project")]
        projects: Vec<String>,

        /// Classify at this instant instead of now
        #[arg(long, value_parser = parse_cutoff)]
        at: Option<DateTime<Utc>>,

        /// Timeline window in days (default from config)
        #[arg(long)]
        window_days: Option<i64>,
    },

    /// One delivery report row per shipment
    Report,

    /// Per-shipment progress label at a point in time
    Classify {
        #[arg(long, value_parser = parse_cutoff)]
        at: DateTime<Utc>,
    },

    /// Center, bounds and zoom level fitting the shipment destinations
    Map {
        #[arg(long = "project")]
        projects: Vec<String>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Reindex => "reindex",
            Command::Recalculate { .. } => "recalculate",
            Command::Correct { .. } => "correct",
            Command::Insights { .. } => "insights",
            Command::Report => "report",
            Command::Classify { .. } => "classify",
            Command::Map { .. } => "map",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRow {
    pub id: String,
    pub project: String,
    pub progress: ProgressLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    pub center: Coordinates,
    pub bounds: Bounds,
    pub zoom: u8,
}

/// Result of one command: the JSON to print and, for batch jobs, the
/// dataset with the updates applied
#[derive(Debug)]
pub struct Execution {
    pub output: Value,
    pub updated: Option<Dataset>,
}

/// Resolve and load the config file
///
/// The process subscriber is configured from the result, so resolution logs
/// (missing file, file loaded) go through a temporary subscriber writing to
/// `writer`.
pub fn load_config<W>(config_path: Option<&Path>, writer: W) -> Result<TomlConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .finish();

    let resolver = ConfigResolver::new(config_path);
    let config = tracing::subscriber::with_default(bootstrap, || resolver.load())?;
    Ok(config)
}

/// Load the dataset, run the command and persist updates when requested
pub async fn run(cli: &Cli, config: &TomlConfig) -> Result<Value> {
    let dataset = Dataset::load(&cli.input).await?;
    let execution = execute(&cli.command, dataset, config, time::now()).await?;

    if let (Some(path), Some(dataset)) = (&cli.output, &execution.updated) {
        dataset.save(path).await?;
    }
    Ok(execution.output)
}

/// Run one command against an in-memory dataset
pub async fn execute(
    command: &Command,
    dataset: Dataset,
    config: &TomlConfig,
    now: DateTime<Utc>,
) -> Result<Execution> {
    debug!(command = command.name(), "Executing command");

    match command {
        Command::Reindex => {
            let (dataset, outcome) = blocking("reindex", move || {
                let mut dataset = dataset;
                let outcome = reindex_all(&dataset.boxes, &dataset.scans, now);
                apply_milestone_updates(&mut dataset.boxes, &outcome.updates);
                (dataset, outcome)
            })
            .await?;
            batch_execution(&outcome, dataset)
        }

        Command::Recalculate { tolerance } => {
            let tolerance_m = resolve_tolerance(*tolerance, config)?;
            let (dataset, outcome) = blocking("recalculate", move || {
                let mut dataset = dataset;
                let outcome = recalculate_all(&dataset.boxes, &dataset.scans, tolerance_m, now);
                apply_scan_updates(&mut dataset.scans, &outcome.scan_updates);
                apply_milestone_updates(&mut dataset.boxes, &outcome.updates);
                (dataset, outcome)
            })
            .await?;
            batch_execution(&outcome, dataset)
        }

        Command::Correct { corrections, tolerance } => {
            let tolerance_m = resolve_tolerance(*tolerance, config)?;
            let corrections: Vec<CoordinateCorrection> = read_json(corrections).await?;
            let (dataset, outcome) = blocking("correct", move || {
                let mut dataset = dataset;
                let outcome =
                    correct_and_recalculate(&mut dataset.boxes, &dataset.scans, &corrections, tolerance_m, now);
                if let Some(recalculation) = &outcome.recalculation {
                    apply_scan_updates(&mut dataset.scans, &recalculation.scan_updates);
                    apply_milestone_updates(&mut dataset.boxes, &recalculation.updates);
                }
                (dataset, outcome)
            })
            .await?;
            batch_execution(&outcome, dataset)
        }

        Command::Insights {
            ungrouped,
            projects,
            at,
            window_days,
        } => {
            let mut options = config.insights.options();
            if *ungrouped {
                options.grouped = false;
            }
            if !projects.is_empty() {
                options.project_filter = Some(projects.iter().cloned().collect::<BTreeSet<_>>());
            }
            if let Some(days) = window_days {
                if !(1..=MAX_TIMELINE_WINDOW_DAYS).contains(days) {
                    bail!(
                        "--window-days must be between 1 and {}, got {}",
                        MAX_TIMELINE_WINDOW_DAYS,
                        days
                    );
                }
                options.timeline_window_days = *days;
            }
            let cutoff = at.unwrap_or(now);

            let result = blocking("insights", move || {
                compute_insights(Some(dataset.boxes.as_slice()), &options, cutoff)
            })
            .await?;
            output_only(&result)
        }

        Command::Report => output_only(&report_rows(&dataset.boxes, &dataset.scans)),

        Command::Classify { at } => {
            let rows: Vec<ProgressRow> = dataset
                .boxes
                .iter()
                .map(|shipment| ProgressRow {
                    id: shipment.id.clone(),
                    project: shipment.project.clone(),
                    progress: shipment.current_progress(*at),
                })
                .collect();
            output_only(&rows)
        }

        Command::Map { projects } => {
            let points: Vec<Coordinates> = dataset
                .boxes
                .iter()
                .filter(|shipment| projects.is_empty() || projects.contains(&shipment.project))
                .map(Shipment::destination)
                .collect();
            if points.is_empty() {
                bail!("No shipment destinations to fit");
            }
            let view = MapView {
                center: center(&points)?,
                bounds: bounds(&points)?,
                zoom: zoom_level(&points)?,
            };
            output_only(&view)
        }
    }
}

fn resolve_tolerance(flag: Option<f64>, config: &TomlConfig) -> Result<f64> {
    let tolerance = flag.unwrap_or(config.geo.destination_tolerance_m);
    if !tolerance.is_finite() || tolerance < 0.0 {
        bail!("Tolerance must be a non-negative number of metres, got {}", tolerance);
    }
    Ok(tolerance)
}

async fn blocking<T, F>(job: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .with_context(|| format!("{} job panicked", job))
}

fn batch_execution<T: Serialize>(outcome: &T, dataset: Dataset) -> Result<Execution> {
    Ok(Execution {
        output: serde_json::to_value(outcome).context("Failed to serialize outcome")?,
        updated: Some(dataset),
    })
}

fn output_only<T: Serialize>(value: &T) -> Result<Execution> {
    Ok(Execution {
        output: serde_json::to_value(value).context("Failed to serialize output")?,
        updated: None,
    })
}
