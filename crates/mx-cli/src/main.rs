//! MonoX CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mx_regions::{RegionCatalog, SkimConfig};
use mx_tables::TableStore;

mod skim;

#[derive(Parser)]
#[command(name = "monox")]
#[command(about = "MonoX - region skims for the monophoton analysis")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble every configured region and print the operator chains
    Plan {
        /// Skim configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Side tables (YAML or JSON)
        #[arg(short, long)]
        tables: PathBuf,

        /// Only this sample. Defaults to every configured sample.
        #[arg(long)]
        sample: Option<String>,

        /// Output file for the plan (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run one sample's events through its region pipelines
    Skim {
        /// Skim configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Side tables (YAML or JSON)
        #[arg(short, long)]
        tables: PathBuf,

        /// Input events, one JSON object per line
        #[arg(short, long)]
        events: PathBuf,

        /// Sample to skim (must be configured)
        #[arg(long)]
        sample: String,

        /// Directory for `<sample>_<region>.jsonl` and `summary.json`
        #[arg(long)]
        out_dir: PathBuf,

        /// Stop after this many input events
        #[arg(long)]
        max_events: Option<usize>,
    },

    /// List catalogue assemblers and decorators
    Regions {
        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Plan { config, tables, sample, output } => {
            cmd_plan(&config, &tables, sample.as_deref(), output.as_ref())
        }
        Commands::Skim { config, tables, events, sample, out_dir, max_events } => {
            skim::cmd_skim(&config, &tables, &events, &sample, &out_dir, max_events)
        }
        Commands::Regions { output } => cmd_regions(output.as_ref()),
    }
}

fn load_inputs(config: &Path, tables: &Path) -> Result<(SkimConfig, Arc<TableStore>)> {
    tracing::info!(path = %config.display(), "loading skim configuration");
    let cfg = SkimConfig::from_path(config)
        .with_context(|| format!("reading skim configuration {}", config.display()))?;

    tracing::info!(path = %tables.display(), "loading side tables");
    let store = TableStore::from_path(tables)
        .with_context(|| format!("reading side tables {}", tables.display()))?;
    tracing::info!(samples = cfg.samples.len(), eras = store.eras().count(), "inputs loaded");

    Ok((cfg, Arc::new(store)))
}

fn cmd_plan(
    config: &Path,
    tables: &Path,
    sample: Option<&str>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let (cfg, store) = load_inputs(config, tables)?;
    let catalog = RegionCatalog::standard();

    let samples = match sample {
        Some(name) => vec![cfg.sample(name)?],
        None => cfg.samples.iter().collect(),
    };

    let plans: Vec<_> = samples.into_iter().map(|s| cfg.plan(s, &store, &catalog)).collect();
    for plan in &plans {
        tracing::info!(
            sample = %plan.sample,
            regions = plan.regions.len(),
            skipped = plan.skipped.len(),
            "sample planned"
        );
    }

    write_json(output, serde_json::to_value(&plans)?)
}

fn cmd_regions(output: Option<&PathBuf>) -> Result<()> {
    let catalog = RegionCatalog::standard();
    let output_json = serde_json::json!({
        "assemblers": catalog.names().collect::<Vec<_>>(),
        "decorators": catalog.decorator_names().collect::<Vec<_>>(),
    });
    write_json(output, output_json)
}

pub(crate) fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
