use accident_etl::config::EtlConfig;
use accident_etl::manifest::{FsManifest, ProcessingManifest};
use accident_etl::observability::init_logging;
use accident_etl::pipeline::inspect::{self, InspectOptions};
use accident_etl::pipeline::{self, NormalizeReport, YearStatus};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "accident_etl")]
#[command(about = "Normalizes yearly traffic-accident exports and unifies them into one dataset")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file (defaults to ./etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize every raw year that has no canonical artifact yet
    Normalize {
        /// Maximum number of years processed concurrently
        #[arg(long)]
        workers: Option<usize>,
        /// Write the per-year run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Rebuild the unified artifact from all canonical artifacts
    Unify,
    /// Run normalize then unify
    Run {
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the detected delimiter and normalized header of every raw file
    Columns,
    /// Print schema, row count and the first rows of a Parquet artifact
    Inspect {
        /// Artifact to read (defaults to the unified artifact)
        path: Option<PathBuf>,
        /// Number of rows to print
        #[arg(long, default_value_t = 5)]
        rows: usize,
        /// Columns to print (comma-separated)
        #[arg(long)]
        columns: Option<String>,
        /// Only count and print rows where this column is non-empty
        #[arg(long)]
        non_empty: Option<String>,
    },
}

fn load_config(path: Option<&Path>, workers: Option<usize>) -> anyhow::Result<EtlConfig> {
    let mut config = EtlConfig::load(path).context("Failed to load configuration")?;
    if let Some(w) = workers {
        config.normalize.workers = w;
        config.validate().context("Invalid --workers")?;
    }
    Ok(config)
}

async fn run_normalize(config: &EtlConfig, report_path: Option<&Path>) -> anyhow::Result<NormalizeReport> {
    let manifest: Arc<dyn ProcessingManifest> = Arc::new(FsManifest::new(
        &config.paths.canonical_dir,
        &config.normalize.canonical_prefix,
    ));
    let report = pipeline::normalize_all(config, manifest)
        .await
        .with_context(|| format!("Failed to scan raw store {}", config.paths.raw_dir.display()))?;

    println!("\n📊 Normalize Results:");
    println!("   Normalized: {}", report.normalized());
    println!("   Skipped: {}", report.skipped());
    println!("   Failed: {}", report.failed());
    for rejected in &report.rejected {
        println!("   ⚠️  Ignored {}: {}", rejected.path.display(), rejected.reason);
    }
    for outcome in &report.outcomes {
        if let YearStatus::Failed { kind, message } = &outcome.status {
            println!("   ❌ {} ({:?}): {}", outcome.year, kind, message);
        }
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("   Report: {}", path.display());
    }
    Ok(report)
}

fn run_unify(config: &EtlConfig) -> anyhow::Result<()> {
    let report = pipeline::unify(config).context("Unify failed")?;
    println!("\n📊 Unify Results:");
    for y in &report.years {
        println!("   {}: {} rows", y.year, y.rows);
    }
    println!("   Total rows: {}", report.total_rows);
    println!("   Columns: {}", report.columns);
    println!("   Output file: {}", report.artifact.display());
    Ok(())
}

fn run_columns(config: &EtlConfig) -> anyhow::Result<()> {
    let (listing, rejected) = inspect::raw_columns(&config.paths.raw_dir, &config.normalize)
        .with_context(|| format!("Failed to scan raw store {}", config.paths.raw_dir.display()))?;
    for entry in &listing {
        match &entry.layout {
            Ok(layout) => println!(
                "{} ({}, delimiter {:?}, {} rows): {:?}",
                entry.source.year,
                entry.source.file_name(),
                layout.delimiter,
                layout.rows,
                layout.headers
            ),
            Err(e) => println!("❌ {} ({}): {}", entry.source.year, entry.source.file_name(), e),
        }
    }
    for r in &rejected {
        println!("⚠️  {}: {}", r.path.display(), r.reason);
    }
    Ok(())
}

fn run_inspect(path: &Path, options: &InspectOptions) -> anyhow::Result<()> {
    let summary = inspect::inspect_artifact(path, options)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;
    println!("📄 {} ({} rows)", path.display(), summary.rows);
    for (name, ty) in &summary.schema {
        println!("   {name}: {ty}");
    }
    if let Some((column, count)) = &summary.non_empty {
        println!("Rows with non-empty {column}: {count}");
    }
    println!("{}", summary.head_columns.join("\t"));
    for row in &summary.head {
        println!("{}", row.join("\t"));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let workers = match &cli.command {
        Commands::Normalize { workers, .. } | Commands::Run { workers, .. } => *workers,
        _ => None,
    };
    let config = load_config(cli.config.as_deref(), workers)?;

    let _guard = init_logging(&config.paths.logs_dir);
    info!(
        raw_dir = %config.paths.raw_dir.display(),
        canonical_dir = %config.paths.canonical_dir.display(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Normalize { report, .. } => {
            println!("🔄 Normalizing raw years...");
            run_normalize(&config, report.as_deref()).await?;
        }
        Commands::Unify => {
            println!("🔗 Unifying canonical artifacts...");
            if let Err(e) = run_unify(&config) {
                error!("{:#}", e);
                println!("❌ {:#}", e);
                return Err(e);
            }
        }
        Commands::Run { report, .. } => {
            println!("🚀 Running full pipeline (normalize + unify)...");
            println!("\n📥 Step 1: Normalizing...");
            run_normalize(&config, report.as_deref()).await?;
            println!("\n🔗 Step 2: Unifying...");
            if let Err(e) = run_unify(&config) {
                error!("{:#}", e);
                println!("❌ {:#}", e);
                return Err(e);
            }
        }
        Commands::Columns => run_columns(&config)?,
        Commands::Inspect {
            path,
            rows,
            columns,
            non_empty,
        } => {
            let path = path.unwrap_or_else(|| config.paths.unified_path.clone());
            if !path.is_file() {
                bail!("{} does not exist", path.display());
            }
            let options = InspectOptions {
                rows,
                columns: columns
                    .map(|c| {
                        c.split(',')
                            .map(|s| s.trim().to_lowercase())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                non_empty: non_empty.map(|c| c.trim().to_lowercase()),
            };
            run_inspect(&path, &options)?;
        }
    }

    Ok(())
}
