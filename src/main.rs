//! SalesLens - batch sales analytics
//!
//! A CLI tool that reads a sales fact snapshot and computes revenue
//! trends, product profitability, RFM segments, cohort retention and
//! related result sets, written as Markdown, JSON or CSV.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any error (bad arguments, config, unreadable data, write failure)

mod analysis;
mod cli;
mod config;
mod error;
mod loader;
mod models;
mod report;
mod runner;

use analysis::{AnalysisOutput, AnalysisParams};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE, DEFAULT_OUTPUT};
use loader::Dataset;
use models::{Report, ReportMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so `[general] verbose` applies
    let (config, config_source) = match load_config(&args, Path::new(".")) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("SalesLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    if let Err(e) = run(args, config).await {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .saleslens.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the data location, analyses and thresholds.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity flags.
fn init_logging(level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete analytics workflow.
async fn run(args: Args, config: Config) -> Result<()> {
    let start_time = Instant::now();

    let facts_path = config
        .data
        .facts
        .clone()
        .ok_or_else(|| anyhow!("No data path given. Use --data or set [data] facts in {}", CONFIG_FILE))?;

    // Step 1: Load the snapshot
    if !args.quiet {
        println!("📥 Loading sales data: {}", facts_path.display());
    }
    let dataset = Dataset::load(
        &facts_path,
        config.data.customers.as_deref(),
        !args.quiet,
    )?;

    // Handle --dry-run: report what was loaded and exit
    if args.dry_run {
        return handle_dry_run(&dataset, &config);
    }

    // Step 2: Run the analyses
    let params = AnalysisParams::from_config(&config.analysis);
    let as_of = params.as_of;
    let kinds = config.analysis.analyses.clone();

    if !args.quiet {
        println!("\n🔬 Running {} analyses (as of {})...", kinds.len(), as_of);
    }

    let dataset = Arc::new(dataset);
    let results = runner::run_analyses(
        Arc::clone(&dataset),
        Arc::new(params),
        &kinds,
        config.general.concurrency,
    )
    .await?;

    for result in results.iter().filter(|r| r.is_empty()) {
        warn!("{} produced no rows", result.kind());
    }

    // Step 3: Build the report
    let duration = start_time.elapsed().as_secs_f64();
    let metadata = ReportMetadata {
        data_source: facts_path.display().to_string(),
        as_of,
        generated_at: Utc::now(),
        fact_rows: dataset.facts.len(),
        undated_rows: dataset.undated_rows(),
        orders: dataset.order_count(),
        customers: dataset.customer_count(),
        duration_seconds: duration,
    };
    let report = Report { metadata, results };

    // Step 4: Write it out
    let format = config.report.format;
    let output = output_path(&config.general.output, format);
    report::write_report(&report, format, &output, config.report.max_table_rows)?;

    if !args.quiet {
        print_summary(&report.results, duration);
        println!("\n✅ Analysis complete! Report saved to: {}", output.display());
    }

    Ok(())
}

/// Handle --dry-run: print what was loaded, run nothing.
fn handle_dry_run(dataset: &Dataset, config: &Config) -> Result<()> {
    println!("\n🔍 Dry run: data loaded, no analyses run.\n");
    println!("   Fact rows: {}", dataset.facts.len());
    println!("   Rows without order date: {}", dataset.undated_rows());
    println!("   Orders: {}", dataset.order_count());
    println!("   Customers: {}", dataset.customer_count());
    println!("\n   Analyses that would run:");
    for kind in &config.analysis.analyses {
        println!("     📊 {}", kind.title());
    }

    println!("\n✅ Dry run complete.");
    Ok(())
}

fn print_summary(results: &[AnalysisOutput], duration: f64) {
    println!("\n📊 Results:");
    for result in results {
        println!("   {:<24} {} rows", result.kind().name(), result.len());
    }
    println!("   Duration: {:.1}s", duration);
}

/// Pick the output path for `format`.
///
/// The default Markdown file name gets the matching extension for JSON,
/// and loses it for CSV, which writes a directory.
fn output_path(configured: &Path, format: OutputFormat) -> PathBuf {
    if configured != Path::new(DEFAULT_OUTPUT) {
        return configured.to_path_buf();
    }

    match format {
        OutputFormat::Markdown => configured.to_path_buf(),
        OutputFormat::Json => configured.with_extension("json"),
        OutputFormat::Csv => configured.with_extension(""),
    }
}

/// Load configuration, merge the CLI arguments over it and validate.
///
/// `--config` wins over `<dir>/.saleslens.toml`; with neither, defaults are
/// used. A config file that exists but does not parse is an error. Also
/// returns the file the settings came from, if any.
fn load_config(args: &Args, dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    let (mut config, source) = match args.config {
        Some(ref config_path) => (Config::load(config_path)?, Some(config_path.clone())),
        None => match Config::load_default_in(dir)? {
            Some(config) => (config, Some(dir.join(CONFIG_FILE))),
            None => (Config::default(), None),
        },
    };

    config.merge_with_args(args);
    config.validate()?;
    Ok((config, source))
}
