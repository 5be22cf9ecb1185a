//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration from
//! `.saleslens.toml` files.

use crate::analysis::{AnalysisKind, Dimension};
use crate::cli::OutputFormat;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".saleslens.toml";

/// Default report path.
pub const DEFAULT_OUTPUT: &str = "sales_report.md";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input data settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Analysis parameters.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output path (a directory for CSV output).
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of analyses run at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_concurrency() -> usize {
    4
}

/// Input data locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// Sales fact CSV file, or a directory of CSV partitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<PathBuf>,

    /// Customer reference table. Defaults to `customers.csv` next to the facts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customers: Option<PathBuf>,
}

/// Analysis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Analyses to run, in report order.
    #[serde(default = "default_analyses")]
    pub analyses: Vec<AnalysisKind>,

    /// Reference date for recency (defaults to today).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,

    /// Number of RFM score buckets.
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,

    /// Days without an order before a customer counts as at risk.
    #[serde(default = "default_lookback_days")]
    pub at_risk_lookback_days: i64,

    /// Minimum lifetime value for at-risk detection.
    #[serde(default = "default_min_lifetime_value")]
    pub at_risk_min_lifetime_value: f64,

    /// Margins below this percentage are "Low Margin".
    #[serde(default = "default_low_margin")]
    pub low_margin_pct: f64,

    /// Margins at or above this percentage are "High Margin".
    #[serde(default = "default_high_margin")]
    pub high_margin_pct: f64,

    /// Rows in the top products ranking.
    #[serde(default = "default_top_products")]
    pub top_products_limit: usize,

    /// Rows in the product pair ranking.
    #[serde(default = "default_product_pairs")]
    pub product_pair_limit: usize,

    /// Emit zero rows for quarters with no activity in the cohort grid.
    #[serde(default)]
    pub zero_fill_cohorts: bool,

    /// Dimension for the generic breakdown.
    #[serde(default)]
    pub breakdown_dimension: Dimension,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analyses: default_analyses(),
            as_of: None,
            bucket_count: default_bucket_count(),
            at_risk_lookback_days: default_lookback_days(),
            at_risk_min_lifetime_value: default_min_lifetime_value(),
            low_margin_pct: default_low_margin(),
            high_margin_pct: default_high_margin(),
            top_products_limit: default_top_products(),
            product_pair_limit: default_product_pairs(),
            zero_fill_cohorts: false,
            breakdown_dimension: Dimension::default(),
        }
    }
}

fn default_analyses() -> Vec<AnalysisKind> {
    AnalysisKind::ALL.to_vec()
}

fn default_bucket_count() -> usize {
    5
}

fn default_lookback_days() -> i64 {
    90
}

fn default_min_lifetime_value() -> f64 {
    1000.0
}

fn default_low_margin() -> f64 {
    10.0
}

fn default_high_margin() -> f64 {
    30.0
}

fn default_top_products() -> usize {
    10
}

fn default_product_pairs() -> usize {
    20
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Maximum rows per table in Markdown reports (0 = unlimited).
    #[serde(default = "default_max_table_rows")]
    pub max_table_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            max_table_rows: default_max_table_rows(),
        }
    }
}

fn default_max_table_rows() -> usize {
    50
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load `.saleslens.toml` from `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default_in(dir: &Path) -> Result<Option<Self>> {
        let default_path = dir.join(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(&default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence, but only when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.data.facts = Some(data.clone());
        }
        if let Some(ref customers) = args.customers {
            self.data.customers = Some(customers.clone());
        }

        if let Some(ref analyses) = args.analysis {
            self.analysis.analyses = analyses.clone();
        }
        if let Some(as_of) = args.as_of {
            self.analysis.as_of = Some(as_of);
        }
        if let Some(dimension) = args.group_by {
            self.analysis.breakdown_dimension = dimension;
        }
        if let Some(top_n) = args.top_n {
            self.analysis.top_products_limit = top_n;
        }
        if args.zero_fill_cohorts {
            self.analysis.zero_fill_cohorts = true;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.clone();
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.analysis.bucket_count == 0 {
            bail!("analysis.bucket_count must be at least 1");
        }
        if self.analysis.low_margin_pct >= self.analysis.high_margin_pct {
            bail!(
                "analysis.low_margin_pct ({}) must be below analysis.high_margin_pct ({})",
                self.analysis.low_margin_pct,
                self.analysis.high_margin_pct
            );
        }
        if self.analysis.at_risk_lookback_days < 0 {
            bail!("analysis.at_risk_lookback_days must not be negative");
        }
        if self.general.concurrency == 0 {
            bail!("general.concurrency must be at least 1");
        }
        if self.analysis.analyses.is_empty() {
            bail!("No analyses selected");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
