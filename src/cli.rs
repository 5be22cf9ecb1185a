//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Options left unset fall back to the
//! configuration file, then to built-in defaults.

use crate::analysis::{AnalysisKind, Dimension};
use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SalesLens - batch sales analytics
///
/// Reads a sales fact export (CSV) and produces revenue trends, product
/// profitability, RFM customer segments, cohort retention and more as
/// Markdown, JSON or CSV result sets.
///
/// Examples:
///   saleslens --data data/v_sales_fact.csv
///   saleslens --data data/ --analysis rfm,cohorts --as-of 2024-06-30
///   saleslens --data data/ --format csv --output results/
///   saleslens --data data/ --dry-run
///   saleslens --init-config
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Sales fact CSV file or directory of CSV files
    ///
    /// Can also be set via SALESLENS_DATA or the [data] section of .saleslens.toml.
    #[arg(short, long, value_name = "PATH", env = "SALESLENS_DATA")]
    pub data: Option<PathBuf>,

    /// Customer reference table (customer_id, customer_name)
    ///
    /// Defaults to customers.csv next to the fact data, if present.
    #[arg(long, value_name = "FILE")]
    pub customers: Option<PathBuf>,

    /// Analyses to run (comma-separated)
    ///
    /// Example: --analysis rfm,cohorts,at-risk. Runs all analyses by default.
    #[arg(short, long, value_name = "LIST", value_delimiter = ',')]
    pub analysis: Option<Vec<AnalysisKind>>,

    /// Reference date for recency and lookback windows (YYYY-MM-DD)
    ///
    /// Defaults to today.
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<NaiveDate>,

    /// Output path for the report (a directory when --format csv)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json, csv)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .saleslens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Dimension for the breakdown analysis
    #[arg(long, value_name = "DIMENSION")]
    pub group_by: Option<Dimension>,

    /// Number of products in the top products ranking
    #[arg(long, value_name = "N")]
    pub top_n: Option<usize>,

    /// Emit zero rows for inactive quarters in cohort retention
    #[arg(long)]
    pub zero_fill_cohorts: bool,

    /// Number of analyses to run concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: load and validate the data, print counts and exit
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .saleslens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
    /// One CSV file per analysis
    Csv,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.top_n == Some(0) {
            return Err("Top N must be at least 1".to_string());
        }

        if let Some(ref analyses) = self.analysis {
            if analyses.is_empty() {
                return Err("At least one analysis must be selected".to_string());
            }
        }

        // Validate data path if provided
        if let Some(ref data) = self.data {
            if !data.exists() {
                return Err(format!("Data path does not exist: {}", data.display()));
            }
        }

        if let Some(ref customers) = self.customers {
            if !customers.is_file() {
                return Err(format!(
                    "Customer table is not a file: {}",
                    customers.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the `[general] verbose` setting; `--quiet` wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analysis_list() {
        let args = Args::try_parse_from([
            "saleslens",
            "--analysis",
            "rfm,cohorts,at-risk",
            "--as-of",
            "2024-06-30",
            "--format",
            "csv",
            "--group-by",
            "sales-rep",
        ])
        .unwrap();

        assert_eq!(
            args.analysis,
            Some(vec![
                AnalysisKind::Rfm,
                AnalysisKind::Cohorts,
                AnalysisKind::AtRisk
            ])
        );
        assert_eq!(args.as_of, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(args.format, Some(OutputFormat::Csv));
        assert_eq!(args.group_by, Some(Dimension::SalesRep));
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert!(Args::try_parse_from(["saleslens", "--as-of", "30/06/2024"]).is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = Args {
            verbose: true,
            quiet: true,
            ..Args::default()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_values() {
        let args = Args {
            concurrency: Some(0),
            ..Args::default()
        };
        assert!(args.validate().is_err());

        let args = Args {
            top_n: Some(0),
            ..Args::default()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_data_path() {
        let args = Args {
            data: Some(PathBuf::from("/definitely/not/here")),
            ..Args::default()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = Args::default();
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_level_from_config() {
        let mut args = Args::default();
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
