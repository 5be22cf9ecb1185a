//! Report generation.
//!
//! This module renders the analysis results as a Markdown report, a JSON
//! document, or a directory of CSV files (one per analysis).

use crate::analysis::AnalysisOutput;
use crate::cli::OutputFormat;
use crate::models::{Report, ReportMetadata};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Column headers and formatted cells of one result set.
struct Table {
    headers: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

fn num(value: f64) -> String {
    format!("{:.2}", value)
}

fn opt_num(value: Option<f64>) -> String {
    value.map(num).unwrap_or_else(|| "-".to_string())
}

fn opt_text(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

/// Make free text safe inside a Markdown table cell.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(|c: char| c == '\r' || c == '\n', " ")
}

/// Build the Markdown table for a result set.
fn table(output: &AnalysisOutput) -> Table {
    match output {
        AnalysisOutput::MonthlyRevenue(rows) => Table {
            headers: &[
                "Month", "Orders", "Customers", "Revenue", "Profit", "Margin %",
                "Running Revenue", "MoM Growth %",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.month.to_string(),
                        r.orders.to_string(),
                        r.customers.to_string(),
                        num(r.revenue),
                        num(r.profit),
                        opt_num(r.margin_pct),
                        num(r.running_revenue),
                        opt_num(r.mom_growth_pct),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::DiscountLeakage(rows) => Table {
            headers: &["Month", "Gross", "Net", "Discount $", "Discount % of Gross"],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.month.to_string(),
                        num(r.gross_revenue),
                        num(r.net_revenue),
                        num(r.discount_dollars),
                        opt_num(r.discount_rate_pct_of_gross),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::CategoryPerformance(rows) => Table {
            headers: &[
                "Category", "Orders", "Units", "Revenue", "Cost", "Profit", "Margin %",
                "Revenue Share %",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.category.clone(),
                        r.orders.to_string(),
                        r.units.to_string(),
                        num(r.revenue),
                        num(r.cost),
                        num(r.profit),
                        opt_num(r.margin_pct),
                        opt_num(r.revenue_share_pct),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::ProductProfitability(rows) | AnalysisOutput::TopProducts(rows) => Table {
            headers: &[
                "#", "Product", "Name", "Category", "Units", "Revenue", "Profit", "Margin %",
                "Band",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.rank.to_string(),
                        format!("`{}`", r.product_id),
                        r.product_name.clone(),
                        r.category.clone(),
                        r.units.to_string(),
                        num(r.revenue),
                        num(r.profit),
                        opt_num(r.margin_pct),
                        r.margin_band.to_string(),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::ProductPairs(rows) => Table {
            headers: &["Product A", "Product B", "Orders Together", "Support %"],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.product_a_name.clone(),
                        r.product_b_name.clone(),
                        r.co_orders.to_string(),
                        opt_num(r.support_pct),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::SalesReps(rows) => Table {
            headers: &[
                "Rank", "Sales Rep", "Orders", "Customers", "Revenue", "Profit", "Margin %",
                "Avg Order",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.revenue_rank.to_string(),
                        r.sales_rep.clone(),
                        r.orders.to_string(),
                        r.customers.to_string(),
                        num(r.revenue),
                        num(r.profit),
                        opt_num(r.margin_pct),
                        opt_num(r.avg_order_value),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::SegmentRegion(rows) => Table {
            headers: &[
                "Segment", "Region", "Orders", "Customers", "Revenue", "Profit", "Margin %",
                "Avg Order",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.segment.clone(),
                        r.region.clone(),
                        r.orders.to_string(),
                        r.customers.to_string(),
                        num(r.revenue),
                        num(r.profit),
                        opt_num(r.margin_pct),
                        opt_num(r.avg_order_value),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::Breakdown(rows) => Table {
            headers: &[
                "Key", "Rows", "Orders", "Customers", "Units", "Revenue", "Cost", "Profit",
                "Margin %", "Avg Order",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.key.clone(),
                        r.rows.to_string(),
                        r.orders.to_string(),
                        r.customers.to_string(),
                        r.units.to_string(),
                        num(r.revenue),
                        num(r.cost),
                        num(r.profit),
                        opt_num(r.margin_pct),
                        opt_num(r.avg_order_value),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::Rfm(rows) => Table {
            headers: &[
                "Customer", "Name", "Last Order", "Recency (days)", "Frequency", "Monetary",
                "RFM", "Segment",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        format!("`{}`", r.customer_id),
                        opt_text(&r.customer_name),
                        r.last_order_date.to_string(),
                        r.recency_days.to_string(),
                        r.frequency.to_string(),
                        num(r.monetary),
                        r.rfm_code.clone(),
                        r.segment.to_string(),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::RfmSegments(rows) => Table {
            headers: &["Segment", "Customers", "Share %", "Total Monetary", "Avg Monetary"],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.segment.to_string(),
                        r.customers.to_string(),
                        opt_num(r.share_pct),
                        num(r.total_monetary),
                        opt_num(r.avg_monetary),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::Cohorts(rows) => Table {
            headers: &[
                "Cohort", "Active Quarter", "Offset", "Cohort Size", "Active", "Retention %",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        r.cohort.to_string(),
                        r.active_quarter.to_string(),
                        r.quarter_offset.to_string(),
                        r.cohort_size.to_string(),
                        r.active_customers.to_string(),
                        num(r.retention_pct),
                    ]
                })
                .collect(),
        },
        AnalysisOutput::AtRisk(rows) => Table {
            headers: &[
                "Customer", "Name", "Last Order", "Days Quiet", "Orders", "Lifetime Value",
            ],
            rows: rows
                .iter()
                .map(|r| {
                    vec![
                        format!("`{}`", r.customer_id),
                        opt_text(&r.customer_name),
                        r.last_order_date.to_string(),
                        r.days_since_last_order.to_string(),
                        r.lifetime_orders.to_string(),
                        num(r.lifetime_value),
                    ]
                })
                .collect(),
        },
    }
}

/// Generate a complete Markdown report.
///
/// Tables longer than `max_rows` are cut, with a note; 0 means no limit.
pub fn generate_markdown_report(report: &Report, max_rows: usize) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Sales Analytics Report\n\n");

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Table of contents
    output.push_str(&generate_table_of_contents(&report.results));

    // One section per analysis
    for result in &report.results {
        output.push_str(&generate_analysis_section(result, max_rows));
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Data Source:** `{}`\n", metadata.data_source));
    section.push_str(&format!("- **As Of:** {}\n", metadata.as_of));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Fact Rows:** {}\n", metadata.fact_rows));
    if metadata.undated_rows > 0 {
        section.push_str(&format!(
            "- **Rows Without Order Date:** {} (excluded from time-based analyses)\n",
            metadata.undated_rows
        ));
    }
    section.push_str(&format!("- **Orders:** {}\n", metadata.orders));
    section.push_str(&format!("- **Customers:** {}\n", metadata.customers));
    section.push_str(&format!(
        "- **Run Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn anchor(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-')
        .collect::<String>()
        .replace(' ', "-")
}

/// Generate the table of contents.
fn generate_table_of_contents(results: &[AnalysisOutput]) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");

    for result in results {
        let title = result.kind().title();
        toc.push_str(&format!("- [{}](#{})\n", title, anchor(title)));
    }

    toc.push('\n');

    toc
}

/// Generate the section for one analysis.
fn generate_analysis_section(result: &AnalysisOutput, max_rows: usize) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", result.kind().title()));

    if result.is_empty() {
        section.push_str("*No rows.*\n\n");
        return section;
    }

    let table = table(result);

    section.push_str(&format!("| {} |\n", table.headers.join(" | ")));
    section.push_str(&format!(
        "|{}\n",
        table.headers.iter().map(|_| ":---|").collect::<String>()
    ));

    let shown = if max_rows == 0 {
        table.rows.len()
    } else {
        table.rows.len().min(max_rows)
    };

    for row in table.rows.iter().take(shown) {
        let cells: Vec<String> = row.iter().map(|cell| escape_cell(cell)).collect();
        section.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    section.push('\n');

    if shown < table.rows.len() {
        section.push_str(&format!(
            "*Showing {} of {} rows. Use JSON or CSV output for the full result set.*\n\n",
            shown,
            table.rows.len()
        ));
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by SalesLens v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write one result set as a CSV file.
fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }

    writer.flush()?;
    Ok(())
}

/// Write every result set as `<dir>/<analysis>.csv`.
pub fn write_csv_reports(report: &Report, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    for result in &report.results {
        let path = dir.join(format!("{}.csv", result.kind().name()));
        debug!("Writing {}", path.display());

        match result {
            AnalysisOutput::MonthlyRevenue(rows) => write_rows(&path, rows)?,
            AnalysisOutput::DiscountLeakage(rows) => write_rows(&path, rows)?,
            AnalysisOutput::CategoryPerformance(rows) => write_rows(&path, rows)?,
            AnalysisOutput::ProductProfitability(rows) | AnalysisOutput::TopProducts(rows) => {
                write_rows(&path, rows)?
            }
            AnalysisOutput::ProductPairs(rows) => write_rows(&path, rows)?,
            AnalysisOutput::SalesReps(rows) => write_rows(&path, rows)?,
            AnalysisOutput::SegmentRegion(rows) => write_rows(&path, rows)?,
            AnalysisOutput::Breakdown(rows) => write_rows(&path, rows)?,
            AnalysisOutput::Rfm(rows) => write_rows(&path, rows)?,
            AnalysisOutput::RfmSegments(rows) => write_rows(&path, rows)?,
            AnalysisOutput::Cohorts(rows) => write_rows(&path, rows)?,
            AnalysisOutput::AtRisk(rows) => write_rows(&path, rows)?,
        }
    }

    Ok(())
}

/// Write the report in `format` to `path`.
pub fn write_report(
    report: &Report,
    format: OutputFormat,
    path: &Path,
    max_rows: usize,
) -> Result<()> {
    if format == OutputFormat::Csv {
        return write_csv_reports(report, path);
    }

    let content = match format {
        OutputFormat::Json => generate_json_report(report)?,
        _ => generate_markdown_report(report, max_rows),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisKind, CohortRetention, DiscountLeakage, RfmScore};
    use crate::models::fixtures::date;
    use crate::models::{Month, Quarter, Segment};
    use chrono::Utc;

    fn create_test_report() -> Report {
        let metadata = ReportMetadata {
            data_source: "data/v_sales_fact.csv".to_string(),
            as_of: date("2024-06-30"),
            generated_at: Utc::now(),
            fact_rows: 120,
            undated_rows: 3,
            orders: 40,
            customers: 12,
            duration_seconds: 0.25,
        };

        Report {
            metadata,
            results: vec![
                AnalysisOutput::DiscountLeakage(vec![DiscountLeakage {
                    month: Month {
                        year: 2024,
                        month: 5,
                    },
                    gross_revenue: 10000.0,
                    net_revenue: 9000.0,
                    discount_dollars: 1000.0,
                    discount_rate_pct_of_gross: Some(10.0),
                }]),
                AnalysisOutput::Rfm(vec![RfmScore {
                    customer_id: "C1".to_string(),
                    customer_name: None,
                    last_order_date: date("2024-06-01"),
                    recency_days: 29,
                    frequency: 3,
                    monetary: 450.0,
                    r_score: 5,
                    f_score: 4,
                    m_score: 4,
                    rfm_code: "544".to_string(),
                    segment: Segment::Champions,
                }]),
                AnalysisOutput::Cohorts(vec![CohortRetention {
                    cohort: Quarter {
                        year: 2024,
                        quarter: 1,
                    },
                    active_quarter: Quarter {
                        year: 2024,
                        quarter: 1,
                    },
                    quarter_offset: 0,
                    cohort_size: 4,
                    active_customers: 4,
                    retention_pct: 100.0,
                }]),
                AnalysisOutput::AtRisk(Vec::new()),
            ],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, 50);

        assert!(markdown.contains("# Sales Analytics Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("Rows Without Order Date:** 3"));
        assert!(markdown.contains("## Discount Leakage"));
        assert!(markdown.contains("| 2024-05 | 10000.00 | 9000.00 | 1000.00 | 10.00 |"));
        assert!(markdown.contains("| `C1` | - | 2024-06-01 | 29 | 3 | 450.00 | 544 | Champions |"));
        assert!(markdown.contains("| 2024-Q1 | 2024-Q1 | 0 | 4 | 4 | 100.00 |"));
        assert!(markdown.contains("## At-Risk Customers\n\n*No rows.*"));
        assert!(markdown.contains("- [At-Risk Customers](#at-risk-customers)"));
    }

    #[test]
    fn test_markdown_truncates_long_tables() {
        let rows = (1..=5)
            .map(|month| DiscountLeakage {
                month: Month { year: 2024, month },
                gross_revenue: 0.0,
                net_revenue: 0.0,
                discount_dollars: 0.0,
                discount_rate_pct_of_gross: None,
            })
            .collect();
        let section = generate_analysis_section(&AnalysisOutput::DiscountLeakage(rows), 2);

        assert!(section.contains("| 2024-02 |"));
        assert!(!section.contains("| 2024-03 |"));
        assert!(section.contains("Showing 2 of 5 rows"));
        assert!(section.contains("| - |"));
    }

    #[test]
    fn test_pipes_in_names_are_escaped() {
        let row = crate::analysis::CategoryPerformance {
            category: "Paper | Pens".to_string(),
            orders: 1,
            units: 1,
            revenue: 10.0,
            cost: 0.0,
            profit: 10.0,
            margin_pct: Some(100.0),
            revenue_share_pct: Some(100.0),
        };
        let section =
            generate_analysis_section(&AnalysisOutput::CategoryPerformance(vec![row]), 50);

        assert!(section.contains("| Paper \\| Pens | 1 |"));
        let data_line = section
            .lines()
            .find(|l| l.contains("Paper"))
            .unwrap();
        assert_eq!(data_line.replace("\\|", "").matches('|').count(), 9);
    }

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell("a|b"), "a\\|b");
        assert_eq!(escape_cell("two\nlines"), "two lines");
        assert_eq!(escape_cell("plain"), "plain");
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor("Segment & Region"), "segment--region");
        assert_eq!(anchor("RFM Scores"), "rfm-scores");
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"as_of\": \"2024-06-30\""));
        assert!(json.contains("\"analysis\": \"rfm\""));
        assert!(json.contains("\"segment\": \"Champions\""));
        assert!(json.contains("\"cohort\": \"2024-Q1\""));
    }

    #[test]
    fn test_write_csv_reports() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        let report = create_test_report();

        write_report(&report, OutputFormat::Csv, &out, 0).unwrap();

        let leakage = std::fs::read_to_string(out.join("discount_leakage.csv")).unwrap();
        let mut lines = leakage.lines();
        assert_eq!(
            lines.next(),
            Some("month,gross_revenue,net_revenue,discount_dollars,discount_rate_pct_of_gross")
        );
        assert_eq!(lines.next(), Some("2024-05,10000.0,9000.0,1000.0,10.0"));

        let rfm = std::fs::read_to_string(out.join("rfm.csv")).unwrap();
        assert!(rfm.contains("C1,,2024-06-01,29,3,450.0,5,4,4,544,Champions"));

        assert!(out.join(format!("{}.csv", AnalysisKind::AtRisk.name())).exists());
    }

    #[test]
    fn test_write_markdown_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.md");

        write_report(&create_test_report(), OutputFormat::Markdown, &path, 50).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .starts_with("# Sales Analytics Report"));
    }
}
