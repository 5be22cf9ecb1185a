//! Data models for the sales analytics.
//!
//! This module contains the input records (sales facts and customers),
//! the calendar periods used for grouping, the derived labels, and the
//! report envelope written at the end of a run.

use crate::analysis::AnalysisOutput;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One line of the denormalized sales fact view: a single product on a single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesFact {
    /// Order identifier.
    pub order_id: String,
    /// Order date. `None` when the source row has no usable date.
    #[serde(default, deserialize_with = "deserialize_order_date")]
    pub order_date: Option<NaiveDate>,
    /// Customer identifier.
    pub customer_id: String,
    /// Customer display name, if the export carries it.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Product identifier.
    pub product_id: String,
    /// Product display name, if the export carries it.
    #[serde(default)]
    pub product_name: Option<String>,
    /// Product category.
    pub category: String,
    /// Units sold.
    pub quantity: u32,
    /// List price per unit.
    pub unit_price: f64,
    /// Discount as a fraction of the gross amount (0.0 - 1.0).
    #[serde(default)]
    pub discount_rate: Option<f64>,
    /// Net revenue as computed upstream.
    #[serde(default)]
    pub net_revenue: Option<f64>,
    /// Cost of goods for the line.
    #[serde(default)]
    pub cost: Option<f64>,
    /// Profit as computed upstream.
    #[serde(default)]
    pub profit: Option<f64>,
    /// Customer segment (Consumer, Corporate, ...).
    #[serde(default)]
    pub segment: Option<String>,
    /// Sales region.
    #[serde(default)]
    pub region: Option<String>,
    /// Sales representative who owns the order.
    #[serde(default)]
    pub sales_rep: Option<String>,
}

impl SalesFact {
    /// Gross amount before discount.
    pub fn gross_revenue(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }

    /// Discount fraction, zero when absent.
    pub fn discount(&self) -> f64 {
        self.discount_rate.unwrap_or(0.0)
    }

    /// Net revenue, falling back to `unit_price * quantity * (1 - discount_rate)`.
    pub fn net_revenue(&self) -> f64 {
        self.net_revenue
            .unwrap_or_else(|| self.gross_revenue() * (1.0 - self.discount()))
    }

    /// Cost, zero when absent.
    pub fn cost(&self) -> f64 {
        self.cost.unwrap_or(0.0)
    }

    /// Profit, falling back to `net_revenue - cost`.
    pub fn profit(&self) -> f64 {
        self.profit.unwrap_or_else(|| self.net_revenue() - self.cost())
    }

    /// Dollars given away as discount on this line.
    pub fn discount_dollars(&self) -> f64 {
        self.gross_revenue() - self.net_revenue()
    }

    /// Product label for reports: the name when known, otherwise the id.
    pub fn product_label(&self) -> &str {
        self.product_name.as_deref().unwrap_or(&self.product_id)
    }
}

/// Customer reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
}

/// Parse an order date from either `YYYY-MM-DD` or a timestamp starting with one.
pub fn parse_order_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Empty cells become `None`; anything else must be a date.
fn deserialize_order_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_order_date(value).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("expected date (YYYY-MM-DD), got '{}'", value))
        }),
    }
}

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A calendar quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    pub year: i32,
    /// 1 - 4
    pub quarter: u32,
}

impl Quarter {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: date.month0() / 3 + 1,
        }
    }

    /// Continuous quarter number, so that consecutive quarters differ by one.
    fn ordinal(&self) -> i64 {
        i64::from(self.year) * 4 + i64::from(self.quarter) - 1
    }

    /// Number of quarters from `earlier` to `self`.
    pub fn quarters_since(&self, earlier: Quarter) -> i64 {
        self.ordinal() - earlier.ordinal()
    }

    /// The following quarter.
    pub fn next(&self) -> Self {
        if self.quarter == 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

impl Serialize for Quarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Customer segment derived from RFM scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    Champions,
    Loyal,
    #[serde(rename = "At Risk")]
    AtRisk,
    Potential,
}

impl Segment {
    /// All segments in rule order.
    pub const ALL: [Segment; 4] = [
        Segment::Champions,
        Segment::Loyal,
        Segment::AtRisk,
        Segment::Potential,
    ];
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Champions => write!(f, "Champions"),
            Segment::Loyal => write!(f, "Loyal"),
            Segment::AtRisk => write!(f, "At Risk"),
            Segment::Potential => write!(f, "Potential"),
        }
    }
}

/// Categorical bucket of a product's profit margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarginBand {
    #[serde(rename = "No Sales")]
    NoSales,
    #[serde(rename = "Low Margin")]
    Low,
    #[serde(rename = "Mid Margin")]
    Mid,
    #[serde(rename = "High Margin")]
    High,
}

impl fmt::Display for MarginBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarginBand::NoSales => write!(f, "No Sales"),
            MarginBand::Low => write!(f, "Low Margin"),
            MarginBand::Mid => write!(f, "Mid Margin"),
            MarginBand::High => write!(f, "High Margin"),
        }
    }
}

/// Metadata about the analytics run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Where the fact data was loaded from.
    pub data_source: String,
    /// Reference date used for recency and lookback windows.
    pub as_of: NaiveDate,
    /// Wall-clock time the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Number of sales fact rows in the snapshot.
    pub fact_rows: usize,
    /// Rows without an order date (excluded from temporal analyses).
    pub undated_rows: usize,
    /// Distinct orders in the snapshot.
    pub orders: usize,
    /// Distinct customers in the snapshot.
    pub customers: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete analytics report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub results: Vec<AnalysisOutput>,
}
