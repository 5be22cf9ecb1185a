//! Analysis modules.
//!
//! Every analysis is a pure function of the loaded [`Dataset`] and the
//! [`AnalysisParams`]; [`run`] dispatches on [`AnalysisKind`].

pub mod aggregator;
pub mod basket;
pub mod cohort;
pub mod rfm;

pub use aggregator::{
    CategoryPerformance, Dimension, DiscountLeakage, GroupSummary, MarginThresholds,
    MonthlyRevenue, ProductProfitability, RepPerformance, SegmentRegion,
};
pub use basket::ProductPair;
pub use cohort::CohortRetention;
pub use rfm::{AtRiskCustomer, RfmScore, SegmentSummary};

use crate::config::AnalysisConfig;
use crate::loader::Dataset;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// The analyses this tool can run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    MonthlyRevenue,
    DiscountLeakage,
    CategoryPerformance,
    ProductProfitability,
    TopProducts,
    ProductPairs,
    SalesReps,
    SegmentRegion,
    Breakdown,
    Rfm,
    RfmSegments,
    Cohorts,
    AtRisk,
}

impl AnalysisKind {
    /// Every analysis, in report order.
    pub const ALL: [AnalysisKind; 13] = [
        AnalysisKind::MonthlyRevenue,
        AnalysisKind::DiscountLeakage,
        AnalysisKind::CategoryPerformance,
        AnalysisKind::ProductProfitability,
        AnalysisKind::TopProducts,
        AnalysisKind::ProductPairs,
        AnalysisKind::SalesReps,
        AnalysisKind::SegmentRegion,
        AnalysisKind::Breakdown,
        AnalysisKind::Rfm,
        AnalysisKind::RfmSegments,
        AnalysisKind::Cohorts,
        AnalysisKind::AtRisk,
    ];

    /// Machine name, used for JSON tags and CSV file names.
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisKind::MonthlyRevenue => "monthly_revenue",
            AnalysisKind::DiscountLeakage => "discount_leakage",
            AnalysisKind::CategoryPerformance => "category_performance",
            AnalysisKind::ProductProfitability => "product_profitability",
            AnalysisKind::TopProducts => "top_products",
            AnalysisKind::ProductPairs => "product_pairs",
            AnalysisKind::SalesReps => "sales_reps",
            AnalysisKind::SegmentRegion => "segment_region",
            AnalysisKind::Breakdown => "breakdown",
            AnalysisKind::Rfm => "rfm",
            AnalysisKind::RfmSegments => "rfm_segments",
            AnalysisKind::Cohorts => "cohorts",
            AnalysisKind::AtRisk => "at_risk",
        }
    }

    /// Human-readable title for reports.
    pub fn title(&self) -> &'static str {
        match self {
            AnalysisKind::MonthlyRevenue => "Monthly Revenue Trend",
            AnalysisKind::DiscountLeakage => "Discount Leakage",
            AnalysisKind::CategoryPerformance => "Category Performance",
            AnalysisKind::ProductProfitability => "Product Profitability",
            AnalysisKind::TopProducts => "Top Products by Profit",
            AnalysisKind::ProductPairs => "Product Pair Affinity",
            AnalysisKind::SalesReps => "Sales Rep Performance",
            AnalysisKind::SegmentRegion => "Segment & Region",
            AnalysisKind::Breakdown => "Breakdown",
            AnalysisKind::Rfm => "RFM Scores",
            AnalysisKind::RfmSegments => "RFM Segments",
            AnalysisKind::Cohorts => "Cohort Retention",
            AnalysisKind::AtRisk => "At-Risk Customers",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parameters shared by all analyses in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParams {
    /// Reference date for recency and lookback windows.
    pub as_of: NaiveDate,
    /// Number of tiles for RFM scoring.
    pub bucket_count: usize,
    pub at_risk_lookback_days: i64,
    pub at_risk_min_lifetime_value: f64,
    pub margin_thresholds: MarginThresholds,
    pub top_products_limit: usize,
    pub product_pair_limit: usize,
    pub zero_fill_cohorts: bool,
    pub breakdown_dimension: Dimension,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl AnalysisParams {
    /// Build parameters from configuration; a missing `as_of` means today (UTC).
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            as_of: config.as_of.unwrap_or_else(|| Utc::now().date_naive()),
            bucket_count: config.bucket_count,
            at_risk_lookback_days: config.at_risk_lookback_days,
            at_risk_min_lifetime_value: config.at_risk_min_lifetime_value,
            margin_thresholds: MarginThresholds {
                low_pct: config.low_margin_pct,
                high_pct: config.high_margin_pct,
            },
            top_products_limit: config.top_products_limit,
            product_pair_limit: config.product_pair_limit,
            zero_fill_cohorts: config.zero_fill_cohorts,
            breakdown_dimension: config.breakdown_dimension,
        }
    }
}

/// Result set of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "analysis", content = "rows", rename_all = "snake_case")]
pub enum AnalysisOutput {
    MonthlyRevenue(Vec<MonthlyRevenue>),
    DiscountLeakage(Vec<DiscountLeakage>),
    CategoryPerformance(Vec<CategoryPerformance>),
    ProductProfitability(Vec<ProductProfitability>),
    TopProducts(Vec<ProductProfitability>),
    ProductPairs(Vec<ProductPair>),
    SalesReps(Vec<RepPerformance>),
    SegmentRegion(Vec<SegmentRegion>),
    Breakdown(Vec<GroupSummary>),
    Rfm(Vec<RfmScore>),
    RfmSegments(Vec<SegmentSummary>),
    Cohorts(Vec<CohortRetention>),
    AtRisk(Vec<AtRiskCustomer>),
}

impl AnalysisOutput {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisOutput::MonthlyRevenue(_) => AnalysisKind::MonthlyRevenue,
            AnalysisOutput::DiscountLeakage(_) => AnalysisKind::DiscountLeakage,
            AnalysisOutput::CategoryPerformance(_) => AnalysisKind::CategoryPerformance,
            AnalysisOutput::ProductProfitability(_) => AnalysisKind::ProductProfitability,
            AnalysisOutput::TopProducts(_) => AnalysisKind::TopProducts,
            AnalysisOutput::ProductPairs(_) => AnalysisKind::ProductPairs,
            AnalysisOutput::SalesReps(_) => AnalysisKind::SalesReps,
            AnalysisOutput::SegmentRegion(_) => AnalysisKind::SegmentRegion,
            AnalysisOutput::Breakdown(_) => AnalysisKind::Breakdown,
            AnalysisOutput::Rfm(_) => AnalysisKind::Rfm,
            AnalysisOutput::RfmSegments(_) => AnalysisKind::RfmSegments,
            AnalysisOutput::Cohorts(_) => AnalysisKind::Cohorts,
            AnalysisOutput::AtRisk(_) => AnalysisKind::AtRisk,
        }
    }

    /// Number of rows in the result set.
    pub fn len(&self) -> usize {
        match self {
            AnalysisOutput::MonthlyRevenue(rows) => rows.len(),
            AnalysisOutput::DiscountLeakage(rows) => rows.len(),
            AnalysisOutput::CategoryPerformance(rows) => rows.len(),
            AnalysisOutput::ProductProfitability(rows) | AnalysisOutput::TopProducts(rows) => {
                rows.len()
            }
            AnalysisOutput::ProductPairs(rows) => rows.len(),
            AnalysisOutput::SalesReps(rows) => rows.len(),
            AnalysisOutput::SegmentRegion(rows) => rows.len(),
            AnalysisOutput::Breakdown(rows) => rows.len(),
            AnalysisOutput::Rfm(rows) => rows.len(),
            AnalysisOutput::RfmSegments(rows) => rows.len(),
            AnalysisOutput::Cohorts(rows) => rows.len(),
            AnalysisOutput::AtRisk(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run one analysis over the snapshot.
pub fn run(kind: AnalysisKind, dataset: &Dataset, params: &AnalysisParams) -> AnalysisOutput {
    debug!("Running analysis: {}", kind);

    match kind {
        AnalysisKind::MonthlyRevenue => {
            AnalysisOutput::MonthlyRevenue(aggregator::monthly_revenue(dataset))
        }
        AnalysisKind::DiscountLeakage => {
            AnalysisOutput::DiscountLeakage(aggregator::discount_leakage(dataset))
        }
        AnalysisKind::CategoryPerformance => {
            AnalysisOutput::CategoryPerformance(aggregator::category_performance(dataset))
        }
        AnalysisKind::ProductProfitability => AnalysisOutput::ProductProfitability(
            aggregator::product_profitability(dataset, &params.margin_thresholds),
        ),
        AnalysisKind::TopProducts => AnalysisOutput::TopProducts(aggregator::top_products(
            dataset,
            &params.margin_thresholds,
            params.top_products_limit,
        )),
        AnalysisKind::ProductPairs => AnalysisOutput::ProductPairs(basket::product_pairs(
            dataset,
            params.product_pair_limit,
        )),
        AnalysisKind::SalesReps => AnalysisOutput::SalesReps(aggregator::sales_reps(dataset)),
        AnalysisKind::SegmentRegion => {
            AnalysisOutput::SegmentRegion(aggregator::segment_region(dataset))
        }
        AnalysisKind::Breakdown => AnalysisOutput::Breakdown(aggregator::breakdown(
            dataset,
            params.breakdown_dimension,
        )),
        AnalysisKind::Rfm => {
            AnalysisOutput::Rfm(rfm::rfm_scores(dataset, params.as_of, params.bucket_count))
        }
        AnalysisKind::RfmSegments => {
            let scores = rfm::rfm_scores(dataset, params.as_of, params.bucket_count);
            AnalysisOutput::RfmSegments(rfm::segment_summary(&scores))
        }
        AnalysisKind::Cohorts => AnalysisOutput::Cohorts(cohort::cohort_retention(
            dataset,
            params.zero_fill_cohorts,
        )),
        AnalysisKind::AtRisk => AnalysisOutput::AtRisk(rfm::at_risk_customers(
            dataset,
            params.as_of,
            params.at_risk_lookback_days,
            params.at_risk_min_lifetime_value,
        )),
    }
}
