//! Fact aggregation and the analyses built directly on it.
//!
//! This module groups sales fact rows by a caller-chosen key and reduces
//! each group to totals. Every ratio goes through [`pct_of`], which yields
//! `None` instead of dividing by zero.

use crate::loader::Dataset;
use crate::models::{MarginBand, Month, Quarter, SalesFact};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Label used for rows that do not carry the grouping attribute.
pub const MISSING_KEY: &str = "(none)";

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `100 * part / whole` rounded to two decimals, or `None` when `whole` is zero.
pub fn pct_of(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 || !whole.is_finite() {
        None
    } else {
        Some(round2(100.0 * part / whole))
    }
}

/// Profit margin percentage; `None` when there is no revenue.
pub fn margin_pct(profit: f64, revenue: f64) -> Option<f64> {
    pct_of(profit, revenue)
}

/// Totals for one group of fact rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupTotals {
    pub rows: usize,
    pub orders: usize,
    pub customers: usize,
    pub units: u64,
    pub gross_revenue: f64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
}

impl GroupTotals {
    pub fn margin_pct(&self) -> Option<f64> {
        margin_pct(self.profit, self.revenue)
    }

    /// Average net revenue per distinct order.
    pub fn avg_order_value(&self) -> Option<f64> {
        if self.orders == 0 {
            None
        } else {
            Some(round2(self.revenue / self.orders as f64))
        }
    }
}

#[derive(Default)]
struct Accumulator<'a> {
    totals: GroupTotals,
    orders: HashSet<&'a str>,
    customers: HashSet<&'a str>,
}

impl<'a> Accumulator<'a> {
    fn add(&mut self, fact: &'a SalesFact) {
        self.totals.rows += 1;
        self.totals.units += u64::from(fact.quantity);
        self.totals.gross_revenue += fact.gross_revenue();
        self.totals.revenue += fact.net_revenue();
        self.totals.cost += fact.cost();
        self.totals.profit += fact.profit();
        self.orders.insert(&fact.order_id);
        self.customers.insert(&fact.customer_id);
    }

    fn finish(mut self) -> GroupTotals {
        self.totals.orders = self.orders.len();
        self.totals.customers = self.customers.len();
        self.totals
    }
}

/// Group facts by `key_fn` and total each group.
///
/// Rows for which `key_fn` returns `None` are skipped. Groups come back in
/// key order.
pub fn aggregate_by<'a, K, I, F>(facts: I, key_fn: F) -> BTreeMap<K, GroupTotals>
where
    K: Ord,
    I: IntoIterator<Item = &'a SalesFact>,
    F: Fn(&SalesFact) -> Option<K>,
{
    let mut groups: BTreeMap<K, Accumulator<'a>> = BTreeMap::new();

    for fact in facts {
        if let Some(key) = key_fn(fact) {
            groups.entry(key).or_default().add(fact);
        }
    }

    groups
        .into_iter()
        .map(|(key, acc)| (key, acc.finish()))
        .collect()
}

/// Totals over all given rows.
pub fn total<'a, I>(facts: I) -> GroupTotals
where
    I: IntoIterator<Item = &'a SalesFact>,
{
    aggregate_by(facts, |_| Some(()))
        .remove(&())
        .unwrap_or_default()
}

/// Attribute a breakdown can group by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Month,
    Quarter,
    Product,
    #[default]
    Category,
    Order,
    Customer,
    Segment,
    Region,
    SalesRep,
}

impl Dimension {
    /// Grouping key of a fact row.
    ///
    /// Temporal dimensions skip undated rows; other missing attributes fall
    /// into [`MISSING_KEY`].
    pub fn key_of(&self, fact: &SalesFact) -> Option<String> {
        let or_missing = |value: &Option<String>| {
            value.clone().unwrap_or_else(|| MISSING_KEY.to_string())
        };

        match self {
            Dimension::Month => fact.order_date.map(|d| Month::of(d).to_string()),
            Dimension::Quarter => fact.order_date.map(|d| Quarter::of(d).to_string()),
            Dimension::Product => Some(fact.product_id.clone()),
            Dimension::Category => Some(fact.category.clone()),
            Dimension::Order => Some(fact.order_id.clone()),
            Dimension::Customer => Some(fact.customer_id.clone()),
            Dimension::Segment => Some(or_missing(&fact.segment)),
            Dimension::Region => Some(or_missing(&fact.region)),
            Dimension::SalesRep => Some(or_missing(&fact.sales_rep)),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Month => "month",
            Dimension::Quarter => "quarter",
            Dimension::Product => "product",
            Dimension::Category => "category",
            Dimension::Order => "order",
            Dimension::Customer => "customer",
            Dimension::Segment => "segment",
            Dimension::Region => "region",
            Dimension::SalesRep => "sales_rep",
        };
        write!(f, "{}", name)
    }
}

/// Generic per-group totals row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub rows: usize,
    pub orders: usize,
    pub customers: usize,
    pub units: u64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin_pct: Option<f64>,
    pub avg_order_value: Option<f64>,
}

/// Totals per key of `dimension`.
pub fn breakdown(dataset: &Dataset, dimension: Dimension) -> Vec<GroupSummary> {
    aggregate_by(&dataset.facts, |f| dimension.key_of(f))
        .into_iter()
        .map(|(key, t)| GroupSummary {
            key,
            rows: t.rows,
            orders: t.orders,
            customers: t.customers,
            units: t.units,
            revenue: round2(t.revenue),
            cost: round2(t.cost),
            profit: round2(t.profit),
            margin_pct: t.margin_pct(),
            avg_order_value: t.avg_order_value(),
        })
        .collect()
}

/// Monthly revenue trend row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    pub month: Month,
    pub orders: usize,
    pub customers: usize,
    pub revenue: f64,
    pub profit: f64,
    pub margin_pct: Option<f64>,
    pub running_revenue: f64,
    pub mom_growth_pct: Option<f64>,
}

/// Revenue per month with a running total and month-over-month growth.
pub fn monthly_revenue(dataset: &Dataset) -> Vec<MonthlyRevenue> {
    let mut running = 0.0;
    let mut previous: Option<f64> = None;

    aggregate_by(dataset.dated_facts(), |f| f.order_date.map(Month::of))
        .into_iter()
        .map(|(month, t)| {
            running += t.revenue;
            let mom_growth_pct = previous.and_then(|prev| pct_of(t.revenue - prev, prev));
            previous = Some(t.revenue);

            MonthlyRevenue {
                month,
                orders: t.orders,
                customers: t.customers,
                revenue: round2(t.revenue),
                profit: round2(t.profit),
                margin_pct: t.margin_pct(),
                running_revenue: round2(running),
                mom_growth_pct,
            }
        })
        .collect()
}

/// Discount leakage per month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscountLeakage {
    pub month: Month,
    pub gross_revenue: f64,
    pub net_revenue: f64,
    pub discount_dollars: f64,
    pub discount_rate_pct_of_gross: Option<f64>,
}

/// Revenue given away as discounts, per month.
pub fn discount_leakage(dataset: &Dataset) -> Vec<DiscountLeakage> {
    aggregate_by(dataset.dated_facts(), |f| f.order_date.map(Month::of))
        .into_iter()
        .map(|(month, t)| {
            let discount = t.gross_revenue - t.revenue;
            DiscountLeakage {
                month,
                gross_revenue: round2(t.gross_revenue),
                net_revenue: round2(t.revenue),
                discount_dollars: round2(discount),
                discount_rate_pct_of_gross: pct_of(discount, t.gross_revenue),
            }
        })
        .collect()
}

/// Category performance row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPerformance {
    pub category: String,
    pub orders: usize,
    pub units: u64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub margin_pct: Option<f64>,
    pub revenue_share_pct: Option<f64>,
}

/// Totals per category, highest revenue first.
pub fn category_performance(dataset: &Dataset) -> Vec<CategoryPerformance> {
    let overall = total(&dataset.facts);

    let mut rows: Vec<CategoryPerformance> =
        aggregate_by(&dataset.facts, |f| Some(f.category.clone()))
            .into_iter()
            .map(|(category, t)| CategoryPerformance {
                category,
                orders: t.orders,
                units: t.units,
                revenue: round2(t.revenue),
                cost: round2(t.cost),
                profit: round2(t.profit),
                margin_pct: t.margin_pct(),
                revenue_share_pct: pct_of(t.revenue, overall.revenue),
            })
            .collect();

    rows.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.category.cmp(&b.category))
    });
    rows
}

/// Margin percentages separating the bands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginThresholds {
    /// Margins below this are "Low Margin".
    pub low_pct: f64,
    /// Margins below this (and at least `low_pct`) are "Mid Margin".
    pub high_pct: f64,
}

impl Default for MarginThresholds {
    fn default() -> Self {
        Self {
            low_pct: 10.0,
            high_pct: 30.0,
        }
    }
}

impl MarginThresholds {
    /// Band for the unrounded margin, so values just under a threshold stay below it.
    pub fn band(&self, profit: f64, revenue: f64) -> MarginBand {
        if revenue == 0.0 || !revenue.is_finite() {
            return MarginBand::NoSales;
        }

        let margin = 100.0 * profit / revenue;
        if margin < self.low_pct {
            MarginBand::Low
        } else if margin < self.high_pct {
            MarginBand::Mid
        } else {
            MarginBand::High
        }
    }
}

/// Product profitability row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductProfitability {
    /// 1-based position by profit.
    pub rank: usize,
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub units: u64,
    pub revenue: f64,
    pub profit: f64,
    pub margin_pct: Option<f64>,
    pub margin_band: MarginBand,
}

/// Profit and margin band per product, most profitable first.
pub fn product_profitability(
    dataset: &Dataset,
    thresholds: &MarginThresholds,
) -> Vec<ProductProfitability> {
    let mut labels: HashMap<&str, (&str, &str)> = HashMap::new();
    for fact in &dataset.facts {
        labels
            .entry(fact.product_id.as_str())
            .or_insert((fact.product_label(), fact.category.as_str()));
    }

    let mut rows: Vec<ProductProfitability> =
        aggregate_by(&dataset.facts, |f| Some(f.product_id.clone()))
            .into_iter()
            .map(|(product_id, t)| {
                let (name, category) = labels
                    .get(product_id.as_str())
                    .copied()
                    .unwrap_or((MISSING_KEY, MISSING_KEY));

                ProductProfitability {
                    rank: 0,
                    product_name: name.to_string(),
                    category: category.to_string(),
                    units: t.units,
                    revenue: round2(t.revenue),
                    profit: round2(t.profit),
                    margin_pct: t.margin_pct(),
                    margin_band: thresholds.band(t.profit, t.revenue),
                    product_id,
                }
            })
            .collect();

    rows.sort_by(|a, b| {
        b.profit
            .total_cmp(&a.profit)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    for (index, row) in rows.iter_mut().enumerate() {
        row.rank = index + 1;
    }
    rows
}

/// The `limit` most profitable products.
pub fn top_products(
    dataset: &Dataset,
    thresholds: &MarginThresholds,
    limit: usize,
) -> Vec<ProductProfitability> {
    let mut rows = product_profitability(dataset, thresholds);
    rows.truncate(limit);
    rows
}

/// Sales rep performance row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepPerformance {
    /// Rank by revenue; equal revenue shares a rank.
    pub revenue_rank: usize,
    pub sales_rep: String,
    pub orders: usize,
    pub customers: usize,
    pub revenue: f64,
    pub profit: f64,
    pub margin_pct: Option<f64>,
    pub avg_order_value: Option<f64>,
}

/// Totals per sales rep, ranked by revenue. Rows without a rep are skipped.
pub fn sales_reps(dataset: &Dataset) -> Vec<RepPerformance> {
    let mut groups: Vec<(String, GroupTotals)> =
        aggregate_by(&dataset.facts, |f| f.sales_rep.clone())
            .into_iter()
            .collect();

    // Rank on exact totals; rounding happens only in the output row.
    groups.sort_by(|(rep_a, a), (rep_b, b)| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| rep_a.cmp(rep_b))
    });

    let mut previous: Option<(f64, usize)> = None;
    groups
        .into_iter()
        .enumerate()
        .map(|(index, (sales_rep, t))| {
            let revenue_rank = match previous {
                Some((revenue, rank)) if revenue == t.revenue => rank,
                _ => index + 1,
            };
            previous = Some((t.revenue, revenue_rank));

            RepPerformance {
                revenue_rank,
                sales_rep,
                orders: t.orders,
                customers: t.customers,
                revenue: round2(t.revenue),
                profit: round2(t.profit),
                margin_pct: t.margin_pct(),
                avg_order_value: t.avg_order_value(),
            }
        })
        .collect()
}

/// Segment and region row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRegion {
    pub segment: String,
    pub region: String,
    pub orders: usize,
    pub customers: usize,
    pub revenue: f64,
    pub profit: f64,
    pub margin_pct: Option<f64>,
    pub avg_order_value: Option<f64>,
}

/// Totals per (customer segment, region).
pub fn segment_region(dataset: &Dataset) -> Vec<SegmentRegion> {
    aggregate_by(&dataset.facts, |f| {
        Some((
            Dimension::Segment.key_of(f)?,
            Dimension::Region.key_of(f)?,
        ))
    })
    .into_iter()
    .map(|((segment, region), t)| SegmentRegion {
        segment,
        region,
        orders: t.orders,
        customers: t.customers,
        revenue: round2(t.revenue),
        profit: round2(t.profit),
        margin_pct: t.margin_pct(),
        avg_order_value: t.avg_order_value(),
    })
    .collect()
}
