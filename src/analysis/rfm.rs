//! Recency / frequency / monetary scoring and customer segmentation.
//!
//! Only dated rows take part: a customer needs at least one dated order to
//! have a recency, and customers without one are left out.

use super::aggregator::{aggregate_by, pct_of, round2};
use crate::loader::Dataset;
use crate::models::Segment;
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Raw RFM inputs for one customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: String,
    pub last_order_date: NaiveDate,
    /// Days from the last order to the reference date.
    pub recency_days: i64,
    /// Distinct orders.
    pub frequency: usize,
    /// Net revenue over all orders.
    pub monetary: f64,
}

/// Per-customer recency, frequency and monetary value, ordered by customer id.
pub fn customer_metrics(dataset: &Dataset, as_of: NaiveDate) -> Vec<CustomerMetrics> {
    let mut last_order: HashMap<&str, NaiveDate> = HashMap::new();
    for fact in dataset.dated_facts() {
        if let Some(date) = fact.order_date {
            last_order
                .entry(fact.customer_id.as_str())
                .and_modify(|d| *d = (*d).max(date))
                .or_insert(date);
        }
    }

    aggregate_by(dataset.dated_facts(), |f| Some(f.customer_id.clone()))
        .into_iter()
        .filter_map(|(customer_id, totals)| {
            let last_order_date = *last_order.get(customer_id.as_str())?;
            Some(CustomerMetrics {
                recency_days: (as_of - last_order_date).num_days(),
                frequency: totals.orders,
                monetary: totals.revenue,
                last_order_date,
                customer_id,
            })
        })
        .collect()
}

/// Bucket numbers for `len` ordered rows split into `buckets` tiles.
///
/// Matches SQL `NTILE`: buckets start at 1, and the first `len % buckets`
/// buckets get one extra row.
pub fn ntile(buckets: usize, len: usize) -> Vec<usize> {
    let buckets = buckets.max(1);
    let base = len / buckets;
    let extra = len % buckets;

    let mut tiles = Vec::with_capacity(len);
    for bucket in 1..=buckets {
        let size = base + usize::from(bucket <= extra);
        tiles.extend(std::iter::repeat(bucket).take(size));
    }
    tiles
}

/// Score every customer by tile position under `compare`; ties fall back to customer id.
fn scores_by<F>(metrics: &[CustomerMetrics], buckets: usize, compare: F) -> Vec<usize>
where
    F: Fn(&CustomerMetrics, &CustomerMetrics) -> Ordering,
{
    let mut order: Vec<usize> = (0..metrics.len()).collect();
    order.sort_by(|&a, &b| {
        compare(&metrics[a], &metrics[b])
            .then_with(|| metrics[a].customer_id.cmp(&metrics[b].customer_id))
    });

    let tiles = ntile(buckets, metrics.len());
    let mut scores = vec![0; metrics.len()];
    for (position, &index) in order.iter().enumerate() {
        scores[index] = tiles[position];
    }
    scores
}

/// Map a score triple to its segment. First matching rule wins.
pub fn segment_for(r_score: usize, f_score: usize, m_score: usize) -> Segment {
    if r_score >= 4 && f_score >= 4 && m_score >= 4 {
        Segment::Champions
    } else if r_score >= 4 && f_score >= 3 {
        Segment::Loyal
    } else if r_score <= 2 && f_score <= 2 && m_score <= 2 {
        Segment::AtRisk
    } else {
        Segment::Potential
    }
}

/// Scored customer row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmScore {
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub last_order_date: NaiveDate,
    pub recency_days: i64,
    pub frequency: usize,
    pub monetary: f64,
    pub r_score: usize,
    pub f_score: usize,
    pub m_score: usize,
    /// Scores concatenated, e.g. "545".
    pub rfm_code: String,
    pub segment: Segment,
}

/// Score customers into `buckets` tiles per dimension and assign segments.
///
/// Recency tiles are taken over `recency_days` descending, so the most
/// recently active customers land in the top bucket. Frequency and monetary
/// tiles are ascending.
pub fn rfm_scores(dataset: &Dataset, as_of: NaiveDate, buckets: usize) -> Vec<RfmScore> {
    let metrics = customer_metrics(dataset, as_of);

    let r_scores = scores_by(&metrics, buckets, |a, b| b.recency_days.cmp(&a.recency_days));
    let f_scores = scores_by(&metrics, buckets, |a, b| a.frequency.cmp(&b.frequency));
    let m_scores = scores_by(&metrics, buckets, |a, b| a.monetary.total_cmp(&b.monetary));

    metrics
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            let (r, f, mo) = (r_scores[i], f_scores[i], m_scores[i]);
            RfmScore {
                customer_name: dataset.customer_name(&m.customer_id).map(String::from),
                customer_id: m.customer_id,
                last_order_date: m.last_order_date,
                recency_days: m.recency_days,
                frequency: m.frequency,
                monetary: round2(m.monetary),
                r_score: r,
                f_score: f,
                m_score: mo,
                rfm_code: format!("{}{}{}", r, f, mo),
                segment: segment_for(r, f, mo),
            }
        })
        .collect()
}

/// Customers and value per segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub customers: usize,
    pub share_pct: Option<f64>,
    pub total_monetary: f64,
    pub avg_monetary: Option<f64>,
}

/// Roll scored customers up per segment, in rule order.
pub fn segment_summary(scores: &[RfmScore]) -> Vec<SegmentSummary> {
    if scores.is_empty() {
        return Vec::new();
    }

    Segment::ALL
        .iter()
        .map(|&segment| {
            let members: Vec<&RfmScore> = scores.iter().filter(|s| s.segment == segment).collect();
            let total: f64 = members.iter().map(|s| s.monetary).sum();
            SegmentSummary {
                segment,
                customers: members.len(),
                share_pct: pct_of(members.len() as f64, scores.len() as f64),
                total_monetary: round2(total),
                avg_monetary: if members.is_empty() {
                    None
                } else {
                    Some(round2(total / members.len() as f64))
                },
            }
        })
        .collect()
}

/// High-value customer who has gone quiet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtRiskCustomer {
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub last_order_date: NaiveDate,
    pub days_since_last_order: i64,
    pub lifetime_orders: usize,
    pub lifetime_value: f64,
}

/// Customers worth at least `min_lifetime_value` with no order in the last
/// `lookback_days`, most valuable first.
pub fn at_risk_customers(
    dataset: &Dataset,
    as_of: NaiveDate,
    lookback_days: i64,
    min_lifetime_value: f64,
) -> Vec<AtRiskCustomer> {
    let mut rows: Vec<AtRiskCustomer> = customer_metrics(dataset, as_of)
        .into_iter()
        .filter(|m| m.monetary >= min_lifetime_value && m.recency_days > lookback_days)
        .map(|m| AtRiskCustomer {
            customer_name: dataset.customer_name(&m.customer_id).map(String::from),
            customer_id: m.customer_id,
            last_order_date: m.last_order_date,
            days_since_last_order: m.recency_days,
            lifetime_orders: m.frequency,
            lifetime_value: round2(m.monetary),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.lifetime_value
            .total_cmp(&a.lifetime_value)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{date, fact};
    use crate::models::SalesFact;

    fn dataset(facts: Vec<SalesFact>) -> Dataset {
        Dataset::new(facts, Vec::new())
    }

    /// One single-line order per (customer, date, amount).
    fn orders(rows: &[(&str, &str, f64)]) -> Dataset {
        let facts = rows
            .iter()
            .enumerate()
            .map(|(i, (customer, day, amount))| {
                fact(&format!("o{}", i), Some(*day), customer, "p1", 1, *amount)
            })
            .collect();
        dataset(facts)
    }

    #[test]
    fn test_frequency_and_monetary_example() {
        let ds = orders(&[
            ("X", "2024-01-01", 100.0),
            ("X", "2024-02-01", 200.0),
            ("X", "2024-03-01", 150.0),
            ("Y", "2024-01-15", 50.0),
            ("Y", "2024-02-15", 50.0),
        ]);

        let metrics = customer_metrics(&ds, date("2024-04-01"));
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].customer_id, "X");
        assert_eq!(metrics[0].frequency, 3);
        assert!((metrics[0].monetary - 450.0).abs() < 1e-9);
        assert_eq!(metrics[0].last_order_date, date("2024-03-01"));
        assert_eq!(metrics[0].recency_days, 31);
        assert_eq!(metrics[1].frequency, 2);
        assert!((metrics[1].monetary - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_multi_line_order_counts_once() {
        let ds = dataset(vec![
            fact("o1", Some("2024-01-01"), "X", "p1", 1, 10.0),
            fact("o1", Some("2024-01-01"), "X", "p2", 1, 20.0),
        ]);
        let metrics = customer_metrics(&ds, date("2024-01-02"));
        assert_eq!(metrics[0].frequency, 1);
        assert!((metrics[0].monetary - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_customers_without_dated_orders_are_excluded() {
        let ds = dataset(vec![
            fact("o1", None, "ghost", "p1", 1, 10.0),
            fact("o2", Some("2024-01-01"), "real", "p1", 1, 10.0),
        ]);
        let scores = rfm_scores(&ds, date("2024-02-01"), 5);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].customer_id, "real");
    }

    #[test]
    fn test_ntile_matches_sql() {
        assert_eq!(ntile(5, 7), vec![1, 1, 2, 2, 3, 4, 5]);
        assert_eq!(ntile(5, 3), vec![1, 2, 3]);
        assert_eq!(ntile(5, 10), vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
        assert!(ntile(5, 0).is_empty());
    }

    #[test]
    fn test_ntile_buckets_are_balanced() {
        for n in 0..=37 {
            let tiles = ntile(5, n);
            assert_eq!(tiles.len(), n);
            for bucket in 1..=5 {
                let count = tiles.iter().filter(|&&t| t == bucket).count();
                assert!(count == n / 5 || count == (n + 4) / 5, "n={n} bucket={bucket}");
            }
        }
    }

    #[test]
    fn test_scores_in_range_and_most_recent_scores_highest() {
        let rows: Vec<(String, String, f64)> = (0..12)
            .map(|i| {
                (
                    format!("c{:02}", i),
                    format!("2024-01-{:02}", i + 1),
                    (i as f64 + 1.0) * 10.0,
                )
            })
            .collect();
        let borrowed: Vec<(&str, &str, f64)> = rows
            .iter()
            .map(|(c, d, a)| (c.as_str(), d.as_str(), *a))
            .collect();
        let ds = orders(&borrowed);

        let scores = rfm_scores(&ds, date("2024-02-01"), 5);
        assert_eq!(scores.len(), 12);
        for s in &scores {
            assert!((1..=5).contains(&s.r_score));
            assert!((1..=5).contains(&s.f_score));
            assert!((1..=5).contains(&s.m_score));
            assert_eq!(s.rfm_code.len(), 3);
        }

        let newest = scores.iter().find(|s| s.customer_id == "c11").unwrap();
        let oldest = scores.iter().find(|s| s.customer_id == "c00").unwrap();
        assert_eq!(newest.r_score, 5);
        assert_eq!(newest.m_score, 5);
        assert_eq!(oldest.r_score, 1);
        assert_eq!(oldest.m_score, 1);
    }

    #[test]
    fn test_ties_are_deterministic() {
        let ds = orders(&[
            ("b", "2024-01-01", 10.0),
            ("a", "2024-01-01", 10.0),
            ("c", "2024-01-01", 10.0),
        ]);
        let first = rfm_scores(&ds, date("2024-02-01"), 5);
        let second = rfm_scores(&ds, date("2024-02-01"), 5);
        assert_eq!(first, second);

        // Equal frequency: ties ordered by customer id
        assert_eq!(first[0].customer_id, "a");
        assert_eq!(first[0].f_score, 1);
        assert_eq!(first[2].f_score, 3);
    }

    #[test]
    fn test_segment_rules_first_match() {
        assert_eq!(segment_for(5, 5, 5), Segment::Champions);
        assert_eq!(segment_for(4, 4, 4), Segment::Champions);
        assert_eq!(segment_for(4, 4, 1), Segment::Loyal);
        assert_eq!(segment_for(5, 3, 1), Segment::Loyal);
        assert_eq!(segment_for(2, 2, 2), Segment::AtRisk);
        assert_eq!(segment_for(1, 1, 1), Segment::AtRisk);
        assert_eq!(segment_for(4, 2, 5), Segment::Potential);
        assert_eq!(segment_for(3, 3, 3), Segment::Potential);
        assert_eq!(segment_for(1, 5, 5), Segment::Potential);
    }

    #[test]
    fn test_every_customer_gets_one_segment() {
        let ds = orders(&[
            ("a", "2023-01-01", 5.0),
            ("b", "2023-06-01", 500.0),
            ("b", "2023-07-01", 500.0),
            ("c", "2024-01-01", 50.0),
            ("d", "2024-01-20", 1500.0),
            ("d", "2024-01-25", 1500.0),
            ("d", "2024-01-28", 1500.0),
        ]);
        let scores = rfm_scores(&ds, date("2024-02-01"), 5);
        assert_eq!(scores.len(), 4);

        let summary = segment_summary(&scores);
        assert_eq!(summary.len(), 4);
        assert_eq!(summary.iter().map(|s| s.customers).sum::<usize>(), 4);

        let d = scores.iter().find(|s| s.customer_id == "d").unwrap();
        assert_eq!(d.segment, Segment::Champions);
        let a = scores.iter().find(|s| s.customer_id == "a").unwrap();
        assert_eq!(a.segment, Segment::AtRisk);
    }

    #[test]
    fn test_segment_summary_empty() {
        assert!(segment_summary(&[]).is_empty());
    }

    #[test]
    fn test_at_risk_customers() {
        let ds = orders(&[
            ("big-quiet", "2023-09-01", 1200.0),
            ("big-active", "2024-01-20", 5000.0),
            ("small-quiet", "2023-01-01", 300.0),
            ("bigger-quiet", "2023-06-01", 800.0),
            ("bigger-quiet", "2023-07-01", 800.0),
        ]);

        let rows = at_risk_customers(&ds, date("2024-02-01"), 90, 1000.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].customer_id, "bigger-quiet");
        assert_eq!(rows[0].lifetime_value, 1600.0);
        assert_eq!(rows[0].lifetime_orders, 2);
        assert_eq!(rows[1].customer_id, "big-quiet");
        assert_eq!(rows[1].days_since_last_order, 153);
    }
}
