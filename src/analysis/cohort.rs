//! Quarterly cohort retention.
//!
//! A customer's cohort is the quarter of their first dated order. For each
//! cohort and each later quarter, retention is the share of the cohort that
//! ordered again in that quarter.

use super::aggregator::round2;
use crate::loader::Dataset;
use crate::models::Quarter;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Retention of one cohort in one active quarter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortRetention {
    pub cohort: Quarter,
    pub active_quarter: Quarter,
    /// Quarters since the cohort quarter (0 for the cohort quarter itself).
    pub quarter_offset: i64,
    pub cohort_size: usize,
    pub active_customers: usize,
    pub retention_pct: f64,
}

/// Retention per (cohort, active quarter).
///
/// Without `zero_fill` only quarters with activity are returned. With it,
/// every cohort gets a row for each quarter from its own through the last
/// active quarter in the data.
pub fn cohort_retention(dataset: &Dataset, zero_fill: bool) -> Vec<CohortRetention> {
    let mut first_quarter: HashMap<&str, Quarter> = HashMap::new();
    for fact in dataset.dated_facts() {
        if let Some(date) = fact.order_date {
            let quarter = Quarter::of(date);
            first_quarter
                .entry(fact.customer_id.as_str())
                .and_modify(|q| *q = (*q).min(quarter))
                .or_insert(quarter);
        }
    }

    let mut cohort_sizes: BTreeMap<Quarter, usize> = BTreeMap::new();
    for quarter in first_quarter.values() {
        *cohort_sizes.entry(*quarter).or_default() += 1;
    }

    let mut active: BTreeMap<(Quarter, Quarter), HashSet<&str>> = BTreeMap::new();
    for fact in dataset.dated_facts() {
        let (Some(date), Some(cohort)) = (fact.order_date, first_quarter.get(fact.customer_id.as_str()))
        else {
            continue;
        };
        active
            .entry((*cohort, Quarter::of(date)))
            .or_default()
            .insert(fact.customer_id.as_str());
    }

    // Every cohort holds at least the customers who defined it.
    let row = |cohort: Quarter, active_quarter: Quarter, active_customers: usize| {
        let cohort_size = cohort_sizes.get(&cohort).copied().unwrap_or(1);
        CohortRetention {
            cohort,
            active_quarter,
            quarter_offset: active_quarter.quarters_since(cohort),
            cohort_size,
            active_customers,
            retention_pct: round2(100.0 * active_customers as f64 / cohort_size as f64),
        }
    };

    if !zero_fill {
        return active
            .iter()
            .map(|(&(cohort, quarter), customers)| row(cohort, quarter, customers.len()))
            .collect();
    }

    let Some(last) = active.keys().map(|&(_, quarter)| quarter).max() else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for &cohort in cohort_sizes.keys() {
        let mut quarter = cohort;
        while quarter <= last {
            let count = active.get(&(cohort, quarter)).map_or(0, HashSet::len);
            rows.push(row(cohort, quarter, count));
            quarter = quarter.next();
        }
    }
    rows
}
