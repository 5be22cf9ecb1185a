//! Product-pair affinity: which products are bought together.

use super::aggregator::pct_of;
use crate::loader::Dataset;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Two products and how many orders contain both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPair {
    pub product_a: String,
    pub product_a_name: String,
    pub product_b: String,
    pub product_b_name: String,
    pub co_orders: usize,
    /// Share of all orders containing the pair.
    pub support_pct: Option<f64>,
}

/// The `limit` product pairs appearing together in the most orders.
///
/// Pairs are unordered (`product_a < product_b`), a product listed twice on
/// one order counts once, and ties are broken by product ids.
pub fn product_pairs(dataset: &Dataset, limit: usize) -> Vec<ProductPair> {
    let mut baskets: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut labels: HashMap<&str, &str> = HashMap::new();

    for fact in &dataset.facts {
        baskets
            .entry(fact.order_id.as_str())
            .or_default()
            .insert(fact.product_id.as_str());
        labels
            .entry(fact.product_id.as_str())
            .or_insert(fact.product_label());
    }

    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for products in baskets.values() {
        let products: Vec<&str> = products.iter().copied().collect();
        for (i, &a) in products.iter().enumerate() {
            for &b in &products[i + 1..] {
                *counts.entry((a, b)).or_default() += 1;
            }
        }
    }

    let mut pairs: Vec<((&str, &str), usize)> = counts.into_iter().collect();
    pairs.sort_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.cmp(kb)));
    pairs.truncate(limit);

    let order_count = baskets.len() as f64;
    pairs
        .into_iter()
        .map(|((a, b), co_orders)| ProductPair {
            product_a: a.to_string(),
            product_a_name: labels.get(a).copied().unwrap_or(a).to_string(),
            product_b: b.to_string(),
            product_b_name: labels.get(b).copied().unwrap_or(b).to_string(),
            co_orders,
            support_pct: pct_of(co_orders as f64, order_count),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::fact;

    fn basket_dataset() -> Dataset {
        let mut facts = Vec::new();
        for (order, products) in [
            ("o1", vec!["pen", "ink", "pad"]),
            ("o2", vec!["pen", "ink"]),
            ("o3", vec!["ink", "pen", "pen"]),
            ("o4", vec!["pad"]),
            ("o5", vec!["pad", "pen"]),
        ] {
            for product in products {
                facts.push(fact(order, None, "c1", product, 1, 1.0));
            }
        }
        facts[0].product_name = Some("Gel Pen".to_string());
        Dataset::new(facts, Vec::new())
    }

    #[test]
    fn test_pairs_counted_per_order() {
        let pairs = product_pairs(&basket_dataset(), 20);
        assert_eq!(pairs.len(), 3);

        assert_eq!(pairs[0].product_a, "ink");
        assert_eq!(pairs[0].product_b, "pen");
        assert_eq!(pairs[0].co_orders, 3);
        assert_eq!(pairs[0].support_pct, Some(60.0));
        assert_eq!(pairs[0].product_b_name, "Gel Pen");

        assert_eq!(pairs[1].product_a, "pad");
        assert_eq!(pairs[1].product_b, "pen");
        assert_eq!(pairs[1].co_orders, 2);

        assert_eq!(pairs[2].product_a, "ink");
        assert_eq!(pairs[2].product_b, "pad");
        assert_eq!(pairs[2].co_orders, 1);
    }

    #[test]
    fn test_limit_applies() {
        let pairs = product_pairs(&basket_dataset(), 1);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].co_orders, 3);
    }

    #[test]
    fn test_single_item_orders_have_no_pairs() {
        let ds = Dataset::new(vec![fact("o1", None, "c1", "p1", 2, 1.0)], Vec::new());
        assert!(product_pairs(&ds, 20).is_empty());
    }
}
