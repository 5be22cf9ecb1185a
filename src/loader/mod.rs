//! Sales data loading.
//!
//! Reads the sales fact export (a single CSV file, or a directory of CSV
//! partitions) and the optional customer reference table into an
//! immutable in-memory [`Dataset`].
//!
//! Expected fact columns:
//!   order_id, order_date, customer_id, customer_name, product_id,
//!   product_name, category, quantity, unit_price, discount_rate,
//!   net_revenue, cost, profit, segment, region, sales_rep
//!
//! Only order_id, customer_id, product_id, category, quantity and
//! unit_price are required; the rest may be missing or empty.

use crate::error::{LoadError, LoadResult};
use crate::models::{Customer, SalesFact};
use csv::StringRecord;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File name of the customer reference table.
const CUSTOMER_TABLE: &str = "customers.csv";

/// Immutable snapshot of the sales data.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// All fact rows, in load order.
    pub facts: Vec<SalesFact>,
    customer_names: HashMap<String, String>,
}

impl Dataset {
    /// Build a dataset from already-loaded rows.
    ///
    /// Names from the customer table win over names carried on fact rows.
    pub fn new(facts: Vec<SalesFact>, customers: Vec<Customer>) -> Self {
        let mut customer_names = HashMap::new();

        for customer in customers {
            if let Some(name) = customer.customer_name {
                customer_names.insert(customer.customer_id, name);
            }
        }

        for fact in &facts {
            if let Some(ref name) = fact.customer_name {
                customer_names
                    .entry(fact.customer_id.clone())
                    .or_insert_with(|| name.clone());
            }
        }

        Self {
            facts,
            customer_names,
        }
    }

    /// Load the facts at `facts_path` and the customer table.
    ///
    /// When `customers_path` is `None`, a `customers.csv` next to the facts
    /// is used if present.
    pub fn load(
        facts_path: &Path,
        customers_path: Option<&Path>,
        show_progress: bool,
    ) -> LoadResult<Self> {
        let files = discover_fact_files(facts_path)?;
        info!("Loading {} fact file(s) from {}", files.len(), facts_path.display());

        let progress_bar = if show_progress && files.len() > 1 {
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let mut facts = Vec::new();
        for file in &files {
            if let Some(ref pb) = progress_bar {
                pb.set_message(file.display().to_string());
            }

            let loaded = load_facts(open(file)?, &file.display().to_string())?;
            debug!("{}: {} rows", file.display(), loaded.len());
            facts.extend(loaded);

            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Load complete");
        }

        let customers = match customers_path
            .map(Path::to_path_buf)
            .or_else(|| default_customer_table(facts_path))
        {
            Some(path) => {
                let customers = load_customers(open(&path)?, &path.display().to_string())?;
                info!("Loaded {} customers from {}", customers.len(), path.display());
                customers
            }
            None => Vec::new(),
        };

        let dataset = Self::new(facts, customers);

        info!("Loaded {} sales fact rows", dataset.facts.len());
        let undated = dataset.undated_rows();
        if undated > 0 {
            warn!(
                "{} row(s) have no order date and are excluded from time-based analyses",
                undated
            );
        }

        Ok(dataset)
    }

    /// Display name for a customer, if one is known.
    pub fn customer_name(&self, customer_id: &str) -> Option<&str> {
        self.customer_names.get(customer_id).map(String::as_str)
    }

    /// Rows carrying an order date.
    pub fn dated_facts(&self) -> impl Iterator<Item = &SalesFact> {
        self.facts.iter().filter(|f| f.order_date.is_some())
    }

    /// Number of rows without an order date.
    pub fn undated_rows(&self) -> usize {
        self.facts.iter().filter(|f| f.order_date.is_none()).count()
    }

    /// Number of distinct orders.
    pub fn order_count(&self) -> usize {
        self.facts
            .iter()
            .map(|f| f.order_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of distinct customers with at least one fact row.
    pub fn customer_count(&self) -> usize {
        self.facts
            .iter()
            .map(|f| f.customer_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

fn open(path: &Path) -> LoadResult<File> {
    File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn is_customer_table(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.eq_ignore_ascii_case(CUSTOMER_TABLE))
        .unwrap_or(false)
}

fn default_customer_table(facts_path: &Path) -> Option<PathBuf> {
    let dir = if facts_path.is_dir() {
        facts_path
    } else {
        facts_path.parent()?
    };
    let candidate = dir.join(CUSTOMER_TABLE);
    candidate.is_file().then_some(candidate)
}

/// Resolve the fact files to load.
///
/// A file is returned as-is. A directory is walked recursively for `*.csv`
/// files (sorted by path), skipping the customer table.
pub fn discover_fact_files(path: &Path) -> LoadResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.exists() {
        return Err(LoadError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: path.to_path_buf(),
            source,
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.path();
        let is_csv = file
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        if is_csv && !is_customer_table(file) {
            files.push(file.to_path_buf());
        }
    }

    if files.is_empty() {
        return Err(LoadError::NoInput(path.to_path_buf()));
    }

    files.sort();
    Ok(files)
}

/// Deserialize every record of a headered CSV, paired with the line it starts on.
///
/// Lines come from the reader's position, so quoted fields spanning several
/// lines do not shift the numbers of later rows.
fn read_rows<T, R>(reader: R, origin: &str) -> LoadResult<Vec<(usize, T)>>
where
    T: DeserializeOwned,
    R: Read,
{
    let parse_error = |line: usize, source: csv::Error| LoadError::Parse {
        origin: origin.to_string(),
        line,
        source,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|source| parse_error(1, source))?
        .clone();

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    loop {
        let next_line = csv_reader.position().line() as usize;
        match csv_reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(source) => return Err(parse_error(next_line, source)),
        }

        let line = record
            .position()
            .map_or(next_line, |position| position.line() as usize);
        let row = record
            .deserialize(Some(&headers))
            .map_err(|source| parse_error(line, source))?;
        rows.push((line, row));
    }

    Ok(rows)
}

/// Load sales fact rows from a CSV reader.
pub fn load_facts<R: Read>(reader: R, origin: &str) -> LoadResult<Vec<SalesFact>> {
    let mut facts = Vec::new();
    for (line, fact) in read_rows::<SalesFact, _>(reader, origin)? {
        if let Some(rate) = fact.discount_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(LoadError::InvalidValue {
                    origin: origin.to_string(),
                    line,
                    field: "discount_rate",
                    reason: format!("{} is outside 0.0 - 1.0", rate),
                });
            }
        }

        facts.push(fact);
    }

    Ok(facts)
}

/// Load the customer reference table from a CSV reader.
pub fn load_customers<R: Read>(reader: R, origin: &str) -> LoadResult<Vec<Customer>> {
    Ok(read_rows::<Customer, _>(reader, origin)?
        .into_iter()
        .map(|(_, customer)| customer)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::date;

    const SAMPLE_CSV: &str = "\
order_id,order_date,customer_id,customer_name,product_id,product_name,category,quantity,unit_price,discount_rate,net_revenue,cost,profit,segment,region,sales_rep
1001,2024-01-05,C1,Ada Lovelace,P1,Desk Lamp,Office,2,50.00,0.10,90.00,60.00,30.00,Consumer,West,Jane
1001,2024-01-05,C1,Ada Lovelace,P2,Stapler,Office,1,20.00,0,,8.00,,Consumer,West,Jane
1002,2024-02-11 09:30:00,C2,,P1,Desk Lamp,Office,1,50.00,,,,,Corporate,East,
1003,,C3,Grace Hopper,P3,Monitor,Technology,1,300.00,0.2,240.00,200.00,40.00,,,
";

    #[test]
    fn test_load_sample_csv() {
        let facts = load_facts(SAMPLE_CSV.as_bytes(), "sample").unwrap();
        assert_eq!(facts.len(), 4);

        assert_eq!(facts[0].order_id, "1001");
        assert_eq!(facts[0].order_date, Some(date("2024-01-05")));
        assert_eq!(facts[0].customer_name.as_deref(), Some("Ada Lovelace"));
        assert!((facts[0].net_revenue() - 90.0).abs() < 1e-9);

        // Missing net revenue and profit are derived
        assert!((facts[1].net_revenue() - 20.0).abs() < 1e-9);
        assert!((facts[1].profit() - 12.0).abs() < 1e-9);

        // Timestamps are truncated to the date
        assert_eq!(facts[2].order_date, Some(date("2024-02-11")));
        assert_eq!(facts[2].customer_name, None);
        assert_eq!(facts[2].sales_rep, None);

        // Empty date is kept as missing rather than rejected
        assert_eq!(facts[3].order_date, None);
    }

    #[test]
    fn test_minimal_columns() {
        let csv_data = "\
order_id,customer_id,product_id,category,quantity,unit_price
1,C1,P1,Books,3,10
";
        let facts = load_facts(csv_data.as_bytes(), "minimal").unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].order_date, None);
        assert!((facts[0].net_revenue() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_date_reports_line() {
        let csv_data = "\
order_id,order_date,customer_id,product_id,category,quantity,unit_price
1,2024-01-01,C1,P1,Books,1,10
2,01/02/2024,C1,P1,Books,1,10
";
        let err = load_facts(csv_data.as_bytes(), "bad.csv").unwrap_err();
        match err {
            LoadError::Parse { origin, line, .. } => {
                assert_eq!(origin, "bad.csv");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_line_accounts_for_multiline_fields() {
        let csv_data = "\
order_id,order_date,customer_id,product_id,product_name,category,quantity,unit_price
1,2024-01-01,C1,P1,\"Desk
Lamp\",Books,1,10
2,01/02/2024,C1,P1,Pen,Books,1,10
";
        let err = load_facts(csv_data.as_bytes(), "multiline.csv").unwrap_err();
        match err {
            LoadError::Parse { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_value_line_after_multiline_field() {
        let csv_data = "\
order_id,customer_id,product_id,product_name,category,quantity,unit_price,discount_rate
1,C1,P1,\"Desk
Lamp\",Books,1,10,0.1
2,C1,P1,Pen,Books,1,10,1.5
";
        let err = load_facts(csv_data.as_bytes(), "rates").unwrap_err();
        assert!(matches!(
            err,
            LoadError::InvalidValue {
                field: "discount_rate",
                line: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_discount_rate_out_of_range() {
        let csv_data = "\
order_id,customer_id,product_id,category,quantity,unit_price,discount_rate
1,C1,P1,Books,1,10,1.5
";
        let err = load_facts(csv_data.as_bytes(), "rates").unwrap_err();
        assert!(matches!(
            err,
            LoadError::InvalidValue {
                field: "discount_rate",
                line: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_customer_names_prefer_reference_table() {
        let facts = load_facts(SAMPLE_CSV.as_bytes(), "sample").unwrap();
        let customers = load_customers(
            "customer_id,customer_name\nC1,A. Lovelace\nC2,Alan Turing\n".as_bytes(),
            "customers",
        )
        .unwrap();

        let dataset = Dataset::new(facts, customers);
        assert_eq!(dataset.customer_name("C1"), Some("A. Lovelace"));
        assert_eq!(dataset.customer_name("C2"), Some("Alan Turing"));
        assert_eq!(dataset.customer_name("C3"), Some("Grace Hopper"));
        assert_eq!(dataset.customer_name("C9"), None);
    }

    #[test]
    fn test_dataset_counts() {
        let facts = load_facts(SAMPLE_CSV.as_bytes(), "sample").unwrap();
        let dataset = Dataset::new(facts, Vec::new());
        assert_eq!(dataset.order_count(), 3);
        assert_eq!(dataset.customer_count(), 3);
        assert_eq!(dataset.undated_rows(), 1);
        assert_eq!(dataset.dated_facts().count(), 3);
    }

    #[test]
    fn test_load_directory_of_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let header = "order_id,order_date,customer_id,product_id,category,quantity,unit_price\n";

        std::fs::create_dir(dir.path().join("2024")).unwrap();
        std::fs::write(
            dir.path().join("2024").join("01.csv"),
            format!("{header}1,2024-01-03,C1,P1,Books,1,10\n"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("2024").join("02.csv"),
            format!("{header}2,2024-02-03,C2,P1,Books,2,10\n"),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not data").unwrap();
        std::fs::write(
            dir.path().join(CUSTOMER_TABLE),
            "customer_id,customer_name\nC1,Ada\n",
        )
        .unwrap();

        let files = discover_fact_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("01.csv"));

        let dataset = Dataset::load(dir.path(), None, false).unwrap();
        assert_eq!(dataset.facts.len(), 2);
        assert_eq!(dataset.customer_name("C1"), Some("Ada"));
    }

    #[test]
    fn test_empty_directory_is_no_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_fact_files(dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::NoInput(_)));
    }

    #[test]
    fn test_missing_path_is_open_error() {
        let err = discover_fact_files(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
