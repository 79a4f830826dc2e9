//! Result types returned by the variant adaptor.

use std::time::Duration;

use crate::update::BulkWriteResult;

/// Result of a read operation.
///
/// Carries the values plus the time spent in the document store and any
/// non-fatal warnings raised while compiling the query.
///
/// # Example
///
/// ```ignore
/// let result = adaptor.get(&query, &QueryOptions::new())?;
///
/// println!("{} variants in {:?}", result.num_results, result.db_time);
/// for warning in &result.warnings {
///     println!("warning: {}", warning);
/// }
/// for variant in &result {
///     println!("{}", variant);
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    /// Operation label.
    pub id: String,
    /// Time spent in the document store.
    pub db_time: Duration,
    /// Number of returned values.
    pub num_results: usize,
    /// Number of matching values before paging, when known.
    pub num_total_results: Option<u64>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
    /// The values.
    pub results: Vec<T>,
}

impl<T> QueryResult<T> {
    /// Creates a result.
    pub fn new(id: impl Into<String>, db_time: Duration, results: Vec<T>) -> Self {
        Self {
            id: id.into(),
            db_time,
            num_results: results.len(),
            num_total_results: None,
            warnings: Vec::new(),
            results,
        }
    }

    /// Creates an empty result.
    pub fn empty(id: impl Into<String>) -> Self {
        Self::new(id, Duration::ZERO, Vec::new())
    }

    /// Sets the total count.
    pub fn with_total(mut self, total: u64) -> Self {
        self.num_total_results = Some(total);
        self
    }

    /// Sets the warnings.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Returns true if there are no values.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the first value.
    pub fn first(&self) -> Option<&T> {
        self.results.first()
    }

    /// Returns an iterator over the values.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.results.iter()
    }
}

impl<T> IntoIterator for QueryResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a QueryResult<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Summary of a write operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Variant documents created.
    pub inserted: usize,
    /// Documents changed.
    pub updated: usize,
    /// Documents deleted.
    pub deleted: usize,
    /// Write models skipped because the input could not be converted.
    pub skipped: usize,
    /// Operations rerouted after a duplicate key.
    pub duplicates: usize,
    /// Time spent in the document store.
    pub db_time: Duration,
}

impl WriteSummary {
    /// Adds the counters of one bulk write.
    pub fn absorb(&mut self, result: &BulkWriteResult) {
        self.inserted += result.upserted.len();
        self.updated += result.modified;
        self.deleted += result.deleted;
    }

    /// Adds another summary.
    pub fn merge(&mut self, other: &WriteSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.duplicates += other.duplicates;
        self.db_time += other.db_time;
    }
}

/// One group of a `group_by` or `rank`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCount {
    /// Group key (gene name, SO accession, ...).
    pub id: serde_json::Value,
    /// Number of distinct variants.
    pub count: u64,
    /// Variant ids of the group, present when not counting.
    pub values: Vec<serde_json::Value>,
}

/// One bucket of a `get_frequency` histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBucket {
    /// Bucket index along the chromosome.
    pub id: u32,
    /// Chromosome.
    pub chromosome: String,
    /// First position covered.
    pub start: u32,
    /// Last position covered.
    pub end: u32,
    /// Log-scaled feature count; `0.0` for empty buckets.
    pub features_count: f64,
}
