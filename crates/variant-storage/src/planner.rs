//! Aggregation planning for `group_by`, `rank` and `get_frequency`.
//!
//! The planner turns a compiled filter plus aggregation options into a
//! pipeline of [`Stage`]s, and post-processes the raw pipeline output into
//! [`GroupCount`]s and [`FrequencyBucket`]s.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};
use variant_query::region::{chunk_end, chunk_id, chunk_start};
use variant_query::{FilterError, FilterResult, QueryOptions, Region, SortOrder};

use crate::config::StorageConfig;
use crate::document::{as_i64, Document};
use crate::pipeline::{Accumulator, Expr, Stage};
use crate::predicate::{Condition, Predicate};
use crate::result::{FrequencyBucket, GroupCount};
use crate::schema::{self, path};

// ============================================================================
// Group-by fields
// ============================================================================

/// Annotation field a `group_by` aggregates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GroupByField {
    /// Gene name.
    #[default]
    Gene,
    /// Ensembl gene id.
    EnsemblGene,
    /// Ensembl transcript id.
    EnsemblTranscript,
    /// Sequence ontology accession of the consequence type.
    ConsequenceType,
}

impl GroupByField {
    /// Name accepted from callers.
    pub fn name(self) -> &'static str {
        match self {
            GroupByField::Gene => "gene",
            GroupByField::EnsemblGene => "ensemblGene",
            GroupByField::EnsemblTranscript => "ensemblTranscript",
            GroupByField::ConsequenceType => "ct",
        }
    }

    /// Stored path of the grouped value.
    pub fn document_path(self) -> String {
        let leaf = match self {
            GroupByField::Gene => schema::GENE_NAME,
            GroupByField::EnsemblGene => schema::ENSEMBL_GENE_ID,
            GroupByField::EnsemblTranscript => schema::ENSEMBL_TRANSCRIPT_ID,
            GroupByField::ConsequenceType => schema::SO_ACCESSION,
        };
        path(&[schema::ANNOTATION, schema::CONSEQUENCE_TYPES, leaf])
    }

    /// Array levels between the document and the grouped value.
    pub fn unwinds(self) -> usize {
        match self {
            // so accessions are themselves an array
            GroupByField::ConsequenceType => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for GroupByField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupByField {
    type Err = FilterError;

    fn from_str(s: &str) -> FilterResult<Self> {
        match s {
            "gene" => Ok(GroupByField::Gene),
            "ensemblGene" => Ok(GroupByField::EnsemblGene),
            "ensemblTranscript" => Ok(GroupByField::EnsemblTranscript),
            "ct" | "consequence_type" => Ok(GroupByField::ConsequenceType),
            _ => Err(FilterError::UnknownValue {
                kind: "group by field",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Plans
// ============================================================================

/// A pipeline ready to run, with a description for logs and `explain`.
///
/// # Example
///
/// ```ignore
/// let plan = planner.group_by(filter, GroupByField::Gene, &options);
/// println!("{}", plan);
/// let docs = store.aggregate(&plan.stages)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    /// What the plan computes.
    pub description: String,
    /// Pipeline stages in order.
    pub stages: Vec<Stage>,
    /// Remarks about the plan.
    pub hints: Vec<String>,
}

impl AggregationPlan {
    /// Creates an empty plan.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            stages: Vec::new(),
            hints: Vec::new(),
        }
    }

    /// Appends a stage.
    pub fn add_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Adds a hint.
    pub fn add_hint(&mut self, hint: impl Into<String>) {
        self.hints.push(hint.into());
    }
}

impl fmt::Display for AggregationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Aggregation Plan for: {}", self.description)?;
        writeln!(f)?;

        writeln!(f, "Steps:")?;
        for (i, stage) in self.stages.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, stage)?;
        }

        if !self.hints.is_empty() {
            writeln!(f)?;
            writeln!(f, "Hints:")?;
            for hint in &self.hints {
                writeln!(f, "  - {}", hint)?;
            }
        }

        Ok(())
    }
}

/// Builds aggregation pipelines.
#[derive(Debug, Clone)]
pub struct AggregationPlanner {
    group_by_limit: usize,
    histogram_buckets: u32,
}

impl Default for AggregationPlanner {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}

impl AggregationPlanner {
    /// Creates a planner with the defaults of `config`.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            group_by_limit: config.group_by_limit,
            histogram_buckets: config.histogram_buckets.max(1),
        }
    }

    /// Counts distinct variants per value of `field`.
    ///
    /// Unless `options.count` is set, each group also lists the variants as
    /// `{chromosome, start, end, reference, alternate, ids}`.
    pub fn group_by(&self, filter: Predicate, field: GroupByField, options: &QueryOptions) -> AggregationPlan {
        let name = field.name();
        let mut plan = AggregationPlan::new(format!("group by {}", name));
        if filter.is_all() {
            plan.add_hint("no filter: every variant is scanned");
        }
        plan.add_stage(Stage::Match(filter));

        let mut fields = vec![(name.to_string(), Expr::field(field.document_path()))];
        if !options.count {
            for (key, source) in [
                ("start", schema::START),
                ("end", schema::END),
                ("chromosome", schema::CHROMOSOME),
                ("alternate", schema::ALTERNATE),
                ("reference", schema::REFERENCE),
                ("ids", schema::IDS),
            ] {
                fields.push((path(&[schema::ID, key]), Expr::field(source)));
            }
        }
        plan.add_stage(Stage::Project {
            fields,
            exclude_id: false,
        });
        for _ in 0..field.unwinds() {
            plan.add_stage(Stage::Unwind(name.to_string()));
        }
        plan.add_stage(Stage::Match(Predicate::field(name, Condition::Ne(Value::Null))));
        plan.add_stage(Stage::Group {
            id: Expr::field(name),
            accumulators: vec![("values".into(), Accumulator::AddToSet(Expr::field(schema::ID)))],
        });

        let mut output = vec![
            ("id".to_string(), Expr::field(schema::ID)),
            ("count".to_string(), Expr::Size(Box::new(Expr::field("values")))),
        ];
        if !options.count {
            output.push(("values".to_string(), Expr::field("values")));
        }
        plan.add_stage(Stage::Project {
            fields: output,
            exclude_id: true,
        });
        plan.add_stage(Stage::Sort(vec![("count".into(), options.order)]));
        if let Some(skip) = options.skip.filter(|s| *s > 0) {
            plan.add_stage(Stage::Skip(skip));
        }
        plan.add_stage(Stage::Limit(options.limit.unwrap_or(self.group_by_limit)));
        plan
    }

    /// Width of the buckets for a histogram over `region`.
    ///
    /// A zero `interval` splits the region into the configured bucket count.
    pub fn frequency_interval(&self, region: &Region, interval: u32) -> u32 {
        if interval > 0 {
            return interval;
        }
        (region.end.saturating_sub(region.start) / self.histogram_buckets).max(1)
    }

    /// Counts variants per bucket of width `interval` along `region`.
    pub fn frequency(&self, filter: Predicate, region: &Region, interval: u32) -> AggregationPlan {
        let mut plan = AggregationPlan::new(format!("frequency over {} every {}", region, interval));
        plan.add_stage(Stage::Match(Predicate::and([
            Predicate::eq(schema::CHROMOSOME, region.chromosome.clone()),
            Predicate::field(schema::START, Condition::Gt(json!(region.start))),
            Predicate::field(schema::START, Condition::Lt(json!(region.end))),
            filter,
        ])));

        // floor(start / interval) as (start - start % interval) / interval, exact in f64
        let size = || Box::new(Expr::literal(interval));
        let bucket = Expr::Divide(
            Box::new(Expr::Subtract(
                Box::new(Expr::field(schema::START)),
                Box::new(Expr::Mod(Box::new(Expr::field(schema::START)), size())),
            )),
            size(),
        );
        plan.add_stage(Stage::Group {
            id: bucket,
            accumulators: vec![("features_count".into(), Accumulator::Sum(Expr::literal(1)))],
        });
        plan.add_stage(Stage::Sort(vec![(schema::ID.into(), SortOrder::Ascending)]));
        plan
    }
}

// ============================================================================
// Post-processing
// ============================================================================

/// Reads the output of a [`AggregationPlanner::group_by`] pipeline.
pub fn group_counts(docs: Vec<Document>) -> Vec<GroupCount> {
    docs.into_iter()
        .map(|mut doc| GroupCount {
            id: doc.remove("id").unwrap_or(Value::Null),
            count: doc
                .get("count")
                .and_then(as_i64)
                .map_or(0, |c| c.max(0) as u64),
            values: match doc.remove("values") {
                Some(Value::Array(values)) => values,
                _ => Vec::new(),
            },
        })
        .collect()
}

/// Turns the output of a [`AggregationPlanner::frequency`] pipeline into a
/// dense histogram.
///
/// Counts are log-scaled. Every bucket of the region is present; buckets
/// without variants get `0.0`.
pub fn frequency_buckets(docs: &[Document], region: &Region, interval: u32) -> Vec<FrequencyBucket> {
    let interval = interval.max(1);
    let first = chunk_id(region.start, interval);
    let last = chunk_id(region.end, interval);

    let mut counts: std::collections::BTreeMap<u32, f64> = std::collections::BTreeMap::new();
    for doc in docs {
        let (Some(id), Some(count)) = (
            doc.get(schema::ID).and_then(Value::as_f64),
            doc.get("features_count").and_then(Value::as_f64),
        ) else {
            continue;
        };
        if id < 0.0 || count <= 0.0 {
            continue;
        }
        *counts.entry(id.round() as u32).or_insert(0.0) += count.ln();
    }

    (first..=last)
        .map(|id| FrequencyBucket {
            id,
            chromosome: region.chromosome.clone(),
            start: chunk_start(id, interval),
            end: chunk_end(id, interval),
            features_count: counts.get(&id).copied().unwrap_or(0.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline;

    fn docs(values: Value) -> Vec<Document> {
        values
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    fn annotated() -> Vec<Document> {
        docs(json!([
            {"_id": "v1", "chromosome": "1", "start": 100, "annot": [{"ct": [{"gn": "BRCA2", "so": [1583, 1587]}, {"gn": "ZAR1"}]}]},
            {"_id": "v2", "chromosome": "1", "start": 200, "annot": [{"ct": [{"gn": "BRCA2", "so": [1583]}]}]},
            {"_id": "v3", "chromosome": "1", "start": 300, "annot": [{"ct": [{"so": [1631]}]}]},
            {"_id": "v4", "chromosome": "1", "start": 400}
        ]))
    }

    #[test]
    fn test_group_by_field_parse() {
        assert_eq!("gene".parse::<GroupByField>().unwrap(), GroupByField::Gene);
        assert_eq!("consequence_type".parse::<GroupByField>().unwrap(), GroupByField::ConsequenceType);
        assert!("biotype".parse::<GroupByField>().is_err());
        assert_eq!(GroupByField::EnsemblTranscript.document_path(), "annot.ct.enst");
    }

    #[test]
    fn test_group_by_gene() {
        let planner = AggregationPlanner::default();
        let plan = planner.group_by(Predicate::all(), GroupByField::Gene, &QueryOptions::new());
        let groups = group_counts(pipeline::run(annotated(), &plan.stages).unwrap());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, json!("BRCA2"));
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].values.len(), 2);
        assert_eq!(groups[0].values[0]["start"], json!(100));
        assert_eq!(groups[1].count, 1);
    }

    #[test]
    fn test_group_by_consequence_type_counting() {
        let planner = AggregationPlanner::default();
        let options = QueryOptions::new().with_count(true).with_order(SortOrder::Ascending);
        let plan = planner.group_by(Predicate::all(), GroupByField::ConsequenceType, &options);
        let groups = group_counts(pipeline::run(annotated(), &plan.stages).unwrap());
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.last().map(|g| (g.id.clone(), g.count)), Some((json!(1583), 2)));
        assert!(groups.iter().all(|g| g.values.is_empty()));
    }

    #[test]
    fn test_group_by_limit_and_skip() {
        let planner = AggregationPlanner::default();
        let options = QueryOptions::new().with_limit(1).with_skip(1);
        let plan = planner.group_by(Predicate::all(), GroupByField::Gene, &options);
        let groups = group_counts(pipeline::run(annotated(), &plan.stages).unwrap());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, json!("ZAR1"));
    }

    #[test]
    fn test_plan_display() {
        let planner = AggregationPlanner::default();
        let plan = planner.group_by(Predicate::all(), GroupByField::Gene, &QueryOptions::new());
        let display = plan.to_string();
        assert!(display.contains("Aggregation Plan for: group by gene"));
        assert!(display.contains("Steps:"));
        assert!(display.contains("$unwind"));
        assert!(display.contains("Hints:"));
    }

    #[test]
    fn test_frequency_interval() {
        let planner = AggregationPlanner::new(&StorageConfig::builder().with_histogram_buckets(10).build());
        let region = Region::new("1", 1, 1001);
        assert_eq!(planner.frequency_interval(&region, 0), 100);
        assert_eq!(planner.frequency_interval(&region, 7), 7);
        assert_eq!(planner.frequency_interval(&Region::new("1", 5, 6), 0), 1);
    }

    #[test]
    fn test_frequency_histogram() {
        let planner = AggregationPlanner::default();
        let region = Region::new("1", 1, 499);
        let plan = planner.frequency(Predicate::all(), &region, 100);
        let mut input = annotated();
        input.extend(docs(json!([{"_id": "v5", "chromosome": "1", "start": 150}])));
        let raw = pipeline::run(input, &plan.stages).unwrap();
        let buckets = frequency_buckets(&raw, &region, 100);
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets[0].features_count, 0.0);
        assert!((buckets[1].features_count - 2f64.ln()).abs() < 1e-9);
        assert_eq!((buckets[1].start, buckets[1].end), (100, 199));
        assert_eq!(buckets[4].features_count, 0.0);
    }
}
