//! Variant adaptor implementation.

use std::collections::BTreeSet;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};
use variant_query::{Query, QueryOptions, QueryParam, Region, SortOrder, ALL};

use crate::cache::StudyConfigurationCache;
use crate::compiler::QueryCompiler;
use crate::config::StorageConfig;
use crate::converter::DocumentToVariantConverter;
use crate::error::{StorageError, StorageResult};
use crate::model::{StudyConfiguration, Variant, VariantAnnotation, VariantStatsUpdate};
use crate::mutation;
use crate::planner::{frequency_buckets, group_counts, AggregationPlanner, GroupByField};
use crate::result::{FrequencyBucket, GroupCount, QueryResult, WriteSummary};
use crate::schema::{self, VariantField};
use crate::traits::{DocumentCursor, DocumentStore, FindOptions, StudyConfigurationManager};
use crate::update::WriteModel;

/// Main entry point for reading and writing variants.
///
/// The adaptor bridges the query model (`variant-query`) and any document
/// database that implements [`DocumentStore`]. Study metadata comes from a
/// [`StudyConfigurationManager`] through a cache.
///
/// # Example
///
/// ```rust
/// use variant_query::{Query, QueryOptions, QueryParam};
/// use variant_storage::{InMemoryDocumentStore, InMemoryStudyConfigurationManager, VariantAdaptor};
///
/// let store = InMemoryDocumentStore::new();
/// let studies = InMemoryStudyConfigurationManager::new();
/// let adaptor = VariantAdaptor::new(&store, &studies);
///
/// let query = Query::new().with(QueryParam::Region, "1:10000-20000");
/// let result = adaptor.get(&query, &QueryOptions::new()).unwrap();
/// assert!(result.is_empty());
/// ```
pub struct VariantAdaptor<'a> {
    store: &'a dyn DocumentStore,
    studies: StudyConfigurationCache<'a>,
    planner: AggregationPlanner,
    config: StorageConfig,
}

impl<'a> VariantAdaptor<'a> {
    /// Creates an adaptor with default configuration.
    pub fn new(store: &'a dyn DocumentStore, studies: &'a dyn StudyConfigurationManager) -> Self {
        Self::with_config(store, studies, StorageConfig::default())
    }

    /// Creates an adaptor with custom configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = StorageConfig::builder()
    ///     .with_batch_size(1_000)
    ///     .with_parallel(true)
    ///     .build();
    ///
    /// let adaptor = VariantAdaptor::with_config(&store, &studies, config);
    /// ```
    pub fn with_config(
        store: &'a dyn DocumentStore,
        studies: &'a dyn StudyConfigurationManager,
        config: StorageConfig,
    ) -> Self {
        Self {
            store,
            studies: StudyConfigurationCache::new(studies, config.cache.as_ref()),
            planner: AggregationPlanner::new(&config),
            config,
        }
    }

    /// Returns the adaptor configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the study configuration cache.
    pub fn studies(&self) -> &StudyConfigurationCache<'a> {
        &self.studies
    }

    /// Returns a compiler sharing the adaptor's study cache.
    pub fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(&self.studies)
    }

    fn study(&self, study: &str) -> StorageResult<std::sync::Arc<StudyConfiguration>> {
        self.studies
            .resolve(study)?
            .ok_or_else(|| StorageError::Unresolved {
                kind: "study",
                value: study.to_string(),
            })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Variants matching a query.
    ///
    /// # Errors
    ///
    /// Malformed filters, unknown studies, files, samples or cohorts, and
    /// store failures.
    pub fn get(&self, query: &Query, options: &QueryOptions) -> StorageResult<QueryResult<Variant>> {
        let start = Instant::now();
        let (filter, find_options) = self.prepare_find(query, options)?;
        let converter = self.converter(query)?;

        let mut variants = Vec::new();
        for doc in self.store.find(&filter, &find_options)? {
            variants.push(converter.convert(&doc?)?);
        }
        let total = if options.limit.is_some() || options.skip.is_some() {
            self.store.count(&filter)?
        } else {
            variants.len() as u64
        };
        debug!(returned = variants.len(), total, "Variant query finished");

        Ok(QueryResult::new("get", start.elapsed(), variants)
            .with_total(total)
            .with_warnings(query_warnings(query)))
    }

    /// Streams variants matching a query.
    pub fn iterator(&self, query: &Query, options: &QueryOptions) -> StorageResult<VariantIterator<'_>> {
        let (filter, find_options) = self.prepare_find(query, options)?;
        let converter = self.converter(query)?;
        Ok(VariantIterator {
            cursor: self.store.find(&filter, &find_options)?,
            converter,
        })
    }

    /// Number of variants matching a query.
    pub fn count(&self, query: &Query) -> StorageResult<QueryResult<u64>> {
        let start = Instant::now();
        let filter = self.compiler().compile(query)?;
        let count = self.store.count(&filter)?;
        Ok(QueryResult::new("count", start.elapsed(), vec![count]).with_warnings(query_warnings(query)))
    }

    /// Distinct values of a field among the variants matching a query.
    ///
    /// `field` is a caller facing name such as `chromosome` or a stored path
    /// such as `annot.ct.gn`.
    pub fn distinct(&self, query: &Query, field: &str) -> StorageResult<QueryResult<Value>> {
        let start = Instant::now();
        let filter = self.compiler().compile(query)?;
        let path = VariantField::from_name(field).map_or(field, |f| f.document_field());
        let values = self.store.distinct(path, &filter)?;
        Ok(QueryResult::new("distinct", start.elapsed(), values))
    }

    /// Counts variants per annotation value.
    ///
    /// `field` is one of `gene`, `ensemblGene`, `ensemblTranscript` or `ct`.
    /// Groups are sorted by count in `options.order` and paged with
    /// `options.skip`/`options.limit`.
    pub fn group_by(
        &self,
        query: &Query,
        field: &str,
        options: &QueryOptions,
    ) -> StorageResult<QueryResult<GroupCount>> {
        let start = Instant::now();
        let field: GroupByField = field.parse()?;
        let filter = self.compiler().compile(query)?;
        let plan = self.planner.group_by(filter, field, options);
        debug!(plan = %plan, "Running group by");

        let docs = self.store.aggregate(&plan.stages)?.collect::<StorageResult<Vec<_>>>()?;
        Ok(QueryResult::new("groupBy", start.elapsed(), group_counts(docs))
            .with_warnings(query_warnings(query)))
    }

    /// The `n` most (or least) frequent values of a field, counts only.
    pub fn rank(
        &self,
        query: &Query,
        field: &str,
        n: usize,
        ascending: bool,
    ) -> StorageResult<QueryResult<GroupCount>> {
        let order = if ascending {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        let options = QueryOptions::new().with_limit(n).with_count(true).with_order(order);
        self.group_by(query, field, &options)
    }

    /// Histogram of variant density along a region.
    ///
    /// A zero `interval` splits the region into the configured number of
    /// buckets.
    pub fn get_frequency(
        &self,
        query: &Query,
        region: &Region,
        interval: u32,
    ) -> StorageResult<QueryResult<FrequencyBucket>> {
        let start = Instant::now();
        let interval = self.planner.frequency_interval(region, interval);
        let filter = self.compiler().compile(query)?;
        let plan = self.planner.frequency(filter, region, interval);
        debug!(plan = %plan, "Running frequency histogram");

        let docs = self.store.aggregate(&plan.stages)?.collect::<StorageResult<Vec<_>>>()?;
        let buckets = frequency_buckets(&docs, region, interval);
        Ok(QueryResult::new("frequency", start.elapsed(), buckets))
    }

    fn prepare_find(
        &self,
        query: &Query,
        options: &QueryOptions,
    ) -> StorageResult<(crate::predicate::Predicate, FindOptions)> {
        let compiler = self.compiler();
        let filter = compiler.compile(query)?;
        let sort = if options.sort {
            vec![
                (schema::CHROMOSOME.to_string(), SortOrder::Ascending),
                (schema::START.to_string(), SortOrder::Ascending),
            ]
        } else {
            Vec::new()
        };
        let find_options = FindOptions {
            projection: compiler.projection(query, options)?,
            sort,
            skip: options.skip,
            limit: options.limit,
            batch_size: options.batch_size,
        };
        Ok((filter, find_options))
    }

    fn converter(&self, query: &Query) -> StorageResult<DocumentToVariantConverter> {
        let mut converter = DocumentToVariantConverter::new(self.studies.all()?);
        if let Some(samples) = query.get(QueryParam::IncludeSample).filter(|s| *s != ALL) {
            if !samples.trim().is_empty() {
                converter = converter.with_returned_samples(query.get_list(QueryParam::IncludeSample)?);
            }
        }
        if let Some(genotype) = query.get(QueryParam::UnknownGenotype) {
            converter = converter.with_unknown_genotype(genotype);
        }
        Ok(converter)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Loads the variants of one file into a study.
    ///
    /// Each variant must carry an entry for the study. Only the file entry
    /// and sample genotypes of `file_id` are written. Samples of previously
    /// loaded files are recorded as unknown on variants first seen here.
    /// Variants that cannot be converted are skipped and counted.
    ///
    /// # Errors
    ///
    /// Unknown study, or a store failure other than a duplicate key.
    pub fn insert(&self, variants: &[Variant], study: &str, file_id: i32) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let config = self.study(study)?;
        let gap_samples = mutation::loaded_samples(&config, file_id);
        info!(
            study = %config.study_name,
            file_id,
            variants = variants.len(),
            gap_samples = gap_samples.len(),
            "Loading variants"
        );

        let mut summary = WriteSummary::default();
        for batch in variants.chunks(self.config.batch_size.max(1)) {
            let mut loaded = Vec::with_capacity(batch.len());
            let mut models = Vec::with_capacity(batch.len());
            for (variant, model) in batch.iter().zip(self.insert_models(batch, &config, file_id, &gap_samples)) {
                match model {
                    Ok(model) => {
                        loaded.push(variant);
                        models.push(model);
                    }
                    Err(e) => {
                        warn!(variant = %variant, error = %e, "Skipping variant");
                        summary.skipped += 1;
                    }
                }
            }
            if models.is_empty() {
                continue;
            }

            let first = self.store.bulk_write(models, false)?;
            if let Some(error) = first.first_fatal_error() {
                return Err(error.clone().into_storage_error());
            }
            summary.absorb(&first);

            let merges = first
                .write_errors
                .iter()
                .filter(|e| e.duplicate_id().is_some())
                .filter_map(|e| loaded.get(e.index))
                .map(|variant| mutation::merge_model(variant, &config, file_id))
                .collect::<StorageResult<Vec<_>>>()?;
            if merges.is_empty() {
                continue;
            }
            summary.duplicates += merges.len();
            let second = self.store.bulk_write(merges, false)?;
            if let Some(error) = second.write_errors.first() {
                return Err(error.clone().into_storage_error());
            }
            summary.absorb(&second);
        }

        summary.db_time = start.elapsed();
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            merged = summary.duplicates,
            skipped = summary.skipped,
            elapsed = ?summary.db_time,
            "Loaded variants"
        );
        Ok(summary)
    }

    fn insert_models(
        &self,
        batch: &[Variant],
        config: &StudyConfiguration,
        file_id: i32,
        gap_samples: &[i32],
    ) -> Vec<StorageResult<WriteModel>> {
        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                use rayon::prelude::*;

                return batch
                    .par_iter()
                    .map(|v| mutation::insert_model(v, config, file_id, gap_samples))
                    .collect();
            }
        }
        batch
            .iter()
            .map(|v| mutation::insert_model(v, config, file_id, gap_samples))
            .collect()
    }

    /// Records the samples of `file_id` as unknown on every variant of the
    /// study the file did not report.
    ///
    /// `chromosomes` restricts the update; empty means all.
    pub fn fill_file_gaps(&self, study: &str, file_id: i32, chromosomes: &[String]) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let config = self.study(study)?;
        let samples = config
            .samples_in_files
            .get(&file_id)
            .ok_or_else(|| StorageError::Unresolved {
                kind: "file",
                value: file_id.to_string(),
            })?;
        let Some(model) = mutation::fill_gaps_model(&config, file_id, samples, chromosomes) else {
            debug!(file_id, "Nothing to fill");
            return Ok(WriteSummary::default());
        };
        let summary = self.write("fill gaps", vec![model], false, start)?;
        info!(file_id, updated = summary.updated, "Filled file gaps");
        Ok(summary)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Writes cohort stats, keyed by cohort name.
    ///
    /// With `overwrite`, earlier stats of the same cohorts are replaced;
    /// otherwise they are kept alongside.
    pub fn update_stats(
        &self,
        stats: &[VariantStatsUpdate],
        study: &str,
        overwrite: bool,
    ) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let config = self.study(study)?;
        let mut models = Vec::with_capacity(stats.len() * 2);
        for update in stats {
            models.extend(mutation::stats_models(update, &config, overwrite)?);
        }
        let summary = self.write("update stats", models, true, start)?;
        info!(study = %config.study_name, variants = stats.len(), updated = summary.updated, "Updated stats");
        Ok(summary)
    }

    /// Removes the stats of a cohort from every variant.
    pub fn delete_stats(&self, study: &str, cohort: &str) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let config = self.study(study)?;
        let cohort_id = config
            .resolve_cohort(cohort)
            .ok_or_else(|| StorageError::Unresolved {
                kind: "cohort",
                value: cohort.to_string(),
            })?;
        let model = mutation::delete_stats_model(config.study_id, cohort_id);
        self.write("delete stats", vec![model], false, start)
    }

    /// Replaces the annotation of each annotated variant.
    pub fn update_annotations(&self, annotations: &[VariantAnnotation]) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let models = annotations.iter().map(mutation::annotation_model).collect();
        let summary = self.write("update annotations", models, false, start)?;
        info!(annotations = annotations.len(), updated = summary.updated, "Updated annotations");
        Ok(summary)
    }

    /// Clears the annotation of every variant matching a query.
    pub fn delete_annotation(&self, query: &Query) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let filter = self.compiler().compile(query)?;
        self.write("delete annotation", vec![mutation::delete_annotation_model(filter)], false, start)
    }

    /// Removes a study from every variant.
    ///
    /// With `purge`, variants left without any study are deleted.
    pub fn delete_study(&self, study: &str, purge: bool) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let config = self.study(study)?;
        let models = mutation::delete_study_models(config.study_id, purge);
        let summary = self.write("delete study", models, true, start)?;
        info!(
            study = %config.study_name,
            updated = summary.updated,
            deleted = summary.deleted,
            "Deleted study"
        );
        Ok(summary)
    }

    /// Deletes every variant matching a query.
    pub fn delete(&self, query: &Query) -> StorageResult<WriteSummary> {
        let start = Instant::now();
        let filter = self.compiler().compile(query)?;
        self.write("delete", vec![WriteModel::DeleteMany { filter }], false, start)
    }

    fn write(&self, label: &str, models: Vec<WriteModel>, ordered: bool, start: Instant) -> StorageResult<WriteSummary> {
        let mut summary = WriteSummary::default();
        if models.is_empty() {
            return Ok(summary);
        }
        debug!(operation = label, models = models.len(), ordered, "Submitting bulk write");
        let result = self.store.bulk_write(models, ordered)?;
        if let Some(error) = result.write_errors.first() {
            return Err(error.clone().into_storage_error());
        }
        summary.absorb(&result);
        summary.db_time = start.elapsed();
        Ok(summary)
    }
}

impl std::fmt::Debug for VariantAdaptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantAdaptor")
            .field("studies", &self.studies)
            .field("config", &self.config)
            .finish()
    }
}

fn query_warnings(query: &Query) -> Vec<String> {
    query
        .unknown_keys()
        .into_iter()
        .map(|key| format!("Unknown query param '{}'", key))
        .collect()
}

/// Streaming iterator over the variants of a query.
pub struct VariantIterator<'a> {
    cursor: DocumentCursor<'a>,
    converter: DocumentToVariantConverter,
}

impl Iterator for VariantIterator<'_> {
    type Item = StorageResult<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.cursor.next()?;
        Some(doc.and_then(|doc| self.converter.convert(&doc)))
    }
}

impl std::fmt::Debug for VariantIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantIterator").finish_non_exhaustive()
    }
}

/// Sorted chromosomes of a loaded batch.
///
/// Used to restrict gap filling to the chromosomes a file touched.
pub fn chromosomes_of(variants: &[Variant]) -> Vec<String> {
    let chromosomes: BTreeSet<&str> = variants.iter().map(|v| v.chromosome.as_str()).collect();
    chromosomes.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryDocumentStore, InMemoryStudyConfigurationManager};
    use crate::model::{FileEntry, StudyEntry};

    fn manager() -> InMemoryStudyConfigurationManager {
        InMemoryStudyConfigurationManager::new().with_study(
            StudyConfiguration::new(1, "s1")
                .with_file("a.vcf", 10, &["NA001", "NA002"])
                .with_cohort("ALL", 100, [1, 2]),
        )
    }

    fn variant(start: u32, gt: &str) -> Variant {
        Variant::new("1", start, "A", "C").with_study(
            StudyEntry::new(1)
                .with_file(FileEntry::new(10))
                .with_sample("NA001", gt)
                .with_sample("NA002", "0/0"),
        )
    }

    #[test]
    fn test_adaptor_new() {
        let store = InMemoryDocumentStore::new();
        let m = manager();
        let adaptor = VariantAdaptor::new(&store, &m);
        assert!(!adaptor.config().parallel);
        assert!(adaptor.config().cache.is_some());
    }

    #[test]
    fn test_insert_and_get() {
        let store = InMemoryDocumentStore::new();
        let m = manager();
        let adaptor = VariantAdaptor::new(&store, &m);
        let summary = adaptor.insert(&[variant(100, "0/1"), variant(200, "1/1")], "s1", 10).unwrap();
        assert_eq!(summary.inserted, 2);

        let result = adaptor
            .get(&Query::new().with(QueryParam::Genotype, "NA001:1/1"), &QueryOptions::new())
            .unwrap();
        assert_eq!(result.num_results, 1);
        assert_eq!(result.first().map(|v| v.start), Some(200));
    }

    #[test]
    fn test_unknown_study() {
        let store = InMemoryDocumentStore::new();
        let m = manager();
        let adaptor = VariantAdaptor::new(&store, &m);
        let err = adaptor.insert(&[variant(100, "0/1")], "nope", 10);
        assert!(matches!(err, Err(StorageError::Unresolved { kind: "study", .. })));
    }

    #[test]
    fn test_skips_variants_without_study_entry() {
        let store = InMemoryDocumentStore::new();
        let m = manager();
        let adaptor = VariantAdaptor::new(&store, &m);
        let summary = adaptor
            .insert(&[variant(100, "0/1"), Variant::new("1", 300, "G", "T")], "s1", 10)
            .unwrap();
        assert_eq!((summary.inserted, summary.skipped), (1, 1));
    }

    #[test]
    fn test_warnings_for_unknown_params() {
        let store = InMemoryDocumentStore::new();
        let m = manager();
        let adaptor = VariantAdaptor::new(&store, &m);
        let query: Query = [("colour", "blue")].into_iter().collect();
        let result = adaptor.count(&query).unwrap();
        assert_eq!(result.first(), Some(&0));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_chromosomes_of() {
        let variants = vec![
            Variant::new("2", 1, "A", "C"),
            Variant::new("1", 1, "A", "C"),
            Variant::new("2", 5, "A", "C"),
        ];
        assert_eq!(chromosomes_of(&variants), vec!["1", "2"]);
    }

    #[test]
    fn test_adaptor_debug() {
        let store = InMemoryDocumentStore::new();
        let m = manager();
        let adaptor = VariantAdaptor::new(&store, &m);
        assert!(format!("{:?}", adaptor).contains("VariantAdaptor"));
    }
}
