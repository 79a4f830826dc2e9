//! Integration tests for how the adaptor drives a document store.
//!
//! The stores here wrap [`InMemoryDocumentStore`] to record or fail the bulk
//! writes the adaptor submits.

use std::sync::Mutex;

use variant_storage::{
    BulkWriteResult, Document, DocumentCursor, DocumentStore, FileEntry, FindOptions, InMemoryDocumentStore,
    InMemoryStudyConfigurationManager, Predicate, Query, QueryParam, Stage, StorageConfig, StorageError,
    StorageResult, StudyConfiguration, StudyEntry, Variant, VariantAdaptor, VariantAnnotation, VariantStats,
    VariantStatsUpdate, WriteError, WriteModel,
};

// ============================================================================
// Mock stores
// ============================================================================

/// Records every bulk write before passing it on.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryDocumentStore,
    writes: Mutex<Vec<(usize, bool)>>,
}

impl RecordingStore {
    fn writes(&self) -> Vec<(usize, bool)> {
        self.writes.lock().unwrap().clone()
    }
}

impl DocumentStore for RecordingStore {
    fn find(&self, filter: &Predicate, options: &FindOptions) -> StorageResult<DocumentCursor<'_>> {
        self.inner.find(filter, options)
    }

    fn aggregate(&self, pipeline: &[Stage]) -> StorageResult<DocumentCursor<'_>> {
        self.inner.aggregate(pipeline)
    }

    fn bulk_write(&self, operations: Vec<WriteModel>, ordered: bool) -> StorageResult<BulkWriteResult> {
        self.writes.lock().unwrap().push((operations.len(), ordered));
        self.inner.bulk_write(operations, ordered)
    }

    fn count(&self, filter: &Predicate) -> StorageResult<u64> {
        self.inner.count(filter)
    }
}

/// Rejects the first operation of every bulk write.
struct RejectingStore;

impl DocumentStore for RejectingStore {
    fn find(&self, _filter: &Predicate, _options: &FindOptions) -> StorageResult<DocumentCursor<'_>> {
        Ok(Box::new(std::iter::empty::<StorageResult<Document>>()))
    }

    fn aggregate(&self, _pipeline: &[Stage]) -> StorageResult<DocumentCursor<'_>> {
        Ok(Box::new(std::iter::empty::<StorageResult<Document>>()))
    }

    fn bulk_write(&self, _operations: Vec<WriteModel>, _ordered: bool) -> StorageResult<BulkWriteResult> {
        Ok(BulkWriteResult {
            write_errors: vec![WriteError::other(0, "disk full")],
            ..BulkWriteResult::default()
        })
    }
}

/// Fails outright, as an unreachable server would.
struct OfflineStore;

impl DocumentStore for OfflineStore {
    fn find(&self, _filter: &Predicate, _options: &FindOptions) -> StorageResult<DocumentCursor<'_>> {
        Err(StorageError::Store("connection refused".into()))
    }

    fn aggregate(&self, _pipeline: &[Stage]) -> StorageResult<DocumentCursor<'_>> {
        Err(StorageError::Store("connection refused".into()))
    }

    fn bulk_write(&self, _operations: Vec<WriteModel>, _ordered: bool) -> StorageResult<BulkWriteResult> {
        Err(StorageError::Store("connection refused".into()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn manager() -> InMemoryStudyConfigurationManager {
    InMemoryStudyConfigurationManager::new().with_study(
        StudyConfiguration::new(1, "s1")
            .with_file("a.vcf", 1, &["NA001"])
            .with_cohort("ALL", 10, [1]),
    )
}

fn config(batch_size: usize) -> StorageConfig {
    StorageConfig::builder()
        .without_cache()
        .with_batch_size(batch_size)
        .build()
}

fn variants(n: u32) -> Vec<Variant> {
    (1..=n)
        .map(|i| {
            Variant::new("1", i * 100, "A", "G").with_study(
                StudyEntry::new(1)
                    .with_file(FileEntry::new(1))
                    .with_sample("NA001", "0/1"),
            )
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_insert_is_split_into_batches() {
    let studies = manager();
    let store = RecordingStore::default();
    let adaptor = VariantAdaptor::with_config(&store, &studies, config(4));

    let summary = adaptor.insert(&variants(10), "s1", 1).unwrap();
    assert_eq!(summary.inserted, 10);
    assert_eq!(store.writes(), vec![(4, false), (4, false), (2, false)]);
}

#[test]
fn test_duplicates_trigger_a_second_phase() {
    let studies = manager();
    let store = RecordingStore::default();
    let adaptor = VariantAdaptor::with_config(&store, &studies, config(100));

    adaptor.insert(&variants(3), "s1", 1).unwrap();
    let summary = adaptor.insert(&variants(5), "s1", 1).unwrap();
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.duplicates, 3);
    // first load, then upserts and merges of the second
    assert_eq!(store.writes(), vec![(3, false), (5, false), (3, false)]);
}

#[test]
fn test_stats_and_study_deletion_are_ordered() {
    let studies = manager();
    let store = RecordingStore::default();
    let adaptor = VariantAdaptor::with_config(&store, &studies, config(100));

    let loaded = variants(2);
    adaptor.insert(&loaded, "s1", 1).unwrap();

    let stats: Vec<VariantStatsUpdate> = loaded
        .iter()
        .map(|v| VariantStatsUpdate::new(v).with_cohort("ALL", VariantStats::default()))
        .collect();
    adaptor.update_stats(&stats, "s1", true).unwrap();
    adaptor.delete_study("s1", true).unwrap();

    let writes = store.writes();
    // pull + push per variant
    assert_eq!(writes[1], (4, true));
    // pull from every variant, then drop the empty ones
    assert_eq!(writes[2], (2, true));
    assert!(store.inner.is_empty());
}

#[test]
fn test_nothing_to_write_skips_the_store() {
    let studies = manager();
    let store = RecordingStore::default();
    let adaptor = VariantAdaptor::with_config(&store, &studies, config(100));

    let summary = adaptor.update_annotations(&[]).unwrap();
    assert_eq!(summary.updated, 0);
    let summary = adaptor.insert(&[], "s1", 1).unwrap();
    assert_eq!(summary.inserted, 0);
    assert!(store.writes().is_empty());
}

#[test]
fn test_annotation_for_missing_variant_is_a_no_op() {
    let studies = manager();
    let store = RecordingStore::default();
    let adaptor = VariantAdaptor::with_config(&store, &studies, config(100));

    let ghost = VariantAnnotation::for_variant(&Variant::new("9", 1, "A", "C"));
    let summary = adaptor.update_annotations(&[ghost]).unwrap();
    assert_eq!(summary.updated, 0);
    assert!(store.inner.is_empty());
}

#[test]
fn test_rejected_write_is_reported() {
    let studies = manager();
    let adaptor = VariantAdaptor::with_config(&RejectingStore, &studies, config(100));

    let err = adaptor.insert(&variants(1), "s1", 1);
    match err {
        Err(StorageError::BulkWrite { index, message }) => {
            assert_eq!(index, 0);
            assert!(message.contains("disk full"));
        }
        other => panic!("expected a bulk write error, got {:?}", other),
    }

    let err = adaptor.delete(&Query::new().with(QueryParam::Chromosome, "1"));
    assert!(matches!(err, Err(StorageError::BulkWrite { .. })));
}

#[test]
fn test_store_failure_propagates() {
    let studies = manager();
    let adaptor = VariantAdaptor::with_config(&OfflineStore, &studies, config(100));

    let err = adaptor.count(&Query::new());
    assert!(matches!(err, Err(StorageError::Store(_))));
    let err = adaptor.insert(&variants(1), "s1", 1);
    assert!(matches!(err, Err(StorageError::Store(_))));
}
