//! In-memory implementations of the storage traits.
//!
//! [`InMemoryDocumentStore`] evaluates predicates, projections, positional
//! updates, upserts and aggregation pipelines over a `BTreeMap` keyed by
//! document id. Cursors are snapshots taken under a read lock, so callers
//! may write while iterating.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::document::Document;
use crate::error::{StorageError, StorageResult, WriteError};
use crate::model::StudyConfiguration;
use crate::pipeline::{self, Stage};
use crate::predicate::Predicate;
use crate::schema;
use crate::traits::{DocumentCursor, DocumentStore, FindOptions, StudyConfigurationManager};
use crate::update::{BulkWriteResult, Update, WriteModel};

// ============================================================================
// Document store
// ============================================================================

/// Thread-safe in-memory document collection.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collection: RwLock<BTreeMap<String, Document>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts documents, failing on a missing or duplicate `_id`.
    pub fn insert_many(&self, docs: impl IntoIterator<Item = Document>) -> StorageResult<usize> {
        let mut collection = self.collection.write();
        let mut inserted = 0;
        for doc in docs {
            let id = doc
                .get(schema::ID)
                .and_then(Value::as_str)
                .ok_or_else(|| StorageError::Document("document without string _id".to_string()))?
                .to_string();
            if collection.contains_key(&id) {
                return Err(StorageError::Store(format!("duplicate key '{}'", id)));
            }
            collection.insert(id, doc);
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Document by id.
    pub fn get(&self, id: &str) -> Option<Document> {
        self.collection.read().get(id).cloned()
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.collection.read().len()
    }

    /// Returns true if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.collection.read().is_empty()
    }

    /// Removes every document.
    pub fn clear(&self) {
        self.collection.write().clear();
    }

    fn snapshot(&self, filter: Option<&Predicate>) -> Vec<Document> {
        self.collection
            .read()
            .values()
            .filter(|d| filter.map_or(true, |f| f.matches(d)))
            .cloned()
            .collect()
    }
}

fn apply_update(
    doc: &mut Document,
    filter: &Predicate,
    update: &Update,
    index: usize,
) -> Result<bool, WriteError> {
    let positional = update
        .positional_array()
        .and_then(|array| filter.positional_index(doc, &array));
    let mut updated = doc.clone();
    let changed = update
        .apply(&mut updated, positional, false)
        .map_err(|e| WriteError::other(index, e.to_string()))?;
    if changed {
        *doc = updated;
    }
    Ok(changed)
}

fn update_one(
    collection: &mut BTreeMap<String, Document>,
    index: usize,
    filter: &Predicate,
    update: &Update,
    upsert: bool,
    result: &mut BulkWriteResult,
) -> Result<(), WriteError> {
    let key = collection
        .iter()
        .find(|(_, d)| filter.matches(d))
        .map(|(k, _)| k.clone());
    if let Some(doc) = key.and_then(|k| collection.get_mut(&k)) {
        result.matched += 1;
        if apply_update(doc, filter, update, index)? {
            result.modified += 1;
        }
        return Ok(());
    }
    if !upsert {
        return Ok(());
    }

    let id = filter
        .equality_value(schema::ID)
        .and_then(Value::as_str)
        .ok_or_else(|| WriteError::other(index, "upsert requires an _id equality in the filter"))?
        .to_string();
    if collection.contains_key(&id) {
        // The document exists but the rest of the filter did not match
        return Err(WriteError::duplicate_key(index, id));
    }
    let mut doc = Map::new();
    doc.insert(schema::ID.to_string(), json!(id));
    update
        .apply(&mut doc, None, true)
        .map_err(|e| WriteError::other(index, e.to_string()))?;
    collection.insert(id.clone(), doc);
    result.upserted.push(id);
    Ok(())
}

fn update_many(
    collection: &mut BTreeMap<String, Document>,
    index: usize,
    filter: &Predicate,
    update: &Update,
    result: &mut BulkWriteResult,
) -> Result<(), WriteError> {
    for doc in collection.values_mut().filter(|d| filter.matches(d)) {
        result.matched += 1;
        if apply_update(doc, filter, update, index)? {
            result.modified += 1;
        }
    }
    Ok(())
}

impl DocumentStore for InMemoryDocumentStore {
    fn find(&self, filter: &Predicate, options: &FindOptions) -> StorageResult<DocumentCursor<'_>> {
        debug!(filter = %filter, "find");
        let mut stages = Vec::new();
        if !options.sort.is_empty() {
            stages.push(Stage::Sort(options.sort.clone()));
        }
        if let Some(skip) = options.skip {
            stages.push(Stage::Skip(skip));
        }
        if let Some(limit) = options.limit {
            stages.push(Stage::Limit(limit));
        }
        let docs = pipeline::run(self.snapshot(Some(filter)), &stages)?;
        let projection = options.projection.clone();
        Ok(Box::new(
            docs.into_iter().map(move |doc| Ok(projection.apply(&doc))),
        ))
    }

    fn aggregate(&self, stages: &[Stage]) -> StorageResult<DocumentCursor<'_>> {
        let docs = pipeline::run(self.snapshot(None), stages)?;
        Ok(Box::new(docs.into_iter().map(Ok)))
    }

    fn bulk_write(&self, operations: Vec<WriteModel>, ordered: bool) -> StorageResult<BulkWriteResult> {
        let mut collection = self.collection.write();
        let mut result = BulkWriteResult::default();
        for (index, operation) in operations.iter().enumerate() {
            let outcome = match operation {
                WriteModel::UpdateOne {
                    filter,
                    update,
                    upsert,
                } => update_one(&mut collection, index, filter, update, *upsert, &mut result),
                WriteModel::UpdateMany { filter, update } => {
                    update_many(&mut collection, index, filter, update, &mut result)
                }
                WriteModel::DeleteMany { filter } => {
                    let before = collection.len();
                    collection.retain(|_, d| !filter.matches(d));
                    result.deleted += before - collection.len();
                    Ok(())
                }
            };
            if let Err(error) = outcome {
                result.write_errors.push(error);
                if ordered {
                    break;
                }
            }
        }
        debug!(
            operations = operations.len(),
            matched = result.matched,
            modified = result.modified,
            upserted = result.upserted.len(),
            deleted = result.deleted,
            errors = result.write_errors.len(),
            "bulk write"
        );
        Ok(result)
    }

    fn count(&self, filter: &Predicate) -> StorageResult<u64> {
        Ok(self
            .collection
            .read()
            .values()
            .filter(|d| filter.matches(d))
            .count() as u64)
    }
}

// ============================================================================
// Study configuration manager
// ============================================================================

/// Study configurations held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStudyConfigurationManager {
    studies: RwLock<BTreeMap<i32, StudyConfiguration>>,
}

impl InMemoryStudyConfigurationManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a study, consuming and returning the manager.
    pub fn with_study(self, config: StudyConfiguration) -> Self {
        self.put(config);
        self
    }

    /// Adds or replaces a study.
    pub fn put(&self, config: StudyConfiguration) {
        self.studies.write().insert(config.study_id, config);
    }

    /// Removes a study.
    pub fn remove(&self, study_id: i32) -> Option<StudyConfiguration> {
        self.studies.write().remove(&study_id)
    }
}

impl StudyConfigurationManager for InMemoryStudyConfigurationManager {
    fn get_by_id(&self, study_id: i32) -> StorageResult<Option<StudyConfiguration>> {
        Ok(self.studies.read().get(&study_id).cloned())
    }

    fn get_by_name(&self, study_name: &str) -> StorageResult<Option<StudyConfiguration>> {
        Ok(self
            .studies
            .read()
            .values()
            .find(|sc| sc.study_name == study_name)
            .cloned())
    }

    fn study_ids(&self) -> StorageResult<Vec<i32>> {
        Ok(self.studies.read().keys().copied().collect())
    }
}
