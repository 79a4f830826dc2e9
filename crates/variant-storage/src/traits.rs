//! Traits for the external collaborators of the storage engine.
//!
//! Implement [`DocumentStore`] to plug in a document database, and
//! [`StudyConfigurationManager`] to provide study metadata.
//! [`InMemoryDocumentStore`](crate::InMemoryDocumentStore) and
//! [`InMemoryStudyConfigurationManager`](crate::InMemoryStudyConfigurationManager)
//! are complete reference implementations.

use serde_json::Value;
use variant_query::SortOrder;

use crate::document::{compare_values, resolve_path, values_equal, Document};
use crate::error::StorageResult;
use crate::model::StudyConfiguration;
use crate::pipeline::Stage;
use crate::predicate::Predicate;
use crate::projection::Projection;
use crate::update::{BulkWriteResult, WriteModel};

/// Streaming cursor over documents.
pub type DocumentCursor<'a> = Box<dyn Iterator<Item = StorageResult<Document>> + Send + 'a>;

/// Options of a `find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to return.
    pub projection: Projection,
    /// Sort keys.
    pub sort: Vec<(String, SortOrder)>,
    /// Documents to skip.
    pub skip: Option<usize>,
    /// Maximum documents to return.
    pub limit: Option<usize>,
    /// Documents fetched per round trip.
    pub batch_size: Option<usize>,
}

/// A collection of variant documents.
///
/// Implementations must be thread-safe (`Send + Sync`). Updates of a single
/// document are expected to be atomic; nothing else is.
pub trait DocumentStore: Send + Sync {
    /// Documents matching `filter`.
    fn find(&self, filter: &Predicate, options: &FindOptions) -> StorageResult<DocumentCursor<'_>>;

    /// Runs an aggregation pipeline.
    fn aggregate(&self, pipeline: &[Stage]) -> StorageResult<DocumentCursor<'_>>;

    /// Runs a batch of writes.
    ///
    /// Per-operation failures, including duplicate keys, are reported in the
    /// result. `Err` is reserved for failures of the whole batch. When
    /// `ordered` is false every operation is attempted.
    fn bulk_write(&self, operations: Vec<WriteModel>, ordered: bool) -> StorageResult<BulkWriteResult>;

    /// Number of documents matching `filter`.
    fn count(&self, filter: &Predicate) -> StorageResult<u64> {
        let mut n = 0;
        for doc in self.find(filter, &FindOptions::default())? {
            doc?;
            n += 1;
        }
        Ok(n)
    }

    /// Distinct values reached by `path` in documents matching `filter`.
    ///
    /// Array values contribute their elements. The result is sorted.
    fn distinct(&self, path: &str, filter: &Predicate) -> StorageResult<Vec<Value>> {
        let mut values: Vec<Value> = Vec::new();
        for doc in self.find(filter, &FindOptions::default())? {
            let doc = doc?;
            for reached in resolve_path(&doc, path) {
                let members: Vec<&Value> = match reached {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                for value in members {
                    if !value.is_null() && !values.iter().any(|v| values_equal(v, value)) {
                        values.push(value.clone());
                    }
                }
            }
        }
        values.sort_by(compare_values);
        Ok(values)
    }
}

/// Source of [`StudyConfiguration`]s.
pub trait StudyConfigurationManager: Send + Sync {
    /// Configuration of a study by numeric id.
    fn get_by_id(&self, study_id: i32) -> StorageResult<Option<StudyConfiguration>>;

    /// Configuration of a study by name.
    fn get_by_name(&self, study_name: &str) -> StorageResult<Option<StudyConfiguration>> {
        for id in self.study_ids()? {
            if let Some(sc) = self.get_by_id(id)? {
                if sc.study_name == study_name {
                    return Ok(Some(sc));
                }
            }
        }
        Ok(None)
    }

    /// Ids of every known study.
    fn study_ids(&self) -> StorageResult<Vec<i32>>;
}
