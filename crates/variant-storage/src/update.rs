//! Update documents and bulk write models.

use std::fmt;

use serde_json::{json, Map, Value};

use crate::document::{path_entry, remove_path, set_path, values_equal, Document};
use crate::error::{StorageError, StorageResult, WriteError};
use crate::predicate::Predicate;

/// Positional path segment, replaced by the index of the array element the
/// filter matched.
pub const POSITIONAL: &str = "$";

/// A single update operator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets a field.
    Set(String, Value),
    /// Sets a field only when the update creates the document.
    SetOnInsert(String, Value),
    /// Appends values to an array, creating it when missing.
    Push(String, Vec<Value>),
    /// Appends values not already present.
    AddToSet(String, Vec<Value>),
    /// Removes array elements matching a predicate.
    Pull(String, Predicate),
    /// Removes a field.
    Unset(String),
}

impl UpdateOp {
    fn operator(&self) -> &'static str {
        match self {
            UpdateOp::Set(..) => "$set",
            UpdateOp::SetOnInsert(..) => "$setOnInsert",
            UpdateOp::Push(..) => "$push",
            UpdateOp::AddToSet(..) => "$addToSet",
            UpdateOp::Pull(..) => "$pull",
            UpdateOp::Unset(..) => "$unset",
        }
    }

    fn path(&self) -> &str {
        match self {
            UpdateOp::Set(p, _)
            | UpdateOp::SetOnInsert(p, _)
            | UpdateOp::Push(p, _)
            | UpdateOp::AddToSet(p, _)
            | UpdateOp::Pull(p, _)
            | UpdateOp::Unset(p) => p,
        }
    }
}

/// An ordered list of update operators applied to one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    /// Operators in application order.
    pub ops: Vec<UpdateOp>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `$set`.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(path.into(), value.into()));
        self
    }

    /// Adds a `$setOnInsert` for every top-level field of `doc`.
    pub fn set_on_insert_all(mut self, doc: Document) -> Self {
        for (k, v) in doc {
            self.ops.push(UpdateOp::SetOnInsert(k, v));
        }
        self
    }

    /// Adds a `$push` with `$each`.
    pub fn push(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.ops.push(UpdateOp::Push(path.into(), values));
        self
    }

    /// Adds an `$addToSet` with `$each`.
    pub fn add_to_set(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.ops.push(UpdateOp::AddToSet(path.into(), values));
        self
    }

    /// Adds a `$pull`.
    pub fn pull(mut self, path: impl Into<String>, predicate: Predicate) -> Self {
        self.ops.push(UpdateOp::Pull(path.into(), predicate));
        self
    }

    /// Adds an `$unset`.
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(path.into()));
        self
    }

    /// Returns true if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Array path addressed through a positional `$` segment, if any.
    ///
    /// For `studies.$.gt.0/1` this is `studies`.
    pub fn positional_array(&self) -> Option<String> {
        self.ops.iter().find_map(|op| {
            let segments: Vec<&str> = op.path().split('.').collect();
            segments
                .iter()
                .position(|s| *s == POSITIONAL)
                .filter(|idx| *idx > 0)
                .map(|idx| segments[..idx].join("."))
        })
    }

    /// Applies the update in place.
    ///
    /// `positional` is the index substituted for a `$` segment; `inserting`
    /// enables `$setOnInsert`. Returns true if the document changed.
    pub fn apply(&self, doc: &mut Document, positional: Option<usize>, inserting: bool) -> StorageResult<bool> {
        let before = doc.clone();
        for op in &self.ops {
            let path = resolve_positional(op.path(), positional)?;
            match op {
                UpdateOp::Set(_, value) => set_path(doc, &path, value.clone())?,
                UpdateOp::SetOnInsert(_, value) => {
                    if inserting {
                        set_path(doc, &path, value.clone())?;
                    }
                }
                UpdateOp::Push(_, values) => array_at(doc, &path)?.extend(values.iter().cloned()),
                UpdateOp::AddToSet(_, values) => {
                    let array = array_at(doc, &path)?;
                    for value in values {
                        if !array.iter().any(|v| values_equal(v, value)) {
                            array.push(value.clone());
                        }
                    }
                }
                UpdateOp::Pull(_, predicate) => {
                    if let Some(Value::Array(items)) = crate::document::get_path(doc, &path) {
                        let kept: Vec<Value> = items
                            .iter()
                            .filter(|item| !predicate.matches_value(item))
                            .cloned()
                            .collect();
                        set_path(doc, &path, Value::Array(kept))?;
                    }
                }
                UpdateOp::Unset(_) => {
                    remove_path(doc, &path);
                }
            }
        }
        Ok(*doc != before)
    }

    /// Store-native rendering, operators grouped as `{"$push": {...}, ...}`.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for op in &self.ops {
            let rendered = match op {
                UpdateOp::Set(_, v) | UpdateOp::SetOnInsert(_, v) => v.clone(),
                UpdateOp::Push(_, vs) | UpdateOp::AddToSet(_, vs) => json!({ "$each": vs }),
                UpdateOp::Pull(_, p) => p.to_json(),
                UpdateOp::Unset(_) => json!(""),
            };
            if let Value::Object(group) = out
                .entry(op.operator())
                .or_insert_with(|| Value::Object(Map::new()))
            {
                group.insert(op.path().to_string(), rendered);
            }
        }
        Value::Object(out)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

fn resolve_positional(path: &str, positional: Option<usize>) -> StorageResult<String> {
    if !path.split('.').any(|s| s == POSITIONAL) {
        return Ok(path.to_string());
    }
    let idx = positional.ok_or_else(|| {
        StorageError::Document(format!(
            "the positional operator did not find the match needed from the query in '{}'",
            path
        ))
    })?;
    Ok(path
        .split('.')
        .map(|s| if s == POSITIONAL { idx.to_string() } else { s.to_string() })
        .collect::<Vec<_>>()
        .join("."))
}

fn array_at<'a>(doc: &'a mut Document, path: &str) -> StorageResult<&'a mut Vec<Value>> {
    match path_entry(doc, path, Value::Array(Vec::new()))? {
        Value::Array(items) => Ok(items),
        _ => Err(StorageError::Document(format!(
            "field '{}' is not an array",
            path
        ))),
    }
}

// ============================================================================
// Bulk writes
// ============================================================================

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Update the first matching document, optionally inserting one.
    UpdateOne {
        /// Selects the document.
        filter: Predicate,
        /// Changes to apply.
        update: Update,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Update every matching document.
    UpdateMany {
        /// Selects the documents.
        filter: Predicate,
        /// Changes to apply.
        update: Update,
    },
    /// Delete every matching document.
    DeleteMany {
        /// Selects the documents.
        filter: Predicate,
    },
}

impl fmt::Display for WriteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteModel::UpdateOne { filter, update, upsert } => {
                write!(f, "updateOne({}, {}, upsert={})", filter, update, upsert)
            }
            WriteModel::UpdateMany { filter, update } => {
                write!(f, "updateMany({}, {})", filter, update)
            }
            WriteModel::DeleteMany { filter } => write!(f, "deleteMany({})", filter),
        }
    }
}

/// Outcome of a bulk write.
///
/// Per-operation failures are reported in `write_errors`; the remaining
/// operations of an unordered batch still run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    /// Documents matched by update filters.
    pub matched: usize,
    /// Documents actually changed.
    pub modified: usize,
    /// Ids of documents created by upserts.
    pub upserted: Vec<String>,
    /// Documents deleted.
    pub deleted: usize,
    /// Failed operations.
    pub write_errors: Vec<WriteError>,
}

impl BulkWriteResult {
    /// Returns true if no operation failed.
    pub fn is_ok(&self) -> bool {
        self.write_errors.is_empty()
    }

    /// Ids that collided with an existing document during upsert.
    pub fn duplicate_ids(&self) -> impl Iterator<Item = &str> {
        self.write_errors.iter().filter_map(WriteError::duplicate_id)
    }

    /// First failure that is not a duplicate key.
    pub fn first_fatal_error(&self) -> Option<&WriteError> {
        self.write_errors.iter().find(|e| e.duplicate_id().is_none())
    }
}
