//! Error types for variant storage.

use thiserror::Error;
use variant_query::FilterError;

/// Errors that can occur while compiling queries or reading and writing variants.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filter grammar error from `variant-query`.
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// A query param value is not valid for its field.
    #[error("Malformed filter '{param}' = '{value}': {reason}")]
    Malformed {
        /// Query param.
        param: String,
        /// Offending value.
        value: String,
        /// Description of the problem.
        reason: String,
    },

    /// A study, file, sample or cohort could not be found.
    #[error("Unknown {kind} '{value}'")]
    Unresolved {
        /// Entity kind.
        kind: &'static str,
        /// Name or id that was looked up.
        value: String,
    },

    /// A bulk write operation failed for a reason other than a duplicate key.
    #[error("Bulk write failed at operation {index}: {message}")]
    BulkWrite {
        /// Index of the failing operation in the batch.
        index: usize,
        /// Store-native error detail.
        message: String,
    },

    /// A document does not have the expected shape.
    #[error("Invalid document: {0}")]
    Document(String),

    /// Error from the underlying document store.
    #[error("Store error: {0}")]
    Store(String),
}

impl StorageError {
    /// Shorthand for [`StorageError::Malformed`].
    pub fn malformed(
        param: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        StorageError::Malformed {
            param: param.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Why a single operation of a bulk write failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteErrorKind {
    /// An upsert tried to create a document whose `_id` already exists.
    DuplicateKey {
        /// The colliding document id.
        id: String,
    },
    /// Any other per-operation failure.
    Other {
        /// Store-native error detail.
        message: String,
    },
}

/// Failure of one operation inside a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Index of the operation in the submitted batch.
    pub index: usize,
    /// What went wrong.
    pub kind: WriteErrorKind,
}

impl WriteError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(index: usize, id: impl Into<String>) -> Self {
        Self {
            index,
            kind: WriteErrorKind::DuplicateKey { id: id.into() },
        }
    }

    /// Creates a generic error.
    pub fn other(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: WriteErrorKind::Other {
                message: message.into(),
            },
        }
    }

    /// Returns the colliding id if this is a duplicate key error.
    pub fn duplicate_id(&self) -> Option<&str> {
        match &self.kind {
            WriteErrorKind::DuplicateKey { id } => Some(id),
            WriteErrorKind::Other { .. } => None,
        }
    }

    /// Converts into a fatal [`StorageError`].
    pub fn into_storage_error(self) -> StorageError {
        let message = match self.kind {
            WriteErrorKind::DuplicateKey { id } => format!("duplicate key '{}'", id),
            WriteErrorKind::Other { message } => message,
        };
        StorageError::BulkWrite {
            index: self.index,
            message,
        }
    }
}
