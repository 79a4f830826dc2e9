//! Error types for filter value parsing.

use thiserror::Error;

/// Errors that can occur while parsing filter values, regions and query params.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// A single value combines the AND (`;`) and OR (`,`) separators.
    #[error("can't merge in the same filter value AND (;) and OR (,) operators: '{0}'")]
    MixedOperators(String),

    /// A composite value contains an empty atom (e.g. `"A;;B"`).
    #[error("empty element in filter value '{0}'")]
    EmptyAtom(String),

    /// A compound atom did not split into the expected number of parts.
    #[error("malformed filter '{param}' = '{value}': {reason}")]
    Malformed {
        /// Query param (or atom kind) being parsed.
        param: String,
        /// Offending raw value.
        value: String,
        /// Description of the problem.
        reason: String,
    },

    /// A numeric operand could not be parsed.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// A region string could not be parsed.
    #[error("invalid region '{0}'")]
    InvalidRegion(String),

    /// An enumerated value was not recognized.
    #[error("unknown {kind} '{value}'")]
    UnknownValue {
        /// What was being parsed (e.g. "sort order").
        kind: &'static str,
        /// The unrecognized value.
        value: String,
    },
}

impl FilterError {
    /// Shorthand for [`FilterError::Malformed`].
    pub fn malformed(
        param: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FilterError::Malformed {
            param: param.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for filter parsing operations.
pub type FilterResult<T> = std::result::Result<T, FilterError>;
