//! Error types for catalog query resolution.

use thiserror::Error;
use variant_query::FilterError;

/// Errors raised while resolving a query against the catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogQueryError {
    /// A filter value could not be parsed.
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// A param has a value the resolver cannot use.
    #[error("Malformed param '{param}' = '{value}': {reason}")]
    Malformed {
        /// Query param key.
        param: String,
        /// Offending value.
        value: String,
        /// Description of the problem.
        reason: String,
    },

    /// An entity is newer than the requested release.
    #[error("Unable to have '{value}' within '{param}' filter. Not part of release {release}")]
    ReleaseViolation {
        /// Query param key.
        param: String,
        /// Canonical id of the entity.
        value: String,
        /// Requested release ceiling.
        release: u32,
    },

    /// A symbolic name did not resolve to a catalog entity.
    #[error("{kind} '{value}' not found{}", format_available(.available))]
    Unresolved {
        /// Kind of entity (study, sample, family, phenotype...).
        kind: &'static str,
        /// The name that was looked up.
        value: String,
        /// Valid alternatives, when known.
        available: Vec<String>,
    },

    /// A high level filter needs a single default study.
    #[error("Missing study for {kind} '{value}': the query must target exactly one study")]
    MissingStudy {
        /// Kind of filter (family, panel, sampleAnnotation).
        kind: &'static str,
        /// Value of the filter.
        value: String,
    },

    /// A param required by another one is absent.
    #[error("Missing param '{param}': {reason}")]
    MissingParam {
        /// Query param key.
        param: String,
        /// Description of the problem.
        reason: String,
    },

    /// Error reported by the catalog service.
    #[error("Catalog error: {0}")]
    Catalog(String),
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(". Available: [{}]", available.join(", "))
    }
}

impl CatalogQueryError {
    /// Shorthand for [`CatalogQueryError::Malformed`].
    pub fn malformed(param: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        CatalogQueryError::Malformed {
            param: param.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`CatalogQueryError::Unresolved`] without alternatives.
    pub fn unresolved(kind: &'static str, value: impl Into<String>) -> Self {
        CatalogQueryError::Unresolved {
            kind,
            value: value.into(),
            available: Vec::new(),
        }
    }
}

/// Result type for catalog resolution.
pub type CatalogResult<T> = std::result::Result<T, CatalogQueryError>;
