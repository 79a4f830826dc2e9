//! # variant-query
//!
//! Query model and filter value grammar for the variant storage engine.
//!
//! This crate provides:
//! - **Filter grammar**: split composite values into typed atoms
//! - **Region index**: genomic regions and their chunk ids
//! - **Query model**: ordered param map, typed param keys and options
//!
//! ## Usage
//!
//! ```rust
//! use variant_query::{FilterValue, Query, QueryOperation, QueryParam, Region};
//!
//! let query = Query::new()
//!     .with(QueryParam::Region, "1:1000-50000")
//!     .with(QueryParam::Gene, "BRCA1,BRCA2");
//!
//! let genes = FilterValue::parse(query.get(QueryParam::Gene).unwrap()).unwrap();
//! assert_eq!(genes.operation, Some(QueryOperation::Or));
//!
//! let region = Region::parse(query.get(QueryParam::Region).unwrap()).unwrap();
//! assert_eq!(region.chunk_ids().len(), 6);
//! ```
//!
//! ## Value Syntax Quick Reference
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `A,B` | Any of | `gene=BRCA1,BRCA2` |
//! | `A;B` | All of | `annot-ct=SO:0001583;SO:0001587` |
//! | `<op>v` | Comparison | `maf=ALL<0.01` |
//! | `src<op>v` | Keyed comparison | `sift<0.2` |
//! | `study:pop<op>v` | Population frequency | `1000G:EUR<0.01` |
//! | `sample:gt,gt` | Genotype clause | `NA001:0/1,1/1` |
//! | `!v` | Negation | `study=!s2` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod error;
mod genotype;
mod grammar;
mod query;
pub mod region;

pub use error::{FilterError, FilterResult};
pub use genotype::{
    is_hom_ref, GenotypeClause, GenotypeFilter, HET, HOM_ALT, HOM_REF, HOM_REF_PHASED,
    UNKNOWN_GENOTYPE,
};
pub use grammar::{
    check_operator, is_negated, is_none_or_all, join_values, parse_keyed_comparison,
    parse_number, remove_negation, split_key_value, split_value, strip_comparator, Comparator,
    FilterValue, KeyedComparison, QueryOperation, ALL, AND, IS, NONE, NOT, OR,
};
pub use query::{Query, QueryOptions, QueryParam, SortOrder};
pub use region::Region;
