//! # variant-storage
//!
//! Document-store backed storage and query engine for genomic variants.
//!
//! This crate turns a [`Query`] from `variant-query` into predicates,
//! projections and aggregation pipelines over variant documents, and loads
//! and maintains those documents through bulk writes. Any database that
//! implements [`DocumentStore`] can back it; [`InMemoryDocumentStore`] is a
//! complete reference implementation.
//!
//! ## Key Features
//!
//! - **Rich filters** - regions, ids, genes, annotation scores, population
//!   frequencies, cohort stats, genotypes, samples and file attributes
//! - **Idempotent loading** - two phase upserts merge files into existing
//!   study entries and record unknown genotypes for earlier samples
//! - **Aggregations** - group by gene or consequence type, rank, and region
//!   density histograms
//! - **Study metadata cache** - LRU with TTL in front of the study
//!   configuration source
//! - **Optional parallelism** - enable the `parallel` feature to convert
//!   insert batches on the rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use variant_query::{Query, QueryOptions, QueryParam};
//! use variant_storage::{
//!     FileEntry, InMemoryDocumentStore, InMemoryStudyConfigurationManager, StudyConfiguration,
//!     StudyEntry, Variant, VariantAdaptor,
//! };
//!
//! let studies = InMemoryStudyConfigurationManager::new().with_study(
//!     StudyConfiguration::new(1, "study1").with_file("sample.vcf", 1, &["NA001"]),
//! );
//! let store = InMemoryDocumentStore::new();
//! let adaptor = VariantAdaptor::new(&store, &studies);
//!
//! let variant = Variant::new("1", 25000, "A", "T").with_study(
//!     StudyEntry::new(1)
//!         .with_file(FileEntry::new(1))
//!         .with_sample("NA001", "0/1"),
//! );
//! adaptor.insert(&[variant], "study1", 1).unwrap();
//!
//! let query = Query::new()
//!     .with(QueryParam::Region, "1:20000-30000")
//!     .with(QueryParam::Genotype, "NA001:0/1");
//! let result = adaptor.get(&query, &QueryOptions::new()).unwrap();
//! assert_eq!(result.num_results, 1);
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` - Converts insert batches in parallel using rayon
//! - `serde` - Serialization of the `variant-query` types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      variant-storage                         │
//! │                                                              │
//! │  VariantAdaptor                                              │
//! │  ├── QueryCompiler      Query → Predicate + Projection       │
//! │  ├── AggregationPlanner groupBy / rank / frequency → Stages  │
//! │  ├── mutation           loads and maintenance → WriteModels  │
//! │  └── converter          Variant ⇄ Document                   │
//! │                                                              │
//! │  Collaborators:                                              │
//! │  ├── DocumentStore              find / aggregate / bulkWrite │
//! │  └── StudyConfigurationManager  study metadata (cached)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod adaptor;
mod cache;
mod compiler;
mod config;
pub mod converter;
pub mod document;
mod error;
mod memory;
mod model;
pub mod mutation;
mod pipeline;
mod planner;
mod predicate;
mod projection;
mod result;
pub mod schema;
mod traits;
mod update;

// Public re-exports
pub use adaptor::{chromosomes_of, VariantAdaptor, VariantIterator};
pub use cache::{CacheStats, StudyConfigurationCache};
pub use compiler::{non_reference_genotypes, QueryCompiler, STORED_GENOTYPES};
pub use config::{CacheConfig, StorageConfig, StorageConfigBuilder};
pub use converter::{build_storage_id, variant_storage_id, DocumentToVariantConverter};
pub use document::Document;
pub use error::{StorageError, StorageResult, WriteError, WriteErrorKind};
pub use memory::{InMemoryDocumentStore, InMemoryStudyConfigurationManager};
pub use model::{
    CohortStats, ConsequenceType, FileEntry, PopulationFrequency, Score, StudyConfiguration,
    StudyEntry, Variant, VariantAnnotation, VariantStats, VariantStatsUpdate, VariantType, Xref,
    DEFAULT_GENOTYPE_ATTRIBUTE,
};
pub use pipeline::{Accumulator, Expr, Stage};
pub use planner::{frequency_buckets, group_counts, AggregationPlan, AggregationPlanner, GroupByField};
pub use predicate::{Condition, Predicate};
pub use projection::{build_projection, Projection, ProjectionField};
pub use result::{FrequencyBucket, GroupCount, QueryResult, WriteSummary};
pub use schema::VariantField;
pub use traits::{DocumentCursor, DocumentStore, FindOptions, StudyConfigurationManager};
pub use update::{BulkWriteResult, Update, UpdateOp, WriteModel, POSITIONAL};

// Re-export the query model for convenience
pub use variant_query::{Query, QueryOptions, QueryParam, Region, SortOrder};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let _: Option<CacheConfig> = None;
        let _: Option<StorageConfig> = None;
        let _: Option<QueryResult<Variant>> = None;
        let _: Option<WriteSummary> = None;
        let _: Option<StorageResult<()>> = None;
    }

    #[test]
    fn test_re_exports() {
        let query = Query::new().with(QueryParam::Gene, "BRCA2");
        assert_eq!(query.get(QueryParam::Gene), Some("BRCA2"));
        assert_eq!(build_storage_id("X", 1, "A", "G"), "X_0000000001_A_G");
    }
}
