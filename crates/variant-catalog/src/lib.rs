//! # variant-catalog
//!
//! Catalog-aware front end for genomic variant queries.
//!
//! Users name studies, samples, files and cohorts however the catalog
//! knows them, and ask for high level things such as "variants segregating
//! dominantly in family F1". The [`VariantCatalogQueryResolver`] rewrites
//! such a [`Query`] into canonical, storage-addressable filters.
//!
//! ## Key Features
//!
//! - **Symbol resolution** - names, aliases and numeric ids become canonical
//!   ids, keeping operators, negations and comparators in place
//! - **Releases** - entities newer than the requested release are rejected,
//!   and the returned files and samples are restricted to the release
//! - **Sample annotations** - `sampleAnnotation=age>30` becomes a sample or
//!   genotype filter
//! - **Families** - a family expands into its indexed samples, or with a
//!   mode of inheritance into per-member genotype sets
//! - **Panels** - a disease panel expands into its genes
//!
//! ## Quick Start
//!
//! ```rust
//! use variant_catalog::{
//!     CatalogCohort, CatalogSample, CatalogStudy, Family, Individual, InMemoryCatalog, Phenotype,
//!     Sex, VariantCatalogQueryResolver,
//! };
//! use variant_query::{Query, QueryParam};
//!
//! let dad = CatalogSample::new("NA001", 1, 1);
//! let mum = CatalogSample::new("NA002", 2, 1);
//! let kid = CatalogSample::new("NA003", 3, 1);
//! let family = Family::new("F1")
//!     .with_phenotype(Phenotype::new("HP:0000118", "Phenotypic abnormality"))
//!     .with_member(Individual::new("dad", Sex::Male).with_sample(dad.clone()))
//!     .with_member(Individual::new("mum", Sex::Female).with_sample(mum.clone()))
//!     .with_member(
//!         Individual::new("kid", Sex::Male)
//!             .with_parents("dad", "mum")
//!             .with_phenotype("HP:0000118")
//!             .with_sample(kid.clone()),
//!     );
//!
//! let catalog = InMemoryCatalog::new()
//!     .with_project("p1", 1)
//!     .with_study("p1", CatalogStudy::new("s1", 1))
//!     .with_sample("s1", dad)
//!     .with_sample("s1", mum)
//!     .with_sample("s1", kid)
//!     .with_cohort("s1", CatalogCohort::new("ALL", 1, ["NA001", "NA002", "NA003"]))
//!     .with_family("s1", family);
//!
//! let resolver = VariantCatalogQueryResolver::new(&catalog);
//! let query = Query::new()
//!     .with(QueryParam::Family, "F1")
//!     .with(QueryParam::ModeOfInheritance, "biallelic");
//! let resolved = resolver.parse_query(query, "user").unwrap();
//!
//! assert_eq!(
//!     resolved.get(QueryParam::Genotype),
//!     Some("NA001:0/1,0|1,1|0;NA003:1/1,1|1;NA002:0/1,0|1,1|0")
//! );
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` - Serialization of catalog entities and `variant-query` types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      variant-catalog                         │
//! │                                                              │
//! │  VariantCatalogQueryResolver                                 │
//! │  ├── validator     names → canonical ids, release checks     │
//! │  ├── pedigree      family members, parents, affection        │
//! │  └── inheritance   mode of inheritance → genotype sets       │
//! │                                                              │
//! │  Collaborator:                                               │
//! │  └── CatalogService  studies, samples, files, cohorts,       │
//! │                      families, panels                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod config;
mod error;
mod inheritance;
mod memory;
pub mod pedigree;
mod resolver;
mod traits;
pub mod validator;

// Public re-exports
pub use config::{ResolverConfig, ResolverConfigBuilder};
pub use error::{CatalogQueryError, CatalogResult};
pub use inheritance::ModeOfInheritance;
pub use memory::InMemoryCatalog;
pub use pedigree::{Member, Pedigree};
pub use resolver::VariantCatalogQueryResolver;
pub use traits::{
    CatalogCohort, CatalogFile, CatalogSample, CatalogService, CatalogStudy, DiseasePanel, Family,
    IndexStatus, Individual, Phenotype, Sex,
};
pub use validator::{check_release, resolve_symbols, ClauseStyle, EntityResolver};

// Re-export the query model for convenience
pub use variant_query::{Query, QueryParam};
