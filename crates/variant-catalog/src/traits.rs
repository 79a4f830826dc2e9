//! Catalog entities and the [`CatalogService`] trait.
//!
//! The resolver never talks to a catalog database directly. Anything that
//! can answer the lookups below (a REST client, a database adaptor, the
//! [`InMemoryCatalog`](crate::InMemoryCatalog)) can back it.
//!
//! # Example: a catalog backed by another service
//!
//! ```ignore
//! use variant_catalog::{CatalogResult, CatalogSample, CatalogService, CatalogStudy};
//!
//! impl CatalogService for RestCatalog {
//!     fn visible_studies(&self, caller: &str, project: Option<&str>) -> CatalogResult<Vec<CatalogStudy>> {
//!         self.client.studies(caller, project)
//!     }
//!
//!     fn lookup_samples(
//!         &self,
//!         caller: &str,
//!         study: Option<&str>,
//!         names: &[String],
//!     ) -> CatalogResult<Vec<CatalogSample>> {
//!         names.iter().map(|n| self.client.sample(caller, study, n)).collect()
//!     }
//!
//!     // ...
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{CatalogQueryError, CatalogResult};

// =============================================================================
// Entities
// =============================================================================

/// A study visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogStudy {
    /// Canonical id, as known to storage.
    pub id: String,
    /// Alternative name accepted in queries.
    pub alias: Option<String>,
    /// Release the study first appeared in.
    pub release: u32,
}

impl CatalogStudy {
    /// Creates a study.
    pub fn new(id: impl Into<String>, release: u32) -> Self {
        Self {
            id: id.into(),
            alias: None,
            release,
        }
    }

    /// Sets the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// A sample.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogSample {
    /// Canonical id, as known to storage.
    pub id: String,
    /// Numeric catalog id, also accepted in queries.
    pub uid: i64,
    /// Release the sample first appeared in.
    pub release: u32,
}

impl CatalogSample {
    /// Creates a sample.
    pub fn new(id: impl Into<String>, uid: i64, release: u32) -> Self {
        Self {
            id: id.into(),
            uid,
            release,
        }
    }
}

/// Index state of a file in variant storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IndexStatus {
    /// Never loaded.
    #[default]
    None,
    /// Being loaded.
    Indexing,
    /// Loaded and queryable.
    Ready,
}

/// A variant file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogFile {
    /// File name, as known to storage.
    pub id: String,
    /// Numeric catalog id, also accepted in queries.
    pub uid: i64,
    /// Release the file was indexed in.
    pub release: u32,
    /// Index state.
    pub index_status: IndexStatus,
}

impl CatalogFile {
    /// Creates an indexed file.
    pub fn new(id: impl Into<String>, uid: i64, release: u32) -> Self {
        Self {
            id: id.into(),
            uid,
            release,
            index_status: IndexStatus::Ready,
        }
    }

    /// Sets the index state.
    pub fn with_index_status(mut self, status: IndexStatus) -> Self {
        self.index_status = status;
        self
    }
}

/// A cohort and its member samples.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CatalogCohort {
    /// Canonical id, as known to storage.
    pub id: String,
    /// Release the cohort first appeared in.
    pub release: u32,
    /// Member sample ids.
    pub samples: Vec<String>,
}

impl CatalogCohort {
    /// Creates a cohort.
    pub fn new<S: Into<String>>(id: impl Into<String>, release: u32, samples: impl IntoIterator<Item = S>) -> Self {
        Self {
            id: id.into(),
            release,
            samples: samples.into_iter().map(Into::into).collect(),
        }
    }
}

/// Chromosomal sex of an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sex {
    /// XY.
    Male,
    /// XX.
    Female,
    /// Not recorded.
    #[default]
    Unknown,
}

/// A phenotype (HPO term or free text).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Phenotype {
    /// Phenotype id, e.g. `HP:0000118`.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Phenotype {
    /// Creates a phenotype.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A member of a family.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Individual {
    /// Individual id.
    pub id: String,
    /// Father's individual id.
    pub father: Option<String>,
    /// Mother's individual id.
    pub mother: Option<String>,
    /// Sex.
    pub sex: Sex,
    /// Ids of the phenotypes the individual presents.
    pub phenotypes: Vec<String>,
    /// Samples taken from the individual.
    pub samples: Vec<CatalogSample>,
}

impl Individual {
    /// Creates an individual.
    pub fn new(id: impl Into<String>, sex: Sex) -> Self {
        Self {
            id: id.into(),
            sex,
            ..Self::default()
        }
    }

    /// Sets both parents.
    pub fn with_parents(mut self, father: impl Into<String>, mother: impl Into<String>) -> Self {
        self.father = Some(father.into());
        self.mother = Some(mother.into());
        self
    }

    /// Adds a phenotype.
    pub fn with_phenotype(mut self, phenotype: impl Into<String>) -> Self {
        self.phenotypes.push(phenotype.into());
        self
    }

    /// Adds a sample.
    pub fn with_sample(mut self, sample: CatalogSample) -> Self {
        self.samples.push(sample);
        self
    }
}

/// A family: members plus the phenotypes studied in it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Family {
    /// Family id.
    pub id: String,
    /// Members.
    pub members: Vec<Individual>,
    /// Phenotypes of interest.
    pub phenotypes: Vec<Phenotype>,
}

impl Family {
    /// Creates an empty family.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
            phenotypes: Vec::new(),
        }
    }

    /// Adds a member.
    pub fn with_member(mut self, member: Individual) -> Self {
        self.members.push(member);
        self
    }

    /// Adds a phenotype of interest.
    pub fn with_phenotype(mut self, phenotype: Phenotype) -> Self {
        self.phenotypes.push(phenotype);
        self
    }

    /// Ids of the phenotypes of interest.
    pub fn phenotype_ids(&self) -> Vec<String> {
        self.phenotypes.iter().map(|p| p.id.clone()).collect()
    }
}

/// A gene panel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiseasePanel {
    /// Panel id.
    pub id: String,
    /// Gene names.
    pub genes: Vec<String>,
}

impl DiseasePanel {
    /// Creates a panel.
    pub fn new<S: Into<String>>(id: impl Into<String>, genes: impl IntoIterator<Item = S>) -> Self {
        Self {
            id: id.into(),
            genes: genes.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexStatus::None => "NONE",
            IndexStatus::Indexing => "INDEXING",
            IndexStatus::Ready => "READY",
        })
    }
}

impl FromStr for Sex {
    type Err = CatalogQueryError;

    fn from_str(s: &str) -> CatalogResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MALE" | "M" => Ok(Sex::Male),
            "FEMALE" | "F" => Ok(Sex::Female),
            "UNKNOWN" | "UNDETERMINED" | "" => Ok(Sex::Unknown),
            _ => Err(CatalogQueryError::malformed("sex", s, "expected MALE, FEMALE or UNKNOWN")),
        }
    }
}

// =============================================================================
// Catalog service
// =============================================================================

/// Lookups the resolver needs from the catalog.
///
/// Every `lookup_*` method returns one entity per requested name, in the
/// same order, and fails with [`CatalogQueryError::Unresolved`] when a name
/// is unknown to the caller. Names may be canonical ids, aliases or numeric
/// uids; mapping them is up to the implementation.
///
/// # Required Methods
///
/// - [`visible_studies`](Self::visible_studies) - studies of a project the caller can read
/// - [`current_release`](Self::current_release) - current release of a project
/// - [`lookup_studies`](Self::lookup_studies), [`lookup_samples`](Self::lookup_samples),
///   [`lookup_files`](Self::lookup_files), [`lookup_cohorts`](Self::lookup_cohorts)
/// - [`samples`](Self::samples), [`files`](Self::files) - every entity of a study
///
/// # Optional Methods (with defaults)
///
/// Families, panels and sample annotation searches default to "not found".
pub trait CatalogService: Send + Sync {
    /// Studies of `project` (or of the caller's only project) the caller can read.
    fn visible_studies(&self, caller: &str, project: Option<&str>) -> CatalogResult<Vec<CatalogStudy>>;

    /// Current release of `project` (or of the caller's only project).
    fn current_release(&self, caller: &str, project: Option<&str>) -> CatalogResult<u32>;

    /// Resolves study names.
    fn lookup_studies(&self, caller: &str, names: &[String]) -> CatalogResult<Vec<CatalogStudy>>;

    /// Resolves sample names, within `study` when given.
    fn lookup_samples(&self, caller: &str, study: Option<&str>, names: &[String]) -> CatalogResult<Vec<CatalogSample>>;

    /// Resolves file names, within `study` when given.
    fn lookup_files(&self, caller: &str, study: Option<&str>, names: &[String]) -> CatalogResult<Vec<CatalogFile>>;

    /// Resolves cohort names, within `study` when given.
    fn lookup_cohorts(&self, caller: &str, study: Option<&str>, names: &[String]) -> CatalogResult<Vec<CatalogCohort>>;

    /// Every sample of a study.
    fn samples(&self, caller: &str, study: &str) -> CatalogResult<Vec<CatalogSample>>;

    /// Every file of a study.
    fn files(&self, caller: &str, study: &str) -> CatalogResult<Vec<CatalogFile>>;

    /// Samples of a study matching a sample annotation expression such as
    /// `age>20;phenotype=HP:0000118`.
    fn search_samples(&self, caller: &str, study: &str, expression: &str) -> CatalogResult<Vec<CatalogSample>> {
        let _ = (caller, study, expression);
        Ok(Vec::new())
    }

    /// A family with its members and phenotypes.
    fn family(&self, caller: &str, study: &str, family: &str) -> CatalogResult<Family> {
        let _ = (caller, study);
        Err(CatalogQueryError::unresolved("family", family))
    }

    /// A disease panel.
    fn panel(&self, caller: &str, study: &str, panel: &str) -> CatalogResult<DiseasePanel> {
        let _ = (caller, study);
        Err(CatalogQueryError::unresolved("panel", panel))
    }
}
