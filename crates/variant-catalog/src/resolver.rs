//! Catalog-aware query resolver.
//!
//! [`VariantCatalogQueryResolver::parse_query`] turns a user query into one
//! the storage layer can execute:
//!
//! 1. pick the default study (the only one queried or visible)
//! 2. validate the `release` ceiling
//! 3. rewrite study, sample, file and cohort names to canonical ids
//! 4. under a release ceiling, restrict returned files and samples
//! 5. expand `sampleAnnotation`
//! 6. expand `family`, with or without `modeOfInheritance`
//! 7. expand `panel` into genes
//!
//! High level params are removed once expanded.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use variant_query::{
    check_operator, is_negated, remove_negation, split_value, GenotypeClause, GenotypeFilter, Query,
    QueryOperation, QueryParam, NONE,
};

use crate::config::ResolverConfig;
use crate::error::{CatalogQueryError, CatalogResult};
use crate::inheritance::ModeOfInheritance;
use crate::pedigree::Pedigree;
use crate::traits::{CatalogCohort, CatalogFile, CatalogSample, CatalogService, CatalogStudy, Family, IndexStatus};
use crate::validator::{resolve_symbols, ClauseStyle, EntityResolver};

/// Params consumed by the resolver and never passed on to storage.
const EXPANDED_PARAMS: &[QueryParam] = &[
    QueryParam::SampleAnnotation,
    QueryParam::SampleAnnotationGenotype,
    QueryParam::Family,
    QueryParam::FamilyPhenotype,
    QueryParam::ModeOfInheritance,
    QueryParam::Panel,
    QueryParam::Release,
    QueryParam::Project,
];

/// Resolves user queries against a [`CatalogService`].
///
/// # Example
///
/// ```rust
/// use variant_catalog::{CatalogSample, CatalogStudy, InMemoryCatalog, VariantCatalogQueryResolver};
/// use variant_query::{Query, QueryParam};
///
/// let catalog = InMemoryCatalog::new()
///     .with_project("p1", 1)
///     .with_study("p1", CatalogStudy::new("s1", 1))
///     .with_sample("s1", CatalogSample::new("NA001", 101, 1));
/// let resolver = VariantCatalogQueryResolver::new(&catalog);
///
/// let query = Query::new().with(QueryParam::Sample, "101");
/// let resolved = resolver.parse_query(query, "user").unwrap();
/// assert_eq!(resolved.get(QueryParam::Sample), Some("NA001"));
/// assert_eq!(resolved.get(QueryParam::Study), Some("s1"));
/// ```
pub struct VariantCatalogQueryResolver<'a> {
    catalog: &'a dyn CatalogService,
    config: ResolverConfig,
}

impl<'a> VariantCatalogQueryResolver<'a> {
    /// Creates a resolver with default configuration.
    pub fn new(catalog: &'a dyn CatalogService) -> Self {
        Self::with_config(catalog, ResolverConfig::default())
    }

    /// Creates a resolver with custom configuration.
    pub fn with_config(catalog: &'a dyn CatalogService, config: ResolverConfig) -> Self {
        Self { catalog, config }
    }

    /// Returns the resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves a query for `caller`.
    ///
    /// The query is consumed; the returned one only carries canonical ids
    /// and params the storage layer understands.
    ///
    /// # Errors
    ///
    /// Unknown or invisible entities, entities outside the requested
    /// release, malformed values, and high level filters that cannot be
    /// expanded (see [`CatalogQueryError`]).
    pub fn parse_query(&self, mut query: Query, caller: &str) -> CatalogResult<Query> {
        let studies = self.query_studies(&query, caller)?;
        let default_study = match studies.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        let release = self.release_filter(&query, caller)?;
        debug!(caller, default_study = ?default_study, release = ?release, "Resolving query");

        self.resolve_entities(&mut query, caller, default_study.as_deref(), release)?;
        if let Some(release) = release {
            self.restrict_to_release(&mut query, caller, &studies, release)?;
        }
        self.expand_sample_annotation(&mut query, caller, default_study.as_deref(), release)?;
        self.expand_family(&mut query, caller, default_study.as_deref(), release)?;
        self.expand_panel(&mut query, caller, default_study.as_deref())?;

        if let Some(study) = &default_study {
            if !query.is_valid(QueryParam::Study) {
                query.put(QueryParam::Study, study.clone());
            }
        }
        for param in EXPANDED_PARAMS {
            query.remove(*param);
        }
        info!(caller, query = %query, "Resolved query");
        Ok(query)
    }

    /// The study a query targets when it targets exactly one.
    ///
    /// That is the only non-negated study of the `study` param or, without
    /// one, the only study visible to the caller.
    pub fn default_study(&self, query: &Query, caller: &str) -> CatalogResult<Option<String>> {
        let studies = self.query_studies(query, caller)?;
        Ok(match studies.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        })
    }

    /// Release ceiling requested by the query.
    ///
    /// Returns `None` without a `release` param, and when it names the
    /// current release since every indexed entity is visible then.
    ///
    /// # Errors
    ///
    /// [`CatalogQueryError::Malformed`] for non-numeric or non-positive
    /// releases, [`CatalogQueryError::ReleaseViolation`] for releases past
    /// the current one.
    pub fn release_filter(&self, query: &Query, caller: &str) -> CatalogResult<Option<u32>> {
        let Some(value) = valid(query, QueryParam::Release) else {
            return Ok(None);
        };
        let key = QueryParam::Release.key();
        let release: i64 = value
            .trim()
            .parse()
            .map_err(|_| CatalogQueryError::malformed(key, value, "release must be a number"))?;
        if release <= 0 {
            return Err(CatalogQueryError::malformed(key, value, "release must be greater than 0"));
        }
        let current = self.catalog.current_release(caller, valid(query, QueryParam::Project))?;
        if release > i64::from(current) {
            return Err(CatalogQueryError::ReleaseViolation {
                param: key.into(),
                value: value.into(),
                release: current,
            });
        }
        if release == i64::from(current) {
            return Ok(None);
        }
        Ok(u32::try_from(release).ok())
    }

    // ========================================================================
    // Studies and entities
    // ========================================================================

    /// Canonical ids of the studies a query targets.
    fn query_studies(&self, query: &Query, caller: &str) -> CatalogResult<Vec<String>> {
        let project = valid(query, QueryParam::Project);
        let Some(value) = valid(query, QueryParam::Study) else {
            return Ok(ids(self.catalog.visible_studies(caller, project)?, |s| s.id));
        };
        let atoms = split(value)?;
        let (negated, positive): (Vec<&str>, Vec<&str>) = atoms.iter().map(String::as_str).partition(|a| is_negated(a));
        if !positive.is_empty() {
            let names: Vec<String> = positive.iter().map(|s| s.to_string()).collect();
            return Ok(ids(self.catalog.lookup_studies(caller, &names)?, |s| s.id));
        }
        let excluded: Vec<String> = negated.iter().map(|a| remove_negation(a).to_string()).collect();
        let excluded = ids(self.catalog.lookup_studies(caller, &excluded)?, |s| s.id);
        Ok(self
            .catalog
            .visible_studies(caller, project)?
            .into_iter()
            .map(|s| s.id)
            .filter(|id| !excluded.contains(id))
            .collect())
    }

    fn resolve_entities(
        &self,
        query: &mut Query,
        caller: &str,
        study: Option<&str>,
        release: Option<u32>,
    ) -> CatalogResult<()> {
        let catalog = self.catalog;

        let studies = EntityResolver::new(
            "study",
            move |names: &[String]| catalog.lookup_studies(caller, names),
            study_id,
            study_release,
        );
        resolve_symbols(query, QueryParam::Study, release, &studies)?;
        resolve_symbols(query, QueryParam::IncludeStudy, release, &studies)?;

        let samples = || {
            EntityResolver::new(
                "sample",
                move |names: &[String]| catalog.lookup_samples(caller, study, names),
                sample_id,
                sample_release,
            )
        };
        resolve_symbols(query, QueryParam::Sample, release, &samples())?;
        resolve_symbols(query, QueryParam::IncludeSample, release, &samples())?;
        let genotypes = samples().with_style(ClauseStyle::Genotype);
        resolve_symbols(query, QueryParam::Genotype, release, &genotypes)?;

        let mut files = EntityResolver::new(
            "file",
            move |names: &[String]| catalog.lookup_files(caller, study, names),
            file_id,
            file_release,
        );
        if release.is_some() {
            files = files.with_validation(require_indexed);
        }
        resolve_symbols(query, QueryParam::File, release, &files)?;
        resolve_symbols(query, QueryParam::IncludeFile, release, &files)?;

        let cohorts = EntityResolver::new(
            "cohort",
            move |names: &[String]| self.lookup_scoped_cohorts(caller, study, names),
            scoped_cohort_id,
            scoped_cohort_release,
        );
        for param in [
            QueryParam::Cohort,
            QueryParam::StatsMaf,
            QueryParam::StatsMgf,
            QueryParam::MissingAlleles,
            QueryParam::MissingGenotypes,
        ] {
            resolve_symbols(query, param, release, &cohorts)?;
        }
        Ok(())
    }

    /// Cohorts by `cohort` or `study:cohort` name.
    fn lookup_scoped_cohorts(
        &self,
        caller: &str,
        study: Option<&str>,
        names: &[String],
    ) -> CatalogResult<Vec<ScopedCohort>> {
        names
            .iter()
            .map(|name| {
                let (scope, cohort) = match name.split_once(variant_query::IS) {
                    Some((scope, cohort)) => {
                        let found = self.catalog.lookup_studies(caller, &[scope.to_string()])?;
                        let scope = found.into_iter().next().map(|s| s.id).ok_or_else(|| {
                            CatalogQueryError::unresolved("study", scope)
                        })?;
                        (Some(scope), cohort)
                    }
                    None => (None, name.as_str()),
                };
                let lookup_study = scope.as_deref().or(study);
                let cohort = self
                    .catalog
                    .lookup_cohorts(caller, lookup_study, &[cohort.to_string()])?
                    .into_iter()
                    .next()
                    .ok_or_else(|| CatalogQueryError::unresolved("cohort", name.clone()))?;
                Ok(ScopedCohort { study: scope, cohort })
            })
            .collect()
    }

    /// Samples of the default cohort, i.e. loaded into storage.
    fn indexed_samples(&self, caller: &str, study: &str) -> CatalogResult<BTreeSet<String>> {
        let cohort = self
            .catalog
            .lookup_cohorts(caller, Some(study), &[self.config.default_cohort.clone()])?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogQueryError::unresolved("cohort", self.config.default_cohort.clone()))?;
        Ok(cohort.samples.into_iter().collect())
    }

    /// Injects the files and samples visible at `release` as include lists,
    /// unless the query already names them.
    fn restrict_to_release(&self, query: &mut Query, caller: &str, studies: &[String], release: u32) -> CatalogResult<()> {
        if !query.is_valid(QueryParam::IncludeFile) {
            let mut files = Vec::new();
            for study in studies {
                files.extend(
                    self.catalog
                        .files(caller, study)?
                        .into_iter()
                        .filter(|f| f.release <= release && f.index_status == IndexStatus::Ready)
                        .map(|f| f.id),
                );
            }
            debug!(release, files = files.len(), "Restricting files to release");
            put_list_or_none(query, QueryParam::IncludeFile, &files);
        }
        if !query.is_valid(QueryParam::IncludeSample) {
            let mut samples = Vec::new();
            for study in studies {
                let indexed = self.indexed_samples(caller, study)?;
                samples.extend(
                    self.catalog
                        .samples(caller, study)?
                        .into_iter()
                        .filter(|s| s.release <= release && indexed.contains(&s.id))
                        .map(|s| s.id),
                );
            }
            debug!(release, samples = samples.len(), "Restricting samples to release");
            put_list_or_none(query, QueryParam::IncludeSample, &samples);
        }
        Ok(())
    }

    // ========================================================================
    // High level filters
    // ========================================================================

    fn expand_sample_annotation(
        &self,
        query: &mut Query,
        caller: &str,
        study: Option<&str>,
        release: Option<u32>,
    ) -> CatalogResult<()> {
        let Some(expression) = valid(query, QueryParam::SampleAnnotation).map(str::to_string) else {
            return Ok(());
        };
        let study = study.ok_or_else(|| CatalogQueryError::MissingStudy {
            kind: "sampleAnnotation",
            value: expression.clone(),
        })?;
        let samples: Vec<String> = self
            .catalog
            .search_samples(caller, study, &expression)?
            .into_iter()
            .filter(|s| release.map_or(true, |r| s.release <= r))
            .map(|s| s.id)
            .collect();
        if samples.is_empty() {
            return Err(CatalogQueryError::malformed(
                QueryParam::SampleAnnotation.key(),
                expression,
                "no samples match the annotation",
            ));
        }
        debug!(expression = %expression, samples = samples.len(), "Expanded sample annotation");

        match valid(query, QueryParam::SampleAnnotationGenotype).map(str::to_string) {
            Some(genotype) => {
                let mut filter = match valid(query, QueryParam::Genotype) {
                    Some(existing) => GenotypeFilter::parse(existing),
                    None => GenotypeFilter::default(),
                };
                for sample in &samples {
                    filter.push(GenotypeClause::new(sample.clone(), split_value(&genotype, Some(QueryOperation::Or))));
                }
                query.put(QueryParam::Genotype, filter.to_string());
                if !query.is_valid(QueryParam::IncludeSample) {
                    query.put_list(QueryParam::IncludeSample, &samples);
                }
            }
            None => merge_samples(query, &samples, QueryParam::SampleAnnotation)?,
        }
        Ok(())
    }

    fn expand_family(
        &self,
        query: &mut Query,
        caller: &str,
        study: Option<&str>,
        release: Option<u32>,
    ) -> CatalogResult<()> {
        let Some(family_id) = valid(query, QueryParam::Family).map(str::to_string) else {
            for param in [QueryParam::ModeOfInheritance, QueryParam::FamilyPhenotype] {
                if query.is_valid(param) {
                    return Err(CatalogQueryError::MissingParam {
                        param: QueryParam::Family.key().to_string(),
                        reason: format!("'{}' requires a family", param),
                    });
                }
            }
            return Ok(());
        };
        let family_key = QueryParam::Family.key();
        let study = study.ok_or_else(|| CatalogQueryError::MissingStudy {
            kind: "family",
            value: family_id.clone(),
        })?;
        let family = self.catalog.family(caller, study, &family_id)?;
        if family.members.is_empty() {
            return Err(CatalogQueryError::malformed(family_key, &family_id, "family has no members"));
        }

        let indexed = self.indexed_samples(caller, study)?;
        let member_samples: BTreeMap<String, Vec<String>> = family
            .members
            .iter()
            .map(|individual| {
                let samples = individual
                    .samples
                    .iter()
                    .filter(|s| indexed.contains(&s.id) && release.map_or(true, |r| s.release <= r))
                    .map(|s| s.id.clone())
                    .collect();
                (individual.id.clone(), samples)
            })
            .collect();
        let indexed_count: usize = member_samples.values().map(Vec::len).sum();
        match indexed_count {
            0 => return Err(CatalogQueryError::malformed(family_key, &family_id, "family not indexed")),
            1 => {
                return Err(CatalogQueryError::malformed(
                    family_key,
                    &family_id,
                    "only one member of the family is indexed",
                ))
            }
            _ => {}
        }

        match valid(query, QueryParam::ModeOfInheritance).map(str::to_string) {
            Some(mode) => {
                let mode: ModeOfInheritance = mode.parse()?;
                let genotype = self.inheritance_genotypes(query, &family, &member_samples, mode)?;
                debug!(family = %family_id, mode = %mode, genotype = %genotype, "Expanded mode of inheritance");
                query.put(QueryParam::Genotype, genotype);
            }
            None => {
                if let Some(phenotype) = valid(query, QueryParam::FamilyPhenotype) {
                    return Err(CatalogQueryError::malformed(
                        QueryParam::FamilyPhenotype.key(),
                        phenotype,
                        "familyPhenotype requires a modeOfInheritance",
                    ));
                }
                let samples: Vec<String> = member_samples.into_values().flatten().collect();
                debug!(family = %family_id, samples = samples.len(), "Expanded family");
                merge_samples(query, &samples, QueryParam::Family)?;
            }
        }
        Ok(())
    }

    /// Genotype filter implied by `mode` over the indexed family members.
    fn inheritance_genotypes(
        &self,
        query: &Query,
        family: &Family,
        member_samples: &BTreeMap<String, Vec<String>>,
        mode: ModeOfInheritance,
    ) -> CatalogResult<String> {
        let mode_key = QueryParam::ModeOfInheritance.key();
        for param in [QueryParam::Genotype, QueryParam::Sample] {
            if query.is_valid(param) {
                return Err(CatalogQueryError::malformed(
                    mode_key,
                    mode.name(),
                    format!("can not be combined with the '{}' filter", param),
                ));
            }
        }
        if family.phenotypes.is_empty() {
            return Err(CatalogQueryError::malformed(
                QueryParam::Family.key(),
                &family.id,
                "family has no phenotypes",
            ));
        }
        let phenotype = match valid(query, QueryParam::FamilyPhenotype) {
            Some(wanted) => family
                .phenotypes
                .iter()
                .find(|p| p.id == wanted || p.name == wanted)
                .ok_or_else(|| CatalogQueryError::Unresolved {
                    kind: "phenotype",
                    value: wanted.to_string(),
                    available: family.phenotype_ids(),
                })?,
            None => match family.phenotypes.as_slice() {
                [only] => only,
                _ => {
                    return Err(CatalogQueryError::MissingParam {
                        param: QueryParam::FamilyPhenotype.key().to_string(),
                        reason: format!(
                            "family '{}' has more than one phenotype. Available: [{}]",
                            family.id,
                            family.phenotype_ids().join(", ")
                        ),
                    })
                }
            },
        };
        if let Some((individual, _)) = member_samples.iter().find(|(_, samples)| samples.len() > 1) {
            return Err(CatalogQueryError::malformed(
                QueryParam::Family.key(),
                &family.id,
                format!("individual '{}' has more than one indexed sample", individual),
            ));
        }

        let pedigree = Pedigree::from_family(family, &phenotype.id);
        let genotypes = if self.config.phased_genotypes {
            mode.genotypes_with_phased(&pedigree)
        } else {
            mode.genotypes(&pedigree)
        };
        let filter: GenotypeFilter = genotypes
            .into_iter()
            .filter_map(|(individual, gts)| {
                let sample = member_samples.get(&individual)?.first()?;
                Some(GenotypeClause::new(sample.clone(), gts))
            })
            .collect();
        if filter.is_empty() {
            return Err(CatalogQueryError::malformed(
                mode_key,
                mode.name(),
                "no indexed family member is constrained by this mode of inheritance",
            ));
        }
        Ok(filter.to_string())
    }

    fn expand_panel(&self, query: &mut Query, caller: &str, study: Option<&str>) -> CatalogResult<()> {
        let Some(panel_id) = valid(query, QueryParam::Panel).map(str::to_string) else {
            return Ok(());
        };
        let study = study.ok_or_else(|| CatalogQueryError::MissingStudy {
            kind: "panel",
            value: panel_id.clone(),
        })?;
        let panel = self.catalog.panel(caller, study, &panel_id)?;

        let mut genes = match valid(query, QueryParam::Gene) {
            Some(existing) => match check_operator(existing)? {
                Some(QueryOperation::And) => {
                    return Err(CatalogQueryError::malformed(
                        QueryParam::Panel.key(),
                        &panel_id,
                        "can not be combined with an AND gene filter",
                    ))
                }
                op => split_value(existing, op).into_iter().map(str::to_string).collect(),
            },
            None => Vec::new(),
        };
        for gene in panel.genes {
            if !genes.contains(&gene) {
                genes.push(gene);
            }
        }
        debug!(panel = %panel_id, genes = genes.len(), "Expanded panel");
        query.put_list(QueryParam::Gene, &genes);
        Ok(())
    }
}

impl std::fmt::Debug for VariantCatalogQueryResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantCatalogQueryResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A cohort, optionally addressed through its study (`study:cohort`).
struct ScopedCohort {
    study: Option<String>,
    cohort: CatalogCohort,
}

fn study_id(s: &CatalogStudy) -> String {
    s.id.clone()
}

fn study_release(s: &CatalogStudy) -> u32 {
    s.release
}

fn sample_id(s: &CatalogSample) -> String {
    s.id.clone()
}

fn sample_release(s: &CatalogSample) -> u32 {
    s.release
}

fn file_id(f: &CatalogFile) -> String {
    f.id.clone()
}

fn file_release(f: &CatalogFile) -> u32 {
    f.release
}

fn scoped_cohort_id(c: &ScopedCohort) -> String {
    match &c.study {
        Some(study) => format!("{}{}{}", study, variant_query::IS, c.cohort.id),
        None => c.cohort.id.clone(),
    }
}

fn scoped_cohort_release(c: &ScopedCohort) -> u32 {
    c.cohort.release
}

fn require_indexed(file: &CatalogFile) -> CatalogResult<()> {
    if file.index_status == IndexStatus::Ready {
        Ok(())
    } else {
        Err(CatalogQueryError::malformed(
            QueryParam::File.key(),
            &file.id,
            format!("file is not indexed, index status {}", file.index_status),
        ))
    }
}

fn valid(query: &Query, param: QueryParam) -> Option<&str> {
    query.get(param).filter(|v| !v.trim().is_empty())
}

fn split(value: &str) -> CatalogResult<Vec<String>> {
    let operation = check_operator(value)?;
    Ok(split_value(value, operation).into_iter().map(str::to_string).collect())
}

fn ids<T>(entities: Vec<T>, id: impl Fn(T) -> String) -> Vec<String> {
    entities.into_iter().map(id).collect()
}

fn put_list_or_none(query: &mut Query, param: QueryParam, values: &[String]) {
    if values.is_empty() {
        query.put(param, NONE);
    } else {
        query.put_list(param, values);
    }
}

/// ORs `samples` into the `sample` filter.
fn merge_samples(query: &mut Query, samples: &[String], origin: QueryParam) -> CatalogResult<()> {
    let mut merged = match valid(query, QueryParam::Sample) {
        Some(existing) => match check_operator(existing)? {
            Some(QueryOperation::And) => {
                return Err(CatalogQueryError::malformed(
                    origin.key(),
                    query.get(origin).unwrap_or_default(),
                    "can not be combined with an AND sample filter",
                ))
            }
            op => split_value(existing, op).into_iter().map(str::to_string).collect(),
        },
        None => Vec::new(),
    };
    for sample in samples {
        if !merged.contains(sample) {
            merged.push(sample.clone());
        }
    }
    query.put_list(QueryParam::Sample, &merged);
    Ok(())
}
