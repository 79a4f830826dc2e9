//! Compilation of variant queries into document predicates.
//!
//! [`QueryCompiler`] turns each recognized `(param, value)` pair of a
//! [`Query`] into a [`Predicate`] fragment over the variant document and
//! ANDs the fragments together. Conditions on the study entry of a variant
//! (study, file, genotype, sample and file attribute filters) are gathered
//! into a single element match on `studies` so they must hold on the same
//! entry.
//!
//! Names of studies, files, samples and cohorts are resolved through the
//! [`StudyConfigurationCache`].

use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};
use variant_query::{
    is_hom_ref, is_negated, parse_keyed_comparison, parse_number, remove_negation,
    strip_comparator, Comparator, FilterValue, GenotypeFilter, KeyedComparison, Query,
    QueryOperation, QueryOptions, QueryParam, Region, ALL, IS, NONE, UNKNOWN_GENOTYPE,
};

use crate::cache::StudyConfigurationCache;
use crate::converter::{attribute_value, genotype_to_storage};
use crate::error::{StorageError, StorageResult};
use crate::model::{StudyConfiguration, VariantType};
use crate::predicate::{Condition, Predicate};
use crate::projection::{build_projection, Projection};
use crate::schema::{self, path};

/// Every genotype bucket a stored study entry may hold.
///
/// A sample absent from all of them has a homozygous reference call.
/// Haploid calls of X and Y linked sites are stored like any other.
pub const STORED_GENOTYPES: &[&str] = &[
    "0/1", "1/0", "1/1", "-1/-1", "0|1", "1|0", "1|1", "-1|-1", "0|2", "2|0", "2|1", "1|2",
    "2|2", "0/2", "2/0", "2/1", "1/2", "2/2", "0", "1", "2", "-1", UNKNOWN_GENOTYPE,
];

/// Params consumed by the catalog resolver, never by the compiler.
const CATALOG_PARAMS: &[QueryParam] = &[
    QueryParam::Release,
    QueryParam::Project,
    QueryParam::SampleAnnotation,
    QueryParam::SampleAnnotationGenotype,
    QueryParam::Family,
    QueryParam::FamilyPhenotype,
    QueryParam::ModeOfInheritance,
    QueryParam::Panel,
];

/// Stored genotypes carrying at least one alternate allele.
pub fn non_reference_genotypes() -> impl Iterator<Item = &'static str> {
    STORED_GENOTYPES.iter().copied().filter(|gt| {
        gt.split(['/', '|'])
            .any(|allele| allele.parse::<i32>().is_ok_and(|a| a > 0))
    })
}

/// Compiles queries against the studies known to a cache.
pub struct QueryCompiler<'a> {
    studies: &'a StudyConfigurationCache<'a>,
}

impl<'a> QueryCompiler<'a> {
    /// Creates a compiler.
    pub fn new(studies: &'a StudyConfigurationCache<'a>) -> Self {
        Self { studies }
    }

    /// Compiles a query into one predicate.
    ///
    /// An empty query compiles to the match-everything predicate.
    ///
    /// # Errors
    ///
    /// Malformed values and unknown studies, files, samples or cohorts.
    pub fn compile(&self, query: &Query) -> StorageResult<Predicate> {
        for key in query.unknown_keys() {
            warn!(param = key, "Ignoring unknown query param");
        }
        for param in CATALOG_PARAMS {
            if query.is_valid(*param) {
                warn!(param = param.key(), "Ignoring unresolved catalog param");
            }
        }

        let mut clauses = Vec::new();
        self.variant_filters(query, &mut clauses)?;
        self.annotation_filters(query, &mut clauses)?;
        self.stats_filters(query, &mut clauses)?;
        self.study_filters(query, &mut clauses)?;

        let predicate = Predicate::and(clauses);
        debug!(query = %query, predicate = %predicate, "Compiled query");
        Ok(predicate)
    }

    /// Builds the projection for a query, resolving `includeStudy` and
    /// `includeFile`.
    pub fn projection(&self, query: &Query, options: &QueryOptions) -> StorageResult<Projection> {
        let studies = self.id_list(query, QueryParam::IncludeStudy, |atom| {
            self.study(atom).map(|sc| sc.study_id)
        })?;
        let files = self.id_list(query, QueryParam::IncludeFile, |atom| {
            self.resolve_file(query, atom)
        })?;
        Ok(build_projection(options, studies.as_deref(), files.as_deref()))
    }

    /// The study a query implicitly refers to.
    ///
    /// This is the single positive study of the `study` param, or the only
    /// study known to the cache.
    pub fn default_study(&self, query: &Query) -> StorageResult<Option<Arc<StudyConfiguration>>> {
        if let Some(studies) = query.get_filter(QueryParam::Study)? {
            let positive: Vec<&str> = studies.iter().filter(|s| !is_negated(s)).collect();
            return match positive.as_slice() {
                [single] => self.study(single).map(Some),
                _ => Ok(None),
            };
        }
        let mut all = self.studies.all()?;
        Ok(if all.len() == 1 { all.pop() } else { None })
    }

    /// Numeric id of a sample given by name or id.
    ///
    /// The default study is searched first, then every study. Unknown
    /// numeric ids are accepted as they are.
    pub fn resolve_sample(&self, query: &Query, sample: &str) -> StorageResult<i32> {
        self.resolve_in_studies(query, sample, "sample", StudyConfiguration::resolve_sample)
    }

    /// Numeric id of a file given by name or id.
    pub fn resolve_file(&self, query: &Query, file: &str) -> StorageResult<i32> {
        self.resolve_in_studies(query, file, "file", StudyConfiguration::resolve_file)
    }

    fn resolve_in_studies(
        &self,
        query: &Query,
        symbol: &str,
        kind: &'static str,
        lookup: fn(&StudyConfiguration, &str) -> Option<i32>,
    ) -> StorageResult<i32> {
        if let Some(sc) = self.default_study(query)? {
            if let Some(id) = lookup(&sc, symbol) {
                return Ok(id);
            }
        }
        for sc in self.studies.all()? {
            if let Some(id) = lookup(&sc, symbol) {
                return Ok(id);
            }
        }
        symbol.parse::<i32>().map_err(|_| StorageError::Unresolved {
            kind,
            value: symbol.to_string(),
        })
    }

    fn study(&self, study: &str) -> StorageResult<Arc<StudyConfiguration>> {
        self.studies
            .resolve(study)?
            .ok_or_else(|| StorageError::Unresolved {
                kind: "study",
                value: study.to_string(),
            })
    }

    /// Resolves `cohort` or `study:cohort` to `(study id, cohort id)`.
    fn resolve_cohort(&self, query: &Query, param: QueryParam, key: &str) -> StorageResult<(i32, i32)> {
        let (sc, cohort) = match key.split_once(IS) {
            Some((study, cohort)) => (self.study(study)?, cohort),
            None => {
                let sc = self.default_study(query)?.ok_or_else(|| {
                    StorageError::malformed(
                        param.key(),
                        key,
                        "cohort needs a study, use 'study:cohort'",
                    )
                })?;
                (sc, key)
            }
        };
        let cohort_id = sc
            .resolve_cohort(cohort)
            .ok_or_else(|| StorageError::Unresolved {
                kind: "cohort",
                value: key.to_string(),
            })?;
        Ok((sc.study_id, cohort_id))
    }

    fn id_list(
        &self,
        query: &Query,
        param: QueryParam,
        resolve: impl Fn(&str) -> StorageResult<i32>,
    ) -> StorageResult<Option<Vec<i32>>> {
        let Some(value) = valid(query, param) else {
            return Ok(None);
        };
        if value == ALL {
            return Ok(None);
        }
        if value == NONE {
            return Ok(Some(Vec::new()));
        }
        FilterValue::parse(value)?
            .iter()
            .map(resolve)
            .collect::<StorageResult<Vec<_>>>()
            .map(Some)
    }

    // ========================================================================
    // Variant fields
    // ========================================================================

    fn variant_filters(&self, query: &Query, clauses: &mut Vec<Predicate>) -> StorageResult<()> {
        if let Some(value) = valid(query, QueryParam::Region) {
            let regions = Region::parse_list(value)?;
            clauses.push(Predicate::or(regions.iter().map(region_predicate)));
        }

        if let Some(ids) = query.get_filter(QueryParam::Id)? {
            clauses.push(Predicate::or([
                string_filter(QueryParam::Id, &xref_path(), &ids, true)?,
                string_filter(QueryParam::Id, schema::IDS, &ids, true)?,
            ]));
        }

        if let Some(genes) = query.get_filter(QueryParam::Gene)? {
            let gene_path = path(&[schema::ANNOTATION, schema::CONSEQUENCE_TYPES, schema::GENE_NAME]);
            clauses.push(Predicate::or([
                string_filter(QueryParam::Gene, &xref_path(), &genes, true)?,
                string_filter(QueryParam::Gene, &gene_path, &genes, true)?,
            ]));
        }

        let single_valued = [
            (QueryParam::Chromosome, schema::CHROMOSOME),
            (QueryParam::Reference, schema::REFERENCE),
            (QueryParam::Alternate, schema::ALTERNATE),
        ];
        for (param, field) in single_valued {
            if let Some(value) = query.get_filter(param)? {
                clauses.push(string_filter(param, field, &value, false)?);
            }
        }

        if let Some(types) = query.get_filter(QueryParam::Type)? {
            clauses.push(list_filter(QueryParam::Type, schema::TYPE, &types, false, |atom| {
                Ok(json!(atom.parse::<VariantType>()?.as_str()))
            })?);
        }
        Ok(())
    }

    // ========================================================================
    // Annotation fields
    // ========================================================================

    fn annotation_filters(&self, query: &Query, clauses: &mut Vec<Predicate>) -> StorageResult<()> {
        let ct = |field: &str| path(&[schema::ANNOTATION, schema::CONSEQUENCE_TYPES, field]);

        if let Some(value) = valid(query, QueryParam::AnnotationExists) {
            let exists = match value.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(StorageError::malformed(
                        QueryParam::AnnotationExists.key(),
                        value,
                        "expected 'true' or 'false'",
                    ))
                }
            };
            clauses.push(Predicate::field(
                path(&[schema::ANNOTATION, schema::ANNOT_ID]),
                Condition::Exists(exists),
            ));
        }

        if let Some(value) = query.get_filter(QueryParam::AnnotXref)? {
            clauses.push(string_filter(QueryParam::AnnotXref, &xref_path(), &value, true)?);
        }

        if let Some(value) = query.get_filter(QueryParam::AnnotConsequenceType)? {
            clauses.push(list_filter(
                QueryParam::AnnotConsequenceType,
                &ct(schema::SO_ACCESSION),
                &value,
                true,
                parse_so_accession,
            )?);
        }

        if let Some(value) = query.get_filter(QueryParam::AnnotBiotype)? {
            clauses.push(string_filter(QueryParam::AnnotBiotype, &ct(schema::BIOTYPE), &value, true)?);
        }

        let shortcuts = [
            (QueryParam::Polyphen, schema::POLYPHEN),
            (QueryParam::Sift, schema::SIFT),
        ];
        for (param, field) in shortcuts {
            if let Some(value) = query.get_filter(param)? {
                let score = path(&[schema::ANNOTATION, schema::CONSEQUENCE_TYPES, field, schema::SCORE]);
                let parts = value
                    .iter()
                    .map(|atom| numeric_atom(param, &score, atom))
                    .collect::<StorageResult<Vec<_>>>()?;
                clauses.push(combine(&value, parts));
            }
        }

        if let Some(value) = query.get_filter(QueryParam::AnnotProteinSubstitution)? {
            clauses.push(score_filter(
                QueryParam::AnnotProteinSubstitution,
                &ct(schema::PROTEIN_SUBSTITUTION_SCORE),
                &value,
            )?);
        }

        if let Some(value) = query.get_filter(QueryParam::AnnotConservation)? {
            clauses.push(score_filter(
                QueryParam::AnnotConservation,
                &path(&[schema::ANNOTATION, schema::CONSERVATION]),
                &value,
            )?);
        }

        let frequencies = [
            (QueryParam::AnnotPopulationAltFrequency, schema::POP_ALT_FREQ),
            (QueryParam::AnnotPopulationRefFrequency, schema::POP_REF_FREQ),
        ];
        for (param, field) in frequencies {
            if let Some(value) = query.get_filter(param)? {
                clauses.push(frequency_filter(param, field, &value)?);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Stats fields
    // ========================================================================

    fn stats_filters(&self, query: &Query, clauses: &mut Vec<Predicate>) -> StorageResult<()> {
        let fields = [
            (QueryParam::StatsMaf, schema::MAF),
            (QueryParam::StatsMgf, schema::MGF),
            (QueryParam::MissingAlleles, schema::MISSING_ALLELES),
            (QueryParam::MissingGenotypes, schema::MISSING_GENOTYPES),
        ];
        for (param, field) in fields {
            if let Some(value) = query.get_filter(param)? {
                clauses.push(self.stats_filter(query, param, field, &value)?);
            }
        }

        if let Some(value) = query.get_filter(QueryParam::NumGt)? {
            let parts = value
                .iter()
                .map(|atom| {
                    let kc = parse_keyed_comparison(QueryParam::NumGt.key(), atom)?;
                    let count = path(&[schema::STATS, schema::NUM_GT, &genotype_to_storage(&kc.key)]);
                    keyed_numeric(QueryParam::NumGt, &count, &kc)
                })
                .collect::<StorageResult<Vec<_>>>()?;
            clauses.push(combine(&value, parts));
        }
        Ok(())
    }

    /// `cohort<op>v` matches the stats entry of that cohort; a bare `<op>v`
    /// matches any stats entry.
    fn stats_filter(
        &self,
        query: &Query,
        param: QueryParam,
        field: &str,
        value: &FilterValue,
    ) -> StorageResult<Predicate> {
        let parts = value
            .iter()
            .map(|atom| {
                if strip_comparator(atom).0.is_some() {
                    return numeric_atom(param, &path(&[schema::STATS, field]), atom);
                }
                let kc = parse_keyed_comparison(param.key(), atom)?;
                let (study_id, cohort_id) = self.resolve_cohort(query, param, &kc.key)?;
                Ok(Predicate::elem_match(
                    schema::STATS,
                    Predicate::and([
                        Predicate::eq(schema::STUDY_ID, study_id),
                        Predicate::eq(schema::COHORT_ID, cohort_id),
                        keyed_numeric(param, field, &kc)?,
                    ]),
                ))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(combine(value, parts))
    }

    // ========================================================================
    // Study entry fields
    // ========================================================================

    fn study_filters(&self, query: &Query, clauses: &mut Vec<Predicate>) -> StorageResult<()> {
        let study_ids = path(&[schema::STUDIES, schema::STUDY_ID]);
        let mut element = Vec::new();

        if let Some(studies) = query.get_filter(QueryParam::Study)? {
            let (positive, negative) = split_negated(&studies, |s| self.study(s).map(|sc| sc.study_id))?;
            if studies.is_and() && positive.len() > 1 {
                clauses.push(Predicate::field(&study_ids, Condition::All(to_values(&positive))));
            } else if !positive.is_empty() {
                element.push(Predicate::is_in(schema::STUDY_ID, positive));
            }
            if !negative.is_empty() {
                clauses.push(Predicate::field(&study_ids, Condition::Nin(to_values(&negative))));
            }
        }

        if let Some(files) = query.get_filter(QueryParam::File)? {
            let file_ids = path(&[schema::FILES, schema::FILE_ID]);
            let (positive, negative) = split_negated(&files, |f| self.resolve_file(query, f))?;
            if files.is_and() && positive.len() > 1 {
                element.push(Predicate::field(&file_ids, Condition::All(to_values(&positive))));
            } else if !positive.is_empty() {
                element.push(Predicate::is_in(&file_ids, positive));
            }
            if !negative.is_empty() {
                element.push(Predicate::field(&file_ids, Condition::Nin(to_values(&negative))));
            }
        }

        if let Some(value) = valid(query, QueryParam::Genotype) {
            for clause in GenotypeFilter::parse(value).clauses {
                let sample = self.resolve_sample(query, &clause.sample)?;
                element.push(Predicate::or(
                    clause.genotypes.iter().map(|gt| genotype_predicate(sample, gt)),
                ));
            }
        }

        if let Some(samples) = query.get_filter(QueryParam::Sample)? {
            let parts = samples
                .iter()
                .map(|s| {
                    let sample = self.resolve_sample(query, s)?;
                    Ok(Predicate::or(non_reference_genotypes().map(|gt| {
                        Predicate::eq(path(&[schema::GENOTYPES, gt]), sample)
                    })))
                })
                .collect::<StorageResult<Vec<_>>>()?;
            element.push(combine(&samples, parts));
        }

        if let Some(value) = query.get_filter(QueryParam::FileAttributes)? {
            let parts = value
                .iter()
                .map(|atom| file_attribute_predicate(atom))
                .collect::<StorageResult<Vec<_>>>()?;
            element.push(combine(&value, parts));
        }

        if !element.is_empty() {
            clauses.push(Predicate::elem_match(schema::STUDIES, Predicate::and(element)));
        }

        if let Some(cohorts) = query.get_filter(QueryParam::Cohort)? {
            let parts = cohorts
                .iter()
                .map(|c| {
                    let (study_id, cohort_id) = self.resolve_cohort(query, QueryParam::Cohort, c)?;
                    Ok(Predicate::elem_match(
                        schema::STATS,
                        Predicate::and([
                            Predicate::eq(schema::STUDY_ID, study_id),
                            Predicate::eq(schema::COHORT_ID, cohort_id),
                        ]),
                    ))
                })
                .collect::<StorageResult<Vec<_>>>()?;
            clauses.push(combine(&cohorts, parts));
        }
        Ok(())
    }
}

impl std::fmt::Debug for QueryCompiler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCompiler")
            .field("studies", self.studies)
            .finish()
    }
}

// ============================================================================
// Fragment builders
// ============================================================================

fn valid(query: &Query, param: QueryParam) -> Option<&str> {
    query.get(param).filter(|_| query.is_valid(param))
}

fn xref_path() -> String {
    path(&[schema::ANNOTATION, schema::XREFS, schema::XREF_ID])
}

fn to_values(ids: &[i32]) -> Vec<Value> {
    ids.iter().map(|id| json!(id)).collect()
}

/// Chunk ids (or the chromosome, for long regions) plus position bounds.
fn region_predicate(region: &Region) -> Predicate {
    let locator = if region.is_long() {
        Predicate::eq(schema::CHROMOSOME, region.chromosome.clone())
    } else {
        Predicate::is_in(path(&[schema::AT, schema::CHUNK_IDS]), region.chunk_ids())
    };
    Predicate::and([
        locator,
        Predicate::field(schema::END, Condition::Gte(json!(region.start))),
        Predicate::field(schema::START, Condition::Lte(json!(region.end))),
    ])
}

/// Joins fragments with the value's operator, AND when it has none.
fn combine(value: &FilterValue, parts: Vec<Predicate>) -> Predicate {
    match value.operation {
        Some(QueryOperation::Or) => Predicate::or(parts),
        _ => Predicate::and(parts),
    }
}

fn split_negated(
    value: &FilterValue,
    resolve: impl Fn(&str) -> StorageResult<i32>,
) -> StorageResult<(Vec<i32>, Vec<i32>)> {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for atom in value.iter() {
        let id = resolve(remove_negation(atom))?;
        if is_negated(atom) {
            negative.push(id);
        } else {
            positive.push(id);
        }
    }
    Ok((positive, negative))
}

fn string_filter(
    param: QueryParam,
    field: &str,
    value: &FilterValue,
    multi_valued: bool,
) -> StorageResult<Predicate> {
    list_filter(param, field, value, multi_valued, |atom| Ok(json!(atom)))
}

/// Equality for one value, membership for OR, containment of all for AND.
/// Negated atoms exclude.
fn list_filter(
    param: QueryParam,
    field: &str,
    value: &FilterValue,
    multi_valued: bool,
    convert: impl Fn(&str) -> StorageResult<Value>,
) -> StorageResult<Predicate> {
    if value.is_and() && !multi_valued {
        return Err(StorageError::malformed(
            param.key(),
            value.to_string(),
            "AND is not supported on a single-valued field",
        ));
    }
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for atom in value.iter() {
        if is_negated(atom) {
            negative.push(convert(remove_negation(atom))?);
        } else {
            positive.push(convert(atom)?);
        }
    }

    let mut parts = Vec::new();
    match positive.len() {
        0 => {}
        1 => parts.push(Predicate::field(field, Condition::Eq(positive.remove(0)))),
        _ if value.is_and() => parts.push(Predicate::field(field, Condition::All(positive))),
        _ => parts.push(Predicate::field(field, Condition::In(positive))),
    }
    if !negative.is_empty() {
        parts.push(Predicate::field(field, Condition::Nin(negative)));
    }
    Ok(Predicate::and(parts))
}

fn parse_so_accession(atom: &str) -> StorageResult<Value> {
    let digits = atom.strip_prefix("SO:").unwrap_or(atom);
    digits
        .parse::<u32>()
        .map(|so| json!(so))
        .map_err(|_| {
            StorageError::malformed(
                QueryParam::AnnotConsequenceType.key(),
                atom,
                "expected a sequence ontology accession like 'SO:0001583'",
            )
        })
}

fn comparison(field: impl Into<String>, comparator: Comparator, operand: Value) -> Predicate {
    let condition = match comparator {
        Comparator::Lt => Condition::Lt(operand),
        Comparator::Le => Condition::Lte(operand),
        Comparator::Gt => Condition::Gt(operand),
        Comparator::Ge => Condition::Gte(operand),
        Comparator::Eq => Condition::Eq(operand),
        Comparator::Ne => Condition::Ne(operand),
        Comparator::Regex => Condition::Regex(match operand {
            Value::String(s) => s,
            other => other.to_string(),
        }),
    };
    Predicate::field(field, condition)
}

/// `<op>v` (or a bare `v`, meaning equality) on a numeric field.
fn numeric_atom(param: QueryParam, field: &str, atom: &str) -> StorageResult<Predicate> {
    let (comparator, operand) = strip_comparator(atom);
    let comparator = comparator.unwrap_or(Comparator::Eq);
    if comparator == Comparator::Regex {
        return Err(StorageError::malformed(
            param.key(),
            atom,
            "pattern match is not supported on a numeric field",
        ));
    }
    Ok(comparison(field, comparator, json!(parse_number(operand)?)))
}

fn keyed_numeric(param: QueryParam, field: &str, kc: &KeyedComparison) -> StorageResult<Predicate> {
    if kc.comparator == Comparator::Regex {
        return Err(StorageError::malformed(
            param.key(),
            kc.to_string(),
            "pattern match is not supported on a numeric field",
        ));
    }
    Ok(comparison(field, kc.comparator, json!(kc.numeric_operand()?)))
}

/// `source<op>score` atoms over an array of scores.
fn score_filter(param: QueryParam, field: &str, value: &FilterValue) -> StorageResult<Predicate> {
    let parts = value
        .iter()
        .map(|atom| {
            let kc = parse_keyed_comparison(param.key(), atom)?;
            Ok(Predicate::elem_match(
                field,
                Predicate::and([
                    Predicate::eq(schema::SCORE_SOURCE, kc.key.clone()),
                    keyed_numeric(param, schema::SCORE, &kc)?,
                ]),
            ))
        })
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(combine(value, parts))
}

/// `study:population<op>frequency` atoms over the population frequencies.
fn frequency_filter(param: QueryParam, field: &str, value: &FilterValue) -> StorageResult<Predicate> {
    let parts = value
        .iter()
        .map(|atom| {
            let kc = parse_keyed_comparison(param.key(), atom)?;
            let (study, population) = match kc.key.split(IS).collect::<Vec<_>>().as_slice() {
                [study, population] if !study.is_empty() && !population.is_empty() => {
                    (study.to_string(), population.to_string())
                }
                _ => {
                    return Err(StorageError::malformed(
                        param.key(),
                        atom,
                        "expected '<study>:<population><operator><frequency>'",
                    ))
                }
            };
            Ok(Predicate::elem_match(
                path(&[schema::ANNOTATION, schema::POPULATION_FREQUENCIES]),
                Predicate::and([
                    Predicate::eq(schema::POP_STUDY, study),
                    Predicate::eq(schema::POP_POPULATION, population),
                    keyed_numeric(param, field, &kc)?,
                ]),
            ))
        })
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(combine(value, parts))
}

/// One genotype of a genotype clause, relative to a study entry.
///
/// Reference calls are not stored, so `0/0` holds when the sample is in no
/// bucket at all.
fn genotype_predicate(sample: i32, genotype: &str) -> Predicate {
    if is_hom_ref(genotype) {
        Predicate::and(
            STORED_GENOTYPES
                .iter()
                .map(|gt| Predicate::ne(path(&[schema::GENOTYPES, *gt]), sample)),
        )
    } else {
        Predicate::eq(path(&[schema::GENOTYPES, &genotype_to_storage(genotype)]), sample)
    }
}

/// `key<op>value` on the attributes of the entry's files.
fn file_attribute_predicate(atom: &str) -> StorageResult<Predicate> {
    let param = QueryParam::FileAttributes.key();
    let kc = parse_keyed_comparison(param, atom)?;
    let field = path(&[schema::FILES, schema::FILE_ATTRIBUTES, &kc.key]);
    if kc.comparator == Comparator::Regex {
        Regex::new(&kc.operand)
            .map_err(|e| StorageError::malformed(param, atom, e.to_string()))?;
        return Ok(comparison(field, Comparator::Regex, json!(kc.operand)));
    }
    Ok(comparison(field, kc.comparator, attribute_value(&kc.operand)))
}
