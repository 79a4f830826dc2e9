//! Conversion between typed models and stored documents.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use variant_query::{is_hom_ref, region, UNKNOWN_GENOTYPE};

use crate::document::{as_i64, get_f64, get_i64, get_objects, get_path, get_str, Document};
use crate::error::{StorageError, StorageResult};
use crate::model::{
    CohortStats, ConsequenceType, FileEntry, PopulationFrequency, Score, StudyConfiguration,
    StudyEntry, Variant, VariantAnnotation, VariantStats, VariantType, Xref,
};
use crate::schema;

/// Alleles longer than this are replaced by their digest in the storage id.
pub const MAX_ALLELE_LENGTH: usize = 50;

// ============================================================================
// Ids and genotype keys
// ============================================================================

/// Builds the canonical document id of a variant.
///
/// ```rust
/// use variant_storage::build_storage_id;
///
/// assert_eq!(build_storage_id("1", 25000, "A", "T"), "1_0000025000_A_T");
/// ```
pub fn build_storage_id(chromosome: &str, start: u32, reference: &str, alternate: &str) -> String {
    format!(
        "{}_{:010}_{}_{}",
        chromosome,
        start,
        allele_key(reference),
        allele_key(alternate)
    )
}

fn allele_key(allele: &str) -> String {
    if allele.len() > MAX_ALLELE_LENGTH {
        format!("{:x}", Sha256::digest(allele.as_bytes()))
    } else {
        allele.to_string()
    }
}

/// Storage id of a variant.
pub fn variant_storage_id(variant: &Variant) -> String {
    build_storage_id(
        &variant.chromosome,
        variant.start,
        &variant.reference,
        &variant.alternate,
    )
}

/// Genotype as stored in a bucket key. Missing alleles `.` become `-1`.
pub fn genotype_to_storage(genotype: &str) -> String {
    genotype.replace('.', "-1")
}

/// Genotype as reported to callers.
pub fn genotype_from_storage(key: &str) -> String {
    key.replace("-1", ".")
}

// ============================================================================
// Write side
// ============================================================================

/// Document for a variant without study entries.
///
/// This is the part written only when the document is created; study entries
/// and ids are appended separately so concurrent loads can merge.
pub fn variant_core_document(variant: &Variant) -> Document {
    let mut doc = Map::new();
    doc.insert(schema::ID.into(), json!(variant_storage_id(variant)));
    doc.insert(schema::CHROMOSOME.into(), json!(variant.chromosome));
    doc.insert(schema::START.into(), json!(variant.start));
    doc.insert(schema::END.into(), json!(variant.end));
    doc.insert(schema::REFERENCE.into(), json!(variant.reference));
    doc.insert(schema::ALTERNATE.into(), json!(variant.alternate));
    doc.insert(schema::TYPE.into(), json!(variant.variant_type.as_str()));
    doc.insert(schema::LENGTH.into(), json!(variant.length()));
    doc.insert(
        schema::AT.into(),
        json!({ schema::CHUNK_IDS: region::document_chunk_ids(&variant.chromosome, variant.start) }),
    );
    if let Some(annotation) = &variant.annotation {
        doc.insert(
            schema::ANNOTATION.into(),
            Value::Array(vec![Value::Object(annotation_to_document(annotation))]),
        );
    }
    doc
}

/// Full document of a variant, including its study entries and stats.
pub fn variant_to_document(variant: &Variant, config: &StudyConfiguration) -> StorageResult<Document> {
    let mut doc = variant_core_document(variant);
    doc.insert(schema::IDS.into(), json!(variant.ids));
    let studies = variant
        .studies
        .iter()
        .map(|entry| study_entry_to_document(entry, config, &[]).map(Value::Object))
        .collect::<StorageResult<Vec<_>>>()?;
    doc.insert(schema::STUDIES.into(), Value::Array(studies));
    let stats = variant
        .stats
        .iter()
        .map(|s| Value::Object(stats_to_document(s.study_id, s.cohort_id, &s.stats)))
        .collect();
    doc.insert(schema::STATS.into(), Value::Array(stats));
    Ok(doc)
}

/// Stored form of a file entry.
///
/// Numeric attribute values are stored as numbers so range filters apply.
pub fn file_to_document(file: &FileEntry) -> Value {
    let attributes: Map<String, Value> = file
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), attribute_value(value)))
        .collect();
    json!({
        schema::FILE_ID: file.file_id,
        schema::FILE_ATTRIBUTES: attributes,
    })
}

/// Typed form of a file attribute value.
pub fn attribute_value(value: &str) -> Value {
    if let Ok(n) = value.parse::<i64>() {
        return json!(n);
    }
    match value.parse::<f64>() {
        // keep the text when it would not round-trip
        Ok(n) if n.is_finite() && n.to_string() == value => json!(n),
        _ => json!(value),
    }
}

/// Groups the samples of a study entry into genotype buckets of sample ids.
///
/// Homozygous reference calls are not stored; a sample absent from every
/// bucket is read back as reference.
pub fn genotype_buckets(
    entry: &StudyEntry,
    config: &StudyConfiguration,
) -> StorageResult<IndexMap<String, Vec<i32>>> {
    let mut buckets: IndexMap<String, Vec<i32>> = IndexMap::new();
    for (sample, genotype) in &entry.samples {
        let id = config
            .resolve_sample(sample)
            .ok_or_else(|| StorageError::Unresolved {
                kind: "sample",
                value: sample.clone(),
            })?;
        if is_hom_ref(genotype) {
            continue;
        }
        buckets
            .entry(genotype_to_storage(genotype))
            .or_default()
            .push(id);
    }
    Ok(buckets)
}

/// Stored form of a study entry.
///
/// `gap_samples` are samples loaded earlier from other files; they get the
/// unknown genotype unless the study already defaults to it.
pub fn study_entry_to_document(
    entry: &StudyEntry,
    config: &StudyConfiguration,
    gap_samples: &[i32],
) -> StorageResult<Document> {
    let mut gt = Map::new();
    for (key, ids) in genotype_buckets(entry, config)? {
        gt.insert(key, json!(ids));
    }
    if !gap_samples.is_empty() && config.default_genotype() != Some(UNKNOWN_GENOTYPE) {
        let bucket = gt
            .entry(UNKNOWN_GENOTYPE.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(ids) = bucket {
            ids.extend(gap_samples.iter().map(|id| json!(id)));
        }
    }

    let mut doc = Map::new();
    doc.insert(schema::STUDY_ID.into(), json!(config.study_id));
    doc.insert(
        schema::FILES.into(),
        Value::Array(entry.files.iter().map(file_to_document).collect()),
    );
    doc.insert(schema::ALTERNATES.into(), json!(entry.secondary_alternates));
    doc.insert(schema::FORMAT.into(), json!(entry.format));
    doc.insert(schema::GENOTYPES.into(), Value::Object(gt));
    Ok(doc)
}

/// Stored form of one cohort's stats.
pub fn stats_to_document(study_id: i32, cohort_id: i32, stats: &VariantStats) -> Document {
    let mut doc = Map::new();
    doc.insert(schema::STUDY_ID.into(), json!(study_id));
    doc.insert(schema::COHORT_ID.into(), json!(cohort_id));
    doc.insert(schema::MAF.into(), json!(stats.maf));
    doc.insert(schema::MGF.into(), json!(stats.mgf));
    if let Some(allele) = &stats.maf_allele {
        doc.insert(schema::MAF_ALLELE.into(), json!(allele));
    }
    if let Some(genotype) = &stats.mgf_genotype {
        doc.insert(schema::MGF_GENOTYPE.into(), json!(genotype));
    }
    doc.insert(schema::MISSING_ALLELES.into(), json!(stats.missing_alleles));
    doc.insert(schema::MISSING_GENOTYPES.into(), json!(stats.missing_genotypes));
    let counts: Map<String, Value> = stats
        .genotype_counts
        .iter()
        .map(|(gt, n)| (genotype_to_storage(gt), json!(n)))
        .collect();
    doc.insert(schema::NUM_GT.into(), Value::Object(counts));
    doc
}

fn score_to_document(score: &Score) -> Value {
    let mut doc = Map::new();
    doc.insert(schema::SCORE.into(), json!(score.score));
    doc.insert(schema::SCORE_SOURCE.into(), json!(score.source));
    if let Some(description) = &score.description {
        doc.insert(schema::SCORE_DESCRIPTION.into(), json!(description));
    }
    Value::Object(doc)
}

fn consequence_type_to_document(ct: &ConsequenceType) -> Value {
    let mut doc = Map::new();
    let optional = [
        (schema::GENE_NAME, &ct.gene_name),
        (schema::ENSEMBL_GENE_ID, &ct.ensembl_gene_id),
        (schema::ENSEMBL_TRANSCRIPT_ID, &ct.ensembl_transcript_id),
        (schema::BIOTYPE, &ct.biotype),
    ];
    for (field, value) in optional {
        if let Some(value) = value {
            doc.insert(field.into(), json!(value));
        }
    }
    doc.insert(schema::SO_ACCESSION.into(), json!(ct.so_accessions));
    for score in &ct.protein_substitution_scores {
        // SIFT and PolyPhen get a shortcut field for direct filtering
        match score.source.to_ascii_lowercase().as_str() {
            "sift" => {
                doc.insert(schema::SIFT.into(), score_to_document(score));
            }
            "polyphen" => {
                doc.insert(schema::POLYPHEN.into(), score_to_document(score));
            }
            _ => {}
        }
    }
    doc.insert(
        schema::PROTEIN_SUBSTITUTION_SCORE.into(),
        Value::Array(ct.protein_substitution_scores.iter().map(score_to_document).collect()),
    );
    Value::Object(doc)
}

/// Stored form of an annotation.
pub fn annotation_to_document(annotation: &VariantAnnotation) -> Document {
    let mut doc = Map::new();
    doc.insert(schema::ANNOT_ID.into(), json!(annotation.id()));
    doc.insert(
        schema::CONSEQUENCE_TYPES.into(),
        Value::Array(
            annotation
                .consequence_types
                .iter()
                .map(consequence_type_to_document)
                .collect(),
        ),
    );
    doc.insert(
        schema::XREFS.into(),
        Value::Array(
            annotation
                .xrefs
                .iter()
                .map(|x| json!({ schema::XREF_ID: x.id, schema::XREF_SOURCE: x.source }))
                .collect(),
        ),
    );
    doc.insert(
        schema::POPULATION_FREQUENCIES.into(),
        Value::Array(
            annotation
                .population_frequencies
                .iter()
                .map(|p| {
                    json!({
                        schema::POP_STUDY: p.study,
                        schema::POP_POPULATION: p.population,
                        schema::POP_REF_FREQ: p.ref_allele_freq,
                        schema::POP_ALT_FREQ: p.alt_allele_freq,
                    })
                })
                .collect(),
        ),
    );
    doc.insert(
        schema::CONSERVATION.into(),
        Value::Array(annotation.conservation.iter().map(score_to_document).collect()),
    );
    doc
}

// ============================================================================
// Read side
// ============================================================================

/// Converts stored documents back into [`Variant`]s.
///
/// Holds the study configurations needed to turn sample ids into names, the
/// optional set of samples to return, and the genotype reported for samples
/// whose call is unknown.
#[derive(Debug, Clone)]
pub struct DocumentToVariantConverter {
    studies: HashMap<i32, Arc<StudyConfiguration>>,
    returned_samples: Option<BTreeSet<String>>,
    unknown_genotype: String,
}

impl DocumentToVariantConverter {
    /// Creates a converter over the given study configurations.
    pub fn new(studies: impl IntoIterator<Item = Arc<StudyConfiguration>>) -> Self {
        Self {
            studies: studies.into_iter().map(|sc| (sc.study_id, sc)).collect(),
            returned_samples: None,
            unknown_genotype: UNKNOWN_GENOTYPE.to_string(),
        }
    }

    /// Only return these samples (by name).
    pub fn with_returned_samples(mut self, samples: impl IntoIterator<Item = String>) -> Self {
        self.returned_samples = Some(samples.into_iter().collect());
        self
    }

    /// Genotype reported for unknown calls.
    pub fn with_unknown_genotype(mut self, genotype: impl Into<String>) -> Self {
        self.unknown_genotype = genotype.into();
        self
    }

    /// Converts one document.
    pub fn convert(&self, doc: &Document) -> StorageResult<Variant> {
        let chromosome = get_str(doc, schema::CHROMOSOME).unwrap_or_default();
        let reference = get_str(doc, schema::REFERENCE).unwrap_or_default();
        let alternate = get_str(doc, schema::ALTERNATE).unwrap_or_default();
        let start = get_i64(doc, schema::START).unwrap_or(0) as u32;

        let mut variant = Variant::new(chromosome, start, reference, alternate);
        if let Some(end) = get_i64(doc, schema::END) {
            variant.end = end as u32;
        }
        if let Some(t) = get_str(doc, schema::TYPE) {
            variant.variant_type = t
                .parse::<VariantType>()
                .unwrap_or(variant.variant_type);
        }
        variant.ids = get_path(doc, schema::IDS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        for study in get_objects(doc, schema::STUDIES) {
            variant.studies.push(self.convert_study(study)?);
        }
        variant.stats = get_objects(doc, schema::STATS)
            .map(stats_from_document)
            .collect::<StorageResult<_>>()?;
        variant.annotation = get_path(doc, schema::ANNOTATION)
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(Value::as_object)
            .map(|annot| annotation_from_document(&variant, annot));
        Ok(variant)
    }

    fn convert_study(&self, doc: &Document) -> StorageResult<StudyEntry> {
        let study_id = get_i64(doc, schema::STUDY_ID)
            .ok_or_else(|| StorageError::Document("study entry without id".to_string()))?
            as i32;
        let config = self.studies.get(&study_id);

        let mut entry = StudyEntry::new(study_id);
        entry.files = get_objects(doc, schema::FILES).map(file_from_document).collect();
        entry.secondary_alternates = string_list(doc, schema::ALTERNATES);
        if let Some(format) = get_path(doc, schema::FORMAT).and_then(Value::as_array) {
            entry.format = format.iter().filter_map(Value::as_str).map(str::to_string).collect();
        }

        let names: HashMap<i32, &str> = config
            .map(|sc| sc.sample_ids.iter().map(|(n, id)| (*id, n.as_str())).collect())
            .unwrap_or_default();
        let name_of = |id: i32| -> String {
            names
                .get(&id)
                .map(|n| n.to_string())
                .unwrap_or_else(|| id.to_string())
        };

        let mut calls: BTreeMap<i32, String> = BTreeMap::new();
        if let Some(gt) = get_path(doc, schema::GENOTYPES).and_then(Value::as_object) {
            for (key, ids) in gt {
                let genotype = if key == UNKNOWN_GENOTYPE {
                    self.unknown_genotype.clone()
                } else {
                    genotype_from_storage(key)
                };
                for id in ids.as_array().into_iter().flatten().filter_map(as_i64) {
                    calls.insert(id as i32, genotype.clone());
                }
            }
        }

        let default_genotype = match config.and_then(|sc| sc.default_genotype()) {
            Some(UNKNOWN_GENOTYPE) => self.unknown_genotype.clone(),
            Some(gt) => gt.to_string(),
            None => variant_query::HOM_REF.to_string(),
        };
        let mut order: Vec<i32> = config.map(|sc| sc.indexed_samples()).unwrap_or_default();
        for id in calls.keys() {
            if !order.contains(id) {
                order.push(*id);
            }
        }
        for id in order {
            let name = name_of(id);
            if let Some(returned) = &self.returned_samples {
                if !returned.contains(&name) && !returned.contains(&id.to_string()) {
                    continue;
                }
            }
            let genotype = calls
                .get(&id)
                .cloned()
                .unwrap_or_else(|| default_genotype.clone());
            entry.samples.insert(name, genotype);
        }
        debug!(study_id, samples = entry.samples.len(), "Converted study entry");
        Ok(entry)
    }
}

fn string_list(doc: &Document, path: &str) -> Vec<String> {
    get_path(doc, path)
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn file_from_document(doc: &Document) -> FileEntry {
    let mut file = FileEntry::new(get_i64(doc, schema::FILE_ID).unwrap_or(0) as i32);
    if let Some(attrs) = get_path(doc, schema::FILE_ATTRIBUTES).and_then(Value::as_object) {
        for (key, value) in attrs {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            file.attributes.insert(key.clone(), value);
        }
    }
    file
}

/// Reads one stored stats entry.
pub fn stats_from_document(doc: &Document) -> StorageResult<CohortStats> {
    let study_id = get_i64(doc, schema::STUDY_ID)
        .ok_or_else(|| StorageError::Document("stats entry without study id".to_string()))?;
    let cohort_id = get_i64(doc, schema::COHORT_ID)
        .ok_or_else(|| StorageError::Document("stats entry without cohort id".to_string()))?;
    let genotype_counts = get_path(doc, schema::NUM_GT)
        .and_then(Value::as_object)
        .map(|counts| {
            counts
                .iter()
                .filter_map(|(gt, n)| as_i64(n).map(|n| (genotype_from_storage(gt), n as u32)))
                .collect()
        })
        .unwrap_or_default();
    Ok(CohortStats {
        study_id: study_id as i32,
        cohort_id: cohort_id as i32,
        stats: VariantStats {
            maf: get_f64(doc, schema::MAF).unwrap_or(0.0),
            mgf: get_f64(doc, schema::MGF).unwrap_or(0.0),
            maf_allele: get_str(doc, schema::MAF_ALLELE).map(str::to_string),
            mgf_genotype: get_str(doc, schema::MGF_GENOTYPE).map(str::to_string),
            missing_alleles: get_i64(doc, schema::MISSING_ALLELES).unwrap_or(0) as u32,
            missing_genotypes: get_i64(doc, schema::MISSING_GENOTYPES).unwrap_or(0) as u32,
            genotype_counts,
        },
    })
}

fn score_from_document(doc: &Document) -> Score {
    Score {
        source: get_str(doc, schema::SCORE_SOURCE).unwrap_or_default().to_string(),
        score: get_f64(doc, schema::SCORE).unwrap_or(0.0),
        description: get_str(doc, schema::SCORE_DESCRIPTION).map(str::to_string),
    }
}

fn annotation_from_document(variant: &Variant, doc: &Document) -> VariantAnnotation {
    let mut annotation = VariantAnnotation::for_variant(variant);
    annotation.consequence_types = get_objects(doc, schema::CONSEQUENCE_TYPES)
        .map(|ct| ConsequenceType {
            gene_name: get_str(ct, schema::GENE_NAME).map(str::to_string),
            ensembl_gene_id: get_str(ct, schema::ENSEMBL_GENE_ID).map(str::to_string),
            ensembl_transcript_id: get_str(ct, schema::ENSEMBL_TRANSCRIPT_ID).map(str::to_string),
            biotype: get_str(ct, schema::BIOTYPE).map(str::to_string),
            so_accessions: get_path(ct, schema::SO_ACCESSION)
                .and_then(Value::as_array)
                .map(|so| so.iter().filter_map(as_i64).map(|n| n as u32).collect())
                .unwrap_or_default(),
            protein_substitution_scores: get_objects(ct, schema::PROTEIN_SUBSTITUTION_SCORE)
                .map(score_from_document)
                .collect(),
        })
        .collect();
    annotation.xrefs = get_objects(doc, schema::XREFS)
        .map(|x| Xref {
            id: get_str(x, schema::XREF_ID).unwrap_or_default().to_string(),
            source: get_str(x, schema::XREF_SOURCE).unwrap_or_default().to_string(),
        })
        .collect();
    annotation.population_frequencies = get_objects(doc, schema::POPULATION_FREQUENCIES)
        .map(|p| PopulationFrequency {
            study: get_str(p, schema::POP_STUDY).unwrap_or_default().to_string(),
            population: get_str(p, schema::POP_POPULATION).unwrap_or_default().to_string(),
            ref_allele_freq: get_f64(p, schema::POP_REF_FREQ).unwrap_or(0.0),
            alt_allele_freq: get_f64(p, schema::POP_ALT_FREQ).unwrap_or(0.0),
        })
        .collect();
    annotation.conservation = get_objects(doc, schema::CONSERVATION)
        .map(score_from_document)
        .collect();
    annotation
}
