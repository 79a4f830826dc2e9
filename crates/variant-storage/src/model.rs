//! Typed variant models.
//!
//! These are the values callers read from and write to the store. The
//! document layout they map to is described in [`crate::schema`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

// ============================================================================
// Variant
// ============================================================================

/// Broad classification of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantType {
    /// Single nucleotide variant.
    Snv,
    /// Multi nucleotide variant.
    Mnv,
    /// Insertion or deletion.
    Indel,
    /// Structural variant.
    Sv,
    /// Copy number variant.
    Cnv,
    /// Symbolic allele (`<DEL>`, `<INS>`...).
    Symbolic,
    /// Reference call, no alternate.
    NoVariation,
}

impl VariantType {
    /// Stored name.
    pub fn as_str(self) -> &'static str {
        match self {
            VariantType::Snv => "SNV",
            VariantType::Mnv => "MNV",
            VariantType::Indel => "INDEL",
            VariantType::Sv => "SV",
            VariantType::Cnv => "CNV",
            VariantType::Symbolic => "SYMBOLIC",
            VariantType::NoVariation => "NO_VARIATION",
        }
    }

    /// Infers the type from the alleles.
    pub fn infer(reference: &str, alternate: &str) -> Self {
        if (alternate.is_empty() && reference.is_empty()) || alternate == "." {
            return VariantType::NoVariation;
        }
        if alternate.starts_with('<') {
            return if alternate.starts_with("<CN") {
                VariantType::Cnv
            } else {
                VariantType::Symbolic
            };
        }
        match (reference.len(), alternate.len()) {
            (1, 1) => VariantType::Snv,
            (r, a) if r == a => VariantType::Mnv,
            (r, a) if r.abs_diff(a) >= 50 => VariantType::Sv,
            _ => VariantType::Indel,
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SNV" | "SNP" => Ok(VariantType::Snv),
            "MNV" | "MNP" => Ok(VariantType::Mnv),
            "INDEL" => Ok(VariantType::Indel),
            "SV" => Ok(VariantType::Sv),
            "CNV" => Ok(VariantType::Cnv),
            "SYMBOLIC" => Ok(VariantType::Symbolic),
            "NO_VARIATION" => Ok(VariantType::NoVariation),
            _ => Err(StorageError::malformed("type", s, "unknown variant type")),
        }
    }
}

/// A variant with its per-study data, stats and annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Chromosome name.
    pub chromosome: String,
    /// 1-based start.
    pub start: u32,
    /// 1-based inclusive end.
    pub end: u32,
    /// Reference allele.
    pub reference: String,
    /// Alternate allele.
    pub alternate: String,
    /// Variant type.
    pub variant_type: VariantType,
    /// External ids such as rs numbers.
    pub ids: Vec<String>,
    /// One entry per study holding data for this variant.
    pub studies: Vec<StudyEntry>,
    /// Per cohort statistics.
    pub stats: Vec<CohortStats>,
    /// Functional annotation.
    pub annotation: Option<VariantAnnotation>,
}

impl Variant {
    /// Creates a variant, deriving the end coordinate and type from the alleles.
    pub fn new(
        chromosome: impl Into<String>,
        start: u32,
        reference: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        let reference = reference.into();
        let alternate = alternate.into();
        let end = start + (reference.len().max(1) as u32) - 1;
        Self {
            chromosome: chromosome.into(),
            start,
            end,
            variant_type: VariantType::infer(&reference, &alternate),
            reference,
            alternate,
            ids: Vec::new(),
            studies: Vec::new(),
            stats: Vec::new(),
            annotation: None,
        }
    }

    /// Adds an external id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    /// Adds a study entry.
    pub fn with_study(mut self, study: StudyEntry) -> Self {
        self.studies.push(study);
        self
    }

    /// Sets the annotation.
    pub fn with_annotation(mut self, annotation: VariantAnnotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Allele length used for the `len` field.
    pub fn length(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Study entry for a study id.
    pub fn study(&self, study_id: i32) -> Option<&StudyEntry> {
        self.studies.iter().find(|s| s.study_id == study_id)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome, self.start, self.reference, self.alternate
        )
    }
}

// ============================================================================
// Study entries
// ============================================================================

/// A file that contributed data to a study entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileEntry {
    /// Numeric file id.
    pub file_id: i32,
    /// Free-form attributes (QUAL, FILTER...).
    pub attributes: BTreeMap<String, String>,
}

impl FileEntry {
    /// Creates a file entry without attributes.
    pub fn new(file_id: i32) -> Self {
        Self {
            file_id,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Data of one study for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudyEntry {
    /// Numeric study id.
    pub study_id: i32,
    /// Contributing files.
    pub files: Vec<FileEntry>,
    /// Other alternates at this position.
    pub secondary_alternates: Vec<String>,
    /// Sample data format keys.
    pub format: Vec<String>,
    /// Genotype per sample name, in sample order.
    pub samples: IndexMap<String, String>,
}

impl StudyEntry {
    /// Creates an empty entry with the `GT` format.
    pub fn new(study_id: i32) -> Self {
        Self {
            study_id,
            format: vec!["GT".to_string()],
            ..Self::default()
        }
    }

    /// Adds a file.
    pub fn with_file(mut self, file: FileEntry) -> Self {
        self.files.push(file);
        self
    }

    /// Adds a sample genotype.
    pub fn with_sample(mut self, sample: impl Into<String>, genotype: impl Into<String>) -> Self {
        self.samples.insert(sample.into(), genotype.into());
        self
    }

    /// Genotype of a sample.
    pub fn genotype(&self, sample: &str) -> Option<&str> {
        self.samples.get(sample).map(String::as_str)
    }

    /// Returns true if one of the files has the given id.
    pub fn has_file(&self, file_id: i32) -> bool {
        self.files.iter().any(|f| f.file_id == file_id)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Allele and genotype statistics of one cohort.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantStats {
    /// Minor allele frequency.
    pub maf: f64,
    /// Minor genotype frequency.
    pub mgf: f64,
    /// Minor allele.
    pub maf_allele: Option<String>,
    /// Minor genotype.
    pub mgf_genotype: Option<String>,
    /// Number of missing alleles.
    pub missing_alleles: u32,
    /// Number of missing genotypes.
    pub missing_genotypes: u32,
    /// Count per genotype.
    pub genotype_counts: BTreeMap<String, u32>,
}

/// Stats of a cohort as stored on a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    /// Study id.
    pub study_id: i32,
    /// Cohort id.
    pub cohort_id: i32,
    /// The stats.
    pub stats: VariantStats,
}

/// Freshly computed stats for one variant, keyed by cohort name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStatsUpdate {
    /// Chromosome.
    pub chromosome: String,
    /// Start.
    pub start: u32,
    /// Reference allele.
    pub reference: String,
    /// Alternate allele.
    pub alternate: String,
    /// Stats per cohort name.
    pub cohort_stats: BTreeMap<String, VariantStats>,
}

impl VariantStatsUpdate {
    /// Creates an empty update for a variant.
    pub fn new(variant: &Variant) -> Self {
        Self {
            chromosome: variant.chromosome.clone(),
            start: variant.start,
            reference: variant.reference.clone(),
            alternate: variant.alternate.clone(),
            cohort_stats: BTreeMap::new(),
        }
    }

    /// Adds stats of a cohort.
    pub fn with_cohort(mut self, cohort: impl Into<String>, stats: VariantStats) -> Self {
        self.cohort_stats.insert(cohort.into(), stats);
        self
    }
}

// ============================================================================
// Annotation
// ============================================================================

/// A scored prediction or conservation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Source, e.g. `sift`, `polyphen`, `phylop`.
    pub source: String,
    /// Numeric score.
    pub score: f64,
    /// Optional textual classification.
    pub description: Option<String>,
}

impl Score {
    /// Creates a score without description.
    pub fn new(source: impl Into<String>, score: f64) -> Self {
        Self {
            source: source.into(),
            score,
            description: None,
        }
    }
}

/// Effect of the variant on one transcript.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsequenceType {
    /// Gene name.
    pub gene_name: Option<String>,
    /// Ensembl gene id.
    pub ensembl_gene_id: Option<String>,
    /// Ensembl transcript id.
    pub ensembl_transcript_id: Option<String>,
    /// Transcript biotype.
    pub biotype: Option<String>,
    /// Sequence ontology accessions, without the `SO:` prefix.
    pub so_accessions: Vec<u32>,
    /// Protein substitution scores (SIFT, PolyPhen).
    pub protein_substitution_scores: Vec<Score>,
}

/// External cross reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xref {
    /// Identifier.
    pub id: String,
    /// Source database.
    pub source: String,
}

/// Allele frequency in a reference population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationFrequency {
    /// Study, e.g. `1000GENOMES_PHASE_3`.
    pub study: String,
    /// Population, e.g. `EUR`.
    pub population: String,
    /// Reference allele frequency.
    pub ref_allele_freq: f64,
    /// Alternate allele frequency.
    pub alt_allele_freq: f64,
}

/// Functional annotation of a variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariantAnnotation {
    /// Chromosome of the annotated variant.
    pub chromosome: String,
    /// Start of the annotated variant.
    pub start: u32,
    /// Reference allele of the annotated variant.
    pub reference: String,
    /// Alternate allele of the annotated variant.
    pub alternate: String,
    /// Consequence types.
    pub consequence_types: Vec<ConsequenceType>,
    /// Cross references.
    pub xrefs: Vec<Xref>,
    /// Population frequencies.
    pub population_frequencies: Vec<PopulationFrequency>,
    /// Conservation scores.
    pub conservation: Vec<Score>,
}

impl VariantAnnotation {
    /// Creates an empty annotation for a variant.
    pub fn for_variant(variant: &Variant) -> Self {
        Self {
            chromosome: variant.chromosome.clone(),
            start: variant.start,
            reference: variant.reference.clone(),
            alternate: variant.alternate.clone(),
            ..Self::default()
        }
    }

    /// Annotation id, `chr:start:ref:alt`.
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.chromosome, self.start, self.reference, self.alternate
        )
    }
}

// ============================================================================
// Study configuration
// ============================================================================

/// Attribute holding the genotype assumed for samples without explicit call.
pub const DEFAULT_GENOTYPE_ATTRIBUTE: &str = "defaultGenotype";

/// Storage-side metadata of a study: numeric ids of its files, samples and
/// cohorts, and what has been loaded so far.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudyConfiguration {
    /// Numeric study id.
    pub study_id: i32,
    /// Study name.
    pub study_name: String,
    /// File name to id.
    pub file_ids: BTreeMap<String, i32>,
    /// Sample name to id.
    pub sample_ids: BTreeMap<String, i32>,
    /// Cohort name to id.
    pub cohort_ids: BTreeMap<String, i32>,
    /// Cohort id to sample ids.
    pub cohorts: BTreeMap<i32, BTreeSet<i32>>,
    /// File id to its samples, in file order.
    pub samples_in_files: BTreeMap<i32, Vec<i32>>,
    /// Files whose data is loaded.
    pub indexed_files: BTreeSet<i32>,
    /// Free-form attributes.
    pub attributes: BTreeMap<String, String>,
}

impl StudyConfiguration {
    /// Creates an empty configuration.
    pub fn new(study_id: i32, study_name: impl Into<String>) -> Self {
        Self {
            study_id,
            study_name: study_name.into(),
            ..Self::default()
        }
    }

    /// Registers a file with its samples. Sample ids are assigned in order.
    pub fn with_file<S: AsRef<str>>(mut self, file_name: &str, file_id: i32, samples: &[S]) -> Self {
        self.file_ids.insert(file_name.to_string(), file_id);
        let mut ids = Vec::with_capacity(samples.len());
        for sample in samples {
            let next = self.sample_ids.values().max().map_or(1, |m| m + 1);
            let id = *self
                .sample_ids
                .entry(sample.as_ref().to_string())
                .or_insert(next);
            ids.push(id);
        }
        self.samples_in_files.insert(file_id, ids);
        self
    }

    /// Registers a cohort.
    pub fn with_cohort(mut self, name: &str, cohort_id: i32, samples: impl IntoIterator<Item = i32>) -> Self {
        self.cohort_ids.insert(name.to_string(), cohort_id);
        self.cohorts.insert(cohort_id, samples.into_iter().collect());
        self
    }

    /// Marks a file as loaded.
    pub fn with_indexed_file(mut self, file_id: i32) -> Self {
        self.indexed_files.insert(file_id);
        self
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Genotype assumed for samples without an explicit call, if configured.
    pub fn default_genotype(&self) -> Option<&str> {
        self.attributes
            .get(DEFAULT_GENOTYPE_ATTRIBUTE)
            .map(String::as_str)
    }

    /// Sample name for an id.
    pub fn sample_name(&self, sample_id: i32) -> Option<&str> {
        self.sample_ids
            .iter()
            .find(|(_, id)| **id == sample_id)
            .map(|(name, _)| name.as_str())
    }

    /// Resolves a sample given by name or numeric id.
    pub fn resolve_sample(&self, sample: &str) -> Option<i32> {
        resolve_symbol(&self.sample_ids, sample)
    }

    /// Resolves a file given by name or numeric id.
    pub fn resolve_file(&self, file: &str) -> Option<i32> {
        resolve_symbol(&self.file_ids, file)
    }

    /// Resolves a cohort given by name or numeric id.
    pub fn resolve_cohort(&self, cohort: &str) -> Option<i32> {
        resolve_symbol(&self.cohort_ids, cohort)
    }

    /// Sample ids of the loaded files, in load order, without duplicates.
    pub fn indexed_samples(&self) -> Vec<i32> {
        let mut seen = BTreeSet::new();
        self.indexed_files
            .iter()
            .filter_map(|f| self.samples_in_files.get(f))
            .flatten()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

fn resolve_symbol(ids: &BTreeMap<String, i32>, symbol: &str) -> Option<i32> {
    if let Some(id) = ids.get(symbol) {
        return Some(*id);
    }
    symbol
        .parse::<i32>()
        .ok()
        .filter(|id| ids.values().any(|known| known == id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_new_derives_end_and_type() {
        let snv = Variant::new("1", 25000, "A", "T");
        assert_eq!(snv.end, 25000);
        assert_eq!(snv.variant_type, VariantType::Snv);

        let del = Variant::new("1", 60000, "ACGT", "A");
        assert_eq!(del.end, 60003);
        assert_eq!(del.variant_type, VariantType::Indel);
        assert_eq!(del.length(), 4);
    }

    #[test]
    fn test_variant_type_inference() {
        assert_eq!(VariantType::infer("AC", "GT"), VariantType::Mnv);
        assert_eq!(VariantType::infer("A", "<DEL>"), VariantType::Symbolic);
        assert_eq!(VariantType::infer("A", "<CN0>"), VariantType::Cnv);
        assert_eq!(VariantType::infer("A", "."), VariantType::NoVariation);
        assert_eq!(VariantType::infer("A", &"C".repeat(60)), VariantType::Sv);
    }

    #[test]
    fn test_variant_type_from_str() {
        assert_eq!("snv".parse::<VariantType>().unwrap(), VariantType::Snv);
        assert_eq!("SNP".parse::<VariantType>().unwrap(), VariantType::Snv);
        assert!("FOO".parse::<VariantType>().is_err());
    }

    #[test]
    fn test_variant_display() {
        assert_eq!(Variant::new("X", 100, "A", "G").to_string(), "X:100:A:G");
    }

    #[test]
    fn test_study_configuration_assigns_sample_ids() {
        let sc = StudyConfiguration::new(1, "s1")
            .with_file("a.vcf", 10, &["NA001", "NA002"])
            .with_file("b.vcf", 11, &["NA002", "NA003"])
            .with_indexed_file(10);
        assert_eq!(sc.sample_ids["NA001"], 1);
        assert_eq!(sc.sample_ids["NA003"], 3);
        assert_eq!(sc.samples_in_files[&11], vec![2, 3]);
        assert_eq!(sc.indexed_samples(), vec![1, 2]);
    }

    #[test]
    fn test_study_configuration_resolve() {
        let sc = StudyConfiguration::new(1, "s1")
            .with_file("a.vcf", 10, &["NA001"])
            .with_cohort("ALL", 0, [1]);
        assert_eq!(sc.resolve_sample("NA001"), Some(1));
        assert_eq!(sc.resolve_sample("1"), Some(1));
        assert_eq!(sc.resolve_sample("2"), None);
        assert_eq!(sc.resolve_file("a.vcf"), Some(10));
        assert_eq!(sc.resolve_cohort("ALL"), Some(0));
        assert_eq!(sc.sample_name(1), Some("NA001"));
    }

    #[test]
    fn test_default_genotype_attribute() {
        let sc = StudyConfiguration::new(1, "s1");
        assert_eq!(sc.default_genotype(), None);
        let sc = sc.with_attribute(DEFAULT_GENOTYPE_ATTRIBUTE, "?/?");
        assert_eq!(sc.default_genotype(), Some("?/?"));
    }

    #[test]
    fn test_annotation_id() {
        let v = Variant::new("2", 300, "C", "T");
        assert_eq!(VariantAnnotation::for_variant(&v).id(), "2:300:C:T");
    }
}
