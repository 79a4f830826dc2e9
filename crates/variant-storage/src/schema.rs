//! Document field table.
//!
//! Every field name of the stored variant document lives here. Converters,
//! the predicate compiler, the projection builder and the aggregation planner
//! all refer to these constants instead of spelling out paths.
//!
//! ```text
//! {
//!   _id, chromosome, start, end, ref, alt, type, len, ids: [..],
//!   _at: { chunkIds: [..] },
//!   studies: [ { sid, files: [ { fid, attrs } ], alts, fm, gt: { "0/1": [sampleId..] } } ],
//!   st: [ { sid, cid, maf, mgf, mafAl, mgfGt, missAl, missGt, numGt: { "0/1": n } } ],
//!   annot: [ { id, ct: [ { gn, ensg, enst, bt, so, sift, polyphen, ps_score } ],
//!              xrefs: [ { id, src } ], popFq: [ { study, pop, refFq, altFq } ], cr_score } ]
//! }
//! ```

// ============================================================================
// Variant document
// ============================================================================

/// Document id, the storage id of the variant.
pub const ID: &str = "_id";
/// Chromosome name.
pub const CHROMOSOME: &str = "chromosome";
/// 1-based start position.
pub const START: &str = "start";
/// 1-based inclusive end position.
pub const END: &str = "end";
/// Reference allele.
pub const REFERENCE: &str = "ref";
/// Alternate allele.
pub const ALTERNATE: &str = "alt";
/// Variant type name.
pub const TYPE: &str = "type";
/// Variant length.
pub const LENGTH: &str = "len";
/// Cross-reference ids (dbSNP and friends).
pub const IDS: &str = "ids";
/// Region index sub-document.
pub const AT: &str = "_at";
/// Chunk ids inside [`AT`].
pub const CHUNK_IDS: &str = "chunkIds";
/// Study entries array.
pub const STUDIES: &str = "studies";
/// Cohort stats array.
pub const STATS: &str = "st";
/// Annotation array (single slot).
pub const ANNOTATION: &str = "annot";

// ============================================================================
// Study entry
// ============================================================================

/// Study id inside a study entry.
pub const STUDY_ID: &str = "sid";
/// File entries array inside a study entry.
pub const FILES: &str = "files";
/// File id inside a file entry.
pub const FILE_ID: &str = "fid";
/// Free-form attributes of a file entry.
pub const FILE_ATTRIBUTES: &str = "attrs";
/// Secondary alternates of a study entry.
pub const ALTERNATES: &str = "alts";
/// Sample format descriptor.
pub const FORMAT: &str = "fm";
/// Genotype buckets: genotype -> sample ids.
pub const GENOTYPES: &str = "gt";

// ============================================================================
// Stats entry
// ============================================================================

/// Cohort id inside a stats entry.
pub const COHORT_ID: &str = "cid";
/// Minor allele frequency.
pub const MAF: &str = "maf";
/// Minor genotype frequency.
pub const MGF: &str = "mgf";
/// Minor allele.
pub const MAF_ALLELE: &str = "mafAl";
/// Minor genotype.
pub const MGF_GENOTYPE: &str = "mgfGt";
/// Missing allele count.
pub const MISSING_ALLELES: &str = "missAl";
/// Missing genotype count.
pub const MISSING_GENOTYPES: &str = "missGt";
/// Per genotype counts.
pub const NUM_GT: &str = "numGt";

// ============================================================================
// Annotation
// ============================================================================

/// Annotation id, present whenever the variant is annotated.
pub const ANNOT_ID: &str = "id";
/// Consequence types array.
pub const CONSEQUENCE_TYPES: &str = "ct";
/// Gene name.
pub const GENE_NAME: &str = "gn";
/// Ensembl gene id.
pub const ENSEMBL_GENE_ID: &str = "ensg";
/// Ensembl transcript id.
pub const ENSEMBL_TRANSCRIPT_ID: &str = "enst";
/// Transcript biotype.
pub const BIOTYPE: &str = "bt";
/// Sequence ontology accessions, as integers.
pub const SO_ACCESSION: &str = "so";
/// SIFT score sub-document.
pub const SIFT: &str = "sift";
/// PolyPhen score sub-document.
pub const POLYPHEN: &str = "polyphen";
/// Protein substitution scores array.
pub const PROTEIN_SUBSTITUTION_SCORE: &str = "ps_score";
/// Score value.
pub const SCORE: &str = "sc";
/// Score source.
pub const SCORE_SOURCE: &str = "src";
/// Score description.
pub const SCORE_DESCRIPTION: &str = "desc";
/// Cross references array.
pub const XREFS: &str = "xrefs";
/// Cross reference id.
pub const XREF_ID: &str = "id";
/// Cross reference source.
pub const XREF_SOURCE: &str = "src";
/// Population frequencies array.
pub const POPULATION_FREQUENCIES: &str = "popFq";
/// Study of a population frequency.
pub const POP_STUDY: &str = "study";
/// Population name.
pub const POP_POPULATION: &str = "pop";
/// Reference allele frequency.
pub const POP_REF_FREQ: &str = "refFq";
/// Alternate allele frequency.
pub const POP_ALT_FREQ: &str = "altFq";
/// Conservation scores array.
pub const CONSERVATION: &str = "cr_score";

/// Joins path segments with `.`.
pub fn path(segments: &[&str]) -> String {
    segments.join(".")
}

// ============================================================================
// User facing field names
// ============================================================================

/// Top-level fields a caller can include or exclude.
///
/// Each variant has a user facing name (the one accepted in
/// `QueryOptions::include`/`exclude`) and the stored field it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantField {
    /// `chromosome`
    Chromosome,
    /// `start`
    Start,
    /// `end`
    End,
    /// `reference`
    Reference,
    /// `alternate`
    Alternate,
    /// `type`
    Type,
    /// `length`
    Length,
    /// `ids`
    Ids,
    /// `studies`
    Studies,
    /// `stats`
    Stats,
    /// `annotation`
    Annotation,
}

impl VariantField {
    /// All projectable fields, in document order.
    pub const ALL: &'static [VariantField] = &[
        VariantField::Chromosome,
        VariantField::Start,
        VariantField::End,
        VariantField::Reference,
        VariantField::Alternate,
        VariantField::Type,
        VariantField::Length,
        VariantField::Ids,
        VariantField::Studies,
        VariantField::Stats,
        VariantField::Annotation,
    ];

    /// Name accepted from callers.
    pub fn name(self) -> &'static str {
        match self {
            VariantField::Chromosome => "chromosome",
            VariantField::Start => "start",
            VariantField::End => "end",
            VariantField::Reference => "reference",
            VariantField::Alternate => "alternate",
            VariantField::Type => "type",
            VariantField::Length => "length",
            VariantField::Ids => "ids",
            VariantField::Studies => "studies",
            VariantField::Stats => "stats",
            VariantField::Annotation => "annotation",
        }
    }

    /// Stored document field.
    pub fn document_field(self) -> &'static str {
        match self {
            VariantField::Chromosome => CHROMOSOME,
            VariantField::Start => START,
            VariantField::End => END,
            VariantField::Reference => REFERENCE,
            VariantField::Alternate => ALTERNATE,
            VariantField::Type => TYPE,
            VariantField::Length => LENGTH,
            VariantField::Ids => IDS,
            VariantField::Studies => STUDIES,
            VariantField::Stats => STATS,
            VariantField::Annotation => ANNOTATION,
        }
    }

    /// Looks up a caller supplied field name. A few legacy aliases are accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" | "ids" => Some(VariantField::Ids),
            "sourceEntries" | "studies" => Some(VariantField::Studies),
            "ref" => Some(VariantField::Reference),
            "alt" => Some(VariantField::Alternate),
            _ => Self::ALL.iter().copied().find(|f| f.name() == name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_join() {
        assert_eq!(path(&[ANNOTATION, CONSEQUENCE_TYPES, GENE_NAME]), "annot.ct.gn");
        assert_eq!(path(&[STUDIES, FILES, FILE_ID]), "studies.files.fid");
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in VariantField::ALL {
            assert_eq!(VariantField::from_name(field.name()), Some(*field));
        }
    }

    #[test]
    fn test_field_aliases() {
        assert_eq!(VariantField::from_name("sourceEntries"), Some(VariantField::Studies));
        assert_eq!(VariantField::from_name("id"), Some(VariantField::Ids));
        assert_eq!(VariantField::from_name("annotation").map(|f| f.document_field()), Some("annot"));
        assert_eq!(VariantField::from_name("unknown"), None);
    }
}
