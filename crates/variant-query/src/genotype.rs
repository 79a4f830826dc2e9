//! Genotype filter values: `sample:gt1,gt2;sample2:gt3`.

use std::fmt;

use tracing::warn;

use crate::grammar::{AND, IS, OR};

/// Homozygous reference genotype.
pub const HOM_REF: &str = "0/0";
/// Phased homozygous reference genotype.
pub const HOM_REF_PHASED: &str = "0|0";
/// Heterozygous genotype.
pub const HET: &str = "0/1";
/// Homozygous alternate genotype.
pub const HOM_ALT: &str = "1/1";
/// Genotype reported for samples with no information.
pub const UNKNOWN_GENOTYPE: &str = "?/?";

/// Returns true for unphased or phased `0/0`.
pub fn is_hom_ref(genotype: &str) -> bool {
    genotype == HOM_REF || genotype == HOM_REF_PHASED
}

/// One per-sample clause of a genotype filter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenotypeClause {
    /// Sample name or id.
    pub sample: String,
    /// Accepted genotypes, OR-combined.
    pub genotypes: Vec<String>,
}

impl GenotypeClause {
    /// Creates a clause.
    pub fn new<S: Into<String>>(sample: impl Into<String>, genotypes: impl IntoIterator<Item = S>) -> Self {
        Self {
            sample: sample.into(),
            genotypes: genotypes.into_iter().map(Into::into).collect(),
        }
    }

    fn parse(clause: &str) -> Option<Self> {
        let parts: Vec<&str> = clause.split(IS).collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return None;
        }
        let genotypes: Vec<String> = parts[1].split(OR).map(str::to_string).collect();
        if genotypes.iter().any(String::is_empty) {
            return None;
        }
        Some(Self {
            sample: parts[0].to_string(),
            genotypes,
        })
    }
}

impl fmt::Display for GenotypeClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.sample, IS, self.genotypes.join(OR))
    }
}

/// AND-joined list of per-sample genotype clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenotypeFilter {
    /// Clauses in input order.
    pub clauses: Vec<GenotypeClause>,
}

impl GenotypeFilter {
    /// Parses a genotype filter. Malformed clauses are skipped.
    ///
    /// ```rust
    /// use variant_query::GenotypeFilter;
    ///
    /// let filter = GenotypeFilter::parse("NA001:0/1,1/1;NA002:0/0");
    /// assert_eq!(filter.clauses.len(), 2);
    /// assert_eq!(filter.clauses[0].genotypes, vec!["0/1", "1/1"]);
    /// ```
    pub fn parse(value: &str) -> Self {
        let clauses = value
            .split(AND)
            .filter_map(|clause| {
                let parsed = GenotypeClause::parse(clause);
                if parsed.is_none() {
                    warn!(clause, "Skipping malformed genotype clause");
                }
                parsed
            })
            .collect();
        Self { clauses }
    }

    /// Adds a clause.
    pub fn push(&mut self, clause: GenotypeClause) {
        self.clauses.push(clause);
    }

    /// Returns true if there are no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for GenotypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&clauses.join(AND))
    }
}

impl FromIterator<GenotypeClause> for GenotypeFilter {
    fn from_iter<I: IntoIterator<Item = GenotypeClause>>(iter: I) -> Self {
        Self {
            clauses: iter.into_iter().collect(),
        }
    }
}
