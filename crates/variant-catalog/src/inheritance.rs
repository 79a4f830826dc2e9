//! Modes of inheritance and the genotypes they imply.
//!
//! Given a [`Pedigree`] built for one phenotype, each mode assigns every
//! member the set of genotypes compatible with their affection status.
//! The resolver turns those sets into a genotype filter.
//!
//! | Mode | Affected | Unaffected |
//! |------|----------|------------|
//! | monoallelic | `0/1` | `0/0` |
//! | monoallelic, incomplete penetrance | `0/1` | `0/0`, `0/1` |
//! | biallelic | `1/1` | `0/1` if parent of an affected child, else `0/0`, `0/1` |
//! | biallelic, incomplete penetrance | `1/1` | `0/0`, `0/1`, `1/1` |
//!
//! X-linked modes treat males as hemizygous (`1`, or `1/1` as some callers
//! report it). Y-linked mode constrains males only.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use variant_query::{HET, HOM_ALT, HOM_REF};

use crate::error::{CatalogQueryError, CatalogResult};
use crate::pedigree::{Member, Pedigree};
use crate::traits::Sex;

const HEMI_REF: &str = "0";
const HEMI_ALT: &str = "1";

const ACCEPTED: &str = "monoallelic, monoallelicIncompletePenetrance, biallelic, \
                        biallelicIncompletePenetrance, XlinkedMonoallelic, XlinkedBiallelic, Ylinked";

/// A Mendelian inheritance pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeOfInheritance {
    /// Autosomal dominant.
    Monoallelic,
    /// Autosomal dominant, unaffected carriers allowed.
    MonoallelicIncompletePenetrance,
    /// Autosomal recessive.
    Biallelic,
    /// Autosomal recessive, unaffected homozygotes allowed.
    BiallelicIncompletePenetrance,
    /// X-linked dominant.
    XLinkedMonoallelic,
    /// X-linked recessive.
    XLinkedBiallelic,
    /// Y-linked.
    YLinked,
}

impl ModeOfInheritance {
    /// Every mode.
    pub const ALL: &'static [ModeOfInheritance] = &[
        ModeOfInheritance::Monoallelic,
        ModeOfInheritance::MonoallelicIncompletePenetrance,
        ModeOfInheritance::Biallelic,
        ModeOfInheritance::BiallelicIncompletePenetrance,
        ModeOfInheritance::XLinkedMonoallelic,
        ModeOfInheritance::XLinkedBiallelic,
        ModeOfInheritance::YLinked,
    ];

    /// Query name of the mode.
    pub fn name(self) -> &'static str {
        match self {
            ModeOfInheritance::Monoallelic => "monoallelic",
            ModeOfInheritance::MonoallelicIncompletePenetrance => "monoallelicIncompletePenetrance",
            ModeOfInheritance::Biallelic => "biallelic",
            ModeOfInheritance::BiallelicIncompletePenetrance => "biallelicIncompletePenetrance",
            ModeOfInheritance::XLinkedMonoallelic => "XlinkedMonoallelic",
            ModeOfInheritance::XLinkedBiallelic => "XlinkedBiallelic",
            ModeOfInheritance::YLinked => "Ylinked",
        }
    }

    /// Unphased genotypes compatible with each member, keyed by individual id.
    ///
    /// Members the mode says nothing about (females for Y-linked) are left
    /// out.
    pub fn genotypes(self, pedigree: &Pedigree) -> BTreeMap<String, Vec<String>> {
        pedigree
            .members()
            .filter_map(|member| {
                let genotypes = self.member_genotypes(pedigree, member);
                if genotypes.is_empty() {
                    None
                } else {
                    Some((member.id.clone(), genotypes.iter().map(|g| g.to_string()).collect()))
                }
            })
            .collect()
    }

    /// Like [`genotypes`](Self::genotypes), with the phased form of every
    /// diploid genotype appended (`0/1` adds `0|1` and `1|0`).
    pub fn genotypes_with_phased(self, pedigree: &Pedigree) -> BTreeMap<String, Vec<String>> {
        self.genotypes(pedigree)
            .into_iter()
            .map(|(id, genotypes)| (id, with_phased(&genotypes)))
            .collect()
    }

    fn member_genotypes(self, pedigree: &Pedigree, member: &Member) -> Vec<&'static str> {
        let affected = member.affected;
        match self {
            ModeOfInheritance::Monoallelic => {
                if affected {
                    vec![HET]
                } else {
                    vec![HOM_REF]
                }
            }
            ModeOfInheritance::MonoallelicIncompletePenetrance => {
                if affected {
                    vec![HET]
                } else {
                    vec![HOM_REF, HET]
                }
            }
            ModeOfInheritance::Biallelic => {
                if affected {
                    vec![HOM_ALT]
                } else if pedigree.has_affected_child(&member.id) {
                    vec![HET]
                } else {
                    vec![HOM_REF, HET]
                }
            }
            ModeOfInheritance::BiallelicIncompletePenetrance => {
                if affected {
                    vec![HOM_ALT]
                } else {
                    vec![HOM_REF, HET, HOM_ALT]
                }
            }
            ModeOfInheritance::XLinkedMonoallelic => {
                let male = if affected { vec![HEMI_ALT, HOM_ALT] } else { vec![HEMI_REF, HOM_REF] };
                let female = if affected { vec![HET, HOM_ALT] } else { vec![HOM_REF] };
                by_sex(member.sex, male, female)
            }
            ModeOfInheritance::XLinkedBiallelic => {
                let male = if affected { vec![HEMI_ALT, HOM_ALT] } else { vec![HEMI_REF, HOM_REF] };
                let female = if affected {
                    vec![HOM_ALT]
                } else if pedigree.has_affected_child(&member.id) {
                    vec![HET]
                } else {
                    vec![HOM_REF, HET]
                };
                by_sex(member.sex, male, female)
            }
            ModeOfInheritance::YLinked => match member.sex {
                Sex::Male if affected => vec![HEMI_ALT, HOM_ALT],
                Sex::Male => vec![HEMI_REF, HOM_REF],
                Sex::Female | Sex::Unknown => Vec::new(),
            },
        }
    }
}

fn by_sex(sex: Sex, male: Vec<&'static str>, female: Vec<&'static str>) -> Vec<&'static str> {
    match sex {
        Sex::Male => male,
        Sex::Female => female,
        Sex::Unknown => {
            let mut both = male;
            for gt in female {
                if !both.contains(&gt) {
                    both.push(gt);
                }
            }
            both
        }
    }
}

fn with_phased(genotypes: &[String]) -> Vec<String> {
    let mut out = genotypes.to_vec();
    for gt in genotypes {
        let Some((a, b)) = gt.split_once('/') else {
            continue;
        };
        for phased in [format!("{}|{}", a, b), format!("{}|{}", b, a)] {
            if !out.contains(&phased) {
                out.push(phased);
            }
        }
    }
    out
}

impl fmt::Display for ModeOfInheritance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModeOfInheritance {
    type Err = CatalogQueryError;

    fn from_str(s: &str) -> CatalogResult<Self> {
        match s {
            "MONOALLELIC" | "monoallelic" | "dominant" => Ok(ModeOfInheritance::Monoallelic),
            "MONOALLELIC_INCOMPLETE_PENETRANCE" | "monoallelicIncompletePenetrance" => {
                Ok(ModeOfInheritance::MonoallelicIncompletePenetrance)
            }
            "BIALLELIC" | "biallelic" | "recessive" | "recesive" => Ok(ModeOfInheritance::Biallelic),
            "BIALLELIC_INCOMPLETE_PENETRANCE" | "biallelicIncompletePenetrance" => {
                Ok(ModeOfInheritance::BiallelicIncompletePenetrance)
            }
            "XLINKED_MONOALLELIC" | "XlinkedMonoallelic" => Ok(ModeOfInheritance::XLinkedMonoallelic),
            "XLINKED_BIALLELIC" | "XlinkedBiallelic" => Ok(ModeOfInheritance::XLinkedBiallelic),
            "YLINKED" | "Ylinked" => Ok(ModeOfInheritance::YLinked),
            _ => Err(CatalogQueryError::malformed(
                variant_query::QueryParam::ModeOfInheritance.key(),
                s,
                format!("accepted values: [{}]", ACCEPTED),
            )),
        }
    }
}
