//! Query and query options.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{FilterError, FilterResult};
use crate::grammar::{check_operator, split_value, FilterValue, OR};

macro_rules! query_params {
    ($( $(#[$doc:meta])* $variant:ident => $key:literal, )*) => {
        /// Every query param understood by the engine.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum QueryParam {
            $( $(#[$doc])* $variant, )*
        }

        impl QueryParam {
            /// All params, in declaration order.
            pub const ALL: &'static [QueryParam] = &[ $( QueryParam::$variant, )* ];

            /// Key used in a [`Query`].
            pub fn key(self) -> &'static str {
                match self {
                    $( QueryParam::$variant => $key, )*
                }
            }

            /// Looks a param up by key.
            pub fn from_key(key: &str) -> Option<Self> {
                match key {
                    $( $key => Some(QueryParam::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

query_params! {
    /// `chr:start-end` list.
    Region => "region",
    /// Variant ids or xrefs.
    Id => "id",
    /// Gene names.
    Gene => "gene",
    /// Chromosome names.
    Chromosome => "chromosome",
    /// Reference allele.
    Reference => "reference",
    /// Alternate allele.
    Alternate => "alternate",
    /// Variant type (SNV, INDEL, ...).
    Type => "type",
    /// Transcript biotype.
    AnnotBiotype => "annot-biotype",
    /// Consequence type (SO term or accession).
    AnnotConsequenceType => "annot-ct",
    /// Cross-reference id.
    AnnotXref => "annot-xref",
    /// `true` / `false`.
    AnnotationExists => "annotationExists",
    /// PolyPhen score shortcut: `<0.5`.
    Polyphen => "polyphen",
    /// SIFT score shortcut: `<0.2`.
    Sift => "sift",
    /// `source<op>score`.
    AnnotProteinSubstitution => "annot-protein-substitution",
    /// `source<op>score`.
    AnnotConservation => "annot-conservation",
    /// `study:population<op>frequency`.
    AnnotPopulationAltFrequency => "annot-population-alt-frequency",
    /// `study:population<op>frequency`.
    AnnotPopulationRefFrequency => "annot-population-ref-frequency",
    /// `cohort<op>maf`.
    StatsMaf => "maf",
    /// `cohort<op>mgf`.
    StatsMgf => "mgf",
    /// `cohort<op>count`.
    MissingAlleles => "missingAlleles",
    /// `cohort<op>count`.
    MissingGenotypes => "missingGenotypes",
    /// `genotype<op>count`.
    NumGt => "numGt",
    /// Free-text match over file attributes.
    FileAttributes => "fileAttributes",
    /// Study filter.
    Study => "study",
    /// Studies to return.
    IncludeStudy => "includeStudy",
    /// File filter.
    File => "file",
    /// Files to return.
    IncludeFile => "includeFile",
    /// Samples with a non-reference call.
    Sample => "sample",
    /// Samples to return.
    IncludeSample => "includeSample",
    /// `sample:gt1,gt2;sample2:gt3`.
    Genotype => "genotype",
    /// Cohort filter.
    Cohort => "cohort",
    /// Genotype reported for samples without a call.
    UnknownGenotype => "unknownGenotype",
    /// Release ceiling.
    Release => "release",
    /// Project owning the studies.
    Project => "project",
    /// Sample annotation expression.
    SampleAnnotation => "sampleAnnotation",
    /// Genotype applied to every sample matched by `sampleAnnotation`.
    SampleAnnotationGenotype => "sampleAnnotationGenotype",
    /// Family id.
    Family => "family",
    /// Phenotype used with `modeOfInheritance`.
    FamilyPhenotype => "familyPhenotype",
    /// Inheritance pattern.
    ModeOfInheritance => "modeOfInheritance",
    /// Disease panel id.
    Panel => "panel",
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for QueryParam {
    type Err = FilterError;

    fn from_str(s: &str) -> FilterResult<Self> {
        QueryParam::from_key(s).ok_or_else(|| FilterError::UnknownValue {
            kind: "query param",
            value: s.to_string(),
        })
    }
}

/// An insertion-ordered mapping of param key to raw value.
///
/// Keys are plain strings so unknown params survive a round trip; typed
/// access goes through [`QueryParam`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Query {
    params: IndexMap<String, String>,
}

impl Query {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a param, consuming and returning the query.
    pub fn with(mut self, param: QueryParam, value: impl Into<String>) -> Self {
        self.put(param, value);
        self
    }

    /// Sets a param, returning the previous value.
    pub fn put(&mut self, param: QueryParam, value: impl Into<String>) -> Option<String> {
        self.params.insert(param.key().to_string(), value.into())
    }

    /// Sets a param from a list of values, OR-joined.
    pub fn put_list<S: AsRef<str>>(&mut self, param: QueryParam, values: &[S]) -> Option<String> {
        let joined = values
            .iter()
            .map(|v| v.as_ref())
            .collect::<Vec<_>>()
            .join(OR);
        self.put(param, joined)
    }

    /// Raw value of a param.
    pub fn get(&self, param: QueryParam) -> Option<&str> {
        self.get_key(param.key())
    }

    /// Raw value by key.
    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns true if the param is present with a non-blank value.
    pub fn is_valid(&self, param: QueryParam) -> bool {
        self.get(param).is_some_and(|v| !v.trim().is_empty())
    }

    /// Removes a param, keeping the order of the others.
    pub fn remove(&mut self, param: QueryParam) -> Option<String> {
        self.params.shift_remove(param.key())
    }

    /// Value split into atoms by its operator.
    ///
    /// Returns an empty list for missing params.
    pub fn get_list(&self, param: QueryParam) -> FilterResult<Vec<String>> {
        match self.get(param) {
            Some(value) if !value.is_empty() => {
                let op = check_operator(value)?;
                Ok(split_value(value, op).into_iter().map(str::to_string).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Value parsed into a [`FilterValue`], if the param is valid.
    pub fn get_filter(&self, param: QueryParam) -> FilterResult<Option<FilterValue>> {
        if !self.is_valid(param) {
            return Ok(None);
        }
        self.get(param).map(FilterValue::parse).transpose()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keys that do not name a known [`QueryParam`].
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.params
            .keys()
            .map(String::as_str)
            .filter(|k| QueryParam::from_key(k).is_none())
            .collect()
    }

    /// Number of params.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if there are no params.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", pairs.join(", "))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Sort direction for aggregation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    #[default]
    Descending,
}

impl SortOrder {
    /// Store-native sort direction (`1` / `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

impl FromStr for SortOrder {
    type Err = FilterError;

    fn from_str(s: &str) -> FilterResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(SortOrder::Ascending),
            "desc" | "descending" | "-1" => Ok(SortOrder::Descending),
            _ => Err(FilterError::UnknownValue {
                kind: "sort order",
                value: s.to_string(),
            }),
        }
    }
}

/// Projection, paging and aggregation options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryOptions {
    /// Fields to return. Empty means all.
    pub include: Vec<String>,
    /// Fields to omit.
    pub exclude: Vec<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Results to skip.
    pub skip: Option<usize>,
    /// Sort by chromosome and start.
    pub sort: bool,
    /// Return counts instead of values in aggregations.
    pub count: bool,
    /// Aggregation sort order.
    pub order: SortOrder,
    /// Merge results of several queries into one.
    pub merge: bool,
    /// Cursor batch size hint.
    pub batch_size: Option<usize>,
}

impl QueryOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the included fields.
    pub fn with_include<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.include = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the excluded fields.
    pub fn with_exclude<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.exclude = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Enables sorting by position.
    pub fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Enables count mode.
    pub fn with_count(mut self, count: bool) -> Self {
        self.count = count;
        self
    }

    /// Sets the aggregation order.
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Enables result merging.
    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    /// Sets the cursor batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}
