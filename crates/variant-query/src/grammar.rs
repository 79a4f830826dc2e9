//! Filter value grammar.
//!
//! Every query param carries a raw string value. Values compose atoms with
//! a single operator:
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `A;B` | AND | `"sift<0.2;polyphen>0.8"` |
//! | `A,B` | OR | `"BRCA1,BRCA2"` |
//! | `key:value` | compound atom | `"1000G:EUR>0.01"` |
//! | `<`, `<=`, `>`, `>=`, `=`, `==`, `!=`, `~=` | comparator | `"<=0.05"` |
//! | `!atom` | negation | `"!study_2"` |
//!
//! Mixing `;` and `,` inside one value is rejected: there is no precedence
//! rule that would make `"A;B,C"` unambiguous.

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1},
    combinator::{rest, value},
    sequence::tuple,
    IResult,
};

use crate::error::{FilterError, FilterResult};

/// Separator for AND-composed values.
pub const AND: &str = ";";
/// Separator for OR-composed values.
pub const OR: &str = ",";
/// Separator between the key and the value of a compound atom.
pub const IS: &str = ":";
/// Negation prefix.
pub const NOT: &str = "!";
/// Sentinel value selecting every entity of a kind.
pub const ALL: &str = "ALL";
/// Sentinel value selecting no entity of a kind.
pub const NONE: &str = "NONE";

/// Logical operator joining the atoms of a composite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueryOperation {
    /// All atoms must hold (`;`).
    And,
    /// Any atom may hold (`,`).
    Or,
}

impl QueryOperation {
    /// Returns the separator used to join atoms for this operation.
    pub fn separator(self) -> &'static str {
        match self {
            QueryOperation::And => AND,
            QueryOperation::Or => OR,
        }
    }
}

impl fmt::Display for QueryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperation::And => write!(f, "AND"),
            QueryOperation::Or => write!(f, "OR"),
        }
    }
}

/// Classifies the operator of a raw value.
///
/// Returns `None` when the value is a single atom.
///
/// # Errors
///
/// [`FilterError::MixedOperators`] if both separators appear.
///
/// # Examples
///
/// ```rust
/// use variant_query::{check_operator, QueryOperation};
///
/// assert_eq!(check_operator("BRCA1,BRCA2").unwrap(), Some(QueryOperation::Or));
/// assert_eq!(check_operator("a;b").unwrap(), Some(QueryOperation::And));
/// assert_eq!(check_operator("BRCA1").unwrap(), None);
/// assert!(check_operator("a;b,c").is_err());
/// ```
pub fn check_operator(value: &str) -> FilterResult<Option<QueryOperation>> {
    let contains_and = value.contains(AND);
    let contains_or = value.contains(OR);
    match (contains_and, contains_or) {
        (true, true) => Err(FilterError::MixedOperators(value.to_string())),
        (true, false) => Ok(Some(QueryOperation::And)),
        (false, true) => Ok(Some(QueryOperation::Or)),
        (false, false) => Ok(None),
    }
}

/// Splits a raw value into its ordered atoms.
pub fn split_value(value: &str, operation: Option<QueryOperation>) -> Vec<&str> {
    match operation {
        None => vec![value],
        Some(op) => value.split(op.separator()).collect(),
    }
}

/// Joins atoms back into a raw value.
///
/// Several atoms with no operation are joined with OR.
pub fn join_values<S: AsRef<str>>(values: &[S], operation: Option<QueryOperation>) -> String {
    let separator = operation.unwrap_or(QueryOperation::Or).separator();
    values
        .iter()
        .map(|v| v.as_ref())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Returns true if the atom carries the negation prefix.
///
/// `!=` is a comparator, not a negation.
pub fn is_negated(atom: &str) -> bool {
    atom.starts_with(NOT) && !atom.starts_with("!=")
}

/// Removes the negation prefix, if any.
pub fn remove_negation(atom: &str) -> &str {
    if is_negated(atom) {
        &atom[NOT.len()..]
    } else {
        atom
    }
}

/// Returns true for the `ALL` / `NONE` sentinel values.
pub fn is_none_or_all(value: &str) -> bool {
    value == ALL || value == NONE
}

// ============================================================================
// Comparators
// ============================================================================

/// Comparison operator prefixing an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Comparator {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `=` or `==`
    Eq,
    /// `!=`
    Ne,
    /// `~=` pattern match
    Regex,
}

impl Comparator {
    /// Canonical textual form.
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Regex => "~=",
        }
    }

    /// Evaluates `lhs <op> rhs` numerically. `Regex` never holds here.
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
            Comparator::Regex => false,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparator {
    type Err = FilterError;

    fn from_str(s: &str) -> FilterResult<Self> {
        match comparator(s) {
            Ok(("", op)) => Ok(op),
            _ => Err(FilterError::UnknownValue {
                kind: "comparator",
                value: s.to_string(),
            }),
        }
    }
}

fn is_comparator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '!' | '~')
}

fn comparator(input: &str) -> IResult<&str, Comparator> {
    // Two-character operators first so "<=" is not read as "<".
    alt((
        value(Comparator::Le, tag("<=")),
        value(Comparator::Ge, tag(">=")),
        value(Comparator::Ne, tag("!=")),
        value(Comparator::Regex, tag("~=")),
        value(Comparator::Eq, tag("==")),
        value(Comparator::Lt, tag("<")),
        value(Comparator::Gt, tag(">")),
        value(Comparator::Eq, tag("=")),
    ))(input)
}

/// Strips an optional comparator prefix from an atom.
///
/// ```rust
/// use variant_query::{strip_comparator, Comparator};
///
/// assert_eq!(strip_comparator("<=0.2"), (Some(Comparator::Le), "0.2"));
/// assert_eq!(strip_comparator("0.2"), (None, "0.2"));
/// ```
pub fn strip_comparator(atom: &str) -> (Option<Comparator>, &str) {
    match comparator(atom) {
        Ok((operand, op)) => (Some(op), operand),
        Err(_) => (None, atom),
    }
}

/// Splits the leading identifier of an atom from the rest.
///
/// The key is everything before the first comparator character; the rest
/// starts with the comparator (or is empty when there is none).
///
/// ```rust
/// use variant_query::split_key_value;
///
/// assert_eq!(split_key_value("sift<=0.2"), ("sift", "<=0.2"));
/// assert_eq!(split_key_value("1000G:EUR>0.01"), ("1000G:EUR", ">0.01"));
/// assert_eq!(split_key_value("BRCA2"), ("BRCA2", ""));
/// ```
pub fn split_key_value(atom: &str) -> (&str, &str) {
    match atom.find(is_comparator_char) {
        Some(idx) => (&atom[..idx], &atom[idx..]),
        None => (atom, ""),
    }
}

/// A `key<op>operand` atom, e.g. `sift<=0.2`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyedComparison {
    /// Leading identifier (source, cohort, `study:population`, genotype...).
    pub key: String,
    /// Comparison operator.
    pub comparator: Comparator,
    /// Right-hand side, unparsed.
    pub operand: String,
}

impl KeyedComparison {
    /// Parses the operand as a floating point number.
    pub fn numeric_operand(&self) -> FilterResult<f64> {
        parse_number(&self.operand)
    }
}

impl fmt::Display for KeyedComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, self.comparator, self.operand)
    }
}

fn keyed_comparison(input: &str) -> IResult<&str, (&str, Comparator, &str)> {
    tuple((take_till1(is_comparator_char), comparator, rest))(input)
}

/// Parses a `key<op>operand` atom.
///
/// # Errors
///
/// [`FilterError::Malformed`] when the key, the comparator or the operand is
/// missing.
pub fn parse_keyed_comparison(param: &str, atom: &str) -> FilterResult<KeyedComparison> {
    match keyed_comparison(atom) {
        Ok((_, (key, comparator, operand))) if !operand.is_empty() => Ok(KeyedComparison {
            key: key.to_string(),
            comparator,
            operand: operand.to_string(),
        }),
        _ => Err(FilterError::malformed(
            param,
            atom,
            "expected '<key><operator><value>'",
        )),
    }
}

/// Parses a floating point operand.
pub fn parse_number(operand: &str) -> FilterResult<f64> {
    operand
        .trim()
        .parse::<f64>()
        .map_err(|_| FilterError::InvalidNumber(operand.to_string()))
}

// ============================================================================
// Typed intermediate value
// ============================================================================

/// A raw value split into its operator and atoms.
///
/// Parsing once up front keeps every compilation step working on the same
/// split, and `Display` rejoins it with the original separator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterValue {
    /// Operator joining the atoms (`None` for a single atom).
    pub operation: Option<QueryOperation>,
    /// Ordered atoms.
    pub atoms: Vec<String>,
}

impl FilterValue {
    /// Creates a value from already split atoms.
    pub fn new(operation: Option<QueryOperation>, atoms: Vec<String>) -> Self {
        let operation = if atoms.len() > 1 {
            Some(operation.unwrap_or(QueryOperation::Or))
        } else {
            operation
        };
        Self { operation, atoms }
    }

    /// Parses a raw value.
    ///
    /// # Errors
    ///
    /// Mixed operators or empty atoms.
    pub fn parse(value: &str) -> FilterResult<Self> {
        let operation = check_operator(value)?;
        let atoms = split_value(value, operation);
        if atoms.iter().any(|atom| atom.is_empty()) {
            return Err(FilterError::EmptyAtom(value.to_string()));
        }
        Ok(Self {
            operation,
            atoms: atoms.into_iter().map(str::to_string).collect(),
        })
    }

    /// Number of atoms.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Returns true if there are no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Returns true if the atoms are AND-composed.
    pub fn is_and(&self) -> bool {
        self.operation == Some(QueryOperation::And)
    }

    /// Iterates over the atoms.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.atoms.iter().map(String::as_str)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_values(&self.atoms, self.operation))
    }
}

impl FromStr for FilterValue {
    type Err = FilterError;

    fn from_str(s: &str) -> FilterResult<Self> {
        FilterValue::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod operators {
        use super::*;

        #[test]
        fn test_check_operator_single_atom() {
            assert_eq!(check_operator("BRCA2").unwrap(), None);
        }

        #[test]
        fn test_check_operator_or() {
            assert_eq!(check_operator("A,B,C").unwrap(), Some(QueryOperation::Or));
        }

        #[test]
        fn test_check_operator_and() {
            assert_eq!(check_operator("A;B").unwrap(), Some(QueryOperation::And));
        }

        #[test]
        fn test_check_operator_mixed_is_rejected() {
            let err = check_operator("A;B,C").unwrap_err();
            assert_eq!(err, FilterError::MixedOperators("A;B,C".to_string()));
            // Order of atoms does not change the outcome
            assert!(check_operator("C,A;B").is_err());
        }

        #[test]
        fn test_split_and_join_round_trip() {
            for raw in ["A", "A,B,C", "x<1;y>2", "1000G:EUR>0.01,ESP:AFR<0.2"] {
                let op = check_operator(raw).unwrap();
                let atoms = split_value(raw, op);
                assert_eq!(join_values(&atoms, op), raw);
            }
        }

        #[test]
        fn test_join_without_operation_defaults_to_or() {
            assert_eq!(join_values(&["a", "b"], None), "a,b");
            assert_eq!(join_values(&["a"], None), "a");
        }

        #[test]
        fn test_negation() {
            assert!(is_negated("!study1"));
            assert!(!is_negated("!=3"));
            assert!(!is_negated("study1"));
            assert_eq!(remove_negation("!study1"), "study1");
            assert_eq!(remove_negation("study1"), "study1");
        }

        #[test]
        fn test_none_or_all() {
            assert!(is_none_or_all("ALL"));
            assert!(is_none_or_all("NONE"));
            assert!(!is_none_or_all("all"));
        }
    }

    mod comparators {
        use super::*;

        #[test]
        fn test_strip_every_comparator() {
            let cases = [
                ("<1", Comparator::Lt),
                ("<=1", Comparator::Le),
                (">1", Comparator::Gt),
                (">=1", Comparator::Ge),
                ("=1", Comparator::Eq),
                ("==1", Comparator::Eq),
                ("!=1", Comparator::Ne),
                ("~=1", Comparator::Regex),
            ];
            for (atom, expected) in cases {
                assert_eq!(strip_comparator(atom), (Some(expected), "1"), "{atom}");
            }
        }

        #[test]
        fn test_strip_without_comparator() {
            assert_eq!(strip_comparator("PASS"), (None, "PASS"));
        }

        #[test]
        fn test_comparator_from_str() {
            assert_eq!("<=".parse::<Comparator>().unwrap(), Comparator::Le);
            assert!("<>".parse::<Comparator>().is_err());
        }

        #[test]
        fn test_compare() {
            assert!(Comparator::Lt.compare(0.1, 0.2));
            assert!(!Comparator::Gt.compare(0.1, 0.2));
            assert!(Comparator::Ne.compare(1.0, 2.0));
            assert!(!Comparator::Regex.compare(1.0, 1.0));
        }
    }

    mod keyed {
        use super::*;

        #[test]
        fn test_split_key_value() {
            assert_eq!(split_key_value("sift<=0.2"), ("sift", "<=0.2"));
            assert_eq!(split_key_value("ALL<0.3"), ("ALL", "<0.3"));
            assert_eq!(split_key_value("sample_1"), ("sample_1", ""));
        }

        #[test]
        fn test_parse_keyed_comparison() {
            let kc = parse_keyed_comparison("annot-population-alt-frequency", "1000G:EUR>0.01").unwrap();
            assert_eq!(kc.key, "1000G:EUR");
            assert_eq!(kc.comparator, Comparator::Gt);
            assert_eq!(kc.numeric_operand().unwrap(), 0.01);
            assert_eq!(kc.to_string(), "1000G:EUR>0.01");
        }

        #[test]
        fn test_parse_keyed_comparison_missing_parts() {
            assert!(parse_keyed_comparison("sift", "<0.2").is_err());
            assert!(parse_keyed_comparison("sift", "sift").is_err());
            assert!(parse_keyed_comparison("sift", "sift<").is_err());
        }

        #[test]
        fn test_invalid_number() {
            let kc = parse_keyed_comparison("sift", "sift<abc").unwrap();
            assert_eq!(
                kc.numeric_operand().unwrap_err(),
                FilterError::InvalidNumber("abc".to_string())
            );
        }
    }

    mod filter_value {
        use super::*;

        #[test]
        fn test_parse_and_display() {
            let value = FilterValue::parse("sift<0.2;polyphen>0.9").unwrap();
            assert!(value.is_and());
            assert_eq!(value.len(), 2);
            assert_eq!(value.to_string(), "sift<0.2;polyphen>0.9");
        }

        #[test]
        fn test_empty_atom_rejected() {
            assert_eq!(
                FilterValue::parse("A,,B").unwrap_err(),
                FilterError::EmptyAtom("A,,B".to_string())
            );
            assert!(FilterValue::parse("").is_err());
        }

        #[test]
        fn test_new_with_many_atoms_defaults_to_or() {
            let value = FilterValue::new(None, vec!["a".into(), "b".into()]);
            assert_eq!(value.operation, Some(QueryOperation::Or));
            assert_eq!(value.to_string(), "a,b");
        }
    }
}
