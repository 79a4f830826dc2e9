//! Predicate tree over documents.
//!
//! A [`Predicate`] is what the query compiler produces and what a
//! [`DocumentStore`](crate::DocumentStore) consumes. It renders to the
//! store-native filter syntax with [`Predicate::to_json`] and can be evaluated
//! directly with [`Predicate::matches`].
//!
//! Conditions on a path that crosses arrays hold when *any* reached value
//! satisfies them. Negative conditions (`Ne`, `Nin`) hold when *none* do, so
//! a missing field satisfies them.

use std::fmt;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::document::{compare_same_type, get_path, resolve_path, values_equal, Document};

/// A condition applied to the values reached by a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equal to (or, for arrays, containing) the value.
    Eq(Value),
    /// Not equal to and not containing the value.
    Ne(Value),
    /// Equal to any of the values.
    In(Vec<Value>),
    /// Equal to none of the values.
    Nin(Vec<Value>),
    /// Array containing every value.
    All(Vec<Value>),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// String matching a regular expression.
    Regex(String),
    /// Field present or absent.
    Exists(bool),
    /// Some array element satisfies the nested predicate.
    ElemMatch(Box<Predicate>),
    /// Array of exactly this length.
    Size(usize),
    /// Negation of a condition.
    Not(Box<Condition>),
}

/// Boolean composition of field conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// All must hold. An empty list matches everything.
    And(Vec<Predicate>),
    /// Any must hold. An empty list matches nothing.
    Or(Vec<Predicate>),
    /// A condition on a dotted field path.
    Field {
        /// Dotted path.
        path: String,
        /// The condition.
        condition: Condition,
    },
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::And(Vec::new())
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Predicate {
    /// Predicate matching every document.
    pub fn all() -> Self {
        Predicate::And(Vec::new())
    }

    /// Condition on a field.
    pub fn field(path: impl Into<String>, condition: Condition) -> Self {
        Predicate::Field {
            path: path.into(),
            condition,
        }
    }

    /// `path == value`.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Eq(value.into()))
    }

    /// `path != value`.
    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, Condition::Ne(value.into()))
    }

    /// `path in values`.
    pub fn is_in<V: Into<Value>>(path: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::field(path, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    /// Some element of the array at `path` matches `inner`.
    pub fn elem_match(path: impl Into<String>, inner: Predicate) -> Self {
        Self::field(path, Condition::ElemMatch(Box::new(inner)))
    }

    /// Conjunction, flattening nested conjunctions and collapsing singletons.
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut flat = Vec::new();
        for p in predicates {
            match p {
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Predicate::And(flat)
        }
    }

    /// Disjunction, collapsing singletons.
    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut all: Vec<Predicate> = predicates.into_iter().collect();
        if all.len() == 1 {
            all.remove(0)
        } else {
            Predicate::Or(all)
        }
    }

    /// Returns true for the match-everything predicate.
    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::And(ps) if ps.is_empty())
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl Predicate {
    /// Evaluates the predicate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::And(ps) => ps.iter().all(|p| p.matches(doc)),
            Predicate::Or(ps) => ps.iter().any(|p| p.matches(doc)),
            Predicate::Field { path, condition } => condition.holds(&resolve_path(doc, path)),
        }
    }

    /// Evaluates against an arbitrary value; non-objects never match.
    pub fn matches_value(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|doc| self.matches(doc))
    }

    /// Value required for `path` by a top-level equality, if any.
    ///
    /// Used to seed upserted documents with the id they were filtered on.
    pub fn equality_value(&self, path: &str) -> Option<&Value> {
        match self {
            Predicate::Field {
                path: p,
                condition: Condition::Eq(v),
            } if p == path => Some(v),
            Predicate::And(ps) => ps.iter().find_map(|p| p.equality_value(path)),
            _ => None,
        }
    }

    /// Index of the first element of the array at `array_path` satisfying
    /// every condition this predicate places on that array's elements.
    ///
    /// This is what a positional `$` segment in an update refers to.
    pub fn positional_index(&self, doc: &Document, array_path: &str) -> Option<usize> {
        let mut element = Vec::new();
        self.collect_element_predicates(array_path, &mut element);
        if element.is_empty() {
            return None;
        }
        get_path(doc, array_path)?
            .as_array()?
            .iter()
            .position(|item| element.iter().all(|p| p.matches_value(item)))
    }

    fn collect_element_predicates(&self, array_path: &str, out: &mut Vec<Predicate>) {
        match self {
            Predicate::And(ps) => {
                for p in ps {
                    p.collect_element_predicates(array_path, out);
                }
            }
            Predicate::Field { path, condition } => {
                if path == array_path {
                    if let Condition::ElemMatch(inner) = condition {
                        out.push((**inner).clone());
                    }
                } else if let Some(rest) = path
                    .strip_prefix(array_path)
                    .and_then(|r| r.strip_prefix('.'))
                {
                    out.push(Predicate::field(rest, condition.clone()));
                }
            }
            Predicate::Or(_) => {}
        }
    }
}

fn candidates<'a>(reached: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
    reached.iter().flat_map(|v| {
        let members: Box<dyn Iterator<Item = &'a Value>> = match v {
            Value::Array(items) => Box::new(items.iter().chain(std::iter::once(*v))),
            _ => Box::new(std::iter::once(*v)),
        };
        members
    })
}

impl Condition {
    /// Evaluates the condition over the values a path reached.
    pub fn holds(&self, reached: &[&Value]) -> bool {
        match self {
            Condition::Eq(expected) => {
                (expected.is_null() && reached.is_empty())
                    || candidates(reached).any(|c| values_equal(c, expected))
            }
            Condition::Ne(expected) => !Condition::Eq(expected.clone()).holds(reached),
            Condition::In(values) => {
                candidates(reached).any(|c| values.iter().any(|v| values_equal(c, v)))
            }
            Condition::Nin(values) => !Condition::In(values.clone()).holds(reached),
            Condition::All(values) => {
                !values.is_empty()
                    && values
                        .iter()
                        .all(|v| candidates(reached).any(|c| values_equal(c, v)))
            }
            Condition::Lt(bound) => range(reached, bound, |o| o.is_lt()),
            Condition::Lte(bound) => range(reached, bound, |o| o.is_le()),
            Condition::Gt(bound) => range(reached, bound, |o| o.is_gt()),
            Condition::Gte(bound) => range(reached, bound, |o| o.is_ge()),
            Condition::Regex(pattern) => match Regex::new(pattern) {
                Ok(re) => candidates(reached)
                    .filter_map(Value::as_str)
                    .any(|s| re.is_match(s)),
                Err(_) => false,
            },
            Condition::Exists(expected) => !reached.is_empty() == *expected,
            Condition::ElemMatch(inner) => reached
                .iter()
                .filter_map(|v| v.as_array())
                .flatten()
                .any(|item| inner.matches_value(item)),
            Condition::Size(n) => reached
                .iter()
                .any(|v| v.as_array().is_some_and(|a| a.len() == *n)),
            Condition::Not(inner) => !inner.holds(reached),
        }
    }
}

fn range(reached: &[&Value], bound: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    candidates(reached).any(|c| compare_same_type(c, bound).is_some_and(&accept))
}

// ============================================================================
// Rendering
// ============================================================================

impl Condition {
    /// Store-native rendering of the condition.
    pub fn to_json(&self) -> Value {
        match self {
            Condition::Eq(v) => json!({ "$eq": v }),
            Condition::Ne(v) => json!({ "$ne": v }),
            Condition::In(vs) => json!({ "$in": vs }),
            Condition::Nin(vs) => json!({ "$nin": vs }),
            Condition::All(vs) => json!({ "$all": vs }),
            Condition::Lt(v) => json!({ "$lt": v }),
            Condition::Lte(v) => json!({ "$lte": v }),
            Condition::Gt(v) => json!({ "$gt": v }),
            Condition::Gte(v) => json!({ "$gte": v }),
            Condition::Regex(p) => json!({ "$regex": p }),
            Condition::Exists(b) => json!({ "$exists": b }),
            Condition::ElemMatch(p) => json!({ "$elemMatch": p.to_json() }),
            Condition::Size(n) => json!({ "$size": n }),
            Condition::Not(c) => json!({ "$not": c.to_json() }),
        }
    }
}

impl Predicate {
    /// Store-native rendering of the predicate.
    pub fn to_json(&self) -> Value {
        match self {
            Predicate::And(ps) if ps.is_empty() => Value::Object(Map::new()),
            Predicate::And(ps) => json!({ "$and": ps.iter().map(Predicate::to_json).collect::<Vec<_>>() }),
            Predicate::Or(ps) => json!({ "$or": ps.iter().map(Predicate::to_json).collect::<Vec<_>>() }),
            Predicate::Field { path, condition } => {
                let mut map = Map::new();
                map.insert(path.clone(), condition.to_json());
                Value::Object(map)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    fn variant_doc() -> Document {
        doc(json!({
            "_id": "1_0000025000_A_T",
            "chromosome": "1",
            "start": 25000,
            "type": "SNV",
            "ids": ["rs1"],
            "studies": [
                {"sid": 1, "files": [{"fid": 10}], "gt": {"0/1": [5], "1/1": [6]}},
                {"sid": 2, "files": [{"fid": 20}], "gt": {"0/1": [7]}}
            ],
            "annot": [{"ct": [{"gn": "BRCA2", "so": [1583, 1631], "sift": {"sc": 0.01}}]}]
        }))
    }

    mod evaluation {
        use super::*;

        #[test]
        fn test_eq_on_scalar_and_array() {
            let d = variant_doc();
            assert!(Predicate::eq("type", "SNV").matches(&d));
            assert!(Predicate::eq("ids", "rs1").matches(&d));
            assert!(Predicate::eq("annot.ct.so", 1631).matches(&d));
            assert!(!Predicate::eq("annot.ct.so", 1).matches(&d));
        }

        #[test]
        fn test_ne_holds_when_missing() {
            let d = variant_doc();
            assert!(Predicate::ne("studies.gt.0/0", 5).matches(&d));
            assert!(!Predicate::ne("studies.gt.0/1", 5).matches(&d));
        }

        #[test]
        fn test_in_and_all() {
            let d = variant_doc();
            assert!(Predicate::is_in("studies.sid", [3, 2]).matches(&d));
            assert!(Predicate::field("annot.ct.so", Condition::All(vec![json!(1583), json!(1631)])).matches(&d));
            assert!(!Predicate::field("annot.ct.so", Condition::All(vec![json!(1583), json!(9)])).matches(&d));
            assert!(Predicate::field("studies.sid", Condition::Nin(vec![json!(3)])).matches(&d));
        }

        #[test]
        fn test_range_ignores_other_types() {
            let d = variant_doc();
            assert!(Predicate::field("start", Condition::Lte(json!(25000))).matches(&d));
            assert!(!Predicate::field("start", Condition::Gt(json!(25000))).matches(&d));
            assert!(!Predicate::field("chromosome", Condition::Gt(json!(0))).matches(&d));
            assert!(Predicate::field("annot.ct.sift.sc", Condition::Lt(json!(0.05))).matches(&d));
        }

        #[test]
        fn test_regex_and_exists() {
            let d = variant_doc();
            assert!(Predicate::field("_id", Condition::Regex("^1_".into())).matches(&d));
            assert!(Predicate::field("annot.ct.gn", Condition::Exists(true)).matches(&d));
            assert!(Predicate::field("annot.id", Condition::Exists(false)).matches(&d));
        }

        #[test]
        fn test_elem_match_binds_to_one_element() {
            let d = variant_doc();
            let same = Predicate::elem_match(
                "studies",
                Predicate::and([Predicate::eq("sid", 2), Predicate::eq("gt.0/1", 7)]),
            );
            assert!(same.matches(&d));
            let crossed = Predicate::elem_match(
                "studies",
                Predicate::and([Predicate::eq("sid", 2), Predicate::eq("gt.1/1", 6)]),
            );
            assert!(!crossed.matches(&d));
            // Without element binding the two conditions match different entries
            let loose = Predicate::and([Predicate::eq("studies.sid", 2), Predicate::eq("studies.gt.1/1", 6)]);
            assert!(loose.matches(&d));
        }

        #[test]
        fn test_size_and_not() {
            let d = variant_doc();
            assert!(Predicate::field("studies", Condition::Size(2)).matches(&d));
            assert!(Predicate::field("type", Condition::Not(Box::new(Condition::Eq(json!("INDEL"))))).matches(&d));
        }

        #[test]
        fn test_empty_and_or() {
            let d = variant_doc();
            assert!(Predicate::all().matches(&d));
            assert!(!Predicate::Or(vec![]).matches(&d));
        }
    }

    mod helpers {
        use super::*;

        #[test]
        fn test_and_flattens() {
            let p = Predicate::and([
                Predicate::and([Predicate::eq("a", 1), Predicate::eq("b", 2)]),
                Predicate::eq("c", 3),
            ]);
            assert!(matches!(&p, Predicate::And(ps) if ps.len() == 3));
            assert_eq!(Predicate::and([Predicate::eq("a", 1)]), Predicate::eq("a", 1));
        }

        #[test]
        fn test_equality_value() {
            let p = Predicate::and([Predicate::eq("_id", "x"), Predicate::ne("studies.sid", 1)]);
            assert_eq!(p.equality_value("_id"), Some(&json!("x")));
            assert_eq!(p.equality_value("studies.sid"), None);
        }

        #[test]
        fn test_positional_index() {
            let d = variant_doc();
            let dotted = Predicate::and([Predicate::eq("_id", "x"), Predicate::eq("studies.sid", 2)]);
            assert_eq!(dotted.positional_index(&d, "studies"), Some(1));
            let elem = Predicate::elem_match("studies", Predicate::eq("files.fid", 10));
            assert_eq!(elem.positional_index(&d, "studies"), Some(0));
            assert_eq!(Predicate::eq("_id", "x").positional_index(&d, "studies"), None);
        }

        #[test]
        fn test_to_json() {
            let p = Predicate::and([
                Predicate::is_in("_at.chunkIds", ["1_1_1k"]),
                Predicate::field("start", Condition::Lte(json!(50000))),
            ]);
            assert_eq!(
                p.to_json(),
                json!({"$and": [{"_at.chunkIds": {"$in": ["1_1_1k"]}}, {"start": {"$lte": 50000}}]})
            );
            assert_eq!(Predicate::all().to_string(), "{}");
        }
    }
}
