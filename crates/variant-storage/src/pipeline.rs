//! Aggregation pipelines.
//!
//! Stages mirror the document store's aggregation framework. [`run`]
//! evaluates a pipeline over an in-memory batch of documents; remote stores
//! send [`Stage::to_json`] instead.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use variant_query::SortOrder;

use crate::document::{compare_values, eval_path, set_path, values_equal, Document};
use crate::error::StorageResult;
use crate::predicate::Predicate;

/// An expression evaluated against a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Field path, rendered as `"$path"`.
    Field(String),
    /// Constant value.
    Literal(Value),
    /// Length of an array.
    Size(Box<Expr>),
    /// `a / b`.
    Divide(Box<Expr>, Box<Expr>),
    /// `a - b`.
    Subtract(Box<Expr>, Box<Expr>),
    /// `a % b`.
    Mod(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Field reference.
    pub fn field(path: impl Into<String>) -> Self {
        Expr::Field(path.into())
    }

    /// Constant.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Evaluates the expression. Missing fields yield `Null`.
    pub fn evaluate(&self, doc: &Document) -> Value {
        match self {
            Expr::Field(path) => eval_path(doc, path).unwrap_or(Value::Null),
            Expr::Literal(v) => v.clone(),
            Expr::Size(inner) => match inner.evaluate(doc) {
                Value::Array(items) => json!(items.len()),
                _ => Value::Null,
            },
            Expr::Divide(a, b) => arithmetic(doc, a, b, |x, y| (y != 0.0).then(|| x / y)),
            Expr::Subtract(a, b) => arithmetic(doc, a, b, |x, y| Some(x - y)),
            Expr::Mod(a, b) => arithmetic(doc, a, b, |x, y| (y != 0.0).then(|| x % y)),
        }
    }

    /// Store-native rendering.
    pub fn to_json(&self) -> Value {
        match self {
            Expr::Field(path) => json!(format!("${}", path)),
            Expr::Literal(v) => v.clone(),
            Expr::Size(inner) => json!({ "$size": inner.to_json() }),
            Expr::Divide(a, b) => json!({ "$divide": [a.to_json(), b.to_json()] }),
            Expr::Subtract(a, b) => json!({ "$subtract": [a.to_json(), b.to_json()] }),
            Expr::Mod(a, b) => json!({ "$mod": [a.to_json(), b.to_json()] }),
        }
    }
}

fn arithmetic(doc: &Document, a: &Expr, b: &Expr, op: impl Fn(f64, f64) -> Option<f64>) -> Value {
    match (a.evaluate(doc).as_f64(), b.evaluate(doc).as_f64()) {
        (Some(x), Some(y)) => op(x, y).map_or(Value::Null, |r| json!(r)),
        _ => Value::Null,
    }
}

/// Group accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of numeric values.
    Sum(Expr),
    /// Distinct values.
    AddToSet(Expr),
    /// All values.
    Push(Expr),
    /// First value.
    First(Expr),
}

impl Accumulator {
    fn to_json(&self) -> Value {
        match self {
            Accumulator::Sum(e) => json!({ "$sum": e.to_json() }),
            Accumulator::AddToSet(e) => json!({ "$addToSet": e.to_json() }),
            Accumulator::Push(e) => json!({ "$push": e.to_json() }),
            Accumulator::First(e) => json!({ "$first": e.to_json() }),
        }
    }

    fn initial(&self) -> Value {
        match self {
            Accumulator::Sum(_) => json!(0),
            Accumulator::AddToSet(_) | Accumulator::Push(_) => Value::Array(Vec::new()),
            Accumulator::First(_) => Value::Null,
        }
    }

    fn accumulate(&self, acc: &mut Value, doc: &Document, first: bool) {
        match self {
            Accumulator::Sum(e) => {
                let add = e.evaluate(doc).as_f64().unwrap_or(0.0);
                let total = acc.as_f64().unwrap_or(0.0) + add;
                *acc = if total.fract() == 0.0 && total.abs() < i64::MAX as f64 {
                    json!(total as i64)
                } else {
                    json!(total)
                };
            }
            Accumulator::AddToSet(e) => {
                let value = e.evaluate(doc);
                if let Value::Array(items) = acc {
                    if !items.iter().any(|v| values_equal(v, &value)) {
                        items.push(value);
                    }
                }
            }
            Accumulator::Push(e) => {
                if let Value::Array(items) = acc {
                    items.push(e.evaluate(doc));
                }
            }
            Accumulator::First(e) => {
                if first {
                    *acc = e.evaluate(doc);
                }
            }
        }
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keeps documents matching the predicate.
    Match(Predicate),
    /// Computes output fields. `_id` is kept unless `exclude_id` is set or an
    /// output field writes under it.
    Project {
        /// Output field and its expression.
        fields: Vec<(String, Expr)>,
        /// Drop `_id`.
        exclude_id: bool,
    },
    /// One output document per element of the array field.
    Unwind(String),
    /// Groups documents by key.
    Group {
        /// Group key expression.
        id: Expr,
        /// Output field and accumulator.
        accumulators: Vec<(String, Accumulator)>,
    },
    /// Stable sort by fields.
    Sort(Vec<(String, SortOrder)>),
    /// Skips documents.
    Skip(usize),
    /// Keeps at most this many documents.
    Limit(usize),
}

impl Stage {
    /// Store-native rendering.
    pub fn to_json(&self) -> Value {
        match self {
            Stage::Match(p) => json!({ "$match": p.to_json() }),
            Stage::Project { fields, exclude_id } => {
                let mut map = Map::new();
                for (name, expr) in fields {
                    map.insert(name.clone(), expr.to_json());
                }
                if *exclude_id {
                    map.insert("_id".into(), json!(0));
                }
                json!({ "$project": map })
            }
            Stage::Unwind(path) => json!({ "$unwind": format!("${}", path) }),
            Stage::Group { id, accumulators } => {
                let mut map = Map::new();
                map.insert("_id".into(), id.to_json());
                for (name, acc) in accumulators {
                    map.insert(name.clone(), acc.to_json());
                }
                json!({ "$group": map })
            }
            Stage::Sort(keys) => {
                let mut map = Map::new();
                for (path, order) in keys {
                    map.insert(path.clone(), json!(order.as_i32()));
                }
                json!({ "$sort": map })
            }
            Stage::Skip(n) => json!({ "$skip": n }),
            Stage::Limit(n) => json!({ "$limit": n }),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Runs a pipeline over a batch of documents.
pub fn run(mut docs: Vec<Document>, stages: &[Stage]) -> StorageResult<Vec<Document>> {
    for stage in stages {
        docs = match stage {
            Stage::Match(p) => docs.into_iter().filter(|d| p.matches(d)).collect(),
            Stage::Project { fields, exclude_id } => docs
                .iter()
                .map(|d| project(d, fields, *exclude_id))
                .collect::<StorageResult<_>>()?,
            Stage::Unwind(path) => unwind(docs, path)?,
            Stage::Group { id, accumulators } => group(&docs, id, accumulators),
            Stage::Sort(keys) => {
                docs.sort_by(|a, b| {
                    keys.iter()
                        .map(|(path, order)| {
                            let x = eval_path(a, path).unwrap_or(Value::Null);
                            let y = eval_path(b, path).unwrap_or(Value::Null);
                            let o = compare_values(&x, &y);
                            match order {
                                SortOrder::Ascending => o,
                                SortOrder::Descending => o.reverse(),
                            }
                        })
                        .find(|o| o.is_ne())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
        };
    }
    Ok(docs)
}

fn project(doc: &Document, fields: &[(String, Expr)], exclude_id: bool) -> StorageResult<Document> {
    let mut out = Map::new();
    let writes_id = fields
        .iter()
        .any(|(name, _)| name == "_id" || name.starts_with("_id."));
    if !exclude_id && !writes_id {
        if let Some(id) = doc.get("_id") {
            out.insert("_id".into(), id.clone());
        }
    }
    for (name, expr) in fields {
        set_path(&mut out, name, expr.evaluate(doc))?;
    }
    Ok(out)
}

fn unwind(docs: Vec<Document>, path: &str) -> StorageResult<Vec<Document>> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match eval_path(&doc, path) {
            Some(Value::Array(items)) => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item)?;
                    out.push(copy);
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

fn group(docs: &[Document], id: &Expr, accumulators: &[(String, Accumulator)]) -> Vec<Document> {
    let mut groups: IndexMap<String, (Value, Vec<Value>)> = IndexMap::new();
    for doc in docs {
        let key = id.evaluate(doc);
        let slot = key.to_string();
        let first = !groups.contains_key(&slot);
        let (_, accs) = groups.entry(slot).or_insert_with(|| {
            (
                key.clone(),
                accumulators.iter().map(|(_, a)| a.initial()).collect(),
            )
        });
        for ((_, acc), value) in accumulators.iter().zip(accs.iter_mut()) {
            acc.accumulate(value, doc, first);
        }
    }
    groups
        .into_values()
        .map(|(key, values)| {
            let mut out = Map::new();
            out.insert("_id".into(), key);
            for ((name, _), value) in accumulators.iter().zip(values) {
                out.insert(name.clone(), value);
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(values: Value) -> Vec<Document> {
        values
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_unwind_nested_gene_arrays() {
        let input = docs(json!([
            {"_id": "v1", "annot": [{"ct": [{"gn": "A"}, {"gn": "B"}]}]},
            {"_id": "v2", "annot": [{"ct": [{"gn": "A"}]}]},
            {"_id": "v3"}
        ]));
        let out = run(
            input,
            &[
                Stage::Project {
                    fields: vec![("gene".into(), Expr::field("annot.ct.gn"))],
                    exclude_id: false,
                },
                Stage::Unwind("gene".into()),
                Stage::Unwind("gene".into()),
            ],
        )
        .unwrap();
        let genes: Vec<&Value> = out.iter().map(|d| &d["gene"]).collect();
        assert_eq!(genes, vec![&json!("A"), &json!("B"), &json!("A")]);
        assert_eq!(out[1]["_id"], json!("v1"));
    }

    #[test]
    fn test_group_add_to_set_and_size() {
        let input = docs(json!([
            {"_id": "v1", "gene": "A"},
            {"_id": "v1", "gene": "A"},
            {"_id": "v2", "gene": "A"},
            {"_id": "v3", "gene": "B"}
        ]));
        let out = run(
            input,
            &[
                Stage::Group {
                    id: Expr::field("gene"),
                    accumulators: vec![("values".into(), Accumulator::AddToSet(Expr::field("_id")))],
                },
                Stage::Project {
                    fields: vec![
                        ("id".into(), Expr::field("_id")),
                        ("count".into(), Expr::Size(Box::new(Expr::field("values")))),
                    ],
                    exclude_id: true,
                },
                Stage::Sort(vec![("count".into(), SortOrder::Descending)]),
            ],
        )
        .unwrap();
        assert_eq!(out[0], docs(json!([{"id": "A", "count": 2}]))[0]);
        assert_eq!(out[1]["count"], json!(1));
    }

    #[test]
    fn test_bucket_arithmetic_and_sum() {
        let input = docs(json!([{"start": 1500}, {"start": 1250}, {"start": 2500}]));
        let size = || Box::new(Expr::literal(1000));
        let bucket = Expr::Divide(
            Box::new(Expr::Subtract(
                Box::new(Expr::field("start")),
                Box::new(Expr::Mod(Box::new(Expr::field("start")), size())),
            )),
            size(),
        );
        let out = run(
            input,
            &[
                Stage::Group {
                    id: bucket,
                    accumulators: vec![("features_count".into(), Accumulator::Sum(Expr::literal(1)))],
                },
                Stage::Sort(vec![("_id".into(), SortOrder::Ascending)]),
            ],
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"].as_f64(), Some(1.0));
        assert_eq!(out[0]["features_count"], json!(2));
    }

    #[test]
    fn test_project_nested_id() {
        let input = docs(json!([{"_id": "v1", "start": 5}]));
        let out = run(
            input,
            &[Stage::Project {
                fields: vec![("_id.start".into(), Expr::field("start"))],
                exclude_id: false,
            }],
        )
        .unwrap();
        assert_eq!(Value::Object(out[0].clone()), json!({"_id": {"start": 5}}));
    }

    #[test]
    fn test_skip_limit_first() {
        let input = docs(json!([{"k": 1, "v": "a"}, {"k": 1, "v": "b"}, {"k": 2, "v": "c"}]));
        let out = run(
            input,
            &[
                Stage::Group {
                    id: Expr::field("k"),
                    accumulators: vec![("v".into(), Accumulator::First(Expr::field("v")))],
                },
                Stage::Skip(1),
                Stage::Limit(5),
            ],
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["v"], json!("c"));
    }

    #[test]
    fn test_stage_to_json() {
        assert_eq!(Stage::Unwind("gene".into()).to_json(), json!({"$unwind": "$gene"}));
        assert_eq!(
            Stage::Sort(vec![("count".into(), SortOrder::Descending)]).to_json(),
            json!({"$sort": {"count": -1}})
        );
    }
}
