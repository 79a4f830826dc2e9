//! Schemaless documents and dotted path access.
//!
//! Documents are JSON objects. Paths are dotted field names (`annot.ct.gn`);
//! a numeric segment addresses an array position. Three flavours of lookup
//! exist because the store's query, update and aggregation languages walk
//! arrays differently:
//!
//! - [`resolve_path`] (queries): fans out over array elements, collecting every
//!   value the path reaches.
//! - [`path_entry`] (updates): walks a single concrete location, creating
//!   missing containers on the way.
//! - [`eval_path`] (aggregations): maps over arrays, producing nested arrays.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};

/// A stored document.
pub type Document = Map<String, Value>;

// ============================================================================
// Read access
// ============================================================================

/// Value at a concrete path. Numeric segments index arrays; no fan-out.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Every value reached by `path`, fanning out over arrays.
///
/// Array elements that are not objects stop the walk; the array itself is
/// still returned when the path ends on it, so callers can test either the
/// array or its members.
pub fn resolve_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = doc.get(*head) {
            walk(value, rest, &mut out);
        }
    }
    out
}

fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                walk(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                if let Some(child) = items.get(idx) {
                    walk(child, rest, out);
                }
            }
            for item in items.iter().filter(|item| item.is_object()) {
                walk(item, segments, out);
            }
        }
        _ => {}
    }
}

/// Evaluates an aggregation field path against a document.
///
/// Arrays along the path are mapped element-wise, so `annot.ct.gn` over two
/// nested arrays yields an array of arrays. Missing fields are dropped.
pub fn eval_path(doc: &Document, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let (head, rest) = segments.split_first()?;
    eval_in(doc.get(*head)?, rest)
}

fn eval_in(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Object(map) => eval_in(map.get(*head)?, rest),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| eval_in(item, segments))
                .collect(),
        )),
        _ => None,
    }
}

// ============================================================================
// Write access
// ============================================================================

fn container_for(next: &str) -> Value {
    if next.parse::<usize>().is_ok() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child_of_map<'a>(map: &'a mut Document, key: &str, next: Option<&str>) -> &'a mut Value {
    let child = map.entry(key.to_string()).or_insert(Value::Null);
    if child.is_null() {
        if let Some(next) = next {
            *child = container_for(next);
        }
    }
    child
}

fn child_mut<'a>(target: &'a mut Value, key: &str, next: Option<&str>) -> StorageResult<&'a mut Value> {
    match target {
        Value::Object(map) => Ok(child_of_map(map, key, next)),
        Value::Array(items) => {
            let idx = key.parse::<usize>().map_err(|_| {
                StorageError::Document(format!("cannot create field '{}' in an array", key))
            })?;
            if items.len() <= idx {
                items.resize(idx + 1, Value::Null);
            }
            let child = &mut items[idx];
            if child.is_null() {
                if let Some(next) = next {
                    *child = container_for(next);
                }
            }
            Ok(child)
        }
        other => Err(StorageError::Document(format!(
            "cannot create field '{}' in a {}",
            key,
            type_name(other)
        ))),
    }
}

fn entry_in<'a>(target: &'a mut Value, segments: &[&str], default: Value) -> StorageResult<&'a mut Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(target);
    };
    let child = child_mut(target, head, rest.first().copied())?;
    if rest.is_empty() {
        if child.is_null() {
            *child = default;
        }
        Ok(child)
    } else {
        entry_in(child, rest, default)
    }
}

/// Mutable slot at a concrete path, creating missing parents.
///
/// A missing or null leaf is initialised with `default`. Parents are created
/// as arrays when the following segment is numeric, objects otherwise.
pub fn path_entry<'a>(doc: &'a mut Document, path: &str, default: Value) -> StorageResult<&'a mut Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((head, rest)) = segments.split_first() else {
        return Err(StorageError::Document("empty path".to_string()));
    };
    let child = child_of_map(doc, head, rest.first().copied());
    if rest.is_empty() {
        if child.is_null() {
            *child = default;
        }
        Ok(child)
    } else {
        entry_in(child, rest, default)
    }
}

/// Sets the value at a concrete path.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> StorageResult<()> {
    *path_entry(doc, path, Value::Null)? = value;
    Ok(())
}

/// Removes the value at a concrete path. Array slots are nulled, not shifted.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };
    let Some(parent) = parent else {
        return doc.remove(leaf);
    };
    let mut segments = parent.split('.');
    let mut current = doc.get_mut(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Object(map) => map.remove(leaf),
        Value::Array(items) => items
            .get_mut(leaf.parse::<usize>().ok()?)
            .map(|slot| std::mem::replace(slot, Value::Null)),
        _ => None,
    }
}

// ============================================================================
// Value comparison
// ============================================================================

/// Equality with numbers compared by value (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over values: by type first, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| compare_values(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Ordering for range conditions; values of different types are incomparable.
pub fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
            Some(compare_values(a, b))
        }
        _ => None,
    }
}

// ============================================================================
// Typed field helpers
// ============================================================================

/// String field at a concrete path.
pub fn get_str<'a>(doc: &'a Document, path: &str) -> Option<&'a str> {
    get_path(doc, path).and_then(Value::as_str)
}

/// Integer field at a concrete path. Whole floats are accepted.
pub fn get_i64(doc: &Document, path: &str) -> Option<i64> {
    get_path(doc, path).and_then(as_i64)
}

/// Float field at a concrete path.
pub fn get_f64(doc: &Document, path: &str) -> Option<f64> {
    get_path(doc, path).and_then(Value::as_f64)
}

/// Integer view of a JSON number.
pub fn as_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

/// Object elements of the array at a concrete path.
pub fn get_objects<'a>(doc: &'a Document, path: &str) -> impl Iterator<Item = &'a Document> {
    get_path(doc, path)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn sample() -> Document {
        doc(json!({
            "_id": "1_0000025000_A_T",
            "studies": [
                {"sid": 1, "gt": {"0/1": [5, 6]}},
                {"sid": 2, "gt": {"1/1": [7]}}
            ],
            "annot": [{"ct": [{"gn": "BRCA2", "so": [1583, 1631]}, {"gn": "ZAR1L"}]}]
        }))
    }

    mod read {
        use super::*;

        #[test]
        fn test_get_path_indexes_arrays() {
            let d = sample();
            assert_eq!(get_path(&d, "studies.1.sid"), Some(&json!(2)));
            assert_eq!(get_path(&d, "annot.0.ct.0.gn"), Some(&json!("BRCA2")));
            assert_eq!(get_path(&d, "studies.sid"), None);
        }

        #[test]
        fn test_resolve_path_fans_out() {
            let d = sample();
            let sids = resolve_path(&d, "studies.sid");
            assert_eq!(sids, vec![&json!(1), &json!(2)]);
            let genes = resolve_path(&d, "annot.ct.gn");
            assert_eq!(genes, vec![&json!("BRCA2"), &json!("ZAR1L")]);
        }

        #[test]
        fn test_resolve_path_ending_on_array() {
            let d = sample();
            let buckets = resolve_path(&d, "studies.gt.0/1");
            assert_eq!(buckets, vec![&json!([5, 6])]);
        }

        #[test]
        fn test_eval_path_nests_arrays() {
            let d = sample();
            assert_eq!(eval_path(&d, "annot.ct.gn"), Some(json!([["BRCA2", "ZAR1L"]])));
            assert_eq!(eval_path(&d, "annot.ct.so"), Some(json!([[[1583, 1631]]])));
            assert_eq!(eval_path(&d, "missing"), None);
        }
    }

    mod write {
        use super::*;

        #[test]
        fn test_set_path_creates_parents() {
            let mut d = Document::new();
            set_path(&mut d, "a.b.c", json!(1)).unwrap();
            assert_eq!(Value::Object(d), json!({"a": {"b": {"c": 1}}}));
        }

        #[test]
        fn test_set_path_numeric_creates_array() {
            let mut d = Document::new();
            set_path(&mut d, "annot.0", json!({"id": "x"})).unwrap();
            assert_eq!(Value::Object(d), json!({"annot": [{"id": "x"}]}));
        }

        #[test]
        fn test_path_entry_keeps_existing() {
            let mut d = sample();
            let entry = path_entry(&mut d, "studies.0.gt.0/1", json!([])).unwrap();
            assert_eq!(entry, &json!([5, 6]));
        }

        #[test]
        fn test_set_path_through_scalar_fails() {
            let mut d = doc(json!({"a": 1}));
            assert!(set_path(&mut d, "a.b", json!(2)).is_err());
        }

        #[test]
        fn test_remove_path() {
            let mut d = sample();
            assert_eq!(remove_path(&mut d, "studies.1.gt"), Some(json!({"1/1": [7]})));
            assert_eq!(get_path(&d, "studies.1.gt"), None);
            assert!(remove_path(&mut d, "nope.x").is_none());
        }
    }

    mod compare {
        use super::*;

        #[test]
        fn test_numeric_equality() {
            assert!(values_equal(&json!(1), &json!(1.0)));
            assert!(values_equal(&json!({"a": [1]}), &json!({"a": [1.0]})));
            assert!(!values_equal(&json!("1"), &json!(1)));
        }

        #[test]
        fn test_compare_values_orders_types() {
            assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
            assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
            assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
            assert_eq!(compare_same_type(&json!(1), &json!("a")), None);
        }

        #[test]
        fn test_as_i64_accepts_whole_floats() {
            assert_eq!(as_i64(&json!(25.0)), Some(25));
            assert_eq!(as_i64(&json!(25.5)), None);
        }
    }
}
