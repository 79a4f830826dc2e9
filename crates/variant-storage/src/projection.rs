//! Field projections for `find`.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::warn;
use variant_query::QueryOptions;

use crate::document::{get_path, set_path, Document};
use crate::predicate::Predicate;
use crate::schema::{self, VariantField};

/// How a projected field is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionField {
    /// The whole field.
    Include,
    /// Only the first array element matching the predicate.
    ElemMatch(Predicate),
}

/// Fields to return from `find`. An empty projection returns whole documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: IndexMap<String, ProjectionField>,
}

impl Projection {
    /// Projection returning whole documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes a field.
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), ProjectionField::Include);
        self
    }

    /// Includes the first element of an array field matching `predicate`.
    pub fn elem_match(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.fields
            .insert(field.into(), ProjectionField::ElemMatch(predicate));
        self
    }

    /// Returns true when whole documents are returned.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Projected fields in order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &ProjectionField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Applies the projection to a document. `_id` is always kept.
    pub fn apply(&self, doc: &Document) -> Document {
        if self.is_empty() {
            return doc.clone();
        }
        let mut out = Map::new();
        if let Some(id) = doc.get(schema::ID) {
            out.insert(schema::ID.to_string(), id.clone());
        }
        for (field, kind) in &self.fields {
            let Some(value) = get_path(doc, field) else {
                continue;
            };
            let projected = match kind {
                ProjectionField::Include => Some(value.clone()),
                ProjectionField::ElemMatch(predicate) => value
                    .as_array()
                    .and_then(|items| items.iter().find(|item| predicate.matches_value(item)))
                    .map(|item| Value::Array(vec![item.clone()])),
            };
            if let Some(projected) = projected {
                // unwritable paths are left out
                let _ = set_path(&mut out, field, projected);
            }
        }
        out
    }

    /// Store-native rendering.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(field, kind)| {
                let rendered = match kind {
                    ProjectionField::Include => json!(1),
                    ProjectionField::ElemMatch(p) => json!({ "$elemMatch": p.to_json() }),
                };
                (field.clone(), rendered)
            })
            .collect();
        Value::Object(map)
    }
}

/// Builds the projection for a variant query.
///
/// `include`/`exclude` name user facing fields (see [`VariantField`]);
/// unknown names are ignored with a warning. When studies or files are
/// restricted, the study entries array is narrowed with an element match.
pub fn build_projection(
    options: &QueryOptions,
    include_studies: Option<&[i32]>,
    include_files: Option<&[i32]>,
) -> Projection {
    let restricted = include_studies.is_some() || include_files.is_some();
    if options.include.is_empty() && options.exclude.is_empty() && !restricted {
        return Projection::new();
    }

    let mut fields: Vec<VariantField> = if options.include.is_empty() {
        VariantField::ALL.to_vec()
    } else {
        options
            .include
            .iter()
            .filter_map(|name| {
                let field = VariantField::from_name(name);
                if field.is_none() {
                    warn!(field = %name, "Ignoring unknown include field");
                }
                field
            })
            .collect()
    };
    for name in &options.exclude {
        match VariantField::from_name(name) {
            Some(excluded) => fields.retain(|f| *f != excluded),
            None => warn!(field = %name, "Ignoring unknown exclude field"),
        }
    }

    let mut element = Vec::new();
    if let Some(studies) = include_studies {
        element.push(Predicate::is_in(schema::STUDY_ID, studies.iter().copied()));
    }
    if let Some(files) = include_files {
        element.push(Predicate::is_in(
            schema::path(&[schema::FILES, schema::FILE_ID]),
            files.iter().copied(),
        ));
    }

    let mut projection = Projection::new();
    for field in fields {
        if field == VariantField::Studies && !element.is_empty() {
            projection = projection.elem_match(
                field.document_field(),
                Predicate::and(element.iter().cloned()),
            );
        } else {
            projection = projection.include(field.document_field());
        }
    }
    projection
}
