//! Symbol resolution with release checks.
//!
//! Query params such as `sample`, `file` or `maf` name catalog entities by
//! whatever the caller typed. [`resolve_symbols`] rewrites them to
//! canonical ids in place, keeping operators, negations and comparators
//! where they were. Each entity kind plugs in through an
//! [`EntityResolver`], a small record of lookups and extractors.

use tracing::debug;
use variant_query::{
    check_operator, is_none_or_all, remove_negation, split_key_value, split_value, GenotypeFilter,
    Query, QueryOperation, QueryParam,
};

use crate::error::{CatalogQueryError, CatalogResult};

/// How a param value splits into atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseStyle {
    /// `A,B` / `A;B` atoms, each optionally negated (`!A`) or keyed
    /// (`A<0.1`). The symbol is the atom without negation and without
    /// anything from the first comparator on.
    Plain,
    /// `sample:gt,gt;sample:gt` clauses. The symbol is the sample.
    Genotype,
}

type Lookup<'a, T> = Box<dyn Fn(&[String]) -> CatalogResult<Vec<T>> + 'a>;

/// Capabilities needed to resolve one kind of entity.
pub struct EntityResolver<'a, T> {
    /// Entity kind, for errors.
    pub kind: &'static str,
    /// Resolves names to entities, one per name and in order.
    pub lookup: Lookup<'a, T>,
    /// Canonical id of an entity.
    pub id: fn(&T) -> String,
    /// Release an entity belongs to.
    pub release: fn(&T) -> u32,
    /// Extra check, e.g. that a file is indexed.
    pub validate: Option<fn(&T) -> CatalogResult<()>>,
    /// How values split into atoms.
    pub style: ClauseStyle,
}

impl<'a, T> EntityResolver<'a, T> {
    /// Creates a resolver for `Plain` values without extra validation.
    pub fn new(
        kind: &'static str,
        lookup: impl Fn(&[String]) -> CatalogResult<Vec<T>> + 'a,
        id: fn(&T) -> String,
        release: fn(&T) -> u32,
    ) -> Self {
        Self {
            kind,
            lookup: Box::new(lookup),
            id,
            release,
            validate: None,
            style: ClauseStyle::Plain,
        }
    }

    /// Adds an extra check run on every resolved entity.
    pub fn with_validation(mut self, validate: fn(&T) -> CatalogResult<()>) -> Self {
        self.validate = Some(validate);
        self
    }

    /// Sets the clause style.
    pub fn with_style(mut self, style: ClauseStyle) -> Self {
        self.style = style;
        self
    }
}

impl<T> std::fmt::Debug for EntityResolver<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityResolver")
            .field("kind", &self.kind)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

/// Fails when an entity is newer than the release ceiling.
pub fn check_release(param: QueryParam, id: &str, entity_release: u32, ceiling: Option<u32>) -> CatalogResult<()> {
    match ceiling {
        Some(release) if entity_release > release => Err(CatalogQueryError::ReleaseViolation {
            param: param.key().to_string(),
            value: id.to_string(),
            release,
        }),
        _ => Ok(()),
    }
}

/// Rewrites the symbols of `param` to canonical ids.
///
/// Missing, blank, `ALL` and `NONE` values are left untouched. Atoms with
/// no symbol (a bare `<0.1`) are kept as they are.
///
/// # Errors
///
/// Mixed operators, unknown symbols, failed validation, and entities newer
/// than `release`.
pub fn resolve_symbols<T>(
    query: &mut Query,
    param: QueryParam,
    release: Option<u32>,
    resolver: &EntityResolver<'_, T>,
) -> CatalogResult<()> {
    let Some(value) = query.get(param).filter(|v| !v.trim().is_empty()) else {
        return Ok(());
    };
    if is_none_or_all(value) {
        return Ok(());
    }

    let (operation, atoms) = split_atoms(value, resolver.style)?;
    let symbols: Vec<String> = atoms.iter().map(|a| symbol_of(a, resolver.style).to_string()).collect();
    let wanted: Vec<String> = symbols.iter().filter(|s| !s.is_empty()).cloned().collect();
    if wanted.is_empty() {
        return Ok(());
    }

    let entities = (resolver.lookup)(&wanted)?;
    if entities.len() != wanted.len() {
        return Err(CatalogQueryError::Catalog(format!(
            "{} lookup returned {} results for {} names",
            resolver.kind,
            entities.len(),
            wanted.len()
        )));
    }

    let mut resolved = entities.iter();
    let mut rebuilt = Vec::with_capacity(atoms.len());
    for (atom, symbol) in atoms.iter().zip(&symbols) {
        if symbol.is_empty() {
            rebuilt.push(atom.clone());
            continue;
        }
        let Some(entity) = resolved.next() else {
            break;
        };
        if let Some(validate) = resolver.validate {
            validate(entity)?;
        }
        let id = (resolver.id)(entity);
        check_release(param, &id, (resolver.release)(entity), release)?;
        if *symbol == id {
            rebuilt.push(atom.clone());
        } else {
            rebuilt.push(atom.replacen(symbol.as_str(), &id, 1));
        }
    }

    let rewritten = rebuilt.join(operation.separator());
    debug!(param = %param, from = value, to = %rewritten, "Resolved symbols");
    query.put(param, rewritten);
    Ok(())
}

fn split_atoms(value: &str, style: ClauseStyle) -> CatalogResult<(QueryOperation, Vec<String>)> {
    match style {
        ClauseStyle::Plain => {
            let operation = check_operator(value)?;
            let atoms = split_value(value, operation).into_iter().map(str::to_string).collect();
            Ok((operation.unwrap_or(QueryOperation::Or), atoms))
        }
        ClauseStyle::Genotype => {
            let filter = GenotypeFilter::parse(value);
            let atoms = filter.clauses.iter().map(ToString::to_string).collect();
            Ok((QueryOperation::And, atoms))
        }
    }
}

fn symbol_of(atom: &str, style: ClauseStyle) -> &str {
    match style {
        ClauseStyle::Plain => split_key_value(remove_negation(atom)).0,
        ClauseStyle::Genotype => atom.split(variant_query::IS).next().unwrap_or_default(),
    }
}
