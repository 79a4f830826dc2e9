//! In-memory [`CatalogService`].
//!
//! Built once with consuming `with_*` calls, then shared read-only. Studies
//! without readers are visible to every caller; adding a reader restricts
//! the study to its readers.

use std::collections::BTreeMap;

use tracing::warn;
use variant_query::{parse_number, split_key_value, strip_comparator, Comparator, AND};

use crate::error::{CatalogQueryError, CatalogResult};
use crate::traits::{
    CatalogCohort, CatalogFile, CatalogSample, CatalogService, CatalogStudy, DiseasePanel, Family,
};

#[derive(Debug, Clone)]
struct StudyData {
    study: CatalogStudy,
    project: String,
    readers: Vec<String>,
    samples: Vec<CatalogSample>,
    annotations: BTreeMap<String, BTreeMap<String, String>>,
    files: Vec<CatalogFile>,
    cohorts: Vec<CatalogCohort>,
    families: Vec<Family>,
    panels: Vec<DiseasePanel>,
}

impl StudyData {
    fn readable_by(&self, caller: &str) -> bool {
        self.readers.is_empty() || self.readers.iter().any(|r| r == caller)
    }

    fn answers_to(&self, name: &str) -> bool {
        let study = &self.study;
        if study.id == name || study.alias.as_deref() == Some(name) {
            return true;
        }
        // project:study
        match name.split_once(':') {
            Some((project, rest)) => {
                project == self.project && (study.id == rest || study.alias.as_deref() == Some(rest))
            }
            None => false,
        }
    }
}

/// Catalog held in memory.
///
/// # Example
///
/// ```rust
/// use variant_catalog::{CatalogSample, CatalogService, CatalogStudy, InMemoryCatalog};
///
/// let catalog = InMemoryCatalog::new()
///     .with_project("p1", 2)
///     .with_study("p1", CatalogStudy::new("s1", 1).with_alias("first"))
///     .with_sample("s1", CatalogSample::new("NA001", 101, 1));
///
/// let studies = catalog.lookup_studies("user", &["first".to_string()]).unwrap();
/// assert_eq!(studies[0].id, "s1");
/// let samples = catalog.lookup_samples("user", Some("s1"), &["101".to_string()]).unwrap();
/// assert_eq!(samples[0].id, "NA001");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    projects: BTreeMap<String, u32>,
    studies: Vec<StudyData>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project at its current release.
    pub fn with_project(mut self, project: impl Into<String>, current_release: u32) -> Self {
        self.projects.insert(project.into(), current_release);
        self
    }

    /// Adds a study to a project.
    pub fn with_study(mut self, project: impl Into<String>, study: CatalogStudy) -> Self {
        let project = project.into();
        if !self.projects.contains_key(&project) {
            warn!(project = %project, study = %study.id, "Study added to an unknown project");
        }
        self.studies.push(StudyData {
            study,
            project,
            readers: Vec::new(),
            samples: Vec::new(),
            annotations: BTreeMap::new(),
            files: Vec::new(),
            cohorts: Vec::new(),
            families: Vec::new(),
            panels: Vec::new(),
        });
        self
    }

    /// Restricts a study to its readers, adding `caller` to them.
    pub fn with_reader(self, study: &str, caller: impl Into<String>) -> Self {
        let caller = caller.into();
        self.edit(study, |data| data.readers.push(caller))
    }

    /// Adds a sample to a study.
    pub fn with_sample(self, study: &str, sample: CatalogSample) -> Self {
        self.edit(study, |data| data.samples.push(sample))
    }

    /// Sets an annotation of a sample, searchable through
    /// [`search_samples`](CatalogService::search_samples).
    pub fn with_sample_annotation(
        self,
        study: &str,
        sample: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let (sample, key, value) = (sample.to_string(), key.into(), value.into());
        self.edit(study, |data| {
            data.annotations.entry(sample).or_default().insert(key, value);
        })
    }

    /// Adds a file to a study.
    pub fn with_file(self, study: &str, file: CatalogFile) -> Self {
        self.edit(study, |data| data.files.push(file))
    }

    /// Adds a cohort to a study.
    pub fn with_cohort(self, study: &str, cohort: CatalogCohort) -> Self {
        self.edit(study, |data| data.cohorts.push(cohort))
    }

    /// Adds a family to a study.
    pub fn with_family(self, study: &str, family: Family) -> Self {
        self.edit(study, |data| data.families.push(family))
    }

    /// Adds a disease panel to a study.
    pub fn with_panel(self, study: &str, panel: DiseasePanel) -> Self {
        self.edit(study, |data| data.panels.push(panel))
    }

    fn edit(mut self, study: &str, f: impl FnOnce(&mut StudyData)) -> Self {
        match self.studies.iter_mut().find(|d| d.study.id == study) {
            Some(data) => f(data),
            None => warn!(study, "Ignoring catalog entry for an unknown study"),
        }
        self
    }

    fn readable(&self, caller: &str) -> Vec<&StudyData> {
        self.studies.iter().filter(|d| d.readable_by(caller)).collect()
    }

    /// Readable studies to search: `study` alone when given, else all.
    fn scope(&self, caller: &str, study: Option<&str>) -> CatalogResult<Vec<&StudyData>> {
        match study {
            Some(name) => self
                .readable(caller)
                .into_iter()
                .find(|d| d.answers_to(name))
                .map(|d| vec![d])
                .ok_or_else(|| CatalogQueryError::unresolved("study", name)),
            None => Ok(self.readable(caller)),
        }
    }

    fn study(&self, caller: &str, study: &str) -> CatalogResult<&StudyData> {
        self.readable(caller)
            .into_iter()
            .find(|d| d.answers_to(study))
            .ok_or_else(|| CatalogQueryError::unresolved("study", study))
    }

    fn only_project(&self) -> CatalogResult<&str> {
        let mut projects = self.projects.keys();
        match (projects.next(), projects.next()) {
            (Some(project), None) => Ok(project),
            _ => Err(CatalogQueryError::MissingParam {
                param: "project".to_string(),
                reason: format!("{} projects available, choose one", self.projects.len()),
            }),
        }
    }
}

/// Looks every name up among the entities of `scope`.
fn lookup<'a, T: Clone + 'a>(
    kind: &'static str,
    names: &[String],
    scope: &[&'a StudyData],
    entities: impl Fn(&'a StudyData) -> &'a [T],
    matches: impl Fn(&T, &str) -> bool,
) -> CatalogResult<Vec<T>> {
    names
        .iter()
        .map(|name| {
            scope
                .iter()
                .flat_map(|d| entities(*d).iter())
                .find(|e| matches(*e, name.as_str()))
                .cloned()
                .ok_or_else(|| CatalogQueryError::unresolved(kind, name.clone()))
        })
        .collect()
}

fn id_or_uid(id: &str, uid: i64, name: &str) -> bool {
    id == name || name.parse::<i64>().is_ok_and(|n| n == uid)
}

/// Evaluates one `key<op>value` term against a sample's annotations.
///
/// Numeric operands compare numerically; `~=` is a substring match.
fn term_matches(annotations: &BTreeMap<String, String>, term: &str) -> CatalogResult<bool> {
    let (key, rest) = split_key_value(term);
    let (comparator, operand) = match strip_comparator(rest) {
        (Some(comparator), operand) if !key.is_empty() && !operand.is_empty() => (comparator, operand),
        _ => {
            return Err(CatalogQueryError::malformed(
                "sampleAnnotation",
                term,
                "expected '<key><operator><value>'",
            ))
        }
    };
    let Some(actual) = annotations.get(key) else {
        return Ok(comparator == Comparator::Ne);
    };
    Ok(match comparator {
        Comparator::Eq => actual == operand,
        Comparator::Ne => actual != operand,
        Comparator::Regex => actual.contains(operand),
        numeric => match (parse_number(actual), parse_number(operand)) {
            (Ok(lhs), Ok(rhs)) => numeric.compare(lhs, rhs),
            _ => false,
        },
    })
}

impl CatalogService for InMemoryCatalog {
    fn visible_studies(&self, caller: &str, project: Option<&str>) -> CatalogResult<Vec<CatalogStudy>> {
        if let Some(project) = project {
            if !self.projects.contains_key(project) {
                return Err(CatalogQueryError::unresolved("project", project));
            }
        }
        Ok(self
            .readable(caller)
            .into_iter()
            .filter(|d| project.map_or(true, |p| d.project == p))
            .map(|d| d.study.clone())
            .collect())
    }

    fn current_release(&self, _caller: &str, project: Option<&str>) -> CatalogResult<u32> {
        let project = match project {
            Some(project) => project,
            None => self.only_project()?,
        };
        self.projects
            .get(project)
            .copied()
            .ok_or_else(|| CatalogQueryError::unresolved("project", project))
    }

    fn lookup_studies(&self, caller: &str, names: &[String]) -> CatalogResult<Vec<CatalogStudy>> {
        names
            .iter()
            .map(|name| self.study(caller, name).map(|d| d.study.clone()))
            .collect()
    }

    fn lookup_samples(&self, caller: &str, study: Option<&str>, names: &[String]) -> CatalogResult<Vec<CatalogSample>> {
        let scope = self.scope(caller, study)?;
        lookup("sample", names, &scope, |d| d.samples.as_slice(), |s, n| id_or_uid(&s.id, s.uid, n))
    }

    fn lookup_files(&self, caller: &str, study: Option<&str>, names: &[String]) -> CatalogResult<Vec<CatalogFile>> {
        let scope = self.scope(caller, study)?;
        lookup("file", names, &scope, |d| d.files.as_slice(), |f, n| id_or_uid(&f.id, f.uid, n))
    }

    fn lookup_cohorts(&self, caller: &str, study: Option<&str>, names: &[String]) -> CatalogResult<Vec<CatalogCohort>> {
        let scope = self.scope(caller, study)?;
        lookup("cohort", names, &scope, |d| d.cohorts.as_slice(), |c, n| c.id == n)
    }

    fn samples(&self, caller: &str, study: &str) -> CatalogResult<Vec<CatalogSample>> {
        Ok(self.study(caller, study)?.samples.clone())
    }

    fn files(&self, caller: &str, study: &str) -> CatalogResult<Vec<CatalogFile>> {
        Ok(self.study(caller, study)?.files.clone())
    }

    fn search_samples(&self, caller: &str, study: &str, expression: &str) -> CatalogResult<Vec<CatalogSample>> {
        let data = self.study(caller, study)?;
        let terms: Vec<&str> = expression.split(AND).filter(|t| !t.trim().is_empty()).collect();
        let empty = BTreeMap::new();
        let mut found = Vec::new();
        for sample in &data.samples {
            let annotations = data.annotations.get(&sample.id).unwrap_or(&empty);
            let mut all = true;
            for term in &terms {
                if !term_matches(annotations, term.trim())? {
                    all = false;
                    break;
                }
            }
            if all {
                found.push(sample.clone());
            }
        }
        Ok(found)
    }

    fn family(&self, caller: &str, study: &str, family: &str) -> CatalogResult<Family> {
        self.study(caller, study)?
            .families
            .iter()
            .find(|f| f.id == family)
            .cloned()
            .ok_or_else(|| CatalogQueryError::unresolved("family", family))
    }

    fn panel(&self, caller: &str, study: &str, panel: &str) -> CatalogResult<DiseasePanel> {
        self.study(caller, study)?
            .panels
            .iter()
            .find(|p| p.id == panel)
            .cloned()
            .ok_or_else(|| CatalogQueryError::unresolved("panel", panel))
    }
}
