//! Write models for loading and maintaining variants.
//!
//! Loading a study entry is a two phase upsert. The first phase creates the
//! variant document if needed and appends the study entry when the variant
//! has none for that study yet. When the study entry already exists the
//! upsert collides on `_id`, and the second phase merges the new genotypes
//! and file into the existing entry through a positional update.
//!
//! Both phases only write what the loaded file contributes: its file entry
//! and the genotypes of its samples.

use serde_json::{json, Value};
use variant_query::UNKNOWN_GENOTYPE;

use crate::converter::{
    annotation_to_document, build_storage_id, file_to_document, genotype_buckets,
    stats_to_document, study_entry_to_document, variant_core_document, variant_storage_id,
};
use crate::error::{StorageError, StorageResult};
use crate::model::{StudyConfiguration, StudyEntry, Variant, VariantAnnotation, VariantStatsUpdate};
use crate::predicate::{Condition, Predicate};
use crate::schema::{self, path};
use crate::update::{Update, WriteModel, POSITIONAL};

/// Samples of files loaded before `file_id`.
///
/// These samples have no call in the file being loaded, so new study
/// entries record them under the unknown genotype.
pub fn loaded_samples(config: &StudyConfiguration, file_id: i32) -> Vec<i32> {
    let current: &[i32] = config
        .samples_in_files
        .get(&file_id)
        .map_or(&[], Vec::as_slice);
    config
        .indexed_samples()
        .into_iter()
        .filter(|id| !current.contains(id))
        .collect()
}

fn study_entry<'v>(variant: &'v Variant, config: &StudyConfiguration) -> StorageResult<&'v StudyEntry> {
    variant
        .study(config.study_id)
        .ok_or_else(|| StorageError::Document(format!(
            "variant {} has no entry for study {}",
            variant, config.study_id
        )))
}

/// The part of a study entry contributed by `file_id`.
///
/// Samples registered for other files are dropped. When the file has no
/// registered samples every sample is kept; unresolvable names are kept so
/// conversion still reports them.
fn file_slice(entry: &StudyEntry, config: &StudyConfiguration, file_id: i32) -> StudyEntry {
    let file_samples = config.samples_in_files.get(&file_id);
    let in_file = |name: &str| match (file_samples, config.resolve_sample(name)) {
        (Some(ids), Some(id)) => ids.contains(&id),
        _ => true,
    };
    StudyEntry {
        study_id: entry.study_id,
        files: entry
            .files
            .iter()
            .filter(|f| f.file_id == file_id)
            .cloned()
            .collect(),
        secondary_alternates: entry.secondary_alternates.clone(),
        format: entry.format.clone(),
        samples: entry
            .samples
            .iter()
            .filter(|(name, _)| in_file(name.as_str()))
            .map(|(name, gt)| (name.clone(), gt.clone()))
            .collect(),
    }
}

/// First phase: create the variant and append its study entry.
///
/// Matches only when the document exists without an entry for the study;
/// otherwise the upsert reports a duplicate key.
pub fn insert_model(
    variant: &Variant,
    config: &StudyConfiguration,
    file_id: i32,
    gap_samples: &[i32],
) -> StorageResult<WriteModel> {
    let entry = file_slice(study_entry(variant, config)?, config, file_id);
    let id = variant_storage_id(variant);
    let study = study_entry_to_document(&entry, config, gap_samples)?;
    let ids: Vec<Value> = variant.ids.iter().map(|i| json!(i)).collect();
    Ok(WriteModel::UpdateOne {
        filter: Predicate::and([
            Predicate::eq(schema::ID, id),
            Predicate::ne(path(&[schema::STUDIES, schema::STUDY_ID]), config.study_id),
        ]),
        update: Update::new()
            .set_on_insert_all(variant_core_document(variant))
            .push(schema::STUDIES, vec![Value::Object(study)])
            .add_to_set(schema::IDS, ids),
        upsert: true,
    })
}

/// Second phase: merge genotypes and the file into the existing entry.
pub fn merge_model(variant: &Variant, config: &StudyConfiguration, file_id: i32) -> StorageResult<WriteModel> {
    let entry = file_slice(study_entry(variant, config)?, config, file_id);
    let mut update = Update::new();
    for (genotype, samples) in genotype_buckets(&entry, config)? {
        update = update.add_to_set(
            path(&[schema::STUDIES, POSITIONAL, schema::GENOTYPES, &genotype]),
            samples.into_iter().map(|s| json!(s)).collect(),
        );
    }
    update = update.add_to_set(
        path(&[schema::STUDIES, POSITIONAL, schema::FILES]),
        entry.files.iter().map(file_to_document).collect(),
    );
    Ok(WriteModel::UpdateOne {
        filter: Predicate::and([
            Predicate::eq(schema::ID, variant_storage_id(variant)),
            Predicate::eq(path(&[schema::STUDIES, schema::STUDY_ID]), config.study_id),
        ]),
        update,
        upsert: false,
    })
}

/// Marks `samples` as unknown on every variant of the study that `file_id`
/// did not report.
///
/// Returns `None` when the study already reads missing calls as unknown.
pub fn fill_gaps_model(
    config: &StudyConfiguration,
    file_id: i32,
    samples: &[i32],
    chromosomes: &[String],
) -> Option<WriteModel> {
    if samples.is_empty() || config.default_genotype() == Some(UNKNOWN_GENOTYPE) {
        return None;
    }
    let mut clauses = Vec::new();
    if !chromosomes.is_empty() {
        clauses.push(Predicate::is_in(schema::CHROMOSOME, chromosomes.iter().cloned()));
    }
    clauses.push(Predicate::elem_match(
        schema::STUDIES,
        Predicate::and([
            Predicate::eq(schema::STUDY_ID, config.study_id),
            Predicate::ne(path(&[schema::FILES, schema::FILE_ID]), file_id),
        ]),
    ));
    Some(WriteModel::UpdateMany {
        filter: Predicate::and(clauses),
        update: Update::new().push(
            path(&[schema::STUDIES, POSITIONAL, schema::GENOTYPES, UNKNOWN_GENOTYPE]),
            samples.iter().map(|s| json!(s)).collect(),
        ),
    })
}

fn stats_entry(study_id: i32, cohort_id: i32) -> Predicate {
    Predicate::and([
        Predicate::eq(schema::STUDY_ID, study_id),
        Predicate::eq(schema::COHORT_ID, cohort_id),
    ])
}

/// Writes the stats of one variant.
///
/// With `overwrite`, previous stats of the same cohorts are pulled first.
pub fn stats_models(
    update: &VariantStatsUpdate,
    config: &StudyConfiguration,
    overwrite: bool,
) -> StorageResult<Vec<WriteModel>> {
    let id = build_storage_id(&update.chromosome, update.start, &update.reference, &update.alternate);
    let mut cohorts = Vec::with_capacity(update.cohort_stats.len());
    let mut docs = Vec::with_capacity(update.cohort_stats.len());
    for (name, stats) in &update.cohort_stats {
        let cohort_id = config
            .resolve_cohort(name)
            .ok_or_else(|| StorageError::Unresolved {
                kind: "cohort",
                value: name.clone(),
            })?;
        cohorts.push(cohort_id);
        docs.push(Value::Object(stats_to_document(config.study_id, cohort_id, stats)));
    }
    if docs.is_empty() {
        return Ok(Vec::new());
    }

    let mut models = Vec::with_capacity(2);
    if overwrite {
        models.push(WriteModel::UpdateOne {
            filter: Predicate::eq(schema::ID, id.clone()),
            update: Update::new().pull(
                schema::STATS,
                Predicate::or(cohorts.iter().map(|c| stats_entry(config.study_id, *c))),
            ),
            upsert: false,
        });
    }
    models.push(WriteModel::UpdateOne {
        filter: Predicate::eq(schema::ID, id),
        update: Update::new().push(schema::STATS, docs),
        upsert: false,
    });
    Ok(models)
}

/// Removes the stats of a cohort from every variant.
pub fn delete_stats_model(study_id: i32, cohort_id: i32) -> WriteModel {
    WriteModel::UpdateMany {
        filter: Predicate::elem_match(schema::STATS, stats_entry(study_id, cohort_id)),
        update: Update::new().pull(schema::STATS, stats_entry(study_id, cohort_id)),
    }
}

/// Replaces the annotation of the variant it describes.
///
/// The one-element `annot` array is written whole, so a variant without any
/// annotation yet gets an array rather than an object keyed `0`.
pub fn annotation_model(annotation: &VariantAnnotation) -> WriteModel {
    let id = build_storage_id(
        &annotation.chromosome,
        annotation.start,
        &annotation.reference,
        &annotation.alternate,
    );
    WriteModel::UpdateOne {
        filter: Predicate::eq(schema::ID, id),
        update: Update::new().set(
            schema::ANNOTATION,
            Value::Array(vec![Value::Object(annotation_to_document(annotation))]),
        ),
        upsert: false,
    }
}

/// Clears the annotation of every variant matching `filter`.
pub fn delete_annotation_model(filter: Predicate) -> WriteModel {
    WriteModel::UpdateMany {
        filter,
        update: Update::new().unset(schema::ANNOTATION),
    }
}

/// Removes a study entry from every variant, then optionally the variants
/// left without any study.
pub fn delete_study_models(study_id: i32, purge: bool) -> Vec<WriteModel> {
    let mut models = vec![WriteModel::UpdateMany {
        filter: Predicate::eq(path(&[schema::STUDIES, schema::STUDY_ID]), study_id),
        update: Update::new().pull(schema::STUDIES, Predicate::eq(schema::STUDY_ID, study_id)),
    }];
    if purge {
        models.push(WriteModel::DeleteMany {
            filter: Predicate::field(schema::STUDIES, Condition::Size(0)),
        });
    }
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{get_path, Document};
    use crate::model::{FileEntry, VariantStats};

    fn config() -> StudyConfiguration {
        StudyConfiguration::new(1, "s1")
            .with_file("a.vcf", 10, &["NA001", "NA002"])
            .with_file("b.vcf", 20, &["NA003"])
            .with_indexed_file(10)
            .with_cohort("ALL", 100, [1, 2, 3])
    }

    fn variant() -> Variant {
        Variant::new("1", 1000, "A", "G").with_id("rs1").with_study(
            StudyEntry::new(1)
                .with_file(FileEntry::new(20))
                .with_sample("NA003", "0/1"),
        )
    }

    fn apply(model: &WriteModel, doc: &mut Document, inserting: bool) {
        let WriteModel::UpdateOne { filter, update, .. } = model else {
            panic!("expected an updateOne");
        };
        let positional = update
            .positional_array()
            .and_then(|array| filter.positional_index(doc, &array));
        update.apply(doc, positional, inserting).unwrap();
    }

    #[test]
    fn test_loaded_samples_excludes_current_file() {
        let sc = config();
        assert_eq!(loaded_samples(&sc, 20), vec![1, 2]);
        assert!(loaded_samples(&sc, 10).is_empty());
    }

    #[test]
    fn test_insert_model_creates_document() {
        let sc = config();
        let model = insert_model(&variant(), &sc, 20, &[1, 2]).unwrap();
        let mut doc = Document::new();
        apply(&model, &mut doc, true);
        assert_eq!(doc[schema::ID], json!("1_0000001000_A_G"));
        assert_eq!(get_path(&doc, "studies.0.gt.0/1"), Some(&json!([3])));
        assert_eq!(get_path(&doc, "studies.0.gt.?/?"), Some(&json!([1, 2])));
        assert_eq!(doc[schema::IDS], json!(["rs1"]));
    }

    #[test]
    fn test_insert_model_filter_excludes_loaded_study() {
        let sc = config();
        let WriteModel::UpdateOne { filter, upsert, .. } = insert_model(&variant(), &sc, 20, &[]).unwrap() else {
            panic!("expected an updateOne");
        };
        assert!(upsert);
        let mut doc = Document::new();
        apply(&insert_model(&variant(), &sc, 20, &[]).unwrap(), &mut doc, true);
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn test_merge_model_targets_study_entry() {
        let sc = config();
        let mut doc = Document::new();
        apply(&insert_model(&variant(), &sc, 20, &[]).unwrap(), &mut doc, true);

        let second = Variant::new("1", 1000, "A", "G").with_study(
            StudyEntry::new(1)
                .with_file(FileEntry::new(10))
                .with_sample("NA001", "1/1")
                .with_sample("NA002", "0/0"),
        );
        apply(&merge_model(&second, &sc, 10).unwrap(), &mut doc, false);
        assert_eq!(get_path(&doc, "studies.0.gt.1/1"), Some(&json!([1])));
        assert_eq!(get_path(&doc, "studies.0.files.1.fid"), Some(&json!(10)));
    }

    #[test]
    fn test_models_only_write_the_loaded_file() {
        let sc = config();
        let both = Variant::new("1", 1000, "A", "G").with_study(
            StudyEntry::new(1)
                .with_file(FileEntry::new(10))
                .with_file(FileEntry::new(20))
                .with_sample("NA001", "1/1")
                .with_sample("NA003", "0/1"),
        );

        let mut doc = Document::new();
        apply(&insert_model(&both, &sc, 20, &[]).unwrap(), &mut doc, true);
        assert_eq!(get_path(&doc, "studies.0.files"), Some(&json!([{"fid": 20, "attrs": {}}])));
        assert_eq!(get_path(&doc, "studies.0.gt.0/1"), Some(&json!([3])));
        assert_eq!(get_path(&doc, "studies.0.gt.1/1"), None);

        apply(&merge_model(&both, &sc, 10).unwrap(), &mut doc, false);
        assert_eq!(get_path(&doc, "studies.0.gt.1/1"), Some(&json!([1])));
        assert_eq!(get_path(&doc, "studies.0.gt.0/1"), Some(&json!([3])));
        assert_eq!(get_path(&doc, "studies.0.files.1.fid"), Some(&json!(10)));
        assert_eq!(get_path(&doc, "studies.0.files.2"), None);
    }

    #[test]
    fn test_annotation_slot_is_an_array() {
        let sc = config();
        let mut doc = Document::new();
        apply(&insert_model(&variant(), &sc, 20, &[]).unwrap(), &mut doc, true);
        assert_eq!(get_path(&doc, schema::ANNOTATION), None);

        let annotation = VariantAnnotation::for_variant(&variant());
        apply(&annotation_model(&annotation), &mut doc, false);
        let slot = get_path(&doc, schema::ANNOTATION).and_then(Value::as_array).unwrap();
        assert_eq!(slot.len(), 1);
        assert!(slot[0].is_object());

        let WriteModel::UpdateMany { update, .. } = delete_annotation_model(Predicate::all()) else {
            panic!("expected an updateMany");
        };
        update.apply(&mut doc, None, false).unwrap();
        assert_eq!(get_path(&doc, schema::ANNOTATION), None);
    }

    #[test]
    fn test_missing_study_entry() {
        let sc = StudyConfiguration::new(9, "other");
        assert!(matches!(insert_model(&variant(), &sc, 20, &[]), Err(StorageError::Document(_))));
    }

    #[test]
    fn test_fill_gaps_skipped_for_unknown_default() {
        let sc = config().with_attribute(crate::model::DEFAULT_GENOTYPE_ATTRIBUTE, UNKNOWN_GENOTYPE);
        assert!(fill_gaps_model(&sc, 20, &[3], &[]).is_none());
        assert!(fill_gaps_model(&config(), 20, &[], &[]).is_none());
        assert!(fill_gaps_model(&config(), 20, &[3], &["1".to_string()]).is_some());
    }

    #[test]
    fn test_stats_models() {
        let sc = config();
        let update = VariantStatsUpdate::new(&variant()).with_cohort("ALL", VariantStats::default());
        assert_eq!(stats_models(&update, &sc, false).unwrap().len(), 1);
        assert_eq!(stats_models(&update, &sc, true).unwrap().len(), 2);

        let unknown = VariantStatsUpdate::new(&variant()).with_cohort("NOPE", VariantStats::default());
        assert!(matches!(
            stats_models(&unknown, &sc, false),
            Err(StorageError::Unresolved { kind: "cohort", .. })
        ));
    }

    #[test]
    fn test_delete_study_models() {
        assert_eq!(delete_study_models(1, false).len(), 1);
        let models = delete_study_models(1, true);
        assert!(matches!(models[1], WriteModel::DeleteMany { .. }));
    }
}
