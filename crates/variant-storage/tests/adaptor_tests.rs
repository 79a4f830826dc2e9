//! Integration tests for the variant adaptor.
//!
//! Every test loads variants through [`VariantAdaptor::insert`] into an
//! [`InMemoryDocumentStore`] and reads them back through the public query
//! surface.

use variant_storage::{
    ConsequenceType, FileEntry, InMemoryDocumentStore, InMemoryStudyConfigurationManager, PopulationFrequency,
    Query, QueryOptions, QueryParam, Region, StorageConfig, StorageError, StudyConfiguration, StudyEntry,
    Variant, VariantAdaptor, VariantAnnotation, VariantStats, VariantStatsUpdate,
};

// ============================================================================
// Fixtures
// ============================================================================

/// Study 1 has two files. File 1 (NA001, NA002) is already loaded, file 2
/// (NA003) is new. Study 2 has a single file with NB001.
fn manager() -> InMemoryStudyConfigurationManager {
    InMemoryStudyConfigurationManager::new()
        .with_study(
            StudyConfiguration::new(1, "s1")
                .with_file("first.vcf", 1, &["NA001", "NA002"])
                .with_file("second.vcf", 2, &["NA003"])
                .with_indexed_file(1)
                .with_cohort("ALL", 10, [1, 2, 3]),
        )
        .with_study(StudyConfiguration::new(2, "s2").with_file("other.vcf", 5, &["NB001"]))
}

fn uncached() -> StorageConfig {
    StorageConfig::builder().without_cache().with_batch_size(4).build()
}

fn file1_variant(chromosome: &str, start: u32, reference: &str, alternate: &str, gts: [&str; 2]) -> Variant {
    Variant::new(chromosome, start, reference, alternate).with_study(
        StudyEntry::new(1)
            .with_file(FileEntry::new(1).with_attribute("FILTER", "PASS"))
            .with_sample("NA001", gts[0])
            .with_sample("NA002", gts[1]),
    )
}

fn file2_variant(chromosome: &str, start: u32, reference: &str, alternate: &str, gt: &str) -> Variant {
    Variant::new(chromosome, start, reference, alternate).with_study(
        StudyEntry::new(1)
            .with_file(FileEntry::new(2))
            .with_sample("NA003", gt),
    )
}

fn annotated(variant: &Variant, gene: &str, so: u32) -> VariantAnnotation {
    let mut annotation = VariantAnnotation::for_variant(variant);
    annotation.consequence_types.push(ConsequenceType {
        gene_name: Some(gene.to_string()),
        ensembl_gene_id: Some(format!("ENSG_{}", gene)),
        so_accessions: vec![so],
        ..ConsequenceType::default()
    });
    annotation
}

fn count(adaptor: &VariantAdaptor<'_>, query: Query) -> u64 {
    adaptor.count(&query).unwrap().results[0]
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_region_and_type() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let variants = vec![
        file1_variant("1", 1000, "A", "T", ["0/1", "0/0"]),
        file1_variant("1", 1500, "A", "AT", ["0/1", "0/1"]),
        file1_variant("1", 9000, "C", "G", ["1/1", "0/1"]),
        file1_variant("2", 1200, "G", "A", ["0/1", "0/0"]),
    ];
    let summary = adaptor.insert(&variants, "s1", 1).unwrap();
    assert_eq!(summary.inserted, 4);
    assert_eq!(summary.skipped, 0);

    let query = Query::new().with(QueryParam::Region, "1:1-2000");
    let result = adaptor.get(&query, &QueryOptions::new()).unwrap();
    assert_eq!(result.num_results, 2);

    let query = Query::new()
        .with(QueryParam::Region, "1:1-2000")
        .with(QueryParam::Type, "SNV");
    let result = adaptor.get(&query, &QueryOptions::new()).unwrap();
    assert_eq!(result.num_results, 1);
    assert_eq!(result.results[0].start, 1000);

    let query = Query::new().with(QueryParam::Region, "1:1-2000,2:1-2000");
    assert_eq!(count(&adaptor, query), 3);
}

#[test]
fn test_limit_reports_total() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let variants: Vec<Variant> = (1..=10)
        .map(|i| file1_variant("3", i * 100, "A", "C", ["0/1", "0/0"]))
        .collect();
    adaptor.insert(&variants, "s1", 1).unwrap();

    let options = QueryOptions::new().with_limit(3).with_skip(2);
    let result = adaptor.get(&Query::new(), &options).unwrap();
    assert_eq!(result.num_results, 3);
    assert_eq!(result.num_total_results, Some(10));
}

#[test]
fn test_iterator_streams_every_variant() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let variants: Vec<Variant> = (1..=6)
        .map(|i| file1_variant("4", i * 10, "G", "T", ["0/1", "0/1"]))
        .collect();
    adaptor.insert(&variants, "s1", 1).unwrap();

    let streamed = adaptor
        .iterator(&Query::new(), &QueryOptions::new())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(streamed.len(), 6);
}

#[test]
fn test_unknown_param_is_a_warning() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let query: Query = [("colour", "blue")].into_iter().collect();
    let result = adaptor.get(&query, &QueryOptions::new()).unwrap();
    assert_eq!(result.num_results, 0);
    assert_eq!(result.warnings.len(), 1);
}

#[test]
fn test_unknown_sample_fails() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let query = Query::new().with(QueryParam::Genotype, "NOBODY:0/1");
    let err = adaptor.get(&query, &QueryOptions::new());
    assert!(matches!(err, Err(StorageError::Unresolved { kind: "sample", .. })));
}

#[test]
fn test_genotype_partition() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let variants = vec![
        file1_variant("5", 100, "A", "T", ["0/1", "0/0"]),
        file1_variant("5", 200, "A", "G", ["0/0", "0/1"]),
        file1_variant("5", 300, "C", "T", ["1/1", "0/0"]),
        file1_variant("5", 400, "T", "G", ["0/0", "1/1"]),
        file1_variant("5", 500, "G", "C", ["0/1", "0/1"]),
    ];
    adaptor.insert(&variants, "s1", 1).unwrap();

    let total = count(&adaptor, Query::new());
    let hom_ref = count(&adaptor, Query::new().with(QueryParam::Genotype, "NA001:0/0"));
    let het = count(&adaptor, Query::new().with(QueryParam::Genotype, "NA001:0/1"));
    let hom_alt = count(&adaptor, Query::new().with(QueryParam::Genotype, "NA001:1/1"));
    assert_eq!(hom_ref, 2);
    assert_eq!(het, 2);
    assert_eq!(hom_alt, 1);
    assert_eq!(hom_ref + het + hom_alt, total);

    let either = count(&adaptor, Query::new().with(QueryParam::Genotype, "NA001:0/1,1/1"));
    assert_eq!(either, 3);

    let read = adaptor
        .get(&Query::new().with(QueryParam::Region, "5:200-200"), &QueryOptions::new())
        .unwrap();
    let entry = read.results[0].study(1).unwrap();
    assert_eq!(entry.genotype("NA001"), Some("0/0"));
    assert_eq!(entry.genotype("NA002"), Some("0/1"));
}

#[test]
fn test_distinct_chromosomes() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let variants = vec![
        file1_variant("1", 100, "A", "T", ["0/1", "0/0"]),
        file1_variant("1", 200, "A", "G", ["0/1", "0/0"]),
        file1_variant("X", 300, "C", "T", ["0/1", "0/0"]),
    ];
    adaptor.insert(&variants, "s1", 1).unwrap();

    let result = adaptor.distinct(&Query::new(), "chromosome").unwrap();
    let mut values: Vec<String> = result
        .results
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    values.sort();
    assert_eq!(values, vec!["1", "X"]);
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_second_file_merges_into_existing_variants() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let first = vec![
        file1_variant("1", 100, "A", "T", ["0/1", "0/0"]),
        file1_variant("1", 200, "C", "G", ["1/1", "0/1"]),
    ];
    adaptor.insert(&first, "s1", 1).unwrap();

    let second = vec![
        file2_variant("1", 200, "C", "G", "0/1"),
        file2_variant("1", 300, "T", "A", "1/1"),
    ];
    let summary = adaptor.insert(&second, "s1", 2).unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(store.len(), 3);

    let shared = adaptor
        .get(&Query::new().with(QueryParam::Region, "1:200-200"), &QueryOptions::new())
        .unwrap();
    let entry = shared.results[0].study(1).unwrap();
    assert!(entry.has_file(1));
    assert!(entry.has_file(2));
    assert_eq!(entry.genotype("NA001"), Some("1/1"));
    assert_eq!(entry.genotype("NA002"), Some("0/1"));
    assert_eq!(entry.genotype("NA003"), Some("0/1"));

    // Samples of the loaded file are unknown on the variant file 2 introduced
    let fresh = adaptor
        .get(&Query::new().with(QueryParam::Region, "1:300-300"), &QueryOptions::new())
        .unwrap();
    let entry = fresh.results[0].study(1).unwrap();
    assert_eq!(entry.genotype("NA001"), Some("?/?"));
    assert_eq!(entry.genotype("NA002"), Some("?/?"));
    assert_eq!(entry.genotype("NA003"), Some("1/1"));
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Genotype, "NA001:0/0")), 0);
}

#[test]
fn test_insert_writes_only_the_loaded_file() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let both_files = |na001: &str, na003: &str| {
        Variant::new("1", 100, "A", "T").with_study(
            StudyEntry::new(1)
                .with_file(FileEntry::new(1))
                .with_file(FileEntry::new(2))
                .with_sample("NA001", na001)
                .with_sample("NA002", "0/0")
                .with_sample("NA003", na003),
        )
    };

    adaptor.insert(&[both_files("0/1", "1/1")], "s1", 1).unwrap();
    let result = adaptor.get(&Query::new(), &QueryOptions::new()).unwrap();
    let entry = result.results[0].study(1).unwrap();
    assert!(entry.has_file(1));
    assert!(!entry.has_file(2));
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Genotype, "NA003:1/1")), 0);

    // The merge phase takes file 2's sample and leaves file 1's alone
    let summary = adaptor.insert(&[both_files("1/1", "1/1")], "s1", 2).unwrap();
    assert_eq!(summary.duplicates, 1);
    let result = adaptor.get(&Query::new(), &QueryOptions::new()).unwrap();
    let entry = result.results[0].study(1).unwrap();
    assert!(entry.has_file(2));
    assert_eq!(entry.files.len(), 2);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Genotype, "NA003:1/1")), 1);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Genotype, "NA001:1/1")), 0);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Genotype, "NA001:0/1")), 1);
}

#[test]
fn test_reloading_a_file_is_idempotent() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let variants = vec![
        file1_variant("1", 100, "A", "T", ["0/1", "0/0"]),
        file1_variant("1", 200, "C", "G", ["1/1", "0/1"]),
    ];
    adaptor.insert(&variants, "s1", 1).unwrap();
    let before: Vec<Variant> = adaptor.get(&Query::new(), &QueryOptions::new()).unwrap().results;

    let summary = adaptor.insert(&variants, "s1", 1).unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 2);

    let after: Vec<Variant> = adaptor.get(&Query::new(), &QueryOptions::new()).unwrap().results;
    assert_eq!(after.len(), before.len());
    for (a, b) in before.iter().zip(&after) {
        let (a, b) = (a.study(1).unwrap(), b.study(1).unwrap());
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.files.len(), b.files.len());
    }
}

#[test]
fn test_variant_without_study_entry_is_skipped() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let variants = vec![
        file1_variant("1", 100, "A", "T", ["0/1", "0/0"]),
        Variant::new("1", 150, "A", "C"),
    ];
    let summary = adaptor.insert(&variants, "s1", 1).unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.skipped, 1);
}

#[test]
fn test_unknown_study_fails() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let err = adaptor.insert(&[file1_variant("1", 100, "A", "T", ["0/1", "0/0"])], "nope", 1);
    assert!(matches!(err, Err(StorageError::Unresolved { kind: "study", .. })));
}

#[test]
fn test_fill_file_gaps() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    adaptor
        .insert(
            &[
                file1_variant("1", 100, "A", "T", ["0/1", "0/0"]),
                file1_variant("1", 200, "C", "G", ["0/1", "0/1"]),
            ],
            "s1",
            1,
        )
        .unwrap();
    adaptor.insert(&[file2_variant("1", 200, "C", "G", "1/1")], "s1", 2).unwrap();

    let summary = adaptor.fill_file_gaps("s1", 2, &["1".to_string()]).unwrap();
    assert_eq!(summary.updated, 1);

    let query = Query::new()
        .with(QueryParam::Region, "1:100-100")
        .with(QueryParam::IncludeSample, "NA003");
    let result = adaptor.get(&query, &QueryOptions::new()).unwrap();
    let entry = result.results[0].study(1).unwrap();
    assert_eq!(entry.samples.len(), 1);
    assert_eq!(entry.genotype("NA003"), Some("?/?"));

    let err = adaptor.fill_file_gaps("s1", 99, &[]);
    assert!(matches!(err, Err(StorageError::Unresolved { kind: "file", .. })));
}

// ============================================================================
// Maintenance
// ============================================================================

fn stats(maf: f64) -> VariantStats {
    VariantStats {
        maf,
        mgf: maf,
        ..VariantStats::default()
    }
}

#[test]
fn test_stats_update_overwrite_and_delete() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let rare = file1_variant("1", 100, "A", "T", ["0/1", "0/0"]);
    let common = file1_variant("1", 200, "C", "G", ["1/1", "0/1"]);
    adaptor.insert(&[rare.clone(), common.clone()], "s1", 1).unwrap();

    let updates = vec![
        VariantStatsUpdate::new(&rare).with_cohort("ALL", stats(0.01)),
        VariantStatsUpdate::new(&common).with_cohort("ALL", stats(0.4)),
    ];
    adaptor.update_stats(&updates, "s1", false).unwrap();

    let rare_query = || Query::new().with(QueryParam::StatsMaf, "s1:ALL<0.1");
    assert_eq!(count(&adaptor, rare_query()), 1);

    // Overwriting replaces the cohort entry instead of adding a second one
    let updates = vec![VariantStatsUpdate::new(&rare).with_cohort("ALL", stats(0.3))];
    adaptor.update_stats(&updates, "s1", true).unwrap();
    assert_eq!(count(&adaptor, rare_query()), 0);
    let read = adaptor
        .get(&Query::new().with(QueryParam::Region, "1:100-100"), &QueryOptions::new())
        .unwrap();
    assert_eq!(read.results[0].stats.len(), 1);

    adaptor.delete_stats("s1", "ALL").unwrap();
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::StatsMaf, "s1:ALL>=0")), 0);

    let err = adaptor.delete_stats("s1", "NOPE");
    assert!(matches!(err, Err(StorageError::Unresolved { kind: "cohort", .. })));
}

#[test]
fn test_annotation_update_and_delete() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    let brca = file1_variant("13", 32_900_000, "A", "G", ["0/1", "0/0"]);
    let tp53 = file1_variant("17", 7_570_000, "C", "T", ["0/1", "0/1"]);
    adaptor.insert(&[brca.clone(), tp53.clone()], "s1", 1).unwrap();

    let mut tp53_annotation = annotated(&tp53, "TP53", 1583);
    tp53_annotation.population_frequencies.push(PopulationFrequency {
        study: "1kG".into(),
        population: "ALL".into(),
        ref_allele_freq: 0.99,
        alt_allele_freq: 0.01,
    });
    let summary = adaptor
        .update_annotations(&[annotated(&brca, "BRCA2", 1587), tp53_annotation])
        .unwrap();
    assert_eq!(summary.updated, 2);

    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Gene, "BRCA2")), 1);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::AnnotationExists, "true")), 2);
    assert_eq!(
        count(&adaptor, Query::new().with(QueryParam::AnnotPopulationAltFrequency, "1kG:ALL<0.05")),
        1
    );

    let read = adaptor
        .get(&Query::new().with(QueryParam::Gene, "TP53"), &QueryOptions::new())
        .unwrap();
    let annotation = read.results[0].annotation.as_ref().unwrap();
    assert_eq!(annotation.consequence_types[0].gene_name.as_deref(), Some("TP53"));

    adaptor
        .delete_annotation(&Query::new().with(QueryParam::Chromosome, "13"))
        .unwrap();
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::AnnotationExists, "false")), 1);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Gene, "BRCA2")), 0);
}

#[test]
fn test_delete_study_with_purge() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    adaptor
        .insert(
            &[
                file1_variant("1", 100, "A", "T", ["0/1", "0/0"]),
                file1_variant("1", 200, "C", "G", ["0/1", "0/1"]),
            ],
            "s1",
            1,
        )
        .unwrap();
    let other = Variant::new("1", 200, "C", "G").with_study(
        StudyEntry::new(2)
            .with_file(FileEntry::new(5))
            .with_sample("NB001", "0/1"),
    );
    let summary = adaptor.insert(&[other], "s2", 5).unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 0);

    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Study, "s2")), 1);

    let summary = adaptor.delete_study("s1", true).unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(store.len(), 1);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Study, "s1")), 0);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Study, "s2")), 1);
}

#[test]
fn test_delete_study_without_purge_keeps_documents() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    adaptor
        .insert(&[file1_variant("1", 100, "A", "T", ["0/1", "0/0"])], "s1", 1)
        .unwrap();
    adaptor.delete_study("s1", false).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(count(&adaptor, Query::new().with(QueryParam::Study, "s1")), 0);
}

#[test]
fn test_delete_by_query() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    adaptor
        .insert(
            &[
                file1_variant("1", 100, "A", "T", ["0/1", "0/0"]),
                file1_variant("2", 100, "A", "T", ["0/1", "0/0"]),
            ],
            "s1",
            1,
        )
        .unwrap();
    let summary = adaptor.delete(&Query::new().with(QueryParam::Chromosome, "2")).unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(store.len(), 1);
}

// ============================================================================
// Aggregations
// ============================================================================

#[test]
fn test_group_by_gene_with_limit() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    // 6 + 5 + 4 + 3 + 1 + 1 = 20 variants
    let genes = [("GENE_A", 6), ("GENE_B", 5), ("GENE_C", 4), ("GENE_D", 3), ("GENE_E", 1), ("GENE_F", 1)];
    let mut variants = Vec::new();
    let mut annotations = Vec::new();
    let mut position = 1000;
    for (gene, n) in genes {
        for _ in 0..n {
            let variant = file1_variant("7", position, "A", "G", ["0/1", "0/0"]);
            annotations.push(annotated(&variant, gene, 1583));
            variants.push(variant);
            position += 10;
        }
    }
    adaptor.insert(&variants, "s1", 1).unwrap();
    adaptor.update_annotations(&annotations).unwrap();

    let options = QueryOptions::new().with_limit(5).with_count(true);
    let result = adaptor.group_by(&Query::new(), "gene", &options).unwrap();
    assert_eq!(result.num_results, 5);
    let top: Vec<(&str, u64)> = result
        .results
        .iter()
        .take(4)
        .map(|g| (g.id.as_str().unwrap_or_default(), g.count))
        .collect();
    assert_eq!(top, vec![("GENE_A", 6), ("GENE_B", 5), ("GENE_C", 4), ("GENE_D", 3)]);
    assert_eq!(result.results[4].count, 1);

    let least = adaptor.rank(&Query::new(), "gene", 2, true).unwrap();
    assert_eq!(least.results.len(), 2);
    assert!(least.results.iter().all(|g| g.count == 1));

    let err = adaptor.group_by(&Query::new(), "colour", &options);
    assert!(err.is_err());
}

#[test]
fn test_frequency_histogram() {
    let studies = manager();
    let store = InMemoryDocumentStore::new();
    let adaptor = VariantAdaptor::with_config(&store, &studies, uncached());

    adaptor
        .insert(
            &[
                file1_variant("1", 1500, "A", "T", ["0/1", "0/0"]),
                file1_variant("1", 1600, "A", "G", ["0/1", "0/0"]),
                file1_variant("1", 2500, "C", "T", ["0/1", "0/0"]),
                file1_variant("1", 3100, "G", "A", ["0/1", "0/0"]),
                file1_variant("1", 3200, "G", "C", ["0/1", "0/0"]),
                file1_variant("1", 3300, "T", "C", ["0/1", "0/0"]),
                file1_variant("2", 1500, "C", "T", ["0/1", "0/0"]),
            ],
            "s1",
            1,
        )
        .unwrap();

    let region = Region::new("1", 1000, 4000);
    let result = adaptor.get_frequency(&Query::new(), &region, 1000).unwrap();
    let buckets = result.results;
    assert_eq!(buckets.len(), 4);
    assert_eq!(buckets[0].start, 1000);
    assert_eq!(buckets[0].end, 1999);
    // Counts are log scaled: a single variant and an empty bucket both read 0
    assert!((buckets[0].features_count - 2f64.ln()).abs() < 1e-9);
    assert_eq!(buckets[1].features_count, 0.0);
    assert!((buckets[2].features_count - 3f64.ln()).abs() < 1e-9);
    assert!(buckets[2].features_count > buckets[0].features_count);
    assert_eq!(buckets[3].features_count, 0.0);
}
