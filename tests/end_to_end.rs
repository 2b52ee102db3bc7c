use casedup::error::EmbedError;
use casedup::pipeline::{analyze_catalog, load_tables, work_list_artifacts, Outputs};
use casedup::report::{
    read_csv_file, read_stats, ExactDuplicateRow, PassStatus, EXACT_FILE, SIMILAR_FILE, STATS_FILE,
    WORK_LIST_EXACT_FILE, WORK_LIST_HIGH_OVERLAP_FILE, WORK_LIST_PERFECT_FILE,
};
use casedup::config::EmbeddingBackend;
use casedup::{load_embedder, Config, Embedder, HashingEmbedder, Relation, SimilarPair};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "ID,Title,Section,Steps (Step),Steps (Expected Result)";

fn write_catalog(dir: &Path, rows: &[&str]) -> PathBuf {
    let path = dir.join("cases.csv");
    let mut content = String::from(HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    fs::write(&path, content).unwrap();
    path
}

fn five_case_catalog(dir: &Path) -> PathBuf {
    write_catalog(
        dir,
        &[
            "C1,Login,Auth,\"1. Open app\n2. Tap login\",\"1. Home shown\"",
            "C2,Login,Auth,\"1. Open app\n2. Tap login\",\"1. Home shown\"",
            "C3,Change wallpaper,Display,\"1. Open gallery\n2. Pick image\",\"1. Wallpaper updated\"",
            "C4,Export report as PDF,Reports,\"1. Open reports\n2. Tap export\",\"1. PDF saved\"",
            "C5,Delete account,Profile,\"1. Open profile\n2. Tap delete\",\"1. Account removed\"",
        ],
    )
}

/// Fixed vectors keyed by normalized title, for scenarios that need an exact
/// similarity value.
struct FixedEmbedder;

impl Embedder for FixedEmbedder {
    fn dimension(&self) -> usize {
        2
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let y = (1.0f32 - 0.81).sqrt();
        if text.starts_with("title: alpha") {
            Ok(vec![1.0, 0.0])
        } else if text.starts_with("title: beta") {
            Ok(vec![0.9, y])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
}

struct OfflineEmbedder;

impl Embedder for OfflineEmbedder {
    fn dimension(&self) -> usize {
        16
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Service("connection refused".to_string()))
    }
}

#[test]
fn identical_cases_form_one_group_and_unrelated_case_stays_out() {
    let tmp = TempDir::new().unwrap();
    let catalog = five_case_catalog(tmp.path());
    let config = Config::default();

    let analysis = analyze_catalog(&catalog, &config, &HashingEmbedder::default()).unwrap();
    let out = tmp.path().join("out");
    analysis
        .artifacts(&config.thresholds, Outputs::All)
        .unwrap()
        .write_to(&out)
        .unwrap();

    let rows: Vec<ExactDuplicateRow> = read_csv_file(&out.join(EXACT_FILE)).unwrap();
    assert_eq!(
        rows,
        vec![
            ExactDuplicateRow {
                case_id: "C1".to_string(),
                title: "Login".to_string(),
                group_id: 1,
                section: "Auth".to_string(),
            },
            ExactDuplicateRow {
                case_id: "C2".to_string(),
                title: "Login".to_string(),
                group_id: 1,
                section: "Auth".to_string(),
            },
        ]
    );

    let pairs: Vec<SimilarPair> = read_csv_file(&out.join(SIMILAR_FILE)).unwrap();
    assert!(pairs.iter().all(|p| p.case_id_1 != "C3" && p.case_id_2 != "C3"));
    assert!(pairs.iter().all(|p| p.similarity >= 0.80));

    let stats = read_stats(&out).unwrap().unwrap();
    assert_eq!(stats.total_cases, 5);
    assert_eq!(stats.exact_groups, 1);
    assert_eq!(stats.exact_archive_candidates, 1);
    assert_eq!(stats.semantic_pass, PassStatus::Completed);
}

#[test]
fn similar_wording_with_few_shared_steps_is_not_high_overlap() {
    let tmp = TempDir::new().unwrap();
    let catalog = write_catalog(
        tmp.path(),
        &[
            "A1,Alpha flow,,\"1. Open app\n2. Tap login\n3. Check home\n4. Tap logout\n5. Close app\",",
            "B1,Beta flow,,\"1. Open app\n2. Tap login\n3. Change wallpaper\n4. Export report\n5. Delete account\",",
            "Z1,Zeta flow,,\"1. Rotate device\",",
        ],
    );
    let config = Config::default();

    let analysis = analyze_catalog(&catalog, &config, &FixedEmbedder).unwrap();
    let pairs = analysis.pairs().unwrap();
    assert_eq!(pairs.len(), 1);

    let pair = &pairs[0];
    assert_eq!((pair.case_id_1.as_str(), pair.case_id_2.as_str()), ("A1", "B1"));
    assert_eq!(pair.similarity, 0.9);
    assert_eq!(pair.step_overlap, 0.4);
    assert_eq!(pair.relation, Relation::SemanticDuplicate);
    assert!(!pair.shares_most_steps);

    let lists = analysis.work_lists(&config.thresholds);
    assert!(lists.high_overlap.is_empty());
    assert!(lists.perfect.is_empty());
    assert!(lists.high_priority.is_empty());
}

#[test]
fn embedding_failure_still_writes_exact_results() {
    let tmp = TempDir::new().unwrap();
    let catalog = five_case_catalog(tmp.path());
    let config = Config::default();

    let analysis = analyze_catalog(&catalog, &config, &OfflineEmbedder).unwrap();
    assert!(analysis.semantic.is_err());

    let out = tmp.path().join("out");
    analysis
        .artifacts(&config.thresholds, Outputs::All)
        .unwrap()
        .write_to(&out)
        .unwrap();

    assert!(out.join(EXACT_FILE).exists());
    assert!(out.join(WORK_LIST_EXACT_FILE).exists());
    assert!(out.join(STATS_FILE).exists());
    assert!(!out.join(SIMILAR_FILE).exists());
    assert!(!out.join(WORK_LIST_PERFECT_FILE).exists());
    assert!(!out.join(WORK_LIST_HIGH_OVERLAP_FILE).exists());

    let stats = read_stats(&out).unwrap().unwrap();
    assert_eq!(stats.semantic_pass, PassStatus::Failed);
    assert_eq!(stats.exact_groups, 1);
}

#[test]
fn missing_title_column_aborts_without_output() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("cases.csv");
    fs::write(&path, "ID,Name\nC1,Login\n").unwrap();

    let err = analyze_catalog(&path, &Config::default(), &HashingEmbedder::default()).unwrap_err();
    assert!(err.to_string().contains("title"));
}

#[test]
fn work_lists_rebuilt_from_tables_match_direct_run() {
    let tmp = TempDir::new().unwrap();
    let catalog = write_catalog(
        tmp.path(),
        &[
            "C10,Login,Auth,\"1. Open app\n2. Tap login\",\"1. Home shown\"",
            "C9,Login,Auth,\"1. Open app\n2. Tap login\",\"1. Home shown\"",
            "C12,Login,Auth,\"1. Open app\n2. Tap login\",\"1. Home shown\"",
            "C3,Change wallpaper,Display,\"1. Open gallery\n2. Pick image\",\"1. Wallpaper updated\"",
            "C4,Change the wallpaper,Display,\"1. Open gallery\n2. Pick image\",\"1. Wallpaper updated\"",
        ],
    );
    let config = Config::default();
    let analysis = analyze_catalog(&catalog, &config, &HashingEmbedder::default()).unwrap();
    let expected = analysis.work_lists(&config.thresholds);

    let out = tmp.path().join("out");
    analysis
        .artifacts(&config.thresholds, Outputs::Tables)
        .unwrap()
        .write_to(&out)
        .unwrap();
    assert!(!out.join(WORK_LIST_EXACT_FILE).exists());

    let tables = load_tables(&out).unwrap();
    let (lists, artifacts) = work_list_artifacts(&tables, &config.thresholds).unwrap();
    assert_eq!(lists, expected);
    assert_eq!(lists.exact[0].suggested_keep, "C9");
    assert_eq!(lists.exact[0].suggested_archive, "C10, C12");

    artifacts.write_to(&out).unwrap();
    let exact_list = fs::read_to_string(out.join(WORK_LIST_EXACT_FILE)).unwrap();
    assert!(exact_list.starts_with("Group_ID,Group_Size,Case_ID,Title,Suggested_KEEP"));
    assert!(out.join(WORK_LIST_PERFECT_FILE).exists());
}

#[test]
fn unloadable_model_degrades_to_exact_results() {
    let tmp = TempDir::new().unwrap();
    let catalog = five_case_catalog(tmp.path());
    let mut config = Config::default();
    config.embedding.backend = EmbeddingBackend::Onnx;
    config.embedding.model_dir = tmp.path().join("no-model");

    let embedder = load_embedder(&config.embedding);
    let analysis = analyze_catalog(&catalog, &config, &*embedder).unwrap();
    assert!(matches!(analysis.semantic, Err(EmbedError::Service(_))));
    assert_eq!(analysis.exact_groups.len(), 1);
    assert_eq!(analysis.stats().semantic_pass, PassStatus::Failed);
}
