//! Side-channel artifacts: CSV tables, run statistics and the priority
//! summary. Nothing here feeds back into the computation.

use crate::case::CanonicalCase;
use crate::config::Thresholds;
use crate::error::ReportError;
use crate::exact::DuplicateGroup;
use crate::pairs::{Relation, SimilarPair};
use crate::worklist::{case_id_sort_key, WorkLists};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const EXACT_FILE: &str = "duplicates_exact.csv";
pub const SIMILAR_FILE: &str = "similar_pairs.csv";
pub const WORK_LIST_EXACT_FILE: &str = "WORK_LIST_EXACT.csv";
pub const WORK_LIST_PERFECT_FILE: &str = "WORK_LIST_PERFECT_MATCHES.csv";
pub const WORK_LIST_HIGH_PRIORITY_FILE: &str = "WORK_LIST_SIMILAR_HIGH_PRIORITY.csv";
pub const WORK_LIST_HIGH_OVERLAP_FILE: &str = "WORK_LIST_HIGH_OVERLAP.csv";
pub const STATS_FILE: &str = "analysis_stats.json";

const EXACT_HEADERS: &[&str] = &["case_id", "title", "group_id", "section"];
const SIMILAR_HEADERS: &[&str] = &[
    "case_id_1",
    "title_1",
    "case_id_2",
    "title_2",
    "similarity",
    "step_overlap",
    "relation",
    "shares_most_steps",
];
const EXACT_WORK_HEADERS: &[&str] = &[
    "Group_ID",
    "Group_Size",
    "Case_ID",
    "Title",
    "Suggested_KEEP",
    "Suggested_ARCHIVE",
    "Decision",
    "Status",
    "Notes",
];
const PERFECT_WORK_HEADERS: &[&str] = &[
    "case_id_1",
    "title_1",
    "case_id_2",
    "title_2",
    "similarity",
    "step_overlap",
    "Suggested_KEEP",
    "Suggested_ARCHIVE",
    "Decision",
    "Status",
    "Notes",
];
const PAIR_REVIEW_HEADERS: &[&str] = &[
    "case_id_1",
    "title_1",
    "case_id_2",
    "title_2",
    "similarity",
    "step_overlap",
    "relation",
    "shares_most_steps",
    "Suggested_Action",
    "Decision",
    "Status",
    "Notes",
];

/// One member of an exact-duplicate group, as written to `duplicates_exact.csv`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExactDuplicateRow {
    pub case_id: String,
    pub title: String,
    pub group_id: usize,
    #[serde(default)]
    pub section: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisStats {
    pub total_cases: usize,
    pub records_with_warnings: usize,
    pub exact_groups: usize,
    pub cases_in_exact_groups: usize,
    pub exact_archive_candidates: usize,
    pub similar_pairs: usize,
    pub semantic_duplicates: usize,
    pub pairs_sharing_most_steps: usize,
    pub semantic_pass: PassStatus,
    pub generated_at: u64,
}

impl AnalysisStats {
    pub fn new(
        total_cases: usize,
        records_with_warnings: usize,
        groups: &[DuplicateGroup],
        pairs: Option<&[SimilarPair]>,
    ) -> Self {
        let pairs_or_empty = pairs.unwrap_or_default();
        Self {
            total_cases,
            records_with_warnings,
            exact_groups: groups.len(),
            cases_in_exact_groups: groups.iter().map(|g| g.group_size).sum(),
            exact_archive_candidates: groups.iter().map(|g| g.group_size - 1).sum(),
            similar_pairs: pairs_or_empty.len(),
            semantic_duplicates: pairs_or_empty
                .iter()
                .filter(|p| p.relation == Relation::SemanticDuplicate)
                .count(),
            pairs_sharing_most_steps: pairs_or_empty.iter().filter(|p| p.shares_most_steps).count(),
            semantic_pass: if pairs.is_some() {
                PassStatus::Completed
            } else {
                PassStatus::Failed
            },
            generated_at: unix_now(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Flatten groups into one row per member, ordered by group then case id.
pub fn exact_rows(groups: &[DuplicateGroup], cases: &[CanonicalCase]) -> Vec<ExactDuplicateRow> {
    let by_id: HashMap<&str, &CanonicalCase> = cases.iter().map(|c| (c.case_id.as_str(), c)).collect();
    let mut rows = Vec::new();
    for group in groups {
        let mut members = group.member_case_ids.clone();
        members.sort_by_key(|id| case_id_sort_key(id));
        for case_id in members {
            let case = by_id.get(case_id.as_str());
            rows.push(ExactDuplicateRow {
                title: case.map(|c| c.title.clone()).unwrap_or_default(),
                section: case.and_then(|c| c.section.clone()).unwrap_or_default(),
                group_id: group.group_id,
                case_id,
            });
        }
    }
    rows
}

/// Rebuild groups and a title lookup from `duplicates_exact.csv` rows.
pub fn groups_from_rows(rows: &[ExactDuplicateRow]) -> (Vec<DuplicateGroup>, HashMap<String, String>) {
    let mut order: Vec<usize> = Vec::new();
    let mut members: HashMap<usize, Vec<String>> = HashMap::new();
    let mut titles = HashMap::new();
    for row in rows {
        members
            .entry(row.group_id)
            .or_insert_with(|| {
                order.push(row.group_id);
                Vec::new()
            })
            .push(row.case_id.clone());
        titles.insert(row.case_id.clone(), row.title.clone());
    }
    let groups = order
        .into_iter()
        .map(|group_id| {
            let member_case_ids = members.remove(&group_id).unwrap_or_default();
            DuplicateGroup {
                group_id,
                group_size: member_case_ids.len(),
                member_case_ids,
            }
        })
        .collect();
    (groups, titles)
}

pub fn render_csv<T: Serialize>(headers: &[&str], rows: &[T]) -> Result<String, ReportError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
    wtr.write_record(headers)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn read_csv_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, ReportError> {
    if !path.exists() {
        return Err(ReportError::MissingArtifact(path.display().to_string()));
    }
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

const RUN_FILES: &[&str] = &[
    EXACT_FILE,
    SIMILAR_FILE,
    WORK_LIST_EXACT_FILE,
    WORK_LIST_PERFECT_FILE,
    WORK_LIST_HIGH_PRIORITY_FILE,
    WORK_LIST_HIGH_OVERLAP_FILE,
    STATS_FILE,
];
const WORK_LIST_FILES: &[&str] = &[
    WORK_LIST_EXACT_FILE,
    WORK_LIST_PERFECT_FILE,
    WORK_LIST_HIGH_PRIORITY_FILE,
    WORK_LIST_HIGH_OVERLAP_FILE,
];

/// Artifacts rendered in memory; written together once everything succeeded.
///
/// A set owns a fixed list of file names. Writing it removes owned files it
/// does not contain, so a directory never mixes tables from different runs.
#[derive(Debug)]
pub struct ArtifactSet {
    owned: &'static [&'static str],
    files: Vec<(&'static str, String)>,
}

impl ArtifactSet {
    /// Everything `run` and `find` produce.
    pub fn for_run() -> Self {
        Self {
            owned: RUN_FILES,
            files: Vec::new(),
        }
    }

    /// The work lists `worklist` rebuilds; tables are left alone.
    pub fn for_work_lists() -> Self {
        Self {
            owned: WORK_LIST_FILES,
            files: Vec::new(),
        }
    }

    pub fn add_exact(&mut self, rows: &[ExactDuplicateRow]) -> Result<(), ReportError> {
        self.files.push((EXACT_FILE, render_csv(EXACT_HEADERS, rows)?));
        Ok(())
    }

    pub fn add_similar(&mut self, pairs: &[SimilarPair]) -> Result<(), ReportError> {
        self.files.push((SIMILAR_FILE, render_csv(SIMILAR_HEADERS, pairs)?));
        Ok(())
    }

    pub fn add_exact_work_list(&mut self, lists: &WorkLists) -> Result<(), ReportError> {
        self.files
            .push((WORK_LIST_EXACT_FILE, render_csv(EXACT_WORK_HEADERS, &lists.exact)?));
        Ok(())
    }

    pub fn add_pair_work_lists(&mut self, lists: &WorkLists) -> Result<(), ReportError> {
        self.files
            .push((WORK_LIST_PERFECT_FILE, render_csv(PERFECT_WORK_HEADERS, &lists.perfect)?));
        self.files.push((
            WORK_LIST_HIGH_PRIORITY_FILE,
            render_csv(PAIR_REVIEW_HEADERS, &lists.high_priority)?,
        ));
        self.files.push((
            WORK_LIST_HIGH_OVERLAP_FILE,
            render_csv(PAIR_REVIEW_HEADERS, &lists.high_overlap)?,
        ));
        Ok(())
    }

    pub fn add_stats(&mut self, stats: &AnalysisStats) -> Result<(), ReportError> {
        self.files.push((STATS_FILE, serde_json::to_string_pretty(stats)?));
        Ok(())
    }

    pub fn file_names(&self) -> Vec<&'static str> {
        self.files.iter().map(|(name, _)| *name).collect()
    }

    pub fn write_to(&self, dir: &Path) -> Result<(), ReportError> {
        fs::create_dir_all(dir)?;
        for name in self.owned {
            let path = dir.join(name);
            if !self.files.iter().any(|(f, _)| f == name) && path.exists() {
                fs::remove_file(&path)?;
                tracing::info!(path = %path.display(), "removed stale artifact");
            }
        }
        for (name, content) in &self.files {
            fs::write(dir.join(name), content)?;
        }
        tracing::info!(dir = %dir.display(), files = self.files.len(), "artifacts written");
        Ok(())
    }
}

pub fn read_stats(dir: &Path) -> Result<Option<AnalysisStats>, ReportError> {
    let path = dir.join(STATS_FILE);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?))
}

/// Exact group as shown in the console summary.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLine {
    pub group_id: usize,
    pub size: usize,
    pub title: String,
    pub keep: String,
    pub archive: Vec<String>,
}

/// Prioritized review tiers, computed from the same tables the work lists use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrioritySummary {
    /// Groups of four or more, largest first.
    pub large_groups: Vec<GroupLine>,
    pub medium_groups: Vec<GroupLine>,
    pub small_group_count: usize,
    pub exact_archive_total: usize,
    pub perfect_pairs: Vec<SimilarPair>,
    pub near_perfect_pairs: usize,
    pub high_overlap_pairs: usize,
    pub total_cases: Option<usize>,
}

impl PrioritySummary {
    /// Archive suggestions from exact groups plus one per perfect pair.
    pub fn estimated_reduction(&self) -> usize {
        self.exact_archive_total + self.perfect_pairs.len()
    }

    pub fn reduction_percent(&self) -> Option<f64> {
        self.total_cases
            .filter(|&total| total > 0)
            .map(|total| self.estimated_reduction() as f64 * 100.0 / total as f64)
    }
}

pub fn priority_summary(
    groups: &[DuplicateGroup],
    titles: &HashMap<String, String>,
    pairs: &[SimilarPair],
    thresholds: &Thresholds,
    total_cases: Option<usize>,
) -> PrioritySummary {
    let mut ordered: Vec<&DuplicateGroup> = groups.iter().collect();
    ordered.sort_by(|a, b| b.group_size.cmp(&a.group_size).then(a.group_id.cmp(&b.group_id)));

    let mut summary = PrioritySummary {
        total_cases,
        ..PrioritySummary::default()
    };
    for group in ordered {
        summary.exact_archive_total += group.group_size.saturating_sub(1);
        if group.group_size < 3 {
            summary.small_group_count += 1;
            continue;
        }
        let mut members = group.member_case_ids.clone();
        members.sort_by_key(|id| case_id_sort_key(id));
        let keep = members.first().cloned().unwrap_or_default();
        let line = GroupLine {
            group_id: group.group_id,
            size: group.group_size,
            title: titles.get(&keep).cloned().unwrap_or_default(),
            keep,
            archive: members.into_iter().skip(1).collect(),
        };
        if group.group_size >= 4 {
            summary.large_groups.push(line);
        } else {
            summary.medium_groups.push(line);
        }
    }

    summary.perfect_pairs = pairs.iter().filter(|p| p.similarity >= 1.0).cloned().collect();
    summary.near_perfect_pairs = pairs
        .iter()
        .filter(|p| p.similarity >= thresholds.high_priority && p.similarity < 1.0)
        .count();
    summary.high_overlap_pairs = pairs
        .iter()
        .filter(|p| p.similarity >= thresholds.semantic_duplicate && p.shares_most_steps)
        .count();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: usize, members: &[&str]) -> DuplicateGroup {
        DuplicateGroup {
            group_id: id,
            member_case_ids: members.iter().map(|s| s.to_string()).collect(),
            group_size: members.len(),
        }
    }

    fn pair(similarity: f64, overlap: f64) -> SimilarPair {
        SimilarPair {
            case_id_1: "C1".to_string(),
            title_1: "a".to_string(),
            case_id_2: "C2".to_string(),
            title_2: "b".to_string(),
            similarity,
            step_overlap: overlap,
            relation: Relation::SemanticDuplicate,
            shares_most_steps: overlap >= 0.8,
        }
    }

    #[test]
    fn test_render_csv_writes_header_for_empty_table() {
        let rendered = render_csv::<ExactDuplicateRow>(EXACT_HEADERS, &[]).unwrap();
        assert_eq!(rendered, "case_id,title,group_id,section\n");
    }

    #[test]
    fn test_render_similar_pairs() {
        let rendered = render_csv(SIMILAR_HEADERS, &[pair(0.9712, 0.5)]).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], SIMILAR_HEADERS.join(","));
        assert_eq!(lines[1], "C1,a,C2,b,0.9712,0.5,semantic_duplicate,false");
    }

    #[test]
    fn test_groups_round_trip_through_rows() {
        let groups = vec![group(1, &["C10", "C9"]), group(2, &["C3", "C4"])];
        let cases = vec![CanonicalCase::from_parts("C9", "Login", Some("Auth".into()), vec![], vec![])];
        let rows = exact_rows(&groups, &cases);
        assert_eq!(rows[0].case_id, "C9");
        assert_eq!(rows[0].section, "Auth");
        assert_eq!(rows[1].title, "");

        let (rebuilt, titles) = groups_from_rows(&rows);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[0].group_size, 2);
        assert_eq!(rebuilt[0].member_case_ids, vec!["C9", "C10"]);
        assert_eq!(titles.get("C9").map(String::as_str), Some("Login"));
    }

    #[test]
    fn test_write_removes_only_owned_stale_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in [SIMILAR_FILE, WORK_LIST_PERFECT_FILE, "notes.txt"] {
            fs::write(tmp.path().join(name), "old").unwrap();
        }

        let mut lists = ArtifactSet::for_work_lists();
        lists.add_exact_work_list(&WorkLists::default()).unwrap();
        lists.write_to(tmp.path()).unwrap();
        assert!(tmp.path().join(WORK_LIST_EXACT_FILE).exists());
        assert!(!tmp.path().join(WORK_LIST_PERFECT_FILE).exists());
        assert!(tmp.path().join(SIMILAR_FILE).exists());

        let mut run = ArtifactSet::for_run();
        run.add_exact(&[]).unwrap();
        run.write_to(tmp.path()).unwrap();
        assert!(!tmp.path().join(SIMILAR_FILE).exists());
        assert!(!tmp.path().join(WORK_LIST_EXACT_FILE).exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_stats_reflect_failed_semantic_pass() {
        let groups = vec![group(1, &["C1", "C2", "C3"])];
        let stats = AnalysisStats::new(10, 1, &groups, None);
        assert_eq!(stats.exact_archive_candidates, 2);
        assert_eq!(stats.cases_in_exact_groups, 3);
        assert_eq!(stats.similar_pairs, 0);
        assert_eq!(stats.semantic_pass, PassStatus::Failed);
    }

    #[test]
    fn test_priority_summary_tiers() {
        let groups = vec![
            group(1, &["C1", "C2"]),
            group(2, &["C7", "C5", "C6"]),
            group(3, &["C10", "C11", "C12", "C13"]),
        ];
        let titles: HashMap<String, String> = [("C5".to_string(), "Login".to_string())].into_iter().collect();
        let pairs = vec![pair(1.0, 1.0), pair(0.97, 0.9), pair(0.92, 0.85), pair(0.91, 0.2)];
        let summary = priority_summary(&groups, &titles, &pairs, &Thresholds::default(), Some(100));

        assert_eq!(summary.large_groups.len(), 1);
        assert_eq!(summary.large_groups[0].keep, "C10");
        assert_eq!(summary.medium_groups[0].keep, "C5");
        assert_eq!(summary.medium_groups[0].title, "Login");
        assert_eq!(summary.medium_groups[0].archive, vec!["C6", "C7"]);
        assert_eq!(summary.small_group_count, 1);
        assert_eq!(summary.exact_archive_total, 6);
        assert_eq!(summary.perfect_pairs.len(), 1);
        assert_eq!(summary.near_perfect_pairs, 1);
        assert_eq!(summary.high_overlap_pairs, 3);
        assert_eq!(summary.estimated_reduction(), 7);
        assert_eq!(summary.reduction_percent(), Some(7.0));
    }
}
