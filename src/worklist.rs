//! Reviewable work lists proposing keep/archive decisions.
//!
//! Four independent views are built over the same groups and pairs: exact
//! groups, perfect pairs (similarity 1.0), high-priority pairs and
//! high-overlap pairs. Every row carries empty Decision and Notes columns and
//! a `TODO` status for the reviewer.

use crate::config::Thresholds;
use crate::exact::DuplicateGroup;
use crate::pairs::{Relation, SimilarPair};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const DEFAULT_STATUS: &str = "TODO";

/// Ordering key for case ids such as `C12345`: ids with an embedded integer
/// compare by that integer (`C9 < C10`), then by the raw text; ids without
/// digits sort after all numbered ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CaseIdKey {
    unnumbered: bool,
    number: u64,
    raw: String,
}

pub fn case_id_sort_key(case_id: &str) -> CaseIdKey {
    let digits: String = case_id
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u64>() {
        Ok(number) => CaseIdKey {
            unnumbered: false,
            number,
            raw: case_id.to_string(),
        },
        Err(_) => CaseIdKey {
            unnumbered: true,
            number: 0,
            raw: case_id.to_string(),
        },
    }
}

fn by_case_id(a: &str, b: &str) -> Ordering {
    case_id_sort_key(a).cmp(&case_id_sort_key(b))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExactWorkRow {
    #[serde(rename = "Group_ID")]
    pub group_id: usize,
    #[serde(rename = "Group_Size")]
    pub group_size: usize,
    #[serde(rename = "Case_ID")]
    pub case_id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Suggested_KEEP")]
    pub suggested_keep: String,
    #[serde(rename = "Suggested_ARCHIVE")]
    pub suggested_archive: String,
    #[serde(rename = "Decision")]
    pub decision: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Notes")]
    pub notes: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PerfectMatchRow {
    pub case_id_1: String,
    pub title_1: String,
    pub case_id_2: String,
    pub title_2: String,
    pub similarity: f64,
    pub step_overlap: f64,
    #[serde(rename = "Suggested_KEEP")]
    pub suggested_keep: String,
    #[serde(rename = "Suggested_ARCHIVE")]
    pub suggested_archive: String,
    #[serde(rename = "Decision")]
    pub decision: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Notes")]
    pub notes: String,
}

/// A pair left for a manual decision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PairReviewRow {
    pub case_id_1: String,
    pub title_1: String,
    pub case_id_2: String,
    pub title_2: String,
    pub similarity: f64,
    pub step_overlap: f64,
    pub relation: Relation,
    pub shares_most_steps: bool,
    #[serde(rename = "Suggested_Action")]
    pub suggested_action: String,
    #[serde(rename = "Decision")]
    pub decision: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Notes")]
    pub notes: String,
}

impl From<&SimilarPair> for PairReviewRow {
    fn from(pair: &SimilarPair) -> Self {
        Self {
            case_id_1: pair.case_id_1.clone(),
            title_1: pair.title_1.clone(),
            case_id_2: pair.case_id_2.clone(),
            title_2: pair.title_2.clone(),
            similarity: pair.similarity,
            step_overlap: pair.step_overlap,
            relation: pair.relation,
            shares_most_steps: pair.shares_most_steps,
            suggested_action: String::new(),
            decision: String::new(),
            status: DEFAULT_STATUS.to_string(),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkLists {
    pub exact: Vec<ExactWorkRow>,
    pub perfect: Vec<PerfectMatchRow>,
    pub high_priority: Vec<PairReviewRow>,
    pub high_overlap: Vec<PairReviewRow>,
}

/// One row per member, groups ordered by size (largest first) then id;
/// the numerically lowest id is kept.
pub fn exact_work_list(groups: &[DuplicateGroup], titles: &HashMap<String, String>) -> Vec<ExactWorkRow> {
    let mut ordered: Vec<&DuplicateGroup> = groups.iter().collect();
    ordered.sort_by(|a, b| b.group_size.cmp(&a.group_size).then(a.group_id.cmp(&b.group_id)));

    let mut rows = Vec::new();
    for group in ordered {
        let mut members: Vec<&String> = group.member_case_ids.iter().collect();
        members.sort_by(|a, b| by_case_id(a, b));
        let Some((keep, archive)) = members.split_first() else {
            continue;
        };
        let archive = archive.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");

        for case_id in &members {
            rows.push(ExactWorkRow {
                group_id: group.group_id,
                group_size: group.group_size,
                case_id: (*case_id).clone(),
                title: titles.get(*case_id).cloned().unwrap_or_default(),
                suggested_keep: (*keep).clone(),
                suggested_archive: archive.clone(),
                decision: String::new(),
                status: DEFAULT_STATUS.to_string(),
                notes: String::new(),
            });
        }
    }
    rows
}

/// Pairs at similarity 1.0, highest step overlap first; the lower id is kept.
pub fn perfect_match_work_list(pairs: &[SimilarPair]) -> Vec<PerfectMatchRow> {
    let mut perfect: Vec<&SimilarPair> = pairs.iter().filter(|p| p.similarity >= 1.0).collect();
    perfect.sort_by(|a, b| b.step_overlap.partial_cmp(&a.step_overlap).unwrap_or(Ordering::Equal));

    perfect
        .into_iter()
        .map(|pair| {
            let (keep, archive) = if by_case_id(&pair.case_id_2, &pair.case_id_1) == Ordering::Less {
                (&pair.case_id_2, &pair.case_id_1)
            } else {
                (&pair.case_id_1, &pair.case_id_2)
            };
            PerfectMatchRow {
                case_id_1: pair.case_id_1.clone(),
                title_1: pair.title_1.clone(),
                case_id_2: pair.case_id_2.clone(),
                title_2: pair.title_2.clone(),
                similarity: pair.similarity,
                step_overlap: pair.step_overlap,
                suggested_keep: keep.clone(),
                suggested_archive: archive.clone(),
                decision: String::new(),
                status: DEFAULT_STATUS.to_string(),
                notes: String::new(),
            }
        })
        .collect()
}

/// Pairs at or above `high_priority` similarity, most similar first. No
/// keep/archive is suggested.
pub fn high_priority_work_list(pairs: &[SimilarPair], thresholds: &Thresholds) -> Vec<PairReviewRow> {
    let mut selected: Vec<&SimilarPair> = pairs
        .iter()
        .filter(|p| p.similarity >= thresholds.high_priority)
        .collect();
    selected.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
    selected.into_iter().map(PairReviewRow::from).collect()
}

/// Semantic duplicates that also share most of their steps.
pub fn high_overlap_work_list(pairs: &[SimilarPair], thresholds: &Thresholds) -> Vec<PairReviewRow> {
    let mut selected: Vec<&SimilarPair> = pairs
        .iter()
        .filter(|p| p.similarity >= thresholds.semantic_duplicate && p.shares_most_steps)
        .collect();
    selected.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(b.step_overlap.partial_cmp(&a.step_overlap).unwrap_or(Ordering::Equal))
    });
    selected.into_iter().map(PairReviewRow::from).collect()
}

pub fn build_work_lists(
    groups: &[DuplicateGroup],
    titles: &HashMap<String, String>,
    pairs: &[SimilarPair],
    thresholds: &Thresholds,
) -> WorkLists {
    WorkLists {
        exact: exact_work_list(groups, titles),
        perfect: perfect_match_work_list(pairs),
        high_priority: high_priority_work_list(pairs, thresholds),
        high_overlap: high_overlap_work_list(pairs, thresholds),
    }
}
