//! Semantic pass: embed, find neighbors, score and classify pairs.

use crate::case::CanonicalCase;
use crate::config::{Config, Thresholds};
use crate::embed::Embedder;
use crate::error::EmbedError;
use crate::neighbors::build_index;
use crate::similarity::step_overlap;
use crate::worklist::case_id_sort_key;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Similar,
    SemanticDuplicate,
}

/// One unordered pair of cases above the similarity floor.
/// `case_id_1` sorts before `case_id_2` under [`case_id_sort_key`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimilarPair {
    pub case_id_1: String,
    pub title_1: String,
    pub case_id_2: String,
    pub title_2: String,
    pub similarity: f64,
    pub step_overlap: f64,
    pub relation: Relation,
    pub shares_most_steps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub relation: Relation,
    pub shares_most_steps: bool,
}

/// Whether a pair clears the similarity floor; applied before anything else
/// is computed for it.
pub fn passes_floor(similarity: f64, thresholds: &Thresholds) -> bool {
    similarity >= thresholds.similarity_floor
}

/// Label and flag a pair: floor, then relation, then step flag. `None` when
/// the pair is below the floor and must not be reported.
pub fn classify(similarity: f64, overlap: f64, thresholds: &Thresholds) -> Option<Classification> {
    if !passes_floor(similarity, thresholds) {
        return None;
    }
    let relation = if similarity >= thresholds.semantic_duplicate {
        Relation::SemanticDuplicate
    } else {
        Relation::Similar
    };
    Some(Classification {
        relation,
        shares_most_steps: overlap >= thresholds.step_overlap,
    })
}

/// Similarity from cosine, clipped to [0, 1] and rounded to 4 decimals. This
/// single value drives filtering, labeling and reporting.
pub fn similarity_from_cosine(cosine: f32) -> f64 {
    round4((cosine as f64).clamp(0.0, 1.0))
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Find and classify similar pairs among `cases`.
///
/// Every unordered pair discovered as a k-nearest neighbor from either side
/// is scored once. Output is sorted by similarity descending, then by case id.
pub fn compute_similar_pairs(
    cases: &[CanonicalCase],
    embedder: &dyn Embedder,
    config: &Config,
) -> Result<Vec<SimilarPair>, EmbedError> {
    let start = Instant::now();
    let texts: Vec<&str> = cases.iter().map(|c| c.canonical_full_text.as_str()).collect();
    let vectors = embedder.embed_batch(&texts)?;
    tracing::debug!(cases = cases.len(), dimension = embedder.dimension(), "embeddings computed");

    let index = build_index(&vectors, &config.neighbors);
    let mut discovered: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for i in 0..cases.len() {
        for (j, cosine) in index.neighbors(i, config.neighbors.k) {
            let key = (i.min(j), i.max(j));
            discovered
                .entry(key)
                .or_insert_with(|| similarity_from_cosine(cosine));
        }
    }

    let thresholds = &config.thresholds;
    let mut pairs = Vec::new();
    for ((i, j), similarity) in discovered {
        if !passes_floor(similarity, thresholds) {
            continue;
        }
        let overlap = round4(step_overlap(
            &cases[i].steps,
            &cases[j].steps,
            thresholds.step_match,
            config.step_metric,
        ));
        let Some(classification) = classify(similarity, overlap, thresholds) else {
            continue;
        };
        let (first, second) = if case_id_sort_key(&cases[j].case_id) < case_id_sort_key(&cases[i].case_id) {
            (&cases[j], &cases[i])
        } else {
            (&cases[i], &cases[j])
        };
        pairs.push(SimilarPair {
            case_id_1: first.case_id.clone(),
            title_1: first.title.clone(),
            case_id_2: second.case_id.clone(),
            title_2: second.title.clone(),
            similarity,
            step_overlap: overlap,
            relation: classification.relation,
            shares_most_steps: classification.shares_most_steps,
        });
    }

    pairs.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| case_id_sort_key(&a.case_id_1).cmp(&case_id_sort_key(&b.case_id_1)))
            .then_with(|| case_id_sort_key(&a.case_id_2).cmp(&case_id_sort_key(&b.case_id_2)))
    });

    tracing::info!(
        pairs = pairs.len(),
        semantic_duplicates = pairs
            .iter()
            .filter(|p| p.relation == Relation::SemanticDuplicate)
            .count(),
        elapsed = ?start.elapsed(),
        "semantic pass complete"
    );
    Ok(pairs)
}
