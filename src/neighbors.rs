//! k-nearest-neighbor search over case embeddings.
//!
//! Brute force is exact and adequate for thousands of cases. Past
//! `brute_force_limit`, random-hyperplane LSH narrows each query to the cases
//! sharing at least one band signature, re-ranked by exact cosine.

use crate::config::{IndexKind, NeighborConfig};
use crate::embed::unit_cosine;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

pub trait NeighborIndex {
    /// Up to `k` nearest neighbors of vector `i`, excluding `i` itself, as
    /// `(index, cosine similarity)` sorted by similarity descending then index.
    fn neighbors(&self, i: usize, k: usize) -> Vec<(usize, f32)>;

    fn name(&self) -> &'static str;
}

pub struct BruteForceIndex<'a> {
    vectors: &'a [Vec<f32>],
}

impl<'a> BruteForceIndex<'a> {
    pub fn new(vectors: &'a [Vec<f32>]) -> Self {
        Self { vectors }
    }
}

impl NeighborIndex for BruteForceIndex<'_> {
    fn neighbors(&self, i: usize, k: usize) -> Vec<(usize, f32)> {
        let query = &self.vectors[i];
        let scores = (0..self.vectors.len())
            .filter(|&j| j != i)
            .map(|j| (j, unit_cosine(query, &self.vectors[j])))
            .collect();
        top_k(scores, k)
    }

    fn name(&self) -> &'static str {
        "brute-force"
    }
}

pub struct LshIndex<'a> {
    vectors: &'a [Vec<f32>],
    signatures: Vec<Vec<u64>>,
    buckets: HashMap<(usize, u64), Vec<usize>>,
}

impl<'a> LshIndex<'a> {
    pub fn new(vectors: &'a [Vec<f32>], bands: usize, rows: usize) -> Self {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let planes = hyperplanes(bands * rows, dimension);

        let signatures: Vec<Vec<u64>> = vectors
            .iter()
            .map(|v| band_signature(v, &planes, rows))
            .collect();

        let mut buckets: HashMap<(usize, u64), Vec<usize>> = HashMap::new();
        for (idx, signature) in signatures.iter().enumerate() {
            for (band, key) in signature.iter().enumerate() {
                buckets.entry((band, *key)).or_default().push(idx);
            }
        }
        tracing::debug!(buckets = buckets.len(), bands, rows, "built LSH buckets");

        Self {
            vectors,
            signatures,
            buckets,
        }
    }
}

impl NeighborIndex for LshIndex<'_> {
    fn neighbors(&self, i: usize, k: usize) -> Vec<(usize, f32)> {
        let mut candidates = BTreeSet::new();
        for (band, key) in self.signatures[i].iter().enumerate() {
            if let Some(members) = self.buckets.get(&(band, *key)) {
                candidates.extend(members.iter().copied().filter(|&j| j != i));
            }
        }
        let query = &self.vectors[i];
        let scores = candidates
            .into_iter()
            .map(|j| (j, unit_cosine(query, &self.vectors[j])))
            .collect();
        top_k(scores, k)
    }

    fn name(&self) -> &'static str {
        "lsh"
    }
}

/// Pick the index for this catalog size and configuration.
pub fn build_index<'a>(vectors: &'a [Vec<f32>], config: &NeighborConfig) -> Box<dyn NeighborIndex + 'a> {
    let use_lsh = match config.index {
        IndexKind::Brute => false,
        IndexKind::Lsh => true,
        IndexKind::Auto => vectors.len() > config.brute_force_limit,
    };
    let index: Box<dyn NeighborIndex + 'a> = if use_lsh {
        Box::new(LshIndex::new(vectors, config.lsh_bands, config.lsh_rows))
    } else {
        Box::new(BruteForceIndex::new(vectors))
    };
    tracing::debug!(index = index.name(), cases = vectors.len(), "neighbor index ready");
    index
}

fn top_k(mut scores: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    scores.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scores.truncate(k);
    scores
}

fn band_signature(vector: &[f32], planes: &[Vec<f32>], rows: usize) -> Vec<u64> {
    planes
        .chunks(rows)
        .map(|band| {
            band.iter().enumerate().fold(0u64, |key, (bit, plane)| {
                let dot: f32 = plane.iter().zip(vector).map(|(p, v)| p * v).sum();
                if dot >= 0.0 {
                    key | (1 << bit)
                } else {
                    key
                }
            })
        })
        .collect()
}

/// Deterministic pseudo-random hyperplanes with components in [-1, 1).
fn hyperplanes(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    let mut state: u64 = 0x5eed_ca5e_d0d0_0001;
    (0..count)
        .map(|_| {
            (0..dimension)
                .map(|_| {
                    let bits = splitmix64(&mut state);
                    let unit = (bits >> 40) as f32 / (1u64 << 24) as f32;
                    unit.mul_add(2.0, -1.0)
                })
                .collect()
        })
        .collect()
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
