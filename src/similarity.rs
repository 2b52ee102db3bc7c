use crate::config::StepMetric;
use std::collections::HashMap;

/// Ratcliff/Obershelp similarity: `2 * M / T` where `M` counts characters in
/// recursively found longest common blocks and `T` is the combined length.
/// Two empty strings are identical.
pub fn gestalt_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            queue.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common block within `a[alo..ahi]` and `b[blo..bhi]`; ties go to the
/// block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_j2len = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                next_j2len.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        j2len = next_j2len;
    }
    (best_i, best_j, best_size)
}

pub fn step_ratio(metric: StepMetric, a: &str, b: &str) -> f64 {
    match metric {
        StepMetric::Gestalt => gestalt_ratio(a, b),
        StepMetric::Levenshtein => strsim::normalized_levenshtein(a, b),
        StepMetric::JaroWinkler => strsim::jaro_winkler(a, b),
    }
}

/// Fraction of the shorter step list matched in the longer one.
///
/// Each step of the shorter list is paired greedily with its most similar
/// unused step of the longer list and counts as matched when the ratio reaches
/// `min_ratio`. Dividing by the shorter length lets a case fully contained in
/// a longer one score 1.0. Either list empty gives 0.0.
pub fn step_overlap(steps_a: &[String], steps_b: &[String], min_ratio: f64, metric: StepMetric) -> f64 {
    if steps_a.is_empty() || steps_b.is_empty() {
        return 0.0;
    }
    let (shorter, longer) = if steps_a.len() <= steps_b.len() {
        (steps_a, steps_b)
    } else {
        (steps_b, steps_a)
    };

    let mut used = vec![false; longer.len()];
    let mut matches = 0usize;

    for step in shorter {
        let mut best: Option<(usize, f64)> = None;
        for (j, candidate) in longer.iter().enumerate() {
            if used[j] {
                continue;
            }
            let ratio = step_ratio(metric, step, candidate);
            if best.map_or(true, |(_, r)| ratio > r) {
                best = Some((j, ratio));
            }
        }
        if let Some((j, ratio)) = best {
            if ratio >= min_ratio {
                used[j] = true;
                matches += 1;
            }
        }
    }

    matches as f64 / shorter.len() as f64
}
