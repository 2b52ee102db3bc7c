use crate::case::CanonicalCase;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cases sharing byte-identical canonical text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub group_id: usize,
    /// Member ids in input order.
    pub member_case_ids: Vec<String>,
    pub group_size: usize,
}

/// Group cases by identical `canonical_full_text`, keeping only groups with at
/// least two members.
///
/// Group ids are assigned from 1 in order of each key's first appearance in
/// `cases`, so the same input order always yields the same ids.
pub fn find_exact_duplicates(cases: &[CanonicalCase]) -> Vec<DuplicateGroup> {
    let mut by_text: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for (idx, case) in cases.iter().enumerate() {
        let key = case.canonical_full_text.as_str();
        let members = by_text.entry(key).or_insert_with(|| {
            first_seen.push(key);
            Vec::new()
        });
        members.push(idx);
    }

    let mut groups = Vec::new();
    for key in first_seen {
        let members = &by_text[key];
        if members.len() < 2 {
            continue;
        }
        groups.push(DuplicateGroup {
            group_id: groups.len() + 1,
            member_case_ids: members.iter().map(|&i| cases[i].case_id.clone()).collect(),
            group_size: members.len(),
        });
    }

    tracing::info!(
        groups = groups.len(),
        cases = groups.iter().map(|g| g.group_size).sum::<usize>(),
        "exact duplicate pass complete"
    );
    groups
}
