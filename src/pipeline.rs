//! End-to-end orchestration.
//!
//! Catalog problems abort before anything is computed. The exact pass never
//! depends on embeddings, so an embedding failure still leaves exact groups,
//! their work list and the statistics to write.

use crate::case::{build_cases, CanonicalCase, RawCaseRecord};
use crate::catalog::load_catalog;
use crate::config::{Config, Thresholds};
use crate::embed::Embedder;
use crate::error::{EmbedError, ReportError, Result};
use crate::exact::{find_exact_duplicates, DuplicateGroup};
use crate::pairs::{compute_similar_pairs, SimilarPair};
use crate::report::{
    exact_rows, groups_from_rows, read_csv_file, AnalysisStats, ArtifactSet, ExactDuplicateRow, EXACT_FILE,
    SIMILAR_FILE,
};
use crate::worklist::{build_work_lists, WorkLists};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

/// Which tables a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outputs {
    /// Exact and similar-pair tables plus statistics.
    Tables,
    /// Tables, statistics and every work list.
    All,
}

#[derive(Debug)]
pub struct Analysis {
    pub cases: Vec<CanonicalCase>,
    /// Ids of records whose steps no rule could parse.
    pub warnings: Vec<String>,
    pub exact_groups: Vec<DuplicateGroup>,
    pub semantic: std::result::Result<Vec<SimilarPair>, EmbedError>,
}

impl Analysis {
    pub fn pairs(&self) -> Option<&[SimilarPair]> {
        self.semantic.as_ref().ok().map(Vec::as_slice)
    }

    pub fn titles(&self) -> HashMap<String, String> {
        self.cases
            .iter()
            .map(|c| (c.case_id.clone(), c.title.clone()))
            .collect()
    }

    pub fn stats(&self) -> AnalysisStats {
        AnalysisStats::new(self.cases.len(), self.warnings.len(), &self.exact_groups, self.pairs())
    }

    pub fn work_lists(&self, thresholds: &Thresholds) -> WorkLists {
        build_work_lists(
            &self.exact_groups,
            &self.titles(),
            self.pairs().unwrap_or_default(),
            thresholds,
        )
    }

    /// Render every artifact this run is entitled to. Pair tables are left
    /// out when the semantic pass failed.
    pub fn artifacts(&self, thresholds: &Thresholds, outputs: Outputs) -> Result<ArtifactSet> {
        let mut set = ArtifactSet::for_run();
        set.add_exact(&exact_rows(&self.exact_groups, &self.cases))?;
        if let Some(pairs) = self.pairs() {
            set.add_similar(pairs)?;
        }
        if outputs == Outputs::All {
            let lists = self.work_lists(thresholds);
            set.add_exact_work_list(&lists)?;
            if self.pairs().is_some() {
                set.add_pair_work_lists(&lists)?;
            }
        }
        set.add_stats(&self.stats())?;
        Ok(set)
    }
}

/// Run both passes over already-loaded records.
pub fn analyze(records: &[RawCaseRecord], config: &Config, embedder: &dyn Embedder) -> Analysis {
    let start = Instant::now();
    let case_set = build_cases(records);
    let exact_groups = find_exact_duplicates(&case_set.cases);

    let semantic = compute_similar_pairs(&case_set.cases, embedder, config);
    if let Err(e) = &semantic {
        tracing::error!(error = %e, "semantic pass failed; exact results are still available");
    }

    tracing::info!(
        cases = case_set.cases.len(),
        warnings = case_set.warnings.len(),
        exact_groups = exact_groups.len(),
        elapsed = ?start.elapsed(),
        "analysis complete"
    );
    Analysis {
        cases: case_set.cases,
        warnings: case_set.warnings,
        exact_groups,
        semantic,
    }
}

pub fn analyze_catalog(path: &Path, config: &Config, embedder: &dyn Embedder) -> Result<Analysis> {
    let records = load_catalog(path)?;
    Ok(analyze(&records, config, embedder))
}

/// Tables read back from a previous `find` or `run`.
#[derive(Debug, Clone, Default)]
pub struct StoredTables {
    pub groups: Vec<DuplicateGroup>,
    pub titles: HashMap<String, String>,
    /// `None` when `similar_pairs.csv` is absent, i.e. the semantic pass failed.
    pub pairs: Option<Vec<SimilarPair>>,
}

pub fn load_tables(dir: &Path) -> Result<StoredTables> {
    let rows: Vec<ExactDuplicateRow> = read_csv_file(&dir.join(EXACT_FILE))?;
    let (groups, titles) = groups_from_rows(&rows);
    let pairs = match read_csv_file::<SimilarPair>(&dir.join(SIMILAR_FILE)) {
        Ok(pairs) => Some(pairs),
        Err(ReportError::MissingArtifact(path)) => {
            tracing::warn!(%path, "no similar-pair table; only exact work list will be built");
            None
        }
        Err(e) => return Err(e.into()),
    };
    tracing::debug!(groups = groups.len(), pairs = ?pairs.as_ref().map(Vec::len), "tables loaded");
    Ok(StoredTables { groups, titles, pairs })
}

/// Work-list artifacts rebuilt from stored tables.
pub fn work_list_artifacts(tables: &StoredTables, thresholds: &Thresholds) -> Result<(WorkLists, ArtifactSet)> {
    let pairs = tables.pairs.as_deref().unwrap_or_default();
    let lists = build_work_lists(&tables.groups, &tables.titles, pairs, thresholds);
    let mut set = ArtifactSet::for_work_lists();
    set.add_exact_work_list(&lists)?;
    if tables.pairs.is_some() {
        set.add_pair_work_lists(&lists)?;
    }
    Ok((lists, set))
}
