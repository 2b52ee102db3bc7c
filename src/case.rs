use crate::normalize::normalize_opt;
use crate::steps::resolve_steps;
use serde::{Deserialize, Serialize};

/// Separates steps inside the canonical text. Normalized text never contains
/// control characters, so this cannot collide with step content.
pub const STEP_DELIMITER: &str = "\u{1f}";

/// One catalog row as handed over by the loader. Column aliasing has already
/// been resolved; absent cells are `None`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RawCaseRecord {
    pub case_id: String,
    pub title: Option<String>,
    pub section: Option<String>,
    pub structured_steps: Option<String>,
    pub structured_expected: Option<String>,
    pub notes: Option<String>,
    pub section_description: Option<String>,
    /// Case-level expected result, used when no per-step expectation exists.
    pub expected_result: Option<String>,
}

/// The comparable form of a test case. Built once per run, never mutated.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CanonicalCase {
    pub case_id: String,
    /// Title as exported, for reports.
    pub title: String,
    pub section: Option<String>,
    pub normalized_title: String,
    pub steps: Vec<String>,
    pub expected: Vec<String>,
    pub canonical_full_text: String,
}

impl CanonicalCase {
    pub fn from_record(record: &RawCaseRecord) -> (Self, bool) {
        let extraction = resolve_steps(record);
        if let Some(source) = extraction.source {
            tracing::trace!(case_id = %record.case_id, source = source.as_str(), "steps resolved");
        }
        let case = Self::from_parts(
            &record.case_id,
            record.title.as_deref().unwrap_or_default(),
            record.section.clone(),
            extraction.steps,
            extraction.expected,
        );
        (case, extraction.unparsed)
    }

    /// Assemble a case from already-normalized steps and expectations.
    pub fn from_parts(
        case_id: &str,
        title: &str,
        section: Option<String>,
        steps: Vec<String>,
        expected: Vec<String>,
    ) -> Self {
        let normalized_title = normalize_opt(Some(title));
        let canonical_full_text = canonical_text(&normalized_title, &steps, &expected);
        Self {
            case_id: case_id.trim().to_string(),
            title: title.trim().to_string(),
            section,
            normalized_title,
            steps,
            expected,
            canonical_full_text,
        }
    }
}

pub fn canonical_text(normalized_title: &str, steps: &[String], expected: &[String]) -> String {
    format!(
        "title: {}\nsteps: {}\nexpected: {}",
        normalized_title,
        steps.join(STEP_DELIMITER),
        expected.join(STEP_DELIMITER)
    )
}

/// Cases built from a catalog plus the ids of records that triggered a
/// parse warning.
#[derive(Debug, Clone, Default)]
pub struct CaseSet {
    pub cases: Vec<CanonicalCase>,
    pub warnings: Vec<String>,
}

/// Build canonical cases in input order. Records whose step text could not
/// be parsed are kept with empty steps and logged.
pub fn build_cases(records: &[RawCaseRecord]) -> CaseSet {
    let mut set = CaseSet {
        cases: Vec::with_capacity(records.len()),
        warnings: Vec::new(),
    };
    for record in records {
        let (case, unparsed) = CanonicalCase::from_record(record);
        if unparsed {
            tracing::warn!(
                case_id = %case.case_id,
                "steps could not be parsed by any rule; comparing on title alone"
            );
            set.warnings.push(case.case_id.clone());
        }
        set.cases.push(case);
    }
    set
}
