//! Step/expected-result extraction.
//!
//! Catalog exports carry steps in one of several shapes. Each shape is a
//! [`StepSource`] variant; they are tried in priority order and the first one
//! that yields anything wins. Supporting a new export shape means adding a
//! variant, not touching the others.

use crate::case::RawCaseRecord;
use crate::normalize::{normalize, split_numbered_items};

const STEP_MARKER: &str = "Step Description:";
const EXPECTED_MARKER: &str = "Expected Result:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Structured,
    Narrative,
    Section,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Structured => "structured columns",
            SourceKind::Narrative => "narrative notes",
            SourceKind::Section => "section description",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StepSource<'a> {
    /// `Steps (Step)` / `Steps (Expected Result)` columns, numbered items.
    Structured {
        steps: &'a str,
        expected: Option<&'a str>,
    },
    /// A notes block of `Step Description: ... Expected Result: ...` pairs.
    Narrative(&'a str),
    /// Section description used as a last resort; carries no expectations.
    Section(&'a str),
}

impl<'a> StepSource<'a> {
    /// Candidate sources of a record, highest priority first.
    pub fn candidates(record: &'a RawCaseRecord) -> Vec<StepSource<'a>> {
        let mut sources = Vec::with_capacity(3);
        if let Some(steps) = non_blank(record.structured_steps.as_deref()) {
            sources.push(StepSource::Structured {
                steps,
                expected: non_blank(record.structured_expected.as_deref()),
            });
        }
        if let Some(notes) = non_blank(record.notes.as_deref()) {
            sources.push(StepSource::Narrative(notes));
        }
        if let Some(description) = non_blank(record.section_description.as_deref()) {
            sources.push(StepSource::Section(description));
        }
        sources
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            StepSource::Structured { .. } => SourceKind::Structured,
            StepSource::Narrative(_) => SourceKind::Narrative,
            StepSource::Section(_) => SourceKind::Section,
        }
    }

    /// Parse into `(steps, expected)`, or `None` when nothing usable came out.
    pub fn parse(&self) -> Option<(Vec<String>, Vec<String>)> {
        let (steps, expected) = match self {
            StepSource::Structured { steps, expected } => (
                split_numbered_items(steps),
                expected.map(split_numbered_items).unwrap_or_default(),
            ),
            StepSource::Narrative(notes) => parse_narrative(notes),
            StepSource::Section(description) => (split_numbered_items(description), Vec::new()),
        };
        if steps.is_empty() && expected.is_empty() {
            None
        } else {
            Some((steps, expected))
        }
    }
}

/// Outcome of running the cascade over one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepExtraction {
    pub steps: Vec<String>,
    pub expected: Vec<String>,
    pub source: Option<SourceKind>,
    /// Step text was present but no rule could parse it.
    pub unparsed: bool,
}

pub fn resolve_steps(record: &RawCaseRecord) -> StepExtraction {
    let candidates = StepSource::candidates(record);
    let mut extraction = candidates
        .iter()
        .find_map(|source| {
            source.parse().map(|(steps, expected)| StepExtraction {
                steps,
                expected,
                source: Some(source.kind()),
                unparsed: false,
            })
        })
        .unwrap_or_else(|| StepExtraction {
            unparsed: !candidates.is_empty(),
            ..StepExtraction::default()
        });

    // All-blank expectations carry no content; treat them as absent.
    if extraction.expected.iter().all(String::is_empty) {
        extraction.expected.clear();
        let global = normalize(record.expected_result.as_deref().unwrap_or_default());
        if !global.is_empty() {
            extraction.expected = vec![global];
        }
    }
    extraction
}

/// `(steps, expected)` for a record. Never fails: a record without usable
/// steps yields empty lists and stays comparable on its title.
pub fn extract_steps(record: &RawCaseRecord) -> (Vec<String>, Vec<String>) {
    let extraction = resolve_steps(record);
    (extraction.steps, extraction.expected)
}

fn parse_narrative(notes: &str) -> (Vec<String>, Vec<String>) {
    let text = notes.replace("\r\n", "\n").replace('\r', "\n");
    let mut descriptions = Vec::new();
    let mut expectations = Vec::new();

    // The chunk before the first marker is preamble.
    for chunk in text.split(STEP_MARKER).skip(1) {
        let (description, expectation) = match chunk.split_once(EXPECTED_MARKER) {
            Some((d, e)) => (d, e),
            None => (chunk, ""),
        };
        let description = normalize(description);
        let expectation = normalize(expectation);
        // Entries stay aligned by position so a missing expectation cannot
        // shift a later one onto the wrong step.
        if description.is_empty() && expectation.is_empty() {
            continue;
        }
        descriptions.push(description);
        expectations.push(expectation);
    }
    (descriptions, expectations)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
