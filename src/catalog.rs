//! Catalog loading: CSV or JSON exports into [`RawCaseRecord`]s.
//!
//! Export variants disagree on header names and on where the header row is.
//! Each logical column is described by a [`ColumnSpec`], an ordered list of
//! [`ColumnRule`]s tried until one matches.

use crate::case::RawCaseRecord;
use crate::error::CatalogError;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;

/// Rows tried as the header row of a CSV export. TestRail exports carry two
/// preamble rows before the real header.
const HEADER_ROW_CANDIDATES: [usize; 2] = [0, 2];

#[derive(Debug, Clone, Copy)]
pub enum ColumnRule {
    /// Any of these header names, compared trimmed and ASCII case-insensitively.
    Named(&'static [&'static str]),
    /// An unlabeled header at this position.
    BlankAt(usize),
}

impl ColumnRule {
    pub fn resolve(&self, headers: &[String]) -> Option<usize> {
        match self {
            ColumnRule::Named(names) => headers.iter().position(|header| {
                let header = header.trim();
                names.iter().any(|name| header.eq_ignore_ascii_case(name))
            }),
            ColumnRule::BlankAt(index) => headers
                .get(*index)
                .filter(|header| header.trim().is_empty())
                .map(|_| *index),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub label: &'static str,
    pub rules: &'static [ColumnRule],
}

impl ColumnSpec {
    pub fn resolve(&self, headers: &[String]) -> Option<usize> {
        self.rules.iter().find_map(|rule| rule.resolve(headers))
    }
}

pub const CASE_ID: ColumnSpec = ColumnSpec {
    label: "case identifier",
    rules: &[
        ColumnRule::Named(&["ID", "CaseID", "Case ID", "Unnamed: 1"]),
        ColumnRule::BlankAt(1),
    ],
};

pub const TITLE: ColumnSpec = ColumnSpec {
    label: "title",
    rules: &[
        ColumnRule::Named(&["Title", "TestTitle", "Unnamed: 2"]),
        ColumnRule::BlankAt(2),
    ],
};

pub const SECTION: ColumnSpec = ColumnSpec {
    label: "section",
    rules: &[ColumnRule::Named(&["Section"])],
};

pub const STRUCTURED_STEPS: ColumnSpec = ColumnSpec {
    label: "structured steps",
    rules: &[ColumnRule::Named(&["Steps (Step)"])],
};

pub const STRUCTURED_EXPECTED: ColumnSpec = ColumnSpec {
    label: "structured expected results",
    rules: &[ColumnRule::Named(&["Steps (Expected Result)"])],
};

pub const NOTES: ColumnSpec = ColumnSpec {
    label: "notes",
    rules: &[ColumnRule::Named(&["Notes"])],
};

pub const SECTION_DESCRIPTION: ColumnSpec = ColumnSpec {
    label: "section description",
    rules: &[ColumnRule::Named(&["Section Description"])],
};

pub const EXPECTED_RESULT: ColumnSpec = ColumnSpec {
    label: "expected result",
    rules: &[ColumnRule::Named(&["Expected Result"])],
};

/// Header row plus data rows, before column resolution.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Load a catalog file. `.json` is read as an array of objects, anything
/// else as CSV.
pub fn load_catalog(path: &Path) -> Result<Vec<RawCaseRecord>, CatalogError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let records = if is_json {
        read_json(&fs::read_to_string(path)?)?
    } else {
        read_csv(fs::File::open(path)?)?
    };
    tracing::info!(path = %path.display(), cases = records.len(), "catalog loaded");
    Ok(records)
}

pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<RawCaseRecord>, CatalogError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in rdr.records() {
        raw_rows.push(record?.iter().map(str::to_string).collect());
    }

    // Rule priority beats row priority: a named header on row 2 wins over a
    // preamble row that only happens to have a blank cell.
    let header_row = CASE_ID
        .rules
        .iter()
        .find_map(|rule| {
            HEADER_ROW_CANDIDATES.iter().copied().find(|&row| {
                raw_rows
                    .get(row)
                    .map(|headers| rule.resolve(headers).is_some())
                    .unwrap_or(false)
            })
        })
        .ok_or_else(|| CatalogError::missing_column(CASE_ID.label))?;
    tracing::debug!(header_row, "resolved CSV header row");

    let mut rows = raw_rows.into_iter().skip(header_row);
    let headers = rows.next().unwrap_or_default();
    let table = Table {
        headers,
        rows: rows
            .map(|row| row.into_iter().map(Some).collect())
            .collect(),
    };
    records_from_table(&table)
}

pub fn read_json(content: &str) -> Result<Vec<RawCaseRecord>, CatalogError> {
    let value: Value = serde_json::from_str(content)?;
    let objects = value.as_array().ok_or_else(|| {
        CatalogError::InputFormat("JSON catalog must be an array of objects".to_string())
    })?;

    let mut headers: Vec<String> = Vec::new();
    for object in objects.iter().filter_map(Value::as_object) {
        for key in object.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let rows = objects
        .iter()
        .filter_map(Value::as_object)
        .map(|object| {
            headers
                .iter()
                .map(|header| object.get(header).and_then(cell_text))
                .collect()
        })
        .collect();

    records_from_table(&Table { headers, rows })
}

/// Resolve columns and turn rows into records, dropping rows without an id.
pub fn records_from_table(table: &Table) -> Result<Vec<RawCaseRecord>, CatalogError> {
    let id_col = CASE_ID
        .resolve(&table.headers)
        .ok_or_else(|| CatalogError::missing_column(CASE_ID.label))?;
    let title_col = TITLE
        .resolve(&table.headers)
        .ok_or_else(|| CatalogError::missing_column(TITLE.label))?;

    let section_col = SECTION.resolve(&table.headers);
    let steps_col = STRUCTURED_STEPS.resolve(&table.headers);
    let expected_col = STRUCTURED_EXPECTED.resolve(&table.headers);
    let notes_col = NOTES.resolve(&table.headers);
    let description_col = SECTION_DESCRIPTION.resolve(&table.headers);
    let global_expected_col = EXPECTED_RESULT.resolve(&table.headers);

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in &table.rows {
        let cell = |col: Option<usize>| -> Option<String> {
            col.and_then(|c| row.get(c).cloned().flatten())
                .filter(|v| !v.trim().is_empty())
        };
        let Some(case_id) = cell(Some(id_col)) else {
            skipped += 1;
            continue;
        };
        records.push(RawCaseRecord {
            case_id: case_id.trim().to_string(),
            title: cell(Some(title_col)),
            section: cell(section_col),
            structured_steps: cell(steps_col),
            structured_expected: cell(expected_col),
            notes: cell(notes_col),
            section_description: cell(description_col),
            expected_result: cell(global_expected_col),
        });
    }
    if skipped > 0 {
        tracing::debug!(skipped, "dropped rows without a case identifier");
    }

    if records.is_empty() {
        return Err(CatalogError::InputFormat(
            "catalog is empty after filtering rows without a case identifier".to_string(),
        ));
    }
    Ok(records)
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_column_rules_in_order() {
        assert_eq!(CASE_ID.resolve(&headers(&["Title", "id"])), Some(1));
        assert_eq!(CASE_ID.resolve(&headers(&["x", "", "Title"])), Some(1));
        assert_eq!(CASE_ID.resolve(&headers(&["x", "y"])), None);
        assert_eq!(TITLE.resolve(&headers(&["ID", "TestTitle"])), Some(1));
    }

    #[test]
    fn test_reads_csv_with_plain_header() {
        let data = "ID,Title,Steps (Step),Steps (Expected Result)\n\
                    C1,Login,\"1. Open app\n2. Tap login\",1. Home shown\n\
                    ,orphan row,,\n\
                    C2,Logout,1. Tap logout,\n";
        let records = read_csv(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].case_id, "C1");
        assert_eq!(records[0].structured_steps.as_deref(), Some("1. Open app\n2. Tap login"));
        assert_eq!(records[1].structured_expected, None);
    }

    #[test]
    fn test_probes_third_row_for_header() {
        let data = "Export,,\nProject,,\nKey,ID,Title\nx,C7,Settings\n";
        let records = read_csv(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].case_id, "C7");
        assert_eq!(records[0].title.as_deref(), Some("Settings"));
    }

    #[test]
    fn test_missing_id_column_is_fatal() {
        let err = read_csv("Name,Title\nfoo,bar\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("case identifier"));
    }

    #[test]
    fn test_missing_title_column_is_fatal() {
        let err = read_csv("ID,Name\nC1,bar\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_empty_after_filtering_is_fatal() {
        let err = read_csv("ID,Title\n,bar\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CatalogError::InputFormat(msg) if msg.contains("empty")));
    }

    #[test]
    fn test_reads_json_objects() {
        let data = r#"[
            {"ID": "C1", "Title": "Login", "Notes": "Step Description: Open app"},
            {"ID": 42, "Title": "Numeric id", "Notes": null}
        ]"#;
        let records = read_json(data).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].case_id, "42");
        assert_eq!(records[1].notes, None);
        assert_eq!(records[0].notes.as_deref(), Some("Step Description: Open app"));
    }
}
