//! Text canonicalization shared by every comparison in the pipeline.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// Every break `str::lines` misses: lone CR, VT, FF, FS, GS, RS, NEL, LS, PS.
static LINE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r\n|[\r\x0B\x0C\x1C\x1D\x1E\x{85}\x{2028}\x{2029}]").unwrap());

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<.*?>").unwrap());

// Control characters are reserved for the canonical step delimiter.
static CONTROL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{Cc}&&[^\n]]").unwrap());

// "1. ", "2) ", "- ", "• ", repeated: "1. 1. text" and "- 3) text" collapse fully.
static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\s*(?:\d+\s*[.)]|[-•])\s*)+").unwrap());

static ITEM_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\d+\s*[.)]\s*").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Replace HTML tags with spaces. Malformed markup is tolerated: a `<` with
/// no closing `>` stays in the text, as does a lone `>`.
pub fn strip_html(text: &str) -> String {
    HTML_TAG_RE.replace_all(text, " ").into_owned()
}

fn unify_line_breaks(text: &str) -> String {
    LINE_BREAK_RE.replace_all(text, "\n").into_owned()
}

/// Canonicalize a raw field.
///
/// HTML is stripped, the text is NFKC-normalized and lowercased, leading list
/// markers are removed from each line and whitespace is collapsed. The result
/// is a single line and `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    // NFKC first so compatibility forms (fullwidth `<`, circled digits) are
    // seen by the tag and marker patterns below.
    let folded: String = text.nfkc().collect::<String>().to_lowercase().nfkc().collect();

    let without_tags = strip_html(&unify_line_breaks(&folded));
    let cleaned = CONTROL_RE.replace_all(&without_tags, " ");

    let lines: Vec<String> = cleaned
        .lines()
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    // Joining can line a bare number up with a marker from the next line.
    let joined = lines.join(" ");
    let collapsed = WHITESPACE_RE.replace_all(&joined, " ");
    LIST_MARKER_RE.replace(collapsed.trim(), "").trim().to_string()
}

/// Normalize a field that may be absent.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Split a numbered block (`"1. open app\n2. tap login"`) into normalized items.
///
/// Text before the first marker is kept as an item of its own when it is not
/// blank, so an unnumbered single step survives.
pub fn split_numbered_items(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let stripped = unify_line_breaks(&strip_html(text));
    let prefixed = format!("\n{stripped}");

    ITEM_SPLIT_RE
        .split(&prefixed)
        .map(normalize)
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_html_and_lowercases() {
        assert_eq!(normalize("<p>Tap <b>Login</b></p>"), "tap login");
        assert_eq!(normalize("Open <a href=\"x\">Settings"), "open settings");
    }

    #[test]
    fn test_malformed_markup_is_accepted() {
        assert_eq!(normalize("a < b and c"), "a < b and c");
        assert_eq!(normalize("<<a>b>"), "b>");
    }

    #[test]
    fn test_comparison_operators_are_kept() {
        assert_eq!(normalize("Badge count > 5"), "badge count > 5");
        assert_ne!(normalize("Verify badge count < 5"), normalize("Verify badge count > 5"));
    }

    #[test]
    fn test_unicode_line_breaks_split_lines() {
        assert_eq!(normalize("Open app\u{2028}1. Tap login"), "open app tap login");
        assert_eq!(normalize("Open app\u{85}2) Tap login\x0c- Done"), "open app tap login done");
        assert_eq!(
            split_numbered_items("1. Open app\u{2029}2. Tap login\r3. Done"),
            vec!["open app", "tap login", "done"]
        );
    }

    #[test]
    fn test_double_numbering_collapses() {
        assert_eq!(normalize("1. 1. Tap button"), normalize("Tap button"));
        assert_eq!(normalize("2) - Tap button"), "tap button");
        assert_eq!(normalize("• Tap button"), "tap button");
    }

    #[test]
    fn test_markers_removed_per_line() {
        assert_eq!(normalize("1. Open app\n2. Tap login\n\n3)  Done"), "open app tap login done");
    }

    #[test]
    fn test_nfkc_folds_compatibility_forms() {
        assert_eq!(normalize("ＴＡＰ\u{00a0}ﬁle"), "tap file");
        assert_eq!(normalize("①. Tap"), "tap");
        assert_eq!(normalize("5\n. Tap"), "tap");
    }

    #[test]
    fn test_blank_input_is_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t "), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn test_control_characters_removed() {
        assert_eq!(normalize("a\u{1f}b\u{0}c"), "a b c");
    }

    #[test]
    fn test_split_numbered_items() {
        let items = split_numbered_items("1. <p>Open app</p>\n2. <p>Tap Login</p>\n3) Check home");
        assert_eq!(items, vec!["open app", "tap login", "check home"]);
    }

    #[test]
    fn test_split_keeps_unnumbered_text() {
        assert_eq!(split_numbered_items("Open the app"), vec!["open the app"]);
        assert_eq!(
            split_numbered_items("Preconditions\n1. Open app"),
            vec!["preconditions", "open app"]
        );
        assert!(split_numbered_items("  ").is_empty());
    }

    proptest! {
        #[test]
        fn proptest_normalize_is_idempotent(text in "[a-zA-Z0-9 .)\\-•<>/\n\r\t&;:éÉßﬁ①Ａ＜\\x1f\u{2028}\u{85}]{0,80}") {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn proptest_leading_numbering_is_ignored(n in 1u32..500, body in "[a-z]{1,12}( [a-z]{1,12}){0,4}") {
            let numbered = format!("{n}. {n}. {body}");
            prop_assert_eq!(normalize(&numbered), normalize(&body));
        }
    }
}
