use once_cell::sync::Lazy;
use regex::Regex;
use similar::TextDiff;

static PY_FUNC_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*def\s+([A-Za-z_]\w*)\s*\(").unwrap());
static CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_]\w*\s*\(").unwrap());
static DEF_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*def\s+[A-Za-z_]\w*\s*\((.*)\)\s*(?:->\s*(.*))?:\s*$").unwrap());
static ANNOTATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*:\s*[^,=\)\]]+").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A single changed or context line inside a diff hunk.
#[derive(Debug, Clone)]
pub struct DiffLine {
    /// `'+'`, `'-'`, or `' '` (context), matching git's unified-diff origin markers.
    pub origin: char,
    pub content: String,
}

/// A contiguous run of diff lines for one file, as produced by `git2::Patch`.
#[derive(Debug, Clone, Default)]
pub struct Hunk {
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter(|l| l.origin == '+').map(|l| l.content.as_str())
    }

    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter(|l| l.origin == '-').map(|l| l.content.as_str())
    }
}

fn extract_def_name(line: &str) -> Option<&str> {
    PY_FUNC_DEF.captures(line).map(|c| c.get(1).unwrap().as_str())
}

fn strip_type_annotations(params: &str) -> String {
    let no_annotations = ANNOTATION_RE.replace_all(params, "");
    WHITESPACE_RE.replace_all(no_annotations.trim(), " ").to_string()
}

fn normalize_def_line(line: &str) -> Option<String> {
    let captures = DEF_LINE_RE.captures(line)?;
    let params = captures.get(1).map(|m| m.as_str()).unwrap_or("");
    let name = extract_def_name(line)?;
    Some(format!("def {name}({})", strip_type_annotations(params)))
}

/// LCS-ratio similarity between two normalised `def` lines, mirroring
/// `difflib.SequenceMatcher.ratio()`.
fn similarity_ratio(a: &str, b: &str) -> f32 {
    TextDiff::from_chars(a, b).ratio()
}

fn def_line_change_is_trivial(removed: &str, added: &str) -> bool {
    let (Some(norm_removed), Some(norm_added)) = (normalize_def_line(removed), normalize_def_line(added)) else {
        return false;
    };
    if norm_removed == norm_added {
        return true;
    }
    similarity_ratio(&norm_removed, &norm_added) >= 0.85
}

/// A hunk is material iff it contains an addition or removal that survives
/// the trivial-edit filters: bare single-line edits with no call expression
/// are discarded, and paired `def` signature edits that normalise to (near)
/// the same signature are discarded unless accompanied by other
/// non-signature, non-import, non-comment additions.
pub fn is_important_hunk(hunk: &Hunk) -> bool {
    let added: Vec<&str> = hunk.added().collect();
    let removed: Vec<&str> = hunk.removed().collect();
    if added.is_empty() && removed.is_empty() {
        return false;
    }

    if added.len() + removed.len() == 1 {
        let line = added.first().or_else(|| removed.first()).unwrap();
        if PY_FUNC_DEF.is_match(line) {
            return false;
        }
        return CALL_RE.is_match(line);
    }

    let mut def_pairs_checked = 0usize;
    let mut trivial_pairs = 0usize;
    for r in &removed {
        let Some(r_name) = extract_def_name(r) else { continue };
        for a in &added {
            let Some(a_name) = extract_def_name(a) else { continue };
            if a_name == r_name {
                def_pairs_checked += 1;
                if def_line_change_is_trivial(r, a) {
                    trivial_pairs += 1;
                }
            }
        }
    }

    let non_def_added: Vec<&str> = added
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter(|l| !PY_FUNC_DEF.is_match(l))
        .filter(|l| !l.starts_with("from ") && !l.starts_with("import "))
        .filter(|l| !l.starts_with('#'))
        .collect();

    if def_pairs_checked > 0 && def_pairs_checked == trivial_pairs && non_def_added.is_empty() {
        return false;
    }

    true
}

/// Every function name whose header (leftmost non-whitespace content) was
/// added or appears as surviving context inside a material hunk.
pub fn changed_function_names(hunk: &Hunk) -> Vec<String> {
    hunk.lines
        .iter()
        .filter(|l| l.origin == '+' || l.origin == ' ')
        .filter_map(|l| extract_def_name(&l.content))
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(lines: &[(char, &str)]) -> Hunk {
        Hunk {
            lines: lines
                .iter()
                .map(|(origin, content)| DiffLine { origin: *origin, content: content.to_string() })
                .collect(),
        }
    }

    #[test]
    fn single_line_call_addition_is_material() {
        let h = hunk(&[('+', "    do_thing(x)")]);
        assert!(is_important_hunk(&h));
    }

    #[test]
    fn single_line_def_addition_is_not_material() {
        let h = hunk(&[('+', "def foo(x):")]);
        assert!(!is_important_hunk(&h));
    }

    #[test]
    fn trivial_signature_reformat_is_not_material() {
        let h = hunk(&[
            ('-', "def foo(x, y):"),
            ('+', "def foo(x: int, y: int):"),
        ]);
        assert!(!is_important_hunk(&h));
    }

    #[test]
    fn signature_change_accompanied_by_logic_is_material() {
        let h = hunk(&[
            ('-', "def foo(x, y):"),
            ('+', "def foo(x: int, y: int):"),
            ('+', "    helper(x)"),
        ]);
        assert!(is_important_hunk(&h));
    }

    #[test]
    fn changed_function_names_collects_added_and_context_defs() {
        let h = hunk(&[(' ', "def a():"), ('+', "    pass"), ('+', "def b():")]);
        assert_eq!(changed_function_names(&h), vec!["a".to_string(), "b".to_string()]);
    }
}
