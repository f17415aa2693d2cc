//! Keep only the diagnostics a change introduced.

use std::collections::HashSet;

use difflint_core::Diagnostic;
use difflint_diff::linemap::LineMap;

use crate::fingerprint::{fingerprint, Fingerprint};

/// Return the diagnostics from `after` that have no counterpart in `before`.
///
/// `before` diagnostics are already in old-file coordinates and are keyed on
/// their own line. Each `after` diagnostic is keyed on the old line `map`
/// gives for it; a line without an old counterpart is always kept. Order of
/// `after` is preserved.
///
/// # Examples
///
/// ```
/// use difflint_core::{Diagnostic, Severity};
/// use difflint_diff::linemap::LineMap;
/// use difflint_diff::parser::parse_hunks;
/// use difflint_gate::incremental::filter_novel;
/// use std::path::PathBuf;
///
/// let d = |line, msg: &str| Diagnostic {
///     path: PathBuf::from("mod.py"),
///     line,
///     column: 0,
///     rule_id: "R0913".into(),
///     severity: Severity::Refactor,
///     message: msg.into(),
///     symbol: String::new(),
///     obj: String::new(),
///     module: String::new(),
/// };
///
/// let map = LineMap::build(&parse_hunks(b"@@ -5,0 +5 @@\n+import os\n").unwrap(), 11);
/// let before = vec![d(5, "Too many arguments (13/12)")];
/// let after = vec![d(6, "Too many arguments (15/12)")];
/// assert!(filter_novel(&after, &before, &map).is_empty());
/// ```
pub fn filter_novel(after: &[Diagnostic], before: &[Diagnostic], map: &LineMap) -> Vec<Diagnostic> {
    let known: HashSet<Fingerprint> = before
        .iter()
        .filter_map(|d| fingerprint(d, Some(d.line)))
        .collect();

    after
        .iter()
        .filter(|d| match fingerprint(d, map.get(d.line)) {
            Some(fp) => !known.contains(&fp),
            None => true,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use difflint_core::Severity;
    use difflint_diff::parser::parse_hunks;
    use std::path::PathBuf;

    fn diag(line: u32, rule_id: &str, message: &str) -> Diagnostic {
        Diagnostic {
            path: PathBuf::from("pkg/mod.py"),
            line,
            column: 0,
            rule_id: rule_id.into(),
            severity: Severity::Warning,
            message: message.into(),
            symbol: String::new(),
            obj: String::new(),
            module: "pkg.mod".into(),
        }
    }

    fn insertion_at_five() -> LineMap {
        LineMap::build(&parse_hunks(b"@@ -5,0 +5 @@\n+new\n").unwrap(), 11)
    }

    #[test]
    fn shifted_diagnostic_is_not_novel() {
        let before = vec![diag(5, "R0913", "Too many arguments (13/12)")];
        let after = vec![diag(6, "R0913", "Too many arguments (15/12)")];
        assert!(filter_novel(&after, &before, &insertion_at_five()).is_empty());
    }

    #[test]
    fn inserted_line_is_always_novel() {
        let before = vec![diag(5, "W0611", "Unused import os")];
        let after = vec![diag(5, "W0611", "Unused import os")];
        let novel = filter_novel(&after, &before, &insertion_at_five());
        assert_eq!(novel, after);
    }

    #[test]
    fn unshifted_comparison_would_miss() {
        // before line 5 moved to new line 6, a diagnostic at new line 5 is new
        let before = vec![diag(5, "C0301", "Line too long (120/100)")];
        let after = vec![
            diag(6, "C0301", "Line too long (121/100)"),
            diag(7, "C0301", "Line too long (130/100)"),
        ];
        let novel = filter_novel(&after, &before, &insertion_at_five());
        assert_eq!(novel.len(), 1);
        assert_eq!(novel[0].line, 7);
    }

    #[test]
    fn different_message_is_novel() {
        let before = vec![diag(2, "W0612", "Unused variable 'a'")];
        let after = vec![diag(2, "W0612", "Unused variable 'b'")];
        let novel = filter_novel(&after, &before, &LineMap::identity(3));
        assert_eq!(novel.len(), 1);
    }

    #[test]
    fn out_of_range_line_is_novel() {
        let before = vec![diag(0, "C0114", "Missing module docstring")];
        let after = vec![
            diag(0, "C0114", "Missing module docstring"),
            diag(40, "C0305", "Trailing newlines"),
        ];
        let novel = filter_novel(&after, &before, &LineMap::identity(3));
        assert_eq!(novel.len(), 2);
    }

    #[test]
    fn order_of_after_is_preserved() {
        let after = vec![
            diag(3, "E1", "c"),
            diag(1, "E1", "a"),
            diag(2, "E1", "b"),
        ];
        let before = vec![diag(1, "E1", "a")];
        let novel = filter_novel(&after, &before, &LineMap::identity(3));
        let lines: Vec<u32> = novel.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![3, 2]);
    }

    #[test]
    fn empty_before_keeps_everything() {
        let after = vec![diag(1, "E1", "a"), diag(2, "E1", "b")];
        assert_eq!(filter_novel(&after, &[], &LineMap::identity(2)), after);
    }
}
