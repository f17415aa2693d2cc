//! Comparison keys that identify the same issue across two revisions.

use std::borrow::Cow;

use difflint_core::Diagnostic;

/// Equality key for a diagnostic in old-file coordinates.
///
/// # Examples
///
/// ```
/// use difflint_core::{Diagnostic, Severity};
/// use difflint_gate::fingerprint::fingerprint;
/// use std::path::PathBuf;
///
/// let d = Diagnostic {
///     path: PathBuf::from("mod.py"),
///     line: 6,
///     column: 0,
///     rule_id: "R0913".into(),
///     severity: Severity::Refactor,
///     message: "Too many arguments (15/12)".into(),
///     symbol: String::new(),
///     obj: String::new(),
///     module: String::new(),
/// };
/// let fp = fingerprint(&d, Some(5)).unwrap();
/// assert_eq!(fp.line, 5);
/// assert_eq!(fp.message, "Too many arguments (/)");
/// assert!(fingerprint(&d, None).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Line in old-file coordinates.
    pub line: u32,
    /// Column as reported.
    pub column: u32,
    /// Rule identifier.
    pub rule_id: String,
    /// Message with numeric noise removed.
    pub message: String,
}

/// Fingerprint `diagnostic` at `mapped_line`.
///
/// Returns `None` when the line has no old counterpart; such a diagnostic
/// cannot match anything and is always new.
pub fn fingerprint(diagnostic: &Diagnostic, mapped_line: Option<u32>) -> Option<Fingerprint> {
    let line = mapped_line?;
    Some(Fingerprint {
        line,
        column: diagnostic.column,
        rule_id: diagnostic.rule_id.clone(),
        message: normalize_message(&diagnostic.message).into_owned(),
    })
}

/// Strip digits from the trailing parenthetical of a message's first line.
///
/// Analyzers put counts such as `(13/12)` at the end of a message; those
/// change between revisions without the issue being new. Only the last
/// `(`...`)` group of the first line is touched, and only when the first line
/// ends with `)`. Later lines are kept verbatim.
///
/// # Examples
///
/// ```
/// use difflint_gate::fingerprint::normalize_message;
///
/// assert_eq!(normalize_message("Too many branches (14/12)"), "Too many branches (/)");
/// assert_eq!(normalize_message("Line too long (120/100)\ndetail 7"), "Line too long (/)\ndetail 7");
/// assert_eq!(normalize_message("Unused variable 'x2'"), "Unused variable 'x2'");
/// ```
pub fn normalize_message(message: &str) -> Cow<'_, str> {
    let (head, rest) = match message.split_once('\n') {
        Some((head, rest)) => (head, Some(rest)),
        None => (message, None),
    };

    if !head.ends_with(')') {
        return Cow::Borrowed(message);
    }
    let Some(open) = head.rfind('(') else {
        return Cow::Borrowed(message);
    };

    let (prefix, group) = head.split_at(open);
    let mut normalized = String::with_capacity(message.len());
    normalized.push_str(prefix);
    normalized.extend(group.chars().filter(|c| !c.is_ascii_digit()));
    if let Some(rest) = rest {
        normalized.push('\n');
        normalized.push_str(rest);
    }
    Cow::Owned(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use difflint_core::Severity;
    use std::path::PathBuf;

    fn diag(line: u32, rule_id: &str, message: &str) -> Diagnostic {
        Diagnostic {
            path: PathBuf::from("mod.py"),
            line,
            column: 0,
            rule_id: rule_id.into(),
            severity: Severity::Refactor,
            message: message.into(),
            symbol: String::new(),
            obj: String::new(),
            module: String::new(),
        }
    }

    #[test]
    fn counts_in_trailing_group_are_ignored() {
        let before = diag(5, "R0913", "Too many arguments (13/12)");
        let after = diag(6, "R0913", "Too many arguments (15/12)");
        assert_eq!(fingerprint(&before, Some(5)), fingerprint(&after, Some(5)));
    }

    #[test]
    fn digits_outside_the_group_matter() {
        assert_eq!(
            normalize_message("Redefining name 'x1' from outer scope (line 3)"),
            "Redefining name 'x1' from outer scope (line )"
        );
        assert_ne!(
            normalize_message("Unused argument 'a1' (1)"),
            normalize_message("Unused argument 'a2' (1)")
        );
    }

    #[test]
    fn only_the_last_group_is_stripped() {
        assert_eq!(normalize_message("call f(1) too deep (5/4)"), "call f(1) too deep (/)");
    }

    #[test]
    fn head_must_end_with_paren() {
        assert_eq!(normalize_message("Too many lines (1200/1000) in module"), "Too many lines (1200/1000) in module");
        assert_eq!(normalize_message("unbalanced 12)"), "unbalanced 12)");
    }

    #[test]
    fn later_lines_are_not_normalized() {
        let msg = "Similar lines in 2 files (4/4)\n==a:[10:14]\n==b:[20:24]";
        assert_eq!(normalize_message(msg), "Similar lines in 2 files (/)\n==a:[10:14]\n==b:[20:24]");
    }

    #[test]
    fn parenthetical_on_a_later_line_is_untouched() {
        let msg = "Duplicate code\nsee (12/10)";
        assert!(matches!(normalize_message(msg), Cow::Borrowed(_)));
    }

    #[test]
    fn rule_and_column_are_part_of_the_key() {
        let a = diag(5, "R0913", "Too many arguments (13/12)");
        let b = diag(5, "R0917", "Too many arguments (13/12)");
        assert_ne!(fingerprint(&a, Some(5)), fingerprint(&b, Some(5)));

        let mut c = a.clone();
        c.column = 4;
        assert_ne!(fingerprint(&a, Some(5)), fingerprint(&c, Some(5)));
    }

    #[test]
    fn unmapped_line_has_no_fingerprint() {
        assert!(fingerprint(&diag(5, "W0611", "Unused import os"), None).is_none());
    }
}
