//! Selection of the changed files the analyzer should examine.
//!
//! Drops deletions, files the analyzer does not understand, changes that did
//! not touch content (pure renames and mode changes), and files whose basename
//! is on an ignore list.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use difflint_core::{DifflintConfig, DifflintError, FileChange};
use regex::Regex;
use tracing::debug;

/// Decides which [`FileChange`]s are eligible for analysis.
///
/// # Examples
///
/// ```
/// use difflint_diff::select::ChangeSelector;
/// use std::path::Path;
///
/// let selector = ChangeSelector::new(&["*.py".into()], &["setup.py".into()], &["test_".into()]).unwrap();
/// assert!(selector.is_target(Path::new("pkg/mod.py")));
/// assert!(!selector.is_target(Path::new("README.md")));
/// assert!(selector.ignore_reason("setup.py").is_some());
/// assert!(selector.ignore_reason("test_mod.py").is_some());
/// assert!(selector.ignore_reason("mod_test.py").is_none());
/// ```
pub struct ChangeSelector {
    targets: Vec<glob::Pattern>,
    ignore_names: HashSet<String>,
    ignore_patterns: Vec<Regex>,
}

impl ChangeSelector {
    /// Create a selector from target globs, ignored basenames and ignore regexes.
    ///
    /// Regexes match at the start of the basename. An empty target list
    /// accepts every path.
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::Pattern`] if a glob or regex does not compile.
    pub fn new(
        targets: &[String],
        ignore_names: &[String],
        ignore_patterns: &[String],
    ) -> Result<Self, DifflintError> {
        let targets = targets
            .iter()
            .map(|t| {
                glob::Pattern::new(t)
                    .map_err(|e| DifflintError::Pattern(format!("target glob '{t}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ignore_patterns = ignore_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})"))
                    .map_err(|e| DifflintError::Pattern(format!("ignore pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            targets,
            ignore_names: ignore_names.iter().cloned().collect(),
            ignore_patterns,
        })
    }

    /// Create a selector from the analyzer targets and gate ignore lists.
    ///
    /// # Examples
    ///
    /// ```
    /// use difflint_core::DifflintConfig;
    /// use difflint_diff::select::ChangeSelector;
    /// use std::path::Path;
    ///
    /// let selector = ChangeSelector::from_config(&DifflintConfig::default()).unwrap();
    /// assert!(selector.is_target(Path::new("app.py")));
    /// ```
    pub fn from_config(config: &DifflintConfig) -> Result<Self, DifflintError> {
        Self::new(
            &config.analyzer.targets,
            &config.gate.ignore,
            &config.gate.ignore_patterns,
        )
    }

    /// Whether the analyzer handles `path`.
    pub fn is_target(&self, path: &Path) -> bool {
        if self.targets.is_empty() {
            return true;
        }
        let path_str = path.to_string_lossy();
        self.targets.iter().any(|t| t.matches(&path_str))
    }

    /// Why `basename` is ignored, if it is.
    pub fn ignore_reason(&self, basename: &str) -> Option<SkipReason> {
        if self.ignore_names.contains(basename) {
            return Some(SkipReason::IgnoredName(basename.to_string()));
        }
        self.ignore_patterns
            .iter()
            .find(|p| p.is_match(basename))
            .map(|p| SkipReason::IgnoredPattern(p.as_str().to_string()))
    }

    /// Split `changes` into eligible and skipped entries, preserving order.
    pub fn select(&self, changes: Vec<FileChange>) -> Selection {
        let mut selected = Vec::new();
        let mut skipped = Vec::new();

        for change in changes {
            match self.skip_reason(&change) {
                Some(reason) => {
                    debug!(path = %change, %reason, "skipping change");
                    skipped.push(SkippedChange {
                        path: change.path().to_path_buf(),
                        reason,
                    });
                }
                None => selected.push(change),
            }
        }

        Selection { selected, skipped }
    }

    fn skip_reason(&self, change: &FileChange) -> Option<SkipReason> {
        let Some(new_path) = change.new_path.as_deref().filter(|_| change.exists_in_new()) else {
            return Some(SkipReason::Deleted);
        };

        if !self.is_target(new_path) {
            return Some(SkipReason::NotTarget);
        }

        if change.old_id == change.new_id {
            return Some(SkipReason::ContentUnchanged);
        }

        let basename = new_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        self.ignore_reason(&basename)
    }
}

/// Result of selecting changes.
#[derive(Debug, Default)]
pub struct Selection {
    /// Changes to analyze, in diff order.
    pub selected: Vec<FileChange>,
    /// Changes left out, with reasons.
    pub skipped: Vec<SkippedChange>,
}

/// A change that was not selected.
#[derive(Debug, Clone)]
pub struct SkippedChange {
    /// Path of the skipped change.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Reason a change was not selected.
///
/// # Examples
///
/// ```
/// use difflint_diff::select::SkipReason;
///
/// assert_eq!(SkipReason::Deleted.to_string(), "deleted");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file no longer exists.
    Deleted,
    /// The analyzer does not handle this file type.
    NotTarget,
    /// Old and new content are identical (rename or mode change).
    ContentUnchanged,
    /// Basename is in the ignore list.
    IgnoredName(String),
    /// Basename matches an ignore regex.
    IgnoredPattern(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Deleted => write!(f, "deleted"),
            SkipReason::NotTarget => write!(f, "not an analyzer target"),
            SkipReason::ContentUnchanged => write!(f, "content unchanged"),
            SkipReason::IgnoredName(name) => write!(f, "ignored: {name}"),
            SkipReason::IgnoredPattern(pat) => write!(f, "ignore pattern: {pat}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(old: Option<(&str, &str)>, new: Option<(&str, &str)>) -> FileChange {
        FileChange {
            old_path: old.map(|(p, _)| PathBuf::from(p)),
            new_path: new.map(|(p, _)| PathBuf::from(p)),
            old_id: old.map(|(_, id)| id.to_string()),
            new_id: new.map(|(_, id)| id.to_string()),
            patch: String::new(),
        }
    }

    fn python_selector() -> ChangeSelector {
        ChangeSelector::new(&["*.py".into()], &[], &[]).unwrap()
    }

    #[test]
    fn modified_python_file_is_selected() {
        let result = python_selector().select(vec![change(
            Some(("pkg/mod.py", "aaa")),
            Some(("pkg/mod.py", "bbb")),
        )]);
        assert_eq!(result.selected.len(), 1);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn added_file_is_selected() {
        let result = python_selector().select(vec![change(None, Some(("new.py", "bbb")))]);
        assert_eq!(result.selected.len(), 1);
    }

    #[test]
    fn deletion_is_skipped() {
        let result = python_selector().select(vec![change(Some(("gone.py", "aaa")), None)]);
        assert!(result.selected.is_empty());
        assert_eq!(result.skipped[0].reason, SkipReason::Deleted);
        assert_eq!(result.skipped[0].path, PathBuf::from("gone.py"));
    }

    #[test]
    fn non_target_is_skipped() {
        let result = python_selector().select(vec![change(
            Some(("README.md", "aaa")),
            Some(("README.md", "bbb")),
        )]);
        assert_eq!(result.skipped[0].reason, SkipReason::NotTarget);
    }

    #[test]
    fn identical_content_is_skipped_even_when_renamed() {
        let result = python_selector().select(vec![change(
            Some(("old_name.py", "same")),
            Some(("new_name.py", "same")),
        )]);
        assert!(result.selected.is_empty());
        assert_eq!(result.skipped[0].reason, SkipReason::ContentUnchanged);
    }

    #[test]
    fn ignored_names_and_patterns_are_skipped() {
        let selector = ChangeSelector::new(
            &["*.py".into()],
            &["conftest.py".into()],
            &["test_.*".into(), ".*_pb2\\.py".into()],
        )
        .unwrap();
        let result = selector.select(vec![
            change(Some(("tests/conftest.py", "a")), Some(("tests/conftest.py", "b"))),
            change(Some(("tests/test_api.py", "a")), Some(("tests/test_api.py", "b"))),
            change(None, Some(("proto/msg_pb2.py", "b"))),
            change(Some(("src/api.py", "a")), Some(("src/api.py", "b"))),
        ]);
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].path(), Path::new("src/api.py"));
        assert_eq!(
            result.skipped[0].reason,
            SkipReason::IgnoredName("conftest.py".into())
        );
        assert!(matches!(
            result.skipped[1].reason,
            SkipReason::IgnoredPattern(_)
        ));
        assert!(matches!(
            result.skipped[2].reason,
            SkipReason::IgnoredPattern(_)
        ));
    }

    #[test]
    fn ignore_applies_to_basename_only() {
        let selector = ChangeSelector::new(&["*.py".into()], &["tests".into()], &["tests".into()]).unwrap();
        let result = selector.select(vec![change(
            Some(("tests/api.py", "a")),
            Some(("tests/api.py", "b")),
        )]);
        assert_eq!(result.selected.len(), 1);
    }

    #[test]
    fn selection_preserves_order() {
        let result = python_selector().select(vec![
            change(None, Some(("b.py", "1"))),
            change(None, Some(("a.py", "2"))),
            change(None, Some(("c.py", "3"))),
        ]);
        let paths: Vec<&Path> = result.selected.iter().map(|c| c.path()).collect();
        assert_eq!(paths, vec![Path::new("b.py"), Path::new("a.py"), Path::new("c.py")]);
    }

    #[test]
    fn empty_targets_accept_everything() {
        let selector = ChangeSelector::new(&[], &[], &[]).unwrap();
        assert!(selector.is_target(Path::new("Makefile")));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(ChangeSelector::new(&["[".into()], &[], &[]).is_err());
        assert!(ChangeSelector::new(&[], &[], &["(".into()]).is_err());
    }
}
