//! New-to-old line correlation derived from zero-context hunks.

use difflint_core::{DiffHunk, LineSign};

/// Maps 1-based line numbers of the new revision to the old revision.
///
/// `None` means the new line was inserted and has no old counterpart.
/// Defined entries are strictly increasing.
///
/// # Examples
///
/// ```
/// use difflint_diff::linemap::LineMap;
/// use difflint_diff::parser::parse_hunks;
///
/// let hunks = parse_hunks(b"@@ -5,0 +5 @@\n+new\n").unwrap();
/// let map = LineMap::build(&hunks, 11);
/// assert_eq!(map.get(4), Some(4));
/// assert_eq!(map.get(5), None);
/// assert_eq!(map.get(6), Some(5));
/// assert_eq!(map.get(11), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMap {
    /// Index 0 is a sentinel so that indices are line numbers.
    entries: Vec<Option<u32>>,
}

impl LineMap {
    /// Build the map for a file whose new revision has `new_line_count` lines.
    ///
    /// Hunks must be in diff order. Header counts are not checked against the
    /// number of `+`/`-` lines.
    pub fn build(hunks: &[DiffHunk], new_line_count: usize) -> Self {
        let mut entries = Vec::with_capacity(new_line_count + 1);
        entries.push(None);
        let mut old_line: u32 = 1;
        let mut new_line: u32 = 1;

        for hunk in hunks {
            while new_line < hunk.new_start {
                entries.push(Some(old_line));
                old_line += 1;
                new_line += 1;
            }

            for line in &hunk.lines {
                match line.sign {
                    LineSign::Removed => old_line += 1,
                    LineSign::Added => {
                        entries.push(None);
                        new_line += 1;
                    }
                }
            }
        }

        while (new_line as usize) <= new_line_count {
            entries.push(Some(old_line));
            old_line += 1;
            new_line += 1;
        }

        Self { entries }
    }

    /// The map of an unmodified file with `line_count` lines.
    pub fn identity(line_count: usize) -> Self {
        Self::build(&[], line_count)
    }

    /// Old line number for `new_line`.
    ///
    /// Returns `None` for inserted lines and for lines outside the map,
    /// including line 0.
    pub fn get(&self, new_line: u32) -> Option<u32> {
        if new_line == 0 {
            return None;
        }
        self.entries.get(new_line as usize).copied().flatten()
    }

    /// Number of new-revision lines covered.
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    /// Whether the map covers no lines.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(new_line, old_line)` pairs in new-line order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Option<u32>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, old)| (i as u32, *old))
    }
}
