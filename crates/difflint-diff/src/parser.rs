use difflint_core::{DiffHunk, DifflintError, HunkLine, LineSign};

/// Marker git emits after a line that lacks a trailing newline.
const NO_NEWLINE_AT_EOF: &str = "\\ No newline at end of file";

/// Parse the hunk text of a zero-context unified diff into [`DiffHunk`]s.
///
/// The input holds only `@@` headers, `+`/`-` lines and no-newline markers,
/// as produced by `git diff --unified=0` with the file headers removed.
/// Blank lines are dropped. Omitted header counts default to 1, and a count
/// of 0 moves the corresponding start one line forward.
///
/// # Errors
///
/// Returns [`DifflintError::MalformedDiff`] for any other line, for a change
/// line before the first header, or for hunks that go backwards. Nothing is
/// returned on error; a partial result cannot be trusted.
///
/// # Examples
///
/// ```
/// use difflint_diff::parser::parse_hunks;
///
/// let hunks = parse_hunks(b"@@ -5,0 +5 @@\n+new\n").unwrap();
/// assert_eq!(hunks.len(), 1);
/// assert_eq!(hunks[0].old_start, 6);
/// assert_eq!(hunks[0].new_start, 5);
/// assert_eq!(hunks[0].added(), 1);
/// ```
pub fn parse_hunks(input: &[u8]) -> Result<Vec<DiffHunk>, DifflintError> {
    let text = String::from_utf8_lossy(input);
    let mut hunks: Vec<DiffHunk> = Vec::new();
    let mut current: Option<DiffHunk> = None;

    for line in text.split('\n').filter(|l| !l.is_empty()) {
        if line.starts_with("@@ ") {
            let hunk = parse_hunk_header(line)?;
            if let Some(prev) = current.take() {
                hunks.push(prev);
            }
            if let Some(prev) = hunks.last() {
                if hunk.new_start < prev.new_start {
                    return Err(DifflintError::MalformedDiff(format!(
                        "hunk out of order: {line}"
                    )));
                }
            }
            current = Some(hunk);
            continue;
        }

        if line == NO_NEWLINE_AT_EOF {
            continue;
        }

        let mut chars = line.chars();
        if let Some(sign) = chars.next().and_then(LineSign::from_char) {
            let Some(hunk) = current.as_mut() else {
                return Err(DifflintError::MalformedDiff(format!(
                    "change line outside a hunk: {line}"
                )));
            };
            hunk.lines.push(HunkLine {
                sign,
                text: chars.as_str().to_string(),
            });
            continue;
        }

        return Err(DifflintError::MalformedDiff(format!(
            "unexpected line: {line}"
        )));
    }

    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }

    Ok(hunks)
}

fn parse_hunk_header(line: &str) -> Result<DiffHunk, DifflintError> {
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(|| DifflintError::MalformedDiff(format!("invalid hunk header: {line}")))?;

    let Some((old, new)) = inner.split_once(' ') else {
        return Err(DifflintError::MalformedDiff(format!(
            "invalid hunk header: {line}"
        )));
    };

    let old = old.strip_prefix('-').ok_or_else(|| {
        DifflintError::MalformedDiff(format!("invalid old range in hunk: {line}"))
    })?;
    let new = new.strip_prefix('+').ok_or_else(|| {
        DifflintError::MalformedDiff(format!("invalid new range in hunk: {line}"))
    })?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok(DiffHunk {
        old_start,
        old_lines,
        new_start,
        new_lines,
        lines: Vec::new(),
    })
}

/// Parse `start[,count]`, shifting `start` past an empty range.
fn parse_range(range: &str, context: &str) -> Result<(u32, u32), DifflintError> {
    let (start, count) = match range.split_once(',') {
        Some((start, count)) => (start, Some(count)),
        None => (range, None),
    };
    let start: u32 = start
        .parse()
        .map_err(|_| DifflintError::MalformedDiff(format!("invalid range number in: {context}")))?;
    let count: u32 = match count {
        Some(c) => c.parse().map_err(|_| {
            DifflintError::MalformedDiff(format!("invalid range count in: {context}"))
        })?,
        None => 1,
    };
    if count == 0 {
        let shifted = start.checked_add(1).ok_or_else(|| {
            DifflintError::MalformedDiff(format!("range start out of bounds in: {context}"))
        })?;
        Ok((shifted, 0))
    } else {
        Ok((start, count))
    }
}
