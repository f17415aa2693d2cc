use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which side of a diff a hunk line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSign {
    /// Line present only in the new revision (`+`).
    Added,
    /// Line present only in the old revision (`-`).
    Removed,
}

impl LineSign {
    /// Map a diff origin character to a sign.
    ///
    /// # Examples
    ///
    /// ```
    /// use difflint_core::LineSign;
    ///
    /// assert_eq!(LineSign::from_char('+'), Some(LineSign::Added));
    /// assert_eq!(LineSign::from_char(' '), None);
    /// ```
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(LineSign::Added),
            '-' => Some(LineSign::Removed),
            _ => None,
        }
    }
}

/// One changed line inside a hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkLine {
    /// Added or removed.
    pub sign: LineSign,
    /// Line text without the sign character.
    pub text: String,
}

/// A single hunk from a zero-context unified diff.
///
/// Starts are already adjusted for zero counts: a header such as `-5,0`
/// describes an empty range anchored after line 5 and is stored with
/// `old_start == 6`.
///
/// # Examples
///
/// ```
/// use difflint_core::{DiffHunk, HunkLine, LineSign};
///
/// let hunk = DiffHunk {
///     old_start: 6,
///     old_lines: 0,
///     new_start: 5,
///     new_lines: 1,
///     lines: vec![HunkLine { sign: LineSign::Added, text: "new".into() }],
/// };
/// assert_eq!(hunk.added(), 1);
/// assert_eq!(hunk.removed(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    /// Starting line in the old version.
    pub old_start: u32,
    /// Number of lines in the old version.
    pub old_lines: u32,
    /// Starting line in the new version.
    pub new_start: u32,
    /// Number of lines in the new version.
    pub new_lines: u32,
    /// Changed lines in diff order.
    pub lines: Vec<HunkLine>,
}

impl DiffHunk {
    /// Number of `+` lines.
    pub fn added(&self) -> usize {
        self.count(LineSign::Added)
    }

    /// Number of `-` lines.
    pub fn removed(&self) -> usize {
        self.count(LineSign::Removed)
    }

    fn count(&self, sign: LineSign) -> usize {
        self.lines.iter().filter(|l| l.sign == sign).count()
    }
}

/// One entry of a revision-pair diff, as reported by the VCS collaborator.
///
/// # Examples
///
/// ```
/// use difflint_core::FileChange;
/// use std::path::PathBuf;
///
/// let change = FileChange {
///     old_path: Some(PathBuf::from("pkg/a.py")),
///     new_path: None,
///     old_id: Some("1111".into()),
///     new_id: None,
///     patch: String::new(),
/// };
/// assert!(!change.exists_in_new());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Path in the old revision, absent for added files.
    pub old_path: Option<PathBuf>,
    /// Path in the new revision, absent for deleted files.
    pub new_path: Option<PathBuf>,
    /// Blob id of the old content.
    pub old_id: Option<String>,
    /// Blob id of the new content.
    pub new_id: Option<String>,
    /// Zero-context hunk text for this file (no file headers).
    pub patch: String,
}

impl FileChange {
    /// Whether the new revision has content at `new_path`.
    pub fn exists_in_new(&self) -> bool {
        self.new_id.is_some() && self.new_path.is_some()
    }

    /// Whether prior content exists to compare against.
    pub fn has_prior(&self) -> bool {
        self.old_id.is_some()
    }

    /// The path used for reporting: the new path, else the old one.
    pub fn path(&self) -> &Path {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or(Path::new(""))
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.old_path, &self.new_path) {
            (Some(old), Some(new)) if old != new => {
                write!(f, "{} -> {}", old.display(), new.display())
            }
            _ => write!(f, "{}", self.path().display()),
        }
    }
}

/// Message category emitted by the analyzer.
///
/// Variants follow pylint's categories; each maps to one bit of the
/// process exit status.
///
/// # Examples
///
/// ```
/// use difflint_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"refactor\"").unwrap();
/// assert_eq!(s, Severity::Refactor);
/// assert_eq!(s.status_bit(), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The analyzer could not process the file.
    Fatal,
    /// A probable bug.
    Error,
    /// A likely problem worth fixing.
    Warning,
    /// A design smell.
    Refactor,
    /// A style convention violation.
    Convention,
    /// Informational message.
    Info,
}

impl Severity {
    /// Exit-status bit for this category.
    pub fn status_bit(self) -> u8 {
        match self {
            Severity::Fatal => 1,
            Severity::Error => 2,
            Severity::Warning => 4,
            Severity::Refactor => 8,
            Severity::Convention => 16,
            Severity::Info => 0,
        }
    }

    /// Single-letter code (`C`, `R`, `W`, `E`, `F`, `I`).
    pub fn code(self) -> char {
        match self {
            Severity::Fatal => 'F',
            Severity::Error => 'E',
            Severity::Warning => 'W',
            Severity::Refactor => 'R',
            Severity::Convention => 'C',
            Severity::Info => 'I',
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "fatal"),
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Refactor => write!(f, "refactor"),
            Severity::Convention => write!(f, "convention"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fatal" | "f" => Ok(Severity::Fatal),
            "error" | "e" => Ok(Severity::Error),
            "warning" | "w" => Ok(Severity::Warning),
            "refactor" | "r" => Ok(Severity::Refactor),
            "convention" | "c" => Ok(Severity::Convention),
            "info" | "i" => Ok(Severity::Info),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// One diagnostic produced by the external analyzer.
///
/// Field names follow pylint's JSON reporter so analyzer output deserializes
/// directly; `symbol`, `obj` and `module` are only used for rendering.
///
/// # Examples
///
/// ```
/// use difflint_core::{Diagnostic, Severity};
///
/// let json = r#"{
///     "type": "refactor",
///     "module": "pkg.mod",
///     "obj": "f",
///     "line": 5,
///     "column": 0,
///     "path": "pkg/mod.py",
///     "symbol": "too-many-arguments",
///     "message": "Too many arguments (13/12)",
///     "message-id": "R0913"
/// }"#;
/// let d: Diagnostic = serde_json::from_str(json).unwrap();
/// assert_eq!(d.rule_id, "R0913");
/// assert_eq!(d.severity, Severity::Refactor);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Path of the analyzed file, relative to the repository root.
    pub path: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// 0-based column.
    pub column: u32,
    /// Rule identifier such as `R0913`.
    #[serde(rename = "message-id", alias = "ruleId", alias = "msg_id")]
    pub rule_id: String,
    /// Message category.
    #[serde(rename = "type", alias = "severity")]
    pub severity: Severity,
    /// Human-readable message, possibly spanning several lines.
    #[serde(alias = "msg")]
    pub message: String,
    /// Symbolic rule name such as `too-many-arguments`.
    #[serde(default)]
    pub symbol: String,
    /// Enclosing object (function, class) if any.
    #[serde(default)]
    pub obj: String,
    /// Dotted module name.
    #[serde(default)]
    pub module: String,
}

/// Output format for the gate report.
///
/// # Examples
///
/// ```
/// use difflint_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pylint-style text rendered through the message template.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
