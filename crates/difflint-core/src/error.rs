use std::path::PathBuf;

/// Errors that can occur across difflint.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate turns it into a `miette` report with `?`.
///
/// A fatal analyzer failure is not represented here: it is reported as data
/// on the analyzer run and handled by the gate.
///
/// # Examples
///
/// ```
/// use difflint_core::DifflintError;
///
/// let err = DifflintError::MalformedDiff("garbage".into());
/// assert!(err.to_string().contains("garbage"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DifflintError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(difflint::config))]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// Diff text that does not follow the zero-context unified grammar.
    #[error("malformed diff: {0}")]
    MalformedDiff(String),

    /// The analyzer could not be launched or produced unreadable output.
    #[error("analyzer error: {0}")]
    Analyzer(String),

    /// A tree checkout was requested while the working tree had changes.
    #[error("working tree is not clean; commit or stash changes before a tree checkout")]
    #[diagnostic(
        code(difflint::dirty_tree),
        help("use --checkout-mode file to analyze single blobs instead")
    )]
    DirtyWorkingTree,

    /// A revision name could not be resolved.
    #[error("unresolved revision: {0}")]
    UnresolvedRevision(String),

    /// No unused temporary name could be found next to `path`.
    #[error("could not create a temporary copy of {} after {attempts} attempts", path.display())]
    TempExhausted {
        /// The file the temporary copy was for.
        path: PathBuf,
        /// How many names were tried.
        attempts: usize,
    },

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// An ignore regex or target glob failed to compile.
    #[error("invalid pattern: {0}")]
    Pattern(String),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
