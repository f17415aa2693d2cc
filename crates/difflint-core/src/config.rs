use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DifflintError;

/// Default template for one rendered diagnostic line.
pub const DEFAULT_MSG_TEMPLATE: &str = "{path} ({line}:{column}) | {msg_id}: {symbol} | {obj}: {msg}";

/// Top-level configuration loaded from `.difflint.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use difflint_core::{DiffMode, DifflintConfig};
///
/// let config = DifflintConfig::default();
/// assert_eq!(config.gate.target_branch, "master");
/// assert_eq!(config.gate.diff_mode, DiffMode::Line);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifflintConfig {
    /// Gate behavior settings.
    #[serde(default)]
    pub gate: GateConfig,
    /// Analyzer invocation settings.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl DifflintConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::FileNotFound`] if the file does not exist,
    /// [`DifflintError::Io`] if it cannot be read, or
    /// [`DifflintError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use difflint_core::DifflintConfig;
    /// use std::path::Path;
    ///
    /// let config = DifflintConfig::from_file(Path::new(".difflint.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, DifflintError> {
        if !path.exists() {
            return Err(DifflintError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use difflint_core::{CheckoutMode, DifflintConfig};
    ///
    /// let toml = r#"
    /// [gate]
    /// checkout_mode = "tree"
    /// ignore = ["setup.py"]
    /// "#;
    /// let config = DifflintConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.gate.checkout_mode, CheckoutMode::Tree);
    /// assert_eq!(config.gate.ignore, vec!["setup.py"]);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, DifflintError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay the gate settings found in a pylint rcfile.
    ///
    /// `ignore` and `ignore-patterns` are read from `[MASTER]` (or `[MAIN]`)
    /// and `msg-template` from `[REPORTS]`. Keys that are absent leave the
    /// current values alone. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::Io`] if the file exists but cannot be read, or
    /// [`DifflintError::Config`] if it is not valid INI.
    pub fn apply_rcfile(&mut self, path: &Path) -> Result<(), DifflintError> {
        if !path.is_file() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        self.overlay_rcfile(&content)
            .map_err(|e| DifflintError::Config(format!("{}: {e}", path.display())))
    }

    /// Overlay rcfile settings from INI text. See [`DifflintConfig::apply_rcfile`].
    ///
    /// # Examples
    ///
    /// ```
    /// use difflint_core::DifflintConfig;
    ///
    /// let mut config = DifflintConfig::default();
    /// config
    ///     .apply_rcfile_str("[MASTER]\nignore=setup.py, conftest.py\n[REPORTS]\nmsg-template={path}:{line}\n")
    ///     .unwrap();
    /// assert_eq!(config.gate.ignore, vec!["setup.py", "conftest.py"]);
    /// assert_eq!(config.gate.msg_template, "{path}:{line}");
    /// ```
    pub fn apply_rcfile_str(&mut self, content: &str) -> Result<(), DifflintError> {
        self.overlay_rcfile(content)
            .map_err(|e| DifflintError::Config(e.to_string()))
    }

    fn overlay_rcfile(&mut self, content: &str) -> Result<(), ini::ParseError> {
        let options = ini::ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ini::ParseOption::default()
        };
        let rc = ini::Ini::load_from_str_opt(content, options)?;

        let master = rc.section(Some("MASTER")).or_else(|| rc.section(Some("MAIN")));
        if let Some(master) = master {
            if let Some(ignore) = master.get("ignore") {
                self.gate.ignore = split_list(ignore);
            }
            if let Some(patterns) = master.get("ignore-patterns") {
                self.gate.ignore_patterns = split_list(patterns);
            }
        }
        if let Some(template) = rc
            .section(Some("REPORTS"))
            .and_then(|reports| reports.get("msg-template"))
            .filter(|t| !t.trim().is_empty())
        {
            self.gate.msg_template = template.trim().to_string();
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// How changed files are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Report every diagnostic in each changed file.
    File,
    /// Report only diagnostics the change introduced.
    #[default]
    Line,
}

impl fmt::Display for DiffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffMode::File => write!(f, "file"),
            DiffMode::Line => write!(f, "line"),
        }
    }
}

impl FromStr for DiffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(DiffMode::File),
            "line" => Ok(DiffMode::Line),
            other => Err(format!("unrecognised diff mode: {other}")),
        }
    }
}

/// How historical content is put on disk for the analyzer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutMode {
    /// Write single blobs to temporary files next to the original path.
    #[default]
    File,
    /// Check out whole trees into the working directory.
    Tree,
}

impl fmt::Display for CheckoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutMode::File => write!(f, "file"),
            CheckoutMode::Tree => write!(f, "tree"),
        }
    }
}

impl FromStr for CheckoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(CheckoutMode::File),
            "tree" => Ok(CheckoutMode::Tree),
            other => Err(format!("unrecognised checkout mode: {other}")),
        }
    }
}

/// What to do with a file's diagnostics when the baseline analysis fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeforeFailurePolicy {
    /// Drop every diagnostic for the file (fail-closed).
    #[default]
    Discard,
    /// Report the file's diagnostics unfiltered.
    Report,
}

/// Gate behavior configuration.
///
/// # Examples
///
/// ```
/// use difflint_core::{BeforeFailurePolicy, CheckoutMode, GateConfig};
///
/// let config = GateConfig::default();
/// assert_eq!(config.checkout_mode, CheckoutMode::File);
/// assert_eq!(config.before_failure, BeforeFailurePolicy::Discard);
/// assert!(config.ignore.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Branch the change will be merged into (default: `master`).
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    /// Whole-file or changed-line reporting (default: line).
    #[serde(default)]
    pub diff_mode: DiffMode,
    /// Blob or tree materialization (default: file).
    #[serde(default)]
    pub checkout_mode: CheckoutMode,
    /// File basenames to skip.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Regexes matched against the start of file basenames to skip.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Template for one rendered diagnostic line.
    #[serde(default = "default_msg_template")]
    pub msg_template: String,
    /// Baseline-failure policy (default: discard).
    #[serde(default)]
    pub before_failure: BeforeFailurePolicy,
}

fn default_target_branch() -> String {
    "master".into()
}

fn default_msg_template() -> String {
    DEFAULT_MSG_TEMPLATE.into()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            target_branch: default_target_branch(),
            diff_mode: DiffMode::default(),
            checkout_mode: CheckoutMode::default(),
            ignore: Vec::new(),
            ignore_patterns: Vec::new(),
            msg_template: default_msg_template(),
            before_failure: BeforeFailurePolicy::default(),
        }
    }
}

/// External analyzer configuration.
///
/// # Examples
///
/// ```
/// use difflint_core::AnalyzerConfig;
///
/// let config = AnalyzerConfig::default();
/// assert_eq!(config.command, "pylint");
/// assert_eq!(config.targets, vec!["*.py"]);
/// assert_eq!(config.fatal_mask, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Executable to run (default: `pylint`).
    #[serde(default = "default_command")]
    pub command: String,
    /// Extra arguments passed before the target path.
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments selecting JSON output (default: `--output-format=json`).
    #[serde(default = "default_format_args")]
    pub format_args: Vec<String>,
    /// Globs selecting the files the analyzer understands (default: `*.py`).
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    /// Analyzer configuration file.
    pub rcfile: Option<PathBuf>,
    /// Flag used to pass `rcfile` (default: `--rcfile`).
    #[serde(default = "default_rcfile_flag")]
    pub rcfile_flag: String,
    /// Directories prepended to the analyzer's module search path.
    #[serde(default)]
    pub search_path: Vec<PathBuf>,
    /// Environment variable carrying the module search path (default: `PYTHONPATH`).
    #[serde(default = "default_search_path_env")]
    pub search_path_env: String,
    /// Exit-status bits that signal a fatal analyzer failure (default: 1).
    #[serde(default = "default_fatal_mask")]
    pub fatal_mask: i32,
}

fn default_command() -> String {
    "pylint".into()
}

fn default_format_args() -> Vec<String> {
    vec!["--output-format=json".into()]
}

fn default_targets() -> Vec<String> {
    vec!["*.py".into()]
}

fn default_rcfile_flag() -> String {
    "--rcfile".into()
}

fn default_search_path_env() -> String {
    "PYTHONPATH".into()
}

fn default_fatal_mask() -> i32 {
    1
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            format_args: default_format_args(),
            targets: default_targets(),
            rcfile: None,
            rcfile_flag: default_rcfile_flag(),
            search_path: Vec::new(),
            search_path_env: default_search_path_env(),
            fatal_mask: default_fatal_mask(),
        }
    }
}
