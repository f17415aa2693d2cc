//! The external analyzer collaborator.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use difflint_core::{AnalyzerConfig, Diagnostic, DifflintError};
use tracing::{debug, trace, warn};

/// Per-invocation options passed to an [`Analyzer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Files on disk changed out-of-band since the previous run, so any
    /// analyzer-side cache must be dropped first.
    pub invalidate_cache: bool,
}

/// Outcome of one analyzer invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerRun {
    /// The analyzer failed on the file itself (parse error, crash).
    pub fatal: bool,
    /// Diagnostics in report order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs static analysis on a single file.
///
/// A fatal analyzer failure is reported through [`AnalyzerRun::fatal`];
/// `Err` is reserved for failing to run the analyzer at all.
pub trait Analyzer {
    /// Analyze `target`, a path relative to the repository working directory.
    fn run(&self, target: &Path, opts: &RunOptions) -> Result<AnalyzerRun, DifflintError>;
}

/// An analyzer run as a child process that prints a JSON diagnostic array.
///
/// # Examples
///
/// ```
/// use difflint_core::AnalyzerConfig;
/// use difflint_gate::analyzer::CommandAnalyzer;
/// use std::path::Path;
///
/// let analyzer = CommandAnalyzer::from_config(&AnalyzerConfig::default(), Path::new("."), &[]);
/// let args = analyzer.command_args(Path::new("pkg/mod.py"));
/// assert_eq!(args, vec!["--output-format=json", "pkg/mod.py"]);
/// ```
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    command: String,
    args: Vec<String>,
    workdir: PathBuf,
    search_path: Vec<PathBuf>,
    search_path_env: String,
    fatal_mask: i32,
}

impl CommandAnalyzer {
    /// Build an analyzer from config, run from `workdir`.
    ///
    /// `extra_args` come after the configured arguments.
    pub fn from_config(config: &AnalyzerConfig, workdir: &Path, extra_args: &[String]) -> Self {
        let mut args = config.args.clone();
        args.extend(extra_args.iter().cloned());
        if let Some(rcfile) = &config.rcfile {
            args.push(config.rcfile_flag.clone());
            args.push(rcfile.to_string_lossy().to_string());
        }
        args.extend(config.format_args.iter().cloned());

        Self {
            command: config.command.clone(),
            args,
            workdir: workdir.to_path_buf(),
            search_path: config.search_path.clone(),
            search_path_env: config.search_path_env.clone(),
            fatal_mask: config.fatal_mask,
        }
    }

    /// Full argument list for analyzing `target`.
    pub fn command_args(&self, target: &Path) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(target.to_string_lossy().to_string());
        args
    }

    /// Value for the search path variable: configured entries first, then
    /// whatever the environment already holds.
    fn search_path_value(&self) -> Result<Option<OsString>, DifflintError> {
        if self.search_path.is_empty() {
            return Ok(None);
        }
        let mut entries = self.search_path.clone();
        if let Some(existing) = env::var_os(&self.search_path_env) {
            entries.extend(env::split_paths(&existing));
        }
        env::join_paths(entries)
            .map(Some)
            .map_err(|e| DifflintError::Analyzer(format!("invalid search path: {e}")))
    }
}

impl Analyzer for CommandAnalyzer {
    fn run(&self, target: &Path, opts: &RunOptions) -> Result<AnalyzerRun, DifflintError> {
        let args = self.command_args(target);
        if opts.invalidate_cache {
            // every invocation is a fresh process
            trace!(target_path = %target.display(), "cache invalidation requested");
        }
        debug!(command = %self.command, ?args, "running analyzer");

        let mut command = Command::new(&self.command);
        command.args(&args).current_dir(&self.workdir);
        if let Some(value) = self.search_path_value()? {
            command.env(&self.search_path_env, value);
        }

        let output = command
            .output()
            .map_err(|e| DifflintError::Analyzer(format!("failed to run '{}': {e}", self.command)))?;

        // killed by a signal counts as fatal
        let fatal = output
            .status
            .code()
            .map_or(true, |code| code & self.fatal_mask != 0);
        // a crashed analyzer often prints a traceback instead of JSON
        let diagnostics = match parse_output(&output.stdout) {
            Ok(diagnostics) => diagnostics,
            Err(e) if fatal => {
                warn!(
                    target_path = %target.display(),
                    error = %e,
                    "unreadable output from failed analyzer run"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        debug!(
            target_path = %target.display(),
            exit = ?output.status.code(),
            fatal,
            diagnostics = diagnostics.len(),
            "analyzer finished"
        );
        Ok(AnalyzerRun { fatal, diagnostics })
    }
}

/// Parse the analyzer's JSON output. Blank output means no diagnostics.
///
/// # Examples
///
/// ```
/// use difflint_gate::analyzer::parse_output;
///
/// assert!(parse_output(b"  \n").unwrap().is_empty());
/// assert!(parse_output(b"not json").is_err());
/// ```
pub fn parse_output(stdout: &[u8]) -> Result<Vec<Diagnostic>, DifflintError> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text)
        .map_err(|e| DifflintError::Analyzer(format!("unreadable analyzer output: {e}")))
}
