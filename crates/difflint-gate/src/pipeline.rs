use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};

use difflint_core::{
    BeforeFailurePolicy, CheckoutMode, Diagnostic, DiffMode, DifflintError, FileChange,
    GateConfig, Vcs,
};
use difflint_diff::linemap::LineMap;
use difflint_diff::parser::parse_hunks;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::analyzer::{Analyzer, AnalyzerRun, RunOptions};
use crate::incremental::filter_novel;
use crate::materialize::{StagedBlob, WorkingTree};

/// Result of a completed gate run.
///
/// # Examples
///
/// ```
/// use difflint_gate::pipeline::GateReport;
///
/// let report = GateReport::default();
/// assert_eq!(report.status, 0);
/// assert_eq!(report.problem_count(), 0);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct GateReport {
    /// Per-file results in analysis order.
    pub files: Vec<FileReport>,
    /// Whether any analyzer run failed fatally.
    pub fatal: bool,
    /// Exit bitmask: bit 0 for a fatal failure, one bit per reported severity.
    pub status: i32,
}

impl GateReport {
    /// All reported diagnostics across files, in order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.iter().flat_map(|f| f.diagnostics.iter())
    }

    /// Number of reported diagnostics.
    pub fn problem_count(&self) -> usize {
        self.files.iter().map(|f| f.diagnostics.len()).sum()
    }

    /// Whether the run stopped before analyzing every file.
    pub fn aborted(&self) -> bool {
        self.files
            .last()
            .is_some_and(|f| f.outcome == FileOutcome::Aborted)
    }

    fn push(&mut self, file: FileReport) {
        if file.fatal {
            self.fatal = true;
            self.status |= 1;
        }
        for d in &file.diagnostics {
            self.status |= i32::from(d.severity.status_bit());
        }
        self.files.push(file);
    }
}

/// Result for one analyzed file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// Path in the new revision.
    pub path: PathBuf,
    /// Diagnostics reported for the file.
    pub diagnostics: Vec<Diagnostic>,
    /// Whether an analyzer run on this file failed fatally.
    pub fatal: bool,
    /// How the file left the state machine.
    pub outcome: FileOutcome,
}

/// Terminal state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FileOutcome {
    /// Reported without comparison against the previous revision.
    Unfiltered,
    /// Compared against the previous revision.
    Filtered {
        /// Diagnostics that already existed before the change.
        suppressed: usize,
    },
    /// The previous revision could not be analyzed.
    BaselineFailed,
    /// The analyzer failed on the new revision; the run stopped here.
    Aborted,
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Unfiltered => write!(f, "unfiltered"),
            FileOutcome::Filtered { suppressed } => write!(f, "filtered ({suppressed} suppressed)"),
            FileOutcome::BaselineFailed => write!(f, "baseline failed"),
            FileOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// Gate behavior switches.
///
/// # Examples
///
/// ```
/// use difflint_core::{DiffMode, GateConfig};
/// use difflint_gate::pipeline::GateOptions;
///
/// let options = GateOptions::from(&GateConfig::default());
/// assert_eq!(options.diff_mode, DiffMode::Line);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateOptions {
    /// Whether to compare against the previous revision.
    pub diff_mode: DiffMode,
    /// How revisions are put on disk.
    pub checkout_mode: CheckoutMode,
    /// What to report when the previous revision fails to analyze.
    pub before_failure: BeforeFailurePolicy,
}

impl From<&GateConfig> for GateOptions {
    fn from(config: &GateConfig) -> Self {
        Self {
            diff_mode: config.diff_mode,
            checkout_mode: config.checkout_mode,
            before_failure: config.before_failure,
        }
    }
}

/// The two trees a gate run compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revisions {
    /// Tree-ish before the change (usually the merge base).
    pub base: String,
    /// Tree-ish after the change.
    pub head: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

/// Where a file is in its analysis.
enum Stage {
    Pending,
    AnalyzedAfter(AnalyzerRun),
    NeedsBefore(Vec<Diagnostic>),
    AnalyzedBefore {
        after: Vec<Diagnostic>,
        before: AnalyzerRun,
    },
    Filtered {
        after_count: usize,
        novel: Vec<Diagnostic>,
    },
    Reported(FileReport),
    FatalAborted(FileReport),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::AnalyzedAfter(_) => "analyzed-after",
            Stage::NeedsBefore(_) => "needs-before",
            Stage::AnalyzedBefore { .. } => "analyzed-before",
            Stage::Filtered { .. } => "filtered",
            Stage::Reported(_) => "reported",
            Stage::FatalAborted(_) => "fatal-aborted",
        }
    }
}

/// Drives each selected change through analysis and filtering.
///
/// Files are processed one at a time. A fatal analyzer failure on a file's new
/// content stops the run; a failure on its previous content only affects that
/// file.
pub struct Gate<'a, V: Vcs + ?Sized, A: Analyzer + ?Sized> {
    vcs: &'a V,
    analyzer: &'a A,
    options: GateOptions,
    tree: WorkingTree<'a, V>,
    tree_runs: Cell<usize>,
}

impl<'a, V: Vcs + ?Sized, A: Analyzer + ?Sized> Gate<'a, V, A> {
    /// Create a gate over a VCS and an analyzer.
    pub fn new(vcs: &'a V, analyzer: &'a A, options: GateOptions) -> Self {
        Self {
            vcs,
            analyzer,
            options,
            tree: WorkingTree::new(vcs),
            tree_runs: Cell::new(0),
        }
    }

    /// Analyze `changes` and report the diagnostics they introduce.
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::MalformedDiff`] if a change's hunks cannot be
    /// parsed, [`DifflintError::DirtyWorkingTree`] in tree mode with local
    /// changes, or any VCS, I/O or analyzer launch error.
    pub fn run(
        &self,
        changes: &[FileChange],
        revisions: &Revisions,
    ) -> Result<GateReport, DifflintError> {
        let mut report = GateReport::default();

        for change in changes {
            let file = self.process(change, revisions)?;
            info!(
                path = %file.path.display(),
                outcome = %file.outcome,
                diagnostics = file.diagnostics.len(),
                "file done"
            );
            let aborted = file.outcome == FileOutcome::Aborted;
            report.push(file);
            if aborted {
                warn!(path = %change, "analyzer failed on new content, stopping");
                break;
            }
        }

        debug!(files = report.files.len(), status = report.status, "gate finished");
        Ok(report)
    }

    fn process(&self, change: &FileChange, revisions: &Revisions) -> Result<FileReport, DifflintError> {
        let path = change.path().to_path_buf();
        let report = |diagnostics, fatal, outcome| FileReport {
            path: path.clone(),
            diagnostics,
            fatal,
            outcome,
        };

        let mut stage = Stage::Pending;
        loop {
            trace!(path = %change, stage = stage.name(), "file stage");
            stage = match stage {
                Stage::Pending => Stage::AnalyzedAfter(self.analyze(change, Side::After, revisions)?),

                // the file's own diagnostics usually say why the analyzer failed
                Stage::AnalyzedAfter(run) if run.fatal => {
                    Stage::FatalAborted(report(run.diagnostics, true, FileOutcome::Aborted))
                }

                Stage::AnalyzedAfter(run) => {
                    if self.options.diff_mode == DiffMode::File
                        || run.diagnostics.is_empty()
                        || !change.has_prior()
                    {
                        Stage::Reported(report(run.diagnostics, false, FileOutcome::Unfiltered))
                    } else {
                        Stage::NeedsBefore(run.diagnostics)
                    }
                }

                Stage::NeedsBefore(after) => Stage::AnalyzedBefore {
                    after,
                    before: self.analyze(change, Side::Before, revisions)?,
                },

                Stage::AnalyzedBefore { after, before } if before.fatal => {
                    warn!(path = %change, policy = ?self.options.before_failure, "analyzer failed on previous content");
                    let diagnostics = match self.options.before_failure {
                        BeforeFailurePolicy::Discard => Vec::new(),
                        BeforeFailurePolicy::Report => after,
                    };
                    Stage::Reported(report(diagnostics, true, FileOutcome::BaselineFailed))
                }

                Stage::AnalyzedBefore { after, before } => {
                    let map = self.line_map(change)?;
                    Stage::Filtered {
                        after_count: after.len(),
                        novel: filter_novel(&after, &before.diagnostics, &map),
                    }
                }

                Stage::Filtered { after_count, novel } => {
                    let suppressed = after_count - novel.len();
                    Stage::Reported(report(novel, false, FileOutcome::Filtered { suppressed }))
                }

                Stage::Reported(file) | Stage::FatalAborted(file) => return Ok(file),
            };
        }
    }

    fn line_map(&self, change: &FileChange) -> Result<LineMap, DifflintError> {
        let hunks = parse_hunks(change.patch.as_bytes())?;
        let new_id = required_id(change.new_id.as_deref(), change)?;
        let line_count = self.vcs.line_count(new_id)?;
        Ok(LineMap::build(&hunks, line_count))
    }

    fn analyze(
        &self,
        change: &FileChange,
        side: Side,
        revisions: &Revisions,
    ) -> Result<AnalyzerRun, DifflintError> {
        let new_path = required_path(change.new_path.as_deref(), change)?;

        match self.options.checkout_mode {
            CheckoutMode::File => {
                let id = match side {
                    Side::After => change.new_id.as_deref(),
                    Side::Before => change.old_id.as_deref(),
                };
                let staged = StagedBlob::stage(self.vcs, new_path, required_id(id, change)?)?;
                debug!(path = %staged.original().display(), ?side, staged = %staged.path().display(), "analyzing");
                let run = self.analyzer.run(staged.path(), &RunOptions::default())?;
                Ok(AnalyzerRun {
                    fatal: run.fatal,
                    diagnostics: staged.restore(run.diagnostics),
                })
            }
            CheckoutMode::Tree => {
                let (tree, path) = match side {
                    Side::After => (&revisions.head, new_path),
                    Side::Before => (
                        &revisions.base,
                        required_path(change.old_path.as_deref(), change)?,
                    ),
                };
                let _checkout = self.tree.checkout(tree)?;

                // the analyzer may have cached files from an earlier checkout
                let opts = RunOptions {
                    invalidate_cache: self.tree_runs.get() > 0,
                };
                self.tree_runs.set(self.tree_runs.get() + 1);
                debug!(path = %path.display(), ?side, %tree, "analyzing checked-out tree");
                self.analyzer.run(path, &opts)
            }
        }
    }
}

fn required_id<'c>(id: Option<&'c str>, change: &FileChange) -> Result<&'c str, DifflintError> {
    id.ok_or_else(|| DifflintError::Git(format!("{change}: missing content id")))
}

fn required_path<'c>(path: Option<&'c Path>, change: &FileChange) -> Result<&'c Path, DifflintError> {
    path.ok_or_else(|| DifflintError::Git(format!("{change}: missing path")))
}
