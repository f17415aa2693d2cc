use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use difflint_core::{CheckoutMode, Diagnostic, DifflintError, Severity, Vcs};
use difflint_diff::select::ChangeSelector;
use difflint_gate::analyzer::{Analyzer, AnalyzerRun, RunOptions};
use difflint_gate::pipeline::{FileOutcome, Gate, GateOptions, Revisions};
use difflint_vcs::GitRepo;
use git2::{Repository, Signature};
use tempfile::TempDir;

/// Reports a warning on every line containing `print(`.
struct PrintLinter {
    root: PathBuf,
    seen: RefCell<Vec<PathBuf>>,
}

impl Analyzer for PrintLinter {
    fn run(&self, target: &Path, _opts: &RunOptions) -> Result<AnalyzerRun, DifflintError> {
        self.seen.borrow_mut().push(target.to_path_buf());
        let content = fs::read_to_string(self.root.join(target))?;
        let module = target.with_extension("").to_string_lossy().replace('/', ".");
        let diagnostics = content
            .lines()
            .enumerate()
            .filter(|(_, l)| l.contains("print("))
            .map(|(i, _)| Diagnostic {
                path: target.to_path_buf(),
                line: i as u32 + 1,
                column: 0,
                rule_id: "W9001".into(),
                severity: Severity::Warning,
                message: "print call (1)".into(),
                symbol: "print-call".into(),
                obj: String::new(),
                module: module.clone(),
            })
            .collect();
        Ok(AnalyzerRun {
            fatal: false,
            diagnostics,
        })
    }
}

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();

    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let signature = Signature::now("Test User", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

const BASE: &str = "import os\nprint(os.name)\n\n\ndef main():\n    return 1\n";
const HEAD: &str = "import os\nprint(os.sep)\nprint(os.name)\n\n\ndef main():\n    return 1\n";

/// A repository whose feature commit adds one `print(` line above an old one.
fn feature_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    write(dir.path(), "pkg/app.py", BASE);
    write(dir.path(), "README.md", "docs\n");
    let fork = commit_all(&repo, "base");
    repo.branch("target", &repo.find_commit(fork).unwrap(), false)
        .unwrap();

    write(dir.path(), "pkg/app.py", HEAD);
    write(dir.path(), "README.md", "more docs\n");
    commit_all(&repo, "feature");
    (dir, repo)
}

fn run_gate(git: &GitRepo, mode: CheckoutMode, head: String) -> Result<(difflint_gate::pipeline::GateReport, Vec<PathBuf>), DifflintError> {
    let base = git.merge_base("target", &git.head_commit()?)?;
    let changes = git.diff(&base, &head)?;
    let selection = ChangeSelector::new(&["*.py".into()], &[], &[])?.select(changes);

    let linter = PrintLinter {
        root: git.workdir().to_path_buf(),
        seen: RefCell::new(Vec::new()),
    };
    let options = GateOptions {
        checkout_mode: mode,
        ..GateOptions::default()
    };
    let report = Gate::new(git, &linter, options).run(&selection.selected, &Revisions { base, head })?;
    Ok((report, linter.seen.into_inner()))
}

#[test]
fn file_mode_reports_only_the_new_line() {
    let (dir, _repo) = feature_repo();
    let git = GitRepo::open(dir.path()).unwrap();
    let head = git.index_tree().unwrap();

    let (report, seen) = run_gate(&git, CheckoutMode::File, head).unwrap();
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].outcome, FileOutcome::Filtered { suppressed: 1 });
    let lines: Vec<u32> = report.diagnostics().map(|d| d.line).collect();
    assert_eq!(lines, vec![2]);
    assert_eq!(report.status, 4);

    // new content analyzed in place, old content beside it under a temp name
    assert_eq!(seen[0], PathBuf::from("pkg/app.py"));
    assert_eq!(seen[1].parent(), Some(Path::new("pkg")));
    assert!(!dir.path().join(&seen[1]).exists());
    assert!(git.is_clean().unwrap());
}

#[test]
fn tree_mode_matches_file_mode_and_restores_head() {
    let (dir, _repo) = feature_repo();
    let git = GitRepo::open(dir.path()).unwrap();
    let head = git.head_commit().unwrap();

    let (report, seen) = run_gate(&git, CheckoutMode::Tree, head).unwrap();
    let lines: Vec<u32> = report.diagnostics().map(|d| d.line).collect();
    assert_eq!(lines, vec![2]);
    assert!(seen.iter().all(|p| p == Path::new("pkg/app.py")));
    assert_eq!(fs::read_to_string(dir.path().join("pkg/app.py")).unwrap(), HEAD);
    assert!(git.is_clean().unwrap());
}

#[test]
fn tree_mode_refuses_a_dirty_working_tree() {
    let (dir, _repo) = feature_repo();
    write(dir.path(), "scratch.py", "print('wip')\n");
    let git = GitRepo::open(dir.path()).unwrap();
    let head = git.head_commit().unwrap();

    let err = run_gate(&git, CheckoutMode::Tree, head).unwrap_err();
    assert!(matches!(err, DifflintError::DirtyWorkingTree));
    assert!(dir.path().join("scratch.py").exists());
}

#[test]
fn unrelated_target_compares_against_empty_tree() {
    let (dir, _repo) = feature_repo();
    let git = GitRepo::open(dir.path()).unwrap();
    let head = git.index_tree().unwrap();

    let base = git.merge_base("no-such-branch", &git.head_commit().unwrap()).unwrap();
    let changes = git.diff(&base, &head).unwrap();
    let selection = ChangeSelector::new(&["*.py".into()], &[], &[]).unwrap().select(changes);
    let linter = PrintLinter {
        root: git.workdir().to_path_buf(),
        seen: RefCell::new(Vec::new()),
    };
    let report = Gate::new(&git, &linter, GateOptions::default())
        .run(&selection.selected, &Revisions { base, head })
        .unwrap();
    // every file is new, so nothing is filtered
    assert_eq!(report.problem_count(), 2);
    assert_eq!(report.files[0].outcome, FileOutcome::Unfiltered);
}
