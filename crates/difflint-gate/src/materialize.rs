//! Putting a revision's content on disk so the analyzer can read it.
//!
//! Two strategies exist. [`StagedBlob`] writes one blob next to its original
//! path under a random name and needs no shared state. [`WorkingTree`] checks
//! out a whole tree, which is exclusive and must be undone afterwards.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use difflint_core::{Diagnostic, DifflintError, Vcs};
use rand::Rng;
use tracing::{debug, warn};

/// Attempts at finding an unused temp name before giving up.
pub const MAX_TEMP_ATTEMPTS: usize = 16;

const TEMP_STEM_LEN: usize = 10;

/// A blob made available at a path the analyzer can read.
///
/// When the working copy already holds the blob the original path is used
/// directly. Otherwise the content goes to a fresh file in the same directory
/// (same extension, random stem) which is removed on drop together with any
/// directories created for it.
#[derive(Debug)]
pub struct StagedBlob {
    original: PathBuf,
    staged: PathBuf,
    root: PathBuf,
    temporary: bool,
    created_dirs: Vec<PathBuf>,
}

impl StagedBlob {
    /// Make blob `id` readable at or beside `path` (relative to the working directory).
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::TempExhausted`] if no unused name is found
    /// within [`MAX_TEMP_ATTEMPTS`], or an I/O or VCS error.
    pub fn stage<V: Vcs + ?Sized>(vcs: &V, path: &Path, id: &str) -> Result<Self, DifflintError> {
        let root = vcs.workdir().to_path_buf();

        if vcs.working_content_id(path)?.as_deref() == Some(id) {
            debug!(path = %path.display(), "working copy matches blob, analyzing in place");
            return Ok(Self {
                original: path.to_path_buf(),
                staged: path.to_path_buf(),
                root,
                temporary: false,
                created_dirs: Vec::new(),
            });
        }

        let content = vcs.read_blob(id)?;
        let parent = path.parent().unwrap_or(Path::new(""));
        let created_dirs = create_missing_dirs(&root, parent)?;

        // from here on drop cleans up whatever has been created
        let mut blob = Self {
            original: path.to_path_buf(),
            staged: path.to_path_buf(),
            root,
            temporary: false,
            created_dirs,
        };
        let (staged, mut file) = blob.create_unique(parent, path.extension())?;
        blob.staged = staged;
        blob.temporary = true;
        file.write_all(&content)?;

        debug!(path = %path.display(), staged = %blob.staged.display(), "staged blob");
        Ok(blob)
    }

    fn create_unique(
        &self,
        parent: &Path,
        extension: Option<&std::ffi::OsStr>,
    ) -> Result<(PathBuf, fs::File), DifflintError> {
        let mut rng = rand::thread_rng();
        for attempt in 1..=MAX_TEMP_ATTEMPTS {
            let stem: String = (0..TEMP_STEM_LEN)
                .map(|_| rng.gen_range(b'a'..=b'z') as char)
                .collect();
            let mut candidate = parent.join(stem);
            if let Some(ext) = extension {
                candidate.set_extension(ext);
            }

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.root.join(&candidate))
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(candidate = %candidate.display(), attempt, "temp name taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DifflintError::TempExhausted {
            path: self.root.join(parent),
            attempts: MAX_TEMP_ATTEMPTS,
        })
    }

    /// Path to hand to the analyzer, relative to the working directory.
    pub fn path(&self) -> &Path {
        &self.staged
    }

    /// Path the content belongs to.
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// Whether the content was written to a temp file.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Point diagnostics reported against the staged file back at the original.
    pub fn restore(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        if !self.temporary {
            return diagnostics;
        }
        let staged_stem = stem_of(&self.staged);
        let original_stem = stem_of(&self.original);

        diagnostics
            .into_iter()
            .map(|mut d| {
                if d.path != self.staged {
                    return d;
                }
                d.path = self.original.clone();
                let module = match d.module.rsplit_once('.') {
                    Some((package, last)) if last == staged_stem => {
                        Some(format!("{package}.{original_stem}"))
                    }
                    None if d.module == staged_stem => Some(original_stem.clone()),
                    _ => None,
                };
                if let Some(module) = module {
                    d.module = module;
                }
                d
            })
            .collect()
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        if self.temporary {
            let full = self.root.join(&self.staged);
            if let Err(e) = fs::remove_file(&full) {
                warn!(path = %full.display(), error = %e, "failed to remove staged file");
            }
        }
        // deepest first
        for dir in self.created_dirs.iter().rev() {
            if let Err(e) = fs::remove_dir(self.root.join(dir)) {
                warn!(path = %dir.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Create every missing directory of `dir` under `root`, returning the
/// created ones outermost first.
fn create_missing_dirs(root: &Path, dir: &Path) -> Result<Vec<PathBuf>, DifflintError> {
    let mut missing: Vec<PathBuf> = dir
        .ancestors()
        .filter(|a| !a.as_os_str().is_empty() && !root.join(a).is_dir())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();

    for created in &missing {
        fs::create_dir(root.join(created))?;
    }
    Ok(missing)
}

/// The repository working tree as an exclusive resource.
///
/// # Examples
///
/// ```no_run
/// use difflint_gate::materialize::WorkingTree;
/// use difflint_vcs::GitRepo;
/// use std::path::Path;
///
/// let repo = GitRepo::open(Path::new(".")).unwrap();
/// let tree = WorkingTree::new(&repo);
/// {
///     let _checkout = tree.checkout("HEAD~1").unwrap();
///     // files on disk now match HEAD~1
/// }
/// // dropped: files are back at HEAD
/// ```
pub struct WorkingTree<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    lock: Mutex<()>,
}

impl<'a, V: Vcs + ?Sized> WorkingTree<'a, V> {
    /// Wrap the working tree of `vcs`.
    pub fn new(vcs: &'a V) -> Self {
        Self {
            vcs,
            lock: Mutex::new(()),
        }
    }

    /// Check out `tree`, holding the working tree until the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::DirtyWorkingTree`] if there are local
    /// changes, or the VCS error if the checkout fails. A failed checkout is
    /// still reset.
    pub fn checkout(&self, tree: &str) -> Result<CheckoutGuard<'_, V>, DifflintError> {
        // the guard only protects the tree on disk, which reset restores
        let lock = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.vcs.is_clean()? {
            return Err(DifflintError::DirtyWorkingTree);
        }

        let guard = CheckoutGuard {
            vcs: self.vcs,
            _lock: lock,
        };
        self.vcs.checkout_tree(tree)?;
        debug!(%tree, "working tree checked out");
        Ok(guard)
    }
}

/// Holds a checked-out tree; resets the working tree when dropped.
pub struct CheckoutGuard<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    _lock: MutexGuard<'a, ()>,
}

impl<V: Vcs + ?Sized> Drop for CheckoutGuard<'_, V> {
    fn drop(&mut self) {
        match self.vcs.reset() {
            Ok(()) => debug!("working tree reset"),
            Err(e) => warn!(error = %e, "failed to reset working tree"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use difflint_core::{FileChange, Severity};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FakeVcs {
        root: TempDir,
        blobs: HashMap<String, Vec<u8>>,
        clean: bool,
        fail_checkout: bool,
        calls: RefCell<Vec<String>>,
    }

    impl FakeVcs {
        fn new() -> Self {
            Self {
                root: TempDir::new().unwrap(),
                blobs: HashMap::new(),
                clean: true,
                fail_checkout: false,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Vcs for FakeVcs {
        fn workdir(&self) -> &Path {
            self.root.path()
        }
        fn resolves(&self, _rev: &str) -> bool {
            true
        }
        fn merge_base(&self, _target: &str, _source: &str) -> Result<String, DifflintError> {
            unimplemented!()
        }
        fn diff(&self, _base: &str, _head: &str) -> Result<Vec<FileChange>, DifflintError> {
            unimplemented!()
        }
        fn read_blob(&self, id: &str) -> Result<Vec<u8>, DifflintError> {
            self.blobs
                .get(id)
                .cloned()
                .ok_or_else(|| DifflintError::Git(format!("no blob {id}")))
        }
        fn line_count(&self, _id: &str) -> Result<usize, DifflintError> {
            unimplemented!()
        }
        fn working_content_id(&self, path: &Path) -> Result<Option<String>, DifflintError> {
            let Ok(content) = fs::read(self.root.path().join(path)) else {
                return Ok(None);
            };
            Ok(self
                .blobs
                .iter()
                .find(|(_, c)| **c == content)
                .map(|(id, _)| id.clone())
                .or(Some("untracked".into())))
        }
        fn is_clean(&self) -> Result<bool, DifflintError> {
            Ok(self.clean)
        }
        fn checkout_tree(&self, tree: &str) -> Result<(), DifflintError> {
            self.calls.borrow_mut().push(format!("checkout {tree}"));
            if self.fail_checkout {
                return Err(DifflintError::Git("checkout failed".into()));
            }
            Ok(())
        }
        fn reset(&self) -> Result<(), DifflintError> {
            self.calls.borrow_mut().push("reset".into());
            Ok(())
        }
    }

    fn diag(path: &str, module: &str) -> Diagnostic {
        Diagnostic {
            path: PathBuf::from(path),
            line: 1,
            column: 0,
            rule_id: "C0114".into(),
            severity: Severity::Convention,
            message: "Missing module docstring".into(),
            symbol: "missing-module-docstring".into(),
            obj: String::new(),
            module: module.into(),
        }
    }

    #[test]
    fn matching_working_copy_is_used_in_place() {
        let mut vcs = FakeVcs::new();
        vcs.blobs.insert("new".into(), b"x = 1\n".to_vec());
        fs::write(vcs.root.path().join("mod.py"), "x = 1\n").unwrap();

        let staged = StagedBlob::stage(&vcs, Path::new("mod.py"), "new").unwrap();
        assert!(!staged.is_temporary());
        assert_eq!(staged.path(), Path::new("mod.py"));

        let diagnostics = vec![diag("mod.py", "mod")];
        assert_eq!(staged.restore(diagnostics.clone()), diagnostics);
        drop(staged);
        assert!(vcs.root.path().join("mod.py").exists());
    }

    #[test]
    fn differing_content_goes_to_a_temp_sibling() {
        let mut vcs = FakeVcs::new();
        vcs.blobs.insert("old".into(), b"x = 0\n".to_vec());
        fs::create_dir(vcs.root.path().join("pkg")).unwrap();
        fs::write(vcs.root.path().join("pkg/mod.py"), "x = 1\n").unwrap();

        let staged = StagedBlob::stage(&vcs, Path::new("pkg/mod.py"), "old").unwrap();
        assert!(staged.is_temporary());
        let path = staged.path().to_path_buf();
        assert_eq!(path.parent(), Some(Path::new("pkg")));
        assert_eq!(path.extension().unwrap(), "py");
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        assert_eq!(stem.len(), 10);
        assert!(stem.chars().all(|c| c.is_ascii_lowercase()));

        let full = vcs.root.path().join(&path);
        assert_eq!(fs::read_to_string(&full).unwrap(), "x = 0\n");

        drop(staged);
        assert!(!full.exists());
        assert_eq!(fs::read_to_string(vcs.root.path().join("pkg/mod.py")).unwrap(), "x = 1\n");
    }

    #[test]
    fn missing_directories_are_created_and_removed() {
        let mut vcs = FakeVcs::new();
        vcs.blobs.insert("old".into(), b"x = 0\n".to_vec());

        let staged = StagedBlob::stage(&vcs, Path::new("gone/deep/mod.py"), "old").unwrap();
        assert!(vcs.root.path().join("gone/deep").is_dir());
        assert!(vcs.root.path().join(staged.path()).is_file());

        drop(staged);
        assert!(!vcs.root.path().join("gone").exists());
    }

    #[test]
    fn diagnostics_are_rewritten_to_the_original() {
        let mut vcs = FakeVcs::new();
        vcs.blobs.insert("old".into(), b"x = 0\n".to_vec());
        let staged = StagedBlob::stage(&vcs, Path::new("pkg/mod.py"), "old").unwrap();
        let staged_path = staged.path().to_string_lossy().to_string();
        let staged_stem = staged.path().file_stem().unwrap().to_string_lossy().to_string();

        let restored = staged.restore(vec![
            diag(&staged_path, &format!("pkg.{staged_stem}")),
            diag("pkg/other.py", "pkg.other"),
        ]);
        assert_eq!(restored[0].path, PathBuf::from("pkg/mod.py"));
        assert_eq!(restored[0].module, "pkg.mod");
        assert_eq!(restored[1].path, PathBuf::from("pkg/other.py"));
        assert_eq!(restored[1].module, "pkg.other");
    }

    #[test]
    fn top_level_module_is_rewritten() {
        let mut vcs = FakeVcs::new();
        vcs.blobs.insert("old".into(), b"x = 0\n".to_vec());
        let staged = StagedBlob::stage(&vcs, Path::new("setup.py"), "old").unwrap();
        let staged_path = staged.path().to_string_lossy().to_string();
        let staged_stem = staged.path().file_stem().unwrap().to_string_lossy().to_string();

        let restored = staged.restore(vec![diag(&staged_path, &staged_stem)]);
        assert_eq!(restored[0].module, "setup");
    }

    #[test]
    fn checkout_guard_resets_on_drop() {
        let vcs = FakeVcs::new();
        let tree = WorkingTree::new(&vcs);
        {
            let _guard = tree.checkout("base").unwrap();
            assert_eq!(*vcs.calls.borrow(), vec!["checkout base"]);
        }
        assert_eq!(*vcs.calls.borrow(), vec!["checkout base", "reset"]);

        let _again = tree.checkout("head").unwrap();
    }

    #[test]
    fn dirty_tree_is_refused_without_touching_it() {
        let mut vcs = FakeVcs::new();
        vcs.clean = false;
        let tree = WorkingTree::new(&vcs);
        let err = tree.checkout("base").err().unwrap();
        assert!(matches!(err, DifflintError::DirtyWorkingTree));
        assert!(vcs.calls.borrow().is_empty());
    }

    #[test]
    fn failed_checkout_is_still_reset() {
        let mut vcs = FakeVcs::new();
        vcs.fail_checkout = true;
        let tree = WorkingTree::new(&vcs);
        assert!(tree.checkout("base").is_err());
        assert_eq!(*vcs.calls.borrow(), vec!["checkout base", "reset"]);
    }
}
