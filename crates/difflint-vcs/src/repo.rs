use std::path::{Path, PathBuf};

use difflint_core::{DifflintError, FileChange, Vcs, EMPTY_TREE};
use git2::build::CheckoutBuilder;
use git2::{
    DiffFindOptions, DiffOptions, ErrorCode, ObjectType, Oid, Patch, Repository, ResetType,
    StatusOptions, Tree,
};
use tracing::{debug, warn};

/// Marker line emitted for diff lines without a trailing newline.
const NO_NEWLINE_AT_EOF: &str = "\\ No newline at end of file";

/// A git working copy opened through git2.
///
/// # Examples
///
/// ```no_run
/// use difflint_core::Vcs;
/// use difflint_vcs::GitRepo;
/// use std::path::Path;
///
/// let repo = GitRepo::open(Path::new(".")).unwrap();
/// let head = repo.head_commit().unwrap();
/// let base = repo.merge_base("master", &head).unwrap();
/// for change in repo.diff(&base, &head).unwrap() {
///     println!("{change}");
/// }
/// ```
pub struct GitRepo {
    repo: Repository,
    workdir: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DifflintError::Git`] if no repository is found or it is bare.
    pub fn open(path: &Path) -> Result<Self, DifflintError> {
        let repo = Repository::discover(path)
            .map_err(|e| DifflintError::Git(format!("failed to open repository: {e}")))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| DifflintError::Git("repository has no working directory".into()))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// Object id of the commit `HEAD` points to.
    pub fn head_commit(&self) -> Result<String, DifflintError> {
        let commit = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| DifflintError::Git(format!("failed to resolve HEAD: {e}")))?;
        Ok(commit.id().to_string())
    }

    /// Write the index as a tree and return its id, like `git write-tree`.
    pub fn index_tree(&self) -> Result<String, DifflintError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| DifflintError::Git(format!("failed to read index: {e}")))?;
        let oid = index
            .write_tree()
            .map_err(|e| DifflintError::Git(format!("failed to write index tree: {e}")))?;
        Ok(oid.to_string())
    }

    fn resolve_commit(&self, rev: &str) -> Result<Oid, DifflintError> {
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map(|c| c.id())
            .map_err(|e| DifflintError::UnresolvedRevision(format!("{rev}: {e}")))
    }

    fn tree(&self, rev: &str) -> Result<Tree<'_>, DifflintError> {
        if rev == EMPTY_TREE {
            // the empty tree is not guaranteed to be in the object database
            let oid = self
                .repo
                .treebuilder(None)
                .and_then(|b| b.write())
                .map_err(|e| DifflintError::Git(format!("failed to write empty tree: {e}")))?;
            return self
                .repo
                .find_tree(oid)
                .map_err(|e| DifflintError::Git(format!("failed to find empty tree: {e}")));
        }
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_tree())
            .map_err(|e| DifflintError::UnresolvedRevision(format!("{rev}: {e}")))
    }

    fn blob_oid(id: &str) -> Result<Oid, DifflintError> {
        Oid::from_str(id).map_err(|e| DifflintError::Git(format!("invalid object id '{id}': {e}")))
    }
}

impl Vcs for GitRepo {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolves(&self, rev: &str) -> bool {
        self.repo.revparse_single(rev).is_ok()
    }

    fn merge_base(&self, target: &str, source: &str) -> Result<String, DifflintError> {
        let target_oid = match self.resolve_commit(target) {
            Ok(oid) => oid,
            Err(e) => {
                warn!(target_rev = %target, error = %e, "target does not resolve, comparing against the empty tree");
                return Ok(EMPTY_TREE.to_string());
            }
        };
        let source_oid = self.resolve_commit(source)?;

        match self.repo.merge_base(target_oid, source_oid) {
            Ok(oid) => Ok(oid.to_string()),
            Err(e) if e.code() == ErrorCode::NotFound => {
                warn!(target_rev = %target, source_rev = %source, "no common ancestor, comparing against the empty tree");
                Ok(EMPTY_TREE.to_string())
            }
            Err(e) => Err(DifflintError::Git(format!("failed to compute merge base: {e}"))),
        }
    }

    fn diff(&self, base: &str, head: &str) -> Result<Vec<FileChange>, DifflintError> {
        let old_tree = self.tree(base)?;
        let new_tree = self.tree(head)?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.context_lines(0).interhunk_lines(0);
        let mut diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut diff_opts))
            .map_err(|e| DifflintError::Git(format!("failed to compute diff: {e}")))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(|e| DifflintError::Git(format!("failed to find renames: {e}")))?;

        let mut changes = Vec::new();
        for (idx, delta) in diff.deltas().enumerate() {
            let old_file = delta.old_file();
            let new_file = delta.new_file();
            let old_id = (!old_file.id().is_zero()).then(|| old_file.id().to_string());
            let new_id = (!new_file.id().is_zero()).then(|| new_file.id().to_string());

            let patch = Patch::from_diff(&diff, idx)
                .map_err(|e| DifflintError::Git(format!("failed to build patch: {e}")))?;
            let patch = match patch {
                Some(p) => hunk_text(&p)?,
                None => String::new(),
            };

            changes.push(FileChange {
                old_path: old_id
                    .as_ref()
                    .and(old_file.path())
                    .map(Path::to_path_buf),
                new_path: new_id
                    .as_ref()
                    .and(new_file.path())
                    .map(Path::to_path_buf),
                old_id,
                new_id,
                patch,
            });
        }

        debug!(%base, %head, files = changes.len(), "computed diff");
        Ok(changes)
    }

    fn read_blob(&self, id: &str) -> Result<Vec<u8>, DifflintError> {
        let blob = self
            .repo
            .find_blob(Self::blob_oid(id)?)
            .map_err(|e| DifflintError::Git(format!("failed to read blob {id}: {e}")))?;
        Ok(blob.content().to_vec())
    }

    fn line_count(&self, id: &str) -> Result<usize, DifflintError> {
        let blob = self
            .repo
            .find_blob(Self::blob_oid(id)?)
            .map_err(|e| DifflintError::Git(format!("failed to read blob {id}: {e}")))?;
        Ok(count_lines(blob.content()))
    }

    fn working_content_id(&self, path: &Path) -> Result<Option<String>, DifflintError> {
        let full = self.workdir.join(path);
        if !full.is_file() {
            return Ok(None);
        }
        let oid = Oid::hash_file(ObjectType::Blob, &full)
            .map_err(|e| DifflintError::Git(format!("failed to hash {}: {e}", full.display())))?;
        Ok(Some(oid.to_string()))
    }

    fn is_clean(&self) -> Result<bool, DifflintError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(|e| DifflintError::Git(format!("failed to read status: {e}")))?;
        Ok(statuses.is_empty())
    }

    fn checkout_tree(&self, tree: &str) -> Result<(), DifflintError> {
        if !self.is_clean()? {
            return Err(DifflintError::DirtyWorkingTree);
        }
        let tree = self.tree(tree)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut checkout))
            .map_err(|e| DifflintError::Git(format!("failed to check out tree: {e}")))?;
        debug!(tree = %tree.id(), "checked out tree");
        Ok(())
    }

    fn reset(&self) -> Result<(), DifflintError> {
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| DifflintError::Git(format!("failed to resolve HEAD: {e}")))?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo
            .reset(head.as_object(), ResetType::Hard, Some(&mut checkout))
            .map_err(|e| DifflintError::Git(format!("failed to reset working tree: {e}")))?;
        debug!(head = %head.id(), "reset working tree");
        Ok(())
    }
}

/// Render a patch's hunks as zero-context unified diff text without file headers.
fn hunk_text(patch: &Patch<'_>) -> Result<String, DifflintError> {
    let mut out = String::new();
    for h in 0..patch.num_hunks() {
        let (hunk, line_count) = patch
            .hunk(h)
            .map_err(|e| DifflintError::Git(format!("failed to read hunk: {e}")))?;
        push_line(&mut out, &String::from_utf8_lossy(hunk.header()));

        for l in 0..line_count {
            let line = patch
                .line_in_hunk(h, l)
                .map_err(|e| DifflintError::Git(format!("failed to read hunk line: {e}")))?;
            match line.origin() {
                origin @ ('+' | '-') => {
                    out.push(origin);
                    push_line(&mut out, &String::from_utf8_lossy(line.content()));
                }
                '=' | '>' | '<' => push_line(&mut out, NO_NEWLINE_AT_EOF),
                _ => {}
            }
        }
    }
    Ok(out)
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line.trim_end_matches(['\r', '\n']));
    out.push('\n');
}

/// Number of lines in `content`, counting a final line without a newline.
///
/// # Examples
///
/// ```
/// use difflint_vcs::count_lines;
///
/// assert_eq!(count_lines(b""), 0);
/// assert_eq!(count_lines(b"a\nb\n"), 2);
/// assert_eq!(count_lines(b"a\nb"), 2);
/// ```
pub fn count_lines(content: &[u8]) -> usize {
    String::from_utf8_lossy(content).lines().count()
}
