use std::path::Path;

use crate::error::DifflintError;
use crate::types::FileChange;

/// Object id of git's empty tree, used when two revisions share no history.
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Version-control collaborator used by the gate.
///
/// Revisions and content ids are opaque strings (hex object ids for git).
/// `checkout_tree` mutates the working directory; callers must pair it with
/// [`Vcs::reset`] on every exit path.
pub trait Vcs {
    /// Root of the working directory that analyzer paths are relative to.
    fn workdir(&self) -> &Path;

    /// Whether `rev` names an existing revision.
    fn resolves(&self, rev: &str) -> bool;

    /// Best common ancestor of two revisions, or [`EMPTY_TREE`] when there is none.
    fn merge_base(&self, target: &str, source: &str) -> Result<String, DifflintError>;

    /// Zero-context changes between two tree-ish revisions.
    fn diff(&self, base: &str, head: &str) -> Result<Vec<FileChange>, DifflintError>;

    /// Raw content of a blob.
    fn read_blob(&self, id: &str) -> Result<Vec<u8>, DifflintError>;

    /// Number of lines in a blob, counting a final unterminated line.
    fn line_count(&self, id: &str) -> Result<usize, DifflintError>;

    /// Blob id the on-disk file at `path` would hash to, if the file exists.
    fn working_content_id(&self, path: &Path) -> Result<Option<String>, DifflintError>;

    /// Whether the working tree has no staged, unstaged or untracked changes.
    fn is_clean(&self) -> Result<bool, DifflintError>;

    /// Replace the working tree contents with `tree`.
    ///
    /// Fails with [`DifflintError::DirtyWorkingTree`] unless the tree is clean.
    fn checkout_tree(&self, tree: &str) -> Result<(), DifflintError>;

    /// Restore the working tree to `HEAD`, removing files a checkout introduced.
    fn reset(&self) -> Result<(), DifflintError>;
}
