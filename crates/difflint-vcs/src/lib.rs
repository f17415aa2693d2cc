//! Git access for difflint via git2.
//!
//! Implements the [`difflint_core::Vcs`] collaborator: merge-base lookup with
//! an empty-tree fallback, zero-context tree diffs, blob reads, and the
//! checkout/reset pair used by tree materialization.

pub mod repo;

pub use repo::{count_lines, GitRepo};
