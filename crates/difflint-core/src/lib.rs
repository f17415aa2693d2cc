//! Core types, configuration, and error handling for difflint.
//!
//! This crate provides the shared foundation used by all other difflint crates:
//! - [`DifflintError`]: unified error type using `thiserror`
//! - [`DifflintConfig`]: configuration loaded from `.difflint.toml`
//! - Shared types: [`DiffHunk`], [`FileChange`], [`Diagnostic`], [`Severity`],
//!   [`OutputFormat`]
//! - The [`Vcs`] collaborator trait implemented by `difflint-vcs`

mod config;
mod error;
mod types;
mod vcs;

pub use config::{
    AnalyzerConfig, BeforeFailurePolicy, CheckoutMode, DiffMode, DifflintConfig, GateConfig,
    DEFAULT_MSG_TEMPLATE,
};
pub use error::DifflintError;
pub use types::{Diagnostic, DiffHunk, FileChange, HunkLine, LineSign, OutputFormat, Severity};
pub use vcs::{Vcs, EMPTY_TREE};
