//! Incremental diagnostic gating.
//!
//! Runs the external analyzer over each changed file, reruns it on the
//! pre-change content when needed, and keeps only the diagnostics the change
//! introduced. Also renders the resulting report.

pub mod analyzer;
pub mod fingerprint;
pub mod incremental;
pub mod materialize;
pub mod pipeline;
pub mod report;
