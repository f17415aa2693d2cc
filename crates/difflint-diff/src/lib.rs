//! Zero-context diff parsing, line correlation, and change selection.
//!
//! Parses the hunk text of a single file's diff, correlates post-change line
//! numbers with pre-change ones, and selects which changed files the analyzer
//! should look at.

pub mod linemap;
pub mod parser;
pub mod select;
