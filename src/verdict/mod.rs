//! Evidence-backed verdict classification
//!
//! Derives unit verdicts as pure functions over immutable unit reports.

pub mod verdict;

pub use verdict::VerdictClassifier;
