//! # grader-proto
//!
//! Shared types and traits for the OpenGrader tools.
//!
//! This crate provides the foundational abstractions used across all grader
//! crates, including:
//! - The submission descriptor the import skill hands to the merger
//! - The `Reporter` sink for leveled, user-facing messages

mod reporter;
mod submission;

pub use reporter::{Level, Reporter};
pub use submission::{StudentSubmission, display_name};
