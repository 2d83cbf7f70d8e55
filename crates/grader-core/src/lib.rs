//! # grader-core
//!
//! Exam record handling for the OpenGrader tools.
//!
//! This crate provides:
//! - The exam record model and its YAML loader
//! - The submission merger that upserts student answers into a record
//! - Comment-preserving rendering of the edited record
//! - Configuration loading and validation

mod config;
mod error;
mod identity;
mod merger;
mod record;
mod render;
mod reporter;
mod splice;
pub mod submission;
pub mod testing;

pub use config::{ConfigError, ConfigWarning, DEFAULT_CONFIG_FILE, GraderConfig};
pub use error::MergeError;
pub use identity::{ConcatenatedNames, IdentityPolicy, IdentityStrategy, SeparatedNames};
pub use merger::{
    MergeOptions, MergeSummary, RecordMerger, RecordMode, WriteStrategy, merge_submissions,
};
pub use record::{
    AnswerEntry, ExamRecord, ExistingEntry, STUDENT_RESPONSE_KEY, StudentEntry, StudentSummary,
};
pub use reporter::TracingReporter;
