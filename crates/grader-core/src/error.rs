//! Error types for exam record merging.

use std::path::PathBuf;

/// Errors raised while merging submissions into an exam record.
///
/// Every variant is raised before the record file is touched: a failed merge
/// never leaves a half-written record behind.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Exam record not found: {}", .0.display())]
    RecordNotFound(PathBuf),

    #[error("Failed to parse exam record {}: {message}", path.display())]
    RecordParse { path: PathBuf, message: String },

    #[error("Malformed question id '{question_id}' for student '{student}': expected an integer")]
    MalformedQuestionId { student: String, question_id: String },

    #[error("Answer file not found: {}", .0.display())]
    AnswerFileNotFound(PathBuf),

    #[error("Answer file {} is unreadable: {reason}", path.display())]
    AnswerFileUnreadable { path: PathBuf, reason: String },

    #[error("Invalid student list: {0}")]
    InvalidSubmissions(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MergeError {
    pub(crate) fn record_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MergeError::RecordParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }
}
