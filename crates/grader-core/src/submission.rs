//! Loading student submissions into record entries.

use crate::error::MergeError;
use crate::record::{AnswerEntry, StudentEntry};
use grader_proto::StudentSubmission;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parses the JSON student list handed over by the import skill.
pub fn parse_batch(json: &str) -> Result<Vec<StudentSubmission>, MergeError> {
    Ok(serde_json::from_str(json)?)
}

/// Reads every answer file of `student` and builds its record entry.
///
/// Relative answer paths are resolved against `base_dir` when one is given.
/// Fails on the first malformed question id or unreadable file.
pub fn load_student(
    student: &StudentSubmission,
    base_dir: Option<&Path>,
) -> Result<StudentEntry, MergeError> {
    let mut answers = Vec::with_capacity(student.submissions.len());

    for (raw_id, file) in &student.submissions {
        let question_id = parse_question_id(raw_id).ok_or_else(|| MergeError::MalformedQuestionId {
            student: student.display_name(),
            question_id: raw_id.clone(),
        })?;
        let path = resolve(file, base_dir);
        let content = read_answer(&path)?;
        debug!(
            student = %student.display_name(),
            question_id,
            path = %path.display(),
            bytes = content.len(),
            "Loaded answer"
        );
        answers.push(AnswerEntry::ungraded(question_id, content));
    }

    Ok(StudentEntry {
        firstname: student.firstname.clone(),
        lastname: student.lastname.clone(),
        answers,
    })
}

/// Parses a question identifier; surrounding whitespace and a `+` sign are accepted.
pub fn parse_question_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn resolve(file: &Path, base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(base) if file.is_relative() => base.join(file),
        _ => file.to_path_buf(),
    }
}

/// Reads an answer file as UTF-8 text.
///
/// `\r\n` and lone `\r` line breaks become `\n` so multi-line answers can be
/// stored as literal blocks; all other bytes are kept as-is.
pub fn read_answer(path: &Path) -> Result<String, MergeError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(MergeError::AnswerFileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(MergeError::AnswerFileUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };
    let text = String::from_utf8(bytes).map_err(|e| MergeError::AnswerFileUnreadable {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8 ({e})"),
    })?;
    Ok(normalize_line_breaks(text))
}

fn normalize_line_breaks(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text
    }
}
