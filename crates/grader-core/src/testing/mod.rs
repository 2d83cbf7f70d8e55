//! Testing utilities for deterministic merge tests.

use grader_proto::{Level, Reporter, StudentSubmission};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Reporter that keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: RefCell<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages received so far, in order.
    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    /// Messages at exactly `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// True when some message at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn emit(&self, level: Level, message: &str) {
        self.messages.borrow_mut().push((level, message.to_string()));
    }
}

/// Writes `answers` under `dir` as `<file>` and returns a submission
/// pointing at them by relative path.
///
/// # Panics
///
/// Panics when a file cannot be written; meant for tests only.
pub fn write_submission(
    dir: &Path,
    firstname: &str,
    lastname: &str,
    answers: &[(&str, &str, &str)],
) -> StudentSubmission {
    let mut student = StudentSubmission::new(firstname, lastname);
    for (question_id, file, content) in answers {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create answer directory");
        }
        std::fs::write(&path, content).expect("write answer file");
        student = student.with_answer(*question_id, PathBuf::from(file));
    }
    student
}

/// A hand-edited record with comments, grades and extra top-level fields.
pub const GRADED_RECORD: &str = "\
# Midterm exam, autumn term
title: Midterm   # shown on the report
questions:
  - id: 1
    text: What is 6 x 7?
  - id: 2
    text: Explain ownership.

student_response:
# graded on monday
- firstname: John
  lastname: Doe
  answers:
  - question_id: 1
    content: '42'
    points: 2.0
    correction_details:
      comment: correct   # full marks
  feedback: good work
- firstname: Jane
  lastname: Roe
  answers:
  - question_id: 1
    content: '41'
    points: 0.0
    correction_details: null

# rubric maintained by hand
rubric:
  q1: exact answer only
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_records_levels() {
        let reporter = MemoryReporter::new();
        reporter.info("Imported 2 students");
        reporter.warn("Duplicate entry for JohnDoe");

        assert_eq!(reporter.messages().len(), 2);
        assert!(reporter.contains(Level::Warn, "Duplicate"));
        assert!(!reporter.contains(Level::Info, "Duplicate"));
        assert_eq!(reporter.at(Level::Info), vec!["Imported 2 students".to_string()]);
    }

    #[test]
    fn test_write_submission() {
        let dir = tempfile::TempDir::new().unwrap();
        let student = write_submission(dir.path(), "John", "Doe", &[("1", "john/q1.txt", "42")]);
        assert_eq!(student.submissions["1"], PathBuf::from("john/q1.txt"));
        assert_eq!(std::fs::read_to_string(dir.path().join("john/q1.txt")).unwrap(), "42");
    }

    #[test]
    fn test_graded_record_parses() {
        let record = crate::ExamRecord::parse("exam.yaml", GRADED_RECORD).unwrap();
        assert_eq!(record.student_response().len(), 2);
    }
}
