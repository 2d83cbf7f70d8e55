//! Exam record model.
//!
//! An exam record is a YAML document whose root is a mapping. The merger only
//! understands the `student_response` key; every other top-level field
//! (questions, rubric, metadata) is opaque and carried through untouched.

use crate::error::MergeError;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level key holding the imported student answers.
pub const STUDENT_RESPONSE_KEY: &str = "student_response";

/// One question's submitted content plus its (initially empty) grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: i64,
    pub content: String,
    pub points: Option<f64>,
    pub correction_details: Option<Value>,
}

impl AnswerEntry {
    /// Creates an answer awaiting grading.
    pub fn ungraded(question_id: i64, content: impl Into<String>) -> Self {
        Self {
            question_id,
            content: content.into(),
            points: None,
            correction_details: None,
        }
    }
}

/// One student's identity and answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEntry {
    pub firstname: String,
    pub lastname: String,
    pub answers: Vec<AnswerEntry>,
}

impl StudentEntry {
    pub(crate) fn to_value(&self) -> Result<Value, MergeError> {
        Ok(serde_yaml::to_value(self)?)
    }
}

/// An entry already present in a record, kept as parsed.
///
/// Entries may carry fields written downstream (grades, feedback); only the
/// names are interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingEntry {
    pub firstname: String,
    pub lastname: String,
    pub value: Value,
}

/// Per-student overview used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentSummary {
    pub firstname: String,
    pub lastname: String,
    /// Number of answers in the entry.
    pub answers: usize,
    /// Answers whose `points` field is set.
    pub graded: usize,
}

/// A parsed exam record together with its source text.
#[derive(Debug, Clone)]
pub struct ExamRecord {
    path: PathBuf,
    source: String,
    root: Mapping,
    responses: Vec<ExistingEntry>,
}

impl ExamRecord {
    /// An empty record for a file that does not exist yet.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: String::new(),
            root: Mapping::new(),
            responses: Vec::new(),
        }
    }

    /// Loads a record from disk.
    ///
    /// Returns `RecordNotFound` when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MergeError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading exam record");
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MergeError::RecordNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(MergeError::io(path, e)),
        };
        let source = String::from_utf8(bytes)
            .map_err(|_| MergeError::record_parse(path, "file is not valid UTF-8"))?;
        Self::parse(path, source)
    }

    /// Parses record text. `path` is only used in error messages.
    pub fn parse(path: impl Into<PathBuf>, source: impl Into<String>) -> Result<Self, MergeError> {
        let path = path.into();
        let source = source.into();

        let document: Value = serde_yaml::from_str(&source)
            .map_err(|e| MergeError::record_parse(&path, e.to_string()))?;

        let root = match document {
            Value::Null => Mapping::new(),
            Value::Mapping(map) => map,
            other => {
                return Err(MergeError::record_parse(
                    &path,
                    format!("top level must be a mapping, found {}", kind(&other)),
                ));
            }
        };

        let responses = match root.get(STUDENT_RESPONSE_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| existing_entry(&path, i, item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(MergeError::record_parse(
                    &path,
                    format!("'{STUDENT_RESPONSE_KEY}' must be a sequence, found {}", kind(other)),
                ));
            }
        };

        debug!(
            path = %path.display(),
            top_level_keys = root.len(),
            students = responses.len(),
            "Exam record parsed"
        );

        Ok(Self {
            path,
            source,
            root,
            responses,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The text the record was parsed from (empty for new records).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed root mapping.
    pub fn root(&self) -> &Mapping {
        &self.root
    }

    /// Entries of `student_response`, in file order.
    pub fn student_response(&self) -> &[ExistingEntry] {
        &self.responses
    }

    /// Summaries of every student in the record.
    pub fn students(&self) -> Vec<StudentSummary> {
        self.responses
            .iter()
            .map(|entry| {
                let answers = entry
                    .value
                    .get("answers")
                    .and_then(Value::as_sequence)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let graded = answers
                    .iter()
                    .filter(|a| a.get("points").is_some_and(|p| !p.is_null()))
                    .count();
                StudentSummary {
                    firstname: entry.firstname.clone(),
                    lastname: entry.lastname.clone(),
                    answers: answers.len(),
                    graded,
                }
            })
            .collect()
    }

    /// The root mapping with `student_response` set to `responses`.
    ///
    /// An existing key keeps its position; a missing one is appended.
    pub(crate) fn with_responses(&self, responses: Vec<Value>) -> Mapping {
        let mut root = self.root.clone();
        root.insert(
            Value::String(STUDENT_RESPONSE_KEY.to_string()),
            Value::Sequence(responses),
        );
        root
    }
}

fn existing_entry(path: &Path, index: usize, item: &Value) -> Result<ExistingEntry, MergeError> {
    if !item.is_mapping() {
        return Err(MergeError::record_parse(
            path,
            format!("{STUDENT_RESPONSE_KEY}[{index}] must be a mapping, found {}", kind(item)),
        ));
    }
    Ok(ExistingEntry {
        firstname: name_field(path, index, item, "firstname")?,
        lastname: name_field(path, index, item, "lastname")?,
        value: item.clone(),
    })
}

fn name_field(path: &Path, index: usize, item: &Value, field: &str) -> Result<String, MergeError> {
    match item.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(MergeError::record_parse(
            path,
            format!(
                "{STUDENT_RESPONSE_KEY}[{index}].{field} must be a string, found {}",
                kind(other)
            ),
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_text() {
        let record = ExamRecord::parse("exam.yaml", "").unwrap();
        assert!(record.root().is_empty());
        assert!(record.student_response().is_empty());
    }

    #[test]
    fn test_parse_comment_only_text() {
        let record = ExamRecord::parse("exam.yaml", "# nothing here yet\n").unwrap();
        assert!(record.student_response().is_empty());
    }

    #[test]
    fn test_parse_null_student_response() {
        let record = ExamRecord::parse("exam.yaml", "title: Midterm\nstudent_response:\n").unwrap();
        assert!(record.student_response().is_empty());
        assert_eq!(record.root().len(), 2);
    }

    #[test]
    fn test_parse_entries_and_missing_names() {
        let yaml = r#"
student_response:
- firstname: John
  lastname: Doe
  answers: []
- lastname: Solo
  answers: []
"#;
        let record = ExamRecord::parse("exam.yaml", yaml).unwrap();
        let entries = record.student_response();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].firstname, "John");
        assert_eq!(entries[1].firstname, "");
        assert_eq!(entries[1].lastname, "Solo");
    }

    #[test]
    fn test_parse_rejects_non_mapping_root() {
        let err = ExamRecord::parse("exam.yaml", "- a\n- b\n").unwrap_err();
        assert!(matches!(err, MergeError::RecordParse { .. }));
        assert!(err.to_string().contains("top level must be a mapping"));
    }

    #[test]
    fn test_parse_rejects_invalid_yaml() {
        let err = ExamRecord::parse("exam.yaml", "rubric: [unclosed\n").unwrap_err();
        assert!(matches!(err, MergeError::RecordParse { .. }));
    }

    #[test]
    fn test_parse_rejects_scalar_student_response() {
        let err = ExamRecord::parse("exam.yaml", "student_response: 3\n").unwrap_err();
        assert!(err.to_string().contains("must be a sequence"));
    }

    #[test]
    fn test_parse_rejects_numeric_name() {
        let yaml = "student_response:\n- firstname: 42\n  lastname: Doe\n";
        let err = ExamRecord::parse("exam.yaml", yaml).unwrap_err();
        assert!(err.to_string().contains("student_response[0].firstname must be a string"));
    }

    #[test]
    fn test_students_counts_graded_answers() {
        let yaml = r#"
student_response:
- firstname: John
  lastname: Doe
  answers:
  - question_id: 1
    content: '42'
    points: 2.5
    correction_details: null
  - question_id: 2
    content: x
    points: null
    correction_details: null
"#;
        let record = ExamRecord::parse("exam.yaml", yaml).unwrap();
        let students = record.students();
        assert_eq!(
            students,
            vec![StudentSummary {
                firstname: "John".to_string(),
                lastname: "Doe".to_string(),
                answers: 2,
                graded: 1,
            }]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ExamRecord::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, MergeError::RecordNotFound(_)));
    }

    #[test]
    fn test_with_responses_appends_missing_key_last() {
        let record = ExamRecord::parse("exam.yaml", "title: Quiz\nrubric: {}\n").unwrap();
        let root = record.with_responses(vec![]);
        let keys: Vec<&str> = root.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["title", "rubric", "student_response"]);
    }

    #[test]
    fn test_student_entry_value_uses_nulls() {
        let entry = StudentEntry {
            firstname: "John".to_string(),
            lastname: "Doe".to_string(),
            answers: vec![AnswerEntry::ungraded(1, "42")],
        };
        let value = entry.to_value().unwrap();
        let answer = &value["answers"][0];
        assert_eq!(answer["question_id"].as_i64(), Some(1));
        assert_eq!(answer["content"].as_str(), Some("42"));
        assert!(answer["points"].is_null());
        assert!(answer["correction_details"].is_null());
    }
}
