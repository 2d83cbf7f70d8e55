//! Submission descriptors passed to the import skill.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// One student's batch of answer files.
///
/// JSON shape:
///
/// ```json
/// {"firstname": "John", "lastname": "Doe", "submissions": {"1": "john/q1.txt"}}
/// ```
///
/// Missing or null names become empty strings. `submissions` keeps the order
/// in which question ids appear in the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSubmission {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub firstname: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub lastname: String,

    /// Question id (integer in string form) to answer file path.
    #[serde(default)]
    pub submissions: IndexMap<String, PathBuf>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl StudentSubmission {
    /// Creates a descriptor with no submissions.
    pub fn new(firstname: impl Into<String>, lastname: impl Into<String>) -> Self {
        Self {
            firstname: firstname.into(),
            lastname: lastname.into(),
            submissions: IndexMap::new(),
        }
    }

    /// Adds an answer file for a question id, keeping insertion order.
    pub fn with_answer(mut self, question_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.submissions.insert(question_id.into(), path.into());
        self
    }

    /// Human-readable name for messages ("John Doe").
    pub fn display_name(&self) -> String {
        display_name(&self.firstname, &self.lastname)
    }
}

/// Formats a student's names for messages, skipping empty parts.
pub fn display_name(firstname: &str, lastname: &str) -> String {
    match (firstname.is_empty(), lastname.is_empty()) {
        (false, false) => format!("{firstname} {lastname}"),
        (false, true) => firstname.to_string(),
        (true, false) => lastname.to_string(),
        (true, true) => "<unnamed>".to_string(),
    }
}
