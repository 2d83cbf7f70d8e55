//! Configuration for the OpenGrader record tools.
//!
//! The file is optional: every field has a default, and command-line flags
//! override whatever the file sets.

use crate::identity::IdentityStrategy;
use crate::merger::{MergeOptions, RecordMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "opengrader.yml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    /// Folder holding generated grading files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Exam record file name, relative to `output_dir`.
    #[serde(default = "default_record_file")]
    pub record_file: PathBuf,

    /// How students are matched against existing entries.
    #[serde(default)]
    pub identity: IdentityStrategy,

    /// Refuse to create a record that does not exist yet.
    #[serde(default)]
    pub require_existing: bool,

    /// Base directory for relative answer file paths.
    #[serde(default)]
    pub answers_dir: Option<PathBuf>,

    /// Enable verbose output.
    #[serde(default)]
    pub verbose: bool,

    /// Suppress all warnings (for CI environments).
    #[serde(default, rename = "_suppress_warnings")]
    pub suppress_warnings: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("opengrader")
}

fn default_record_file() -> PathBuf {
    PathBuf::from("exam.yaml")
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            record_file: default_record_file(),
            identity: IdentityStrategy::default(),
            require_existing: false,
            answers_dir: None,
            verbose: false,
            suppress_warnings: false,
        }
    }
}

impl GraderConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        // An empty file is a valid, all-defaults configuration.
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        debug!(
            output_dir = %config.output_dir.display(),
            record_file = %config.record_file.display(),
            identity = config.identity.as_str(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Where the exam record lives: `<output_dir>/<record_file>`.
    ///
    /// An absolute `record_file` is used as-is.
    pub fn record_path(&self) -> PathBuf {
        self.output_dir.join(&self.record_file)
    }

    /// Merge options derived from this configuration.
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            mode: if self.require_existing {
                RecordMode::RequireExisting
            } else {
                RecordMode::CreateIfMissing
            },
            base_dir: self.answers_dir.clone(),
            identity: self.identity,
            dry_run: false,
        }
    }

    /// Validates the configuration and returns warnings.
    ///
    /// An empty `record_file` is an error; suspicious but usable values
    /// produce warnings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.record_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "record_file".to_string(),
                message: "must name a file".to_string(),
            });
        }

        let mut warnings = Vec::new();
        if self.suppress_warnings {
            return Ok(warnings);
        }

        if self.identity == IdentityStrategy::Separated {
            warnings.push(ConfigWarning::Compatibility {
                field: "identity".to_string(),
                message: "'separated' keys do not match records written with concatenated names"
                    .to_string(),
            });
        }

        if self.record_file.is_absolute() {
            warnings.push(ConfigWarning::InvalidValue {
                field: "record_file".to_string(),
                message: format!(
                    "absolute path overrides output_dir '{}'",
                    self.output_dir.display()
                ),
            });
        }

        if let Some(dir) = &self.answers_dir
            && !dir.is_dir()
        {
            warnings.push(ConfigWarning::InvalidValue {
                field: "answers_dir".to_string(),
                message: format!("'{}' is not a directory", dir.display()),
            });
        }

        Ok(warnings)
    }
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone)]
pub enum ConfigWarning {
    /// Setting changes how existing records are interpreted.
    Compatibility { field: String, message: String },
    /// Field has a questionable value.
    InvalidValue { field: String, message: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::Compatibility { field, message }
            | ConfigWarning::InvalidValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GraderConfig::default();
        assert_eq!(config.record_path(), PathBuf::from("opengrader/exam.yaml"));
        assert_eq!(config.identity, IdentityStrategy::Concatenated);
        assert!(!config.require_existing);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
output_dir: "grading"
record_file: "midterm.yaml"
identity: separated
require_existing: true
answers_dir: "submissions"
"#;
        let config: GraderConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.record_path(), PathBuf::from("grading/midterm.yaml"));

        let options = config.merge_options();
        assert_eq!(options.mode, RecordMode::RequireExisting);
        assert_eq!(options.identity, IdentityStrategy::Separated);
        assert_eq!(options.base_dir, Some(PathBuf::from("submissions")));
        assert!(!options.dry_run);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: GraderConfig = serde_yaml::from_str("verbose: true\n").unwrap();
        assert!(config.verbose);
        assert_eq!(config.output_dir, PathBuf::from("opengrader"));
        assert_eq!(config.record_file, PathBuf::from("exam.yaml"));
    }

    #[test]
    fn test_absolute_record_file_wins() {
        let config = GraderConfig {
            record_file: PathBuf::from("/srv/exam.yaml"),
            ..GraderConfig::default()
        };
        assert_eq!(config.record_path(), PathBuf::from("/srv/exam.yaml"));
        let warnings = config.validate().unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::InvalidValue { field, .. } if field == "record_file")));
    }

    #[test]
    fn test_validate_separated_identity() {
        let config = GraderConfig {
            identity: IdentityStrategy::Separated,
            ..GraderConfig::default()
        };
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().starts_with("Warning [identity]:"));
    }

    #[test]
    fn test_validate_empty_record_file() {
        let config = GraderConfig {
            record_file: PathBuf::new(),
            ..GraderConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "record_file"));
    }

    #[test]
    fn test_suppress_warnings() {
        let yaml = r#"
_suppress_warnings: true
identity: separated
answers_dir: /definitely/not/here
"#;
        let config: GraderConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_identity_is_rejected() {
        let result: Result<GraderConfig, _> = serde_yaml::from_str("identity: fuzzy\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let config = GraderConfig::load_or_default(&path).unwrap();
        assert_eq!(config.record_file, PathBuf::from("exam.yaml"));
        assert!(matches!(GraderConfig::from_file(&path), Err(ConfigError::Io(_))));

        std::fs::write(&path, "record_file: final.yaml\n").unwrap();
        let config = GraderConfig::load_or_default(&path).unwrap();
        assert_eq!(config.record_file, PathBuf::from("final.yaml"));

        std::fs::write(&path, "").unwrap();
        let config = GraderConfig::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("opengrader"));

        std::fs::write(&path, "identity: [").unwrap();
        assert!(matches!(GraderConfig::from_file(&path), Err(ConfigError::Yaml(_))));
    }
}
