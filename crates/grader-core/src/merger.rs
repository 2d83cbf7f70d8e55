//! Upserting student submissions into an exam record.
//!
//! A merge runs in three phases: everything is read and validated first
//! (record, then every answer file), the new document is rendered in memory,
//! and only then is the record written, atomically and exactly once. Any
//! error before the write leaves the file untouched.

use crate::error::MergeError;
use crate::identity::{IdentityPolicy, IdentityStrategy};
use crate::record::{ExamRecord, ExistingEntry, STUDENT_RESPONSE_KEY, StudentEntry};
use crate::reporter::TracingReporter;
use crate::splice;
use crate::submission::load_student;
use grader_proto::{Reporter, StudentSubmission, display_name};
use serde_yaml::Value;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What to do when the record file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordMode {
    /// Start from an empty document.
    #[default]
    CreateIfMissing,
    /// Fail with `RecordNotFound`.
    RequireExisting,
}

/// Options controlling a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub mode: RecordMode,
    /// Directory relative answer paths are resolved against.
    pub base_dir: Option<PathBuf>,
    pub identity: IdentityStrategy,
    /// Render the result without writing it.
    pub dry_run: bool,
}

/// How the new document text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Original text edited in place; comments and layout kept.
    Spliced,
    /// Whole document re-serialized; comments lost.
    Reserialized,
}

/// Outcome of a successful merge.
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub record_path: PathBuf,
    /// The record did not exist before this merge.
    pub created: bool,
    /// Display names of students appended to the record.
    pub inserted: Vec<String>,
    /// Display names of students whose entry was replaced.
    pub updated: Vec<String>,
    /// Duplicate entries removed from the record.
    pub removed_duplicates: usize,
    pub answers_imported: usize,
    pub strategy: WriteStrategy,
    /// False for dry runs.
    pub written: bool,
    /// The full record text after the merge.
    pub document: String,
}

/// Fate of one entry already in the record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fate {
    Keep,
    Replace(StudentEntry),
    Drop,
}

/// Per-entry decisions for one merge.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergePlan {
    /// One fate per existing entry, in file order.
    pub(crate) fates: Vec<Fate>,
    /// New entries, in batch order.
    pub(crate) appended: Vec<StudentEntry>,
}

impl MergePlan {
    /// The `student_response` values the merged record must contain.
    fn final_values(&self, existing: &[ExistingEntry]) -> Result<Vec<Value>, MergeError> {
        let mut values = Vec::with_capacity(existing.len() + self.appended.len());
        for (fate, entry) in self.fates.iter().zip(existing) {
            match fate {
                Fate::Keep => values.push(entry.value.clone()),
                Fate::Replace(student) => values.push(student.to_value()?),
                Fate::Drop => {}
            }
        }
        for student in &self.appended {
            values.push(student.to_value()?);
        }
        Ok(values)
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Existing(usize),
    Appended(usize),
}

struct Planned {
    plan: MergePlan,
    inserted: Vec<String>,
    updated: Vec<String>,
    removed_duplicates: usize,
}

/// Merges batches of student submissions into exam records.
pub struct RecordMerger<R = TracingReporter> {
    options: MergeOptions,
    identity: Box<dyn IdentityPolicy>,
    reporter: R,
}

impl RecordMerger<TracingReporter> {
    pub fn new(options: MergeOptions) -> Self {
        let identity = options.identity.policy();
        Self {
            options,
            identity,
            reporter: TracingReporter,
        }
    }
}

impl<R: Reporter> RecordMerger<R> {
    /// Replaces the reporter receiving user-facing messages.
    pub fn with_reporter<T: Reporter>(self, reporter: T) -> RecordMerger<T> {
        RecordMerger {
            options: self.options,
            identity: self.identity,
            reporter,
        }
    }

    /// Uses a custom identity policy instead of the configured strategy.
    #[must_use]
    pub fn with_identity(mut self, identity: Box<dyn IdentityPolicy>) -> Self {
        self.identity = identity;
        self
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Upserts `students` into the record at `record_path`.
    ///
    /// Students are matched by identity key; a matched entry has its answers
    /// replaced wholesale, an unmatched one is appended. Everything else in
    /// the record is preserved.
    pub fn merge(
        &self,
        record_path: impl AsRef<Path>,
        students: &[StudentSubmission],
    ) -> Result<MergeSummary, MergeError> {
        let path = record_path.as_ref();

        let (record, created) = match ExamRecord::load(path) {
            Ok(record) => (record, false),
            Err(MergeError::RecordNotFound(_)) if self.options.mode == RecordMode::CreateIfMissing => {
                debug!(path = %path.display(), "Record does not exist, starting empty");
                (ExamRecord::empty(path), true)
            }
            Err(e) => return Err(e),
        };

        let base_dir = self.options.base_dir.as_deref();
        let entries = students
            .iter()
            .map(|student| load_student(student, base_dir))
            .collect::<Result<Vec<_>, _>>()?;
        let answers_imported = entries.iter().map(|e| e.answers.len()).sum();

        let planned = self.plan(&record, entries);
        let (document, strategy) = self.render(&record, &planned.plan)?;

        if self.options.dry_run {
            debug!(path = %path.display(), "Dry run, record not written");
        } else {
            write_atomically(path, &document)?;
        }

        self.reporter.info(&format!(
            "{} {}: {} inserted, {} updated, {} answers",
            if self.options.dry_run { "Would merge into" } else { "Merged into" },
            path.display(),
            planned.inserted.len(),
            planned.updated.len(),
            answers_imported,
        ));

        Ok(MergeSummary {
            record_path: path.to_path_buf(),
            created,
            inserted: planned.inserted,
            updated: planned.updated,
            removed_duplicates: planned.removed_duplicates,
            answers_imported,
            strategy,
            written: !self.options.dry_run,
            document,
        })
    }

    fn plan(&self, record: &ExamRecord, incoming: Vec<StudentEntry>) -> Planned {
        let existing = record.student_response();
        let mut fates = vec![Fate::Keep; existing.len()];
        let mut appended: Vec<StudentEntry> = Vec::new();
        let mut index: HashMap<String, Slot> = HashMap::with_capacity(existing.len() + incoming.len());
        let mut duplicates: Vec<(String, usize)> = Vec::new();

        for (i, entry) in existing.iter().enumerate() {
            let key = self.identity.key(&entry.firstname, &entry.lastname);
            if index.contains_key(&key) {
                duplicates.push((key, i));
            } else {
                index.insert(key, Slot::Existing(i));
            }
        }

        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        let mut touched = HashSet::new();

        for entry in incoming {
            let key = self.identity.key(&entry.firstname, &entry.lastname);
            let name = display_name(&entry.firstname, &entry.lastname);
            match index.get(&key).copied() {
                Some(Slot::Existing(i)) => {
                    if fates[i] == Fate::Keep {
                        updated.push(name);
                    } else {
                        debug!(student = %name, "Student repeated in batch, last one wins");
                    }
                    fates[i] = Fate::Replace(entry);
                }
                Some(Slot::Appended(j)) => {
                    debug!(student = %name, "Student repeated in batch, last one wins");
                    appended[j] = entry;
                }
                None => {
                    index.insert(key.clone(), Slot::Appended(appended.len()));
                    inserted.push(name);
                    appended.push(entry);
                }
            }
            touched.insert(key);
        }

        let mut removed_duplicates = 0;
        for (key, i) in duplicates {
            let name = display_name(&existing[i].firstname, &existing[i].lastname);
            if touched.contains(&key) {
                fates[i] = Fate::Drop;
                removed_duplicates += 1;
                self.reporter.warn(&format!(
                    "Removed duplicate entry for '{name}' ({STUDENT_RESPONSE_KEY}[{i}])"
                ));
            } else {
                self.reporter.warn(&format!(
                    "Record holds a duplicate entry for '{name}' ({STUDENT_RESPONSE_KEY}[{i}]); left as is"
                ));
            }
        }

        debug!(
            existing = existing.len(),
            inserted = inserted.len(),
            updated = updated.len(),
            removed_duplicates,
            "Merge planned"
        );

        Planned {
            plan: MergePlan { fates, appended },
            inserted,
            updated,
            removed_duplicates,
        }
    }

    fn render(
        &self,
        record: &ExamRecord,
        plan: &MergePlan,
    ) -> Result<(String, WriteStrategy), MergeError> {
        let existing = record.student_response();
        let expected = Value::Mapping(record.with_responses(plan.final_values(existing)?));
        let has_key = record.root().contains_key(STUDENT_RESPONSE_KEY);

        if let Some(text) = splice::splice(record.source(), existing, has_key, plan)? {
            match serde_yaml::from_str::<Value>(&text) {
                Ok(reparsed) if reparsed == expected => return Ok((text, WriteStrategy::Spliced)),
                Ok(_) => debug!("Spliced record does not match the expected document"),
                Err(e) => debug!(error = %e, "Spliced record does not parse"),
            }
        } else {
            debug!("Record layout not supported for in-place edits");
        }

        self.reporter.warn(&format!(
            "Could not edit {} in place; rewriting the whole file (comments are not kept)",
            record.path().display()
        ));
        let text = serde_yaml::to_string(&expected)?;
        Ok((text, WriteStrategy::Reserialized))
    }
}

/// Merges `students` into `record_path` with default options.
pub fn merge_submissions(
    record_path: impl AsRef<Path>,
    students: &[StudentSubmission],
) -> Result<MergeSummary, MergeError> {
    RecordMerger::new(MergeOptions::default()).merge(record_path, students)
}

/// Writes `contents` through a temporary file in the target directory.
///
/// A symlinked record is written through its link. An existing file keeps
/// its permissions; a new one gets the usual mode for created files.
fn write_atomically(path: &Path, contents: &str) -> Result<(), MergeError> {
    let target = follow_links(path)?;
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|e| MergeError::io(parent, e))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".exam").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Subject to the umask, like any file the user creates.
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(parent).map_err(|e| MergeError::io(parent, e))?;
    if let Ok(metadata) = fs::metadata(&target) {
        tmp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| MergeError::io(tmp.path(), e))?;
    }
    tmp.write_all(contents.as_bytes())
        .map_err(|e| MergeError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| MergeError::io(tmp.path(), e))?;
    tmp.persist(&target).map_err(|e| MergeError::io(&target, e.error))?;

    debug!(path = %path.display(), target = %target.display(), bytes = contents.len(), "Record written");
    Ok(())
}

/// Resolves `path` through any chain of symlinks, dangling ones included.
fn follow_links(path: &Path) -> Result<PathBuf, MergeError> {
    const MAX_LINKS: usize = 40;

    let mut target = path.to_path_buf();
    for _ in 0..MAX_LINKS {
        match fs::symlink_metadata(&target) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                let link = fs::read_link(&target).map_err(|e| MergeError::io(&target, e))?;
                target = match target.parent() {
                    Some(dir) => dir.join(link),
                    None => link,
                };
            }
            _ => return Ok(target),
        }
    }
    Err(MergeError::io(
        path,
        std::io::Error::other("too many levels of symbolic links"),
    ))
}
