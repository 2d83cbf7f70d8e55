//! In-place edits of the `student_response` block.
//!
//! `serde_yaml` drops comments when a document is written back, so the merge
//! edits the original text instead: only the bytes of `student_response`
//! items that change are rewritten, everything else is copied verbatim.
//!
//! The scanner understands the layout hand-edited and generated records
//! actually use: a block mapping at the root, keys at column 0, and a block
//! sequence under `student_response`. Anything else yields `None` and the
//! caller falls back to a full rewrite. The caller also re-parses the result,
//! so a scan that misjudges an exotic layout can never corrupt a record.

use crate::error::MergeError;
use crate::merger::{Fate, MergePlan};
use crate::record::{ExistingEntry, STUDENT_RESPONSE_KEY};
use crate::render;

/// Rewrites `source` so that `student_response` reflects `plan`.
///
/// `existing` are the entries parsed from `source`, in file order, and
/// `has_key` tells whether the parsed root contains `student_response`.
pub(crate) fn splice(
    source: &str,
    existing: &[ExistingEntry],
    has_key: bool,
    plan: &MergePlan,
) -> Result<Option<String>, MergeError> {
    let lines = split_lines(source);
    if !block_mapping_root(source, &lines) {
        return Ok(None);
    }
    let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };

    let Some(block) = find_block(source, &lines) else {
        if has_key {
            return Ok(None);
        }
        return Ok(Some(append_block(source, &lines, existing, plan, newline)?));
    };

    let (start, end, replacement) = match block.items(source, &lines) {
        Some(items) if items.iter().filter(|s| matches!(s, Segment::Item(_))).count() == existing.len() => {
            let text = rewrite_items(source, &items, block.indent, existing, plan)?;
            (block.body_start(&lines), block.body_end(&lines), text)
        }
        _ => {
            let mut text = String::from("\n");
            text.push_str(&render_sequence(existing, plan, block.indent)?);
            if text == "\n" {
                text = " []\n".to_string();
            }
            (block.value_start, block.value_end(&lines), text)
        }
    };

    let mut out = String::with_capacity(source.len() + replacement.len());
    out.push_str(&source[..start]);
    out.push_str(&convert_newlines(&replacement, newline));
    out.push_str(&source[end..]);
    Ok(Some(out))
}

#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    /// Byte offset after the line terminator.
    end: usize,
}

impl Line {
    /// Line text without its terminator.
    fn text<'a>(&self, source: &'a str) -> &'a str {
        source[self.start..self.end].trim_end_matches(['\n', '\r'])
    }
}

fn split_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for chunk in source.split_inclusive('\n') {
        lines.push(Line {
            start,
            end: start + chunk.len(),
        });
        start += chunk.len();
    }
    lines
}

/// How a line reads at the root level of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Blank,
    Comment,
    Indented,
    SeqItem,
    DocStart,
    DocEnd,
    Directive,
    Key,
}

fn classify(text: &str) -> Kind {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        Kind::Blank
    } else if trimmed.starts_with('#') {
        Kind::Comment
    } else if text.starts_with([' ', '\t']) {
        Kind::Indented
    } else if marker(text, "---") {
        Kind::DocStart
    } else if marker(text, "...") {
        Kind::DocEnd
    } else if text.starts_with('%') {
        Kind::Directive
    } else if seq_item(text) {
        Kind::SeqItem
    } else {
        Kind::Key
    }
}

fn marker(text: &str, marker: &str) -> bool {
    text.strip_prefix(marker)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
}

fn seq_item(text: &str) -> bool {
    text.strip_prefix('-')
        .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '\t']))
}

fn indentation(text: &str) -> usize {
    text.len() - text.trim_start_matches(' ').len()
}

/// True when the root is an (implicit) block mapping or empty.
fn block_mapping_root(source: &str, lines: &[Line]) -> bool {
    for line in lines {
        let text = line.text(source);
        match classify(text) {
            Kind::Blank | Kind::Comment | Kind::Directive => {}
            Kind::DocStart => {
                let rest = text[3..].trim();
                if !(rest.is_empty() || rest.starts_with('#')) {
                    return false;
                }
            }
            Kind::DocEnd => return true,
            Kind::Key => return !text.starts_with(['{', '[', '!', '&', '*', '?', '|', '>']),
            Kind::Indented | Kind::SeqItem => return false,
        }
    }
    true
}

/// Byte offset right after the colon when `text` is the `student_response` key line.
fn key_value_offset(text: &str) -> Option<usize> {
    let quoted_double = format!("\"{STUDENT_RESPONSE_KEY}\"");
    let quoted_single = format!("'{STUDENT_RESPONSE_KEY}'");
    let rest = text
        .strip_prefix(STUDENT_RESPONSE_KEY)
        .or_else(|| text.strip_prefix(quoted_double.as_str()))
        .or_else(|| text.strip_prefix(quoted_single.as_str()))?;
    let after_colon = rest.trim_start_matches([' ', '\t']).strip_prefix(':')?;
    if after_colon.is_empty() || after_colon.starts_with([' ', '\t']) {
        Some(text.len() - after_colon.len())
    } else {
        None
    }
}

/// The `student_response` key and the lines holding its value.
#[derive(Debug)]
struct Block {
    /// Index of the key line.
    key: usize,
    /// Byte offset right after the key's colon.
    value_start: usize,
    /// True when the value starts on the key line (`[]`, `null`, flow, anchor...).
    inline: bool,
    /// Body lines `key + 1 .. body_end_line`, trailing blanks and comments excluded.
    body_end_line: usize,
    /// Column of the sequence items (0 for compact `- ` under the key).
    indent: usize,
}

fn find_block(source: &str, lines: &[Line]) -> Option<Block> {
    let mut key = None;
    for (i, line) in lines.iter().enumerate() {
        let text = line.text(source);
        match classify(text) {
            Kind::DocEnd => break,
            Kind::Key => {
                if let Some(offset) = key_value_offset(text) {
                    key = Some((i, offset));
                    break;
                }
            }
            _ => {}
        }
    }
    let (key, offset) = key?;

    let key_text = lines[key].text(source);
    let remainder = key_text[offset..].trim();
    let inline = !(remainder.is_empty() || remainder.starts_with('#'));

    let mut end = lines.len();
    for (i, line) in lines.iter().enumerate().skip(key + 1) {
        match classify(line.text(source)) {
            Kind::Key | Kind::DocStart | Kind::DocEnd | Kind::Directive => {
                end = i;
                break;
            }
            _ => {}
        }
    }

    let indent = lines[key + 1..end]
        .iter()
        .map(|l| l.text(source))
        .find(|t| !matches!(classify(t), Kind::Blank | Kind::Comment))
        .map_or(0, indentation);

    // Trailing blank lines and shallow comments belong to whatever follows.
    while end > key + 1 {
        let text = lines[end - 1].text(source);
        let trailing = match classify(text) {
            Kind::Blank => true,
            Kind::Comment => indentation(text) <= indent,
            _ => false,
        };
        if !trailing {
            break;
        }
        end -= 1;
    }

    Some(Block {
        key,
        value_start: lines[key].start + offset,
        inline,
        body_end_line: end,
        indent,
    })
}

/// A run of body text: comments/blank lines between items, or one item.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Gap(std::ops::Range<usize>),
    Item(std::ops::Range<usize>),
}

impl Block {
    fn has_body(&self) -> bool {
        self.body_end_line > self.key + 1
    }

    fn body_start(&self, lines: &[Line]) -> usize {
        lines[self.key].end
    }

    fn body_end(&self, lines: &[Line]) -> usize {
        if self.has_body() {
            lines[self.body_end_line - 1].end
        } else {
            lines[self.key].end
        }
    }

    /// End of the region replaced when the whole value is re-rendered.
    fn value_end(&self, lines: &[Line]) -> usize {
        self.body_end(lines)
    }

    /// Splits the body into items. `None` when the body is not a plain
    /// block sequence at a single indentation.
    fn items(&self, source: &str, lines: &[Line]) -> Option<Vec<Segment>> {
        if self.inline {
            return None;
        }
        let mut segments = Vec::new();
        let mut gap_start = self.body_start(lines);
        let mut current: Option<(usize, usize)> = None;

        for line in &lines[self.key + 1..self.body_end_line] {
            let text = line.text(source);
            let column = indentation(text);
            match classify(text) {
                Kind::Blank => continue,
                // Deeper `#` lines may be block scalar text; they stay with the open item.
                Kind::Comment => {
                    if column > self.indent {
                        if let Some((_, end)) = current.as_mut() {
                            *end = line.end;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            if column == self.indent && seq_item(&text[column..]) {
                if let Some((start, end)) = current.take() {
                    segments.push(Segment::Item(start..end));
                    gap_start = end;
                }
                if gap_start < line.start {
                    segments.push(Segment::Gap(gap_start..line.start));
                }
                current = Some((line.start, line.end));
            } else if column > self.indent && !text.starts_with('\t') {
                let (_, end) = current.as_mut()?;
                *end = line.end;
            } else {
                return None;
            }
        }

        let (start, end) = current?;
        segments.push(Segment::Item(start..end));
        if end < self.body_end(lines) {
            segments.push(Segment::Gap(end..self.body_end(lines)));
        }
        Some(segments)
    }
}

fn rewrite_items(
    source: &str,
    segments: &[Segment],
    indent: usize,
    existing: &[ExistingEntry],
    plan: &MergePlan,
) -> Result<String, MergeError> {
    let mut out = String::new();
    let mut fates = plan.fates.iter();

    for segment in segments {
        match segment {
            Segment::Gap(range) => out.push_str(&source[range.clone()]),
            Segment::Item(range) => match fates.next() {
                Some(Fate::Keep) | None => out.push_str(&source[range.clone()]),
                Some(Fate::Replace(entry)) => {
                    ensure_line_break(&mut out);
                    out.push_str(&render::student_entry(entry, indent)?);
                }
                Some(Fate::Drop) => {}
            },
        }
    }
    for entry in &plan.appended {
        ensure_line_break(&mut out);
        out.push_str(&render::student_entry(entry, indent)?);
    }
    debug_assert_eq!(existing.len(), plan.fates.len());
    Ok(out)
}

/// Renders the whole sequence, existing entries included, at `indent`.
fn render_sequence(
    existing: &[ExistingEntry],
    plan: &MergePlan,
    indent: usize,
) -> Result<String, MergeError> {
    let mut out = String::new();
    for (entry, fate) in existing.iter().zip(&plan.fates) {
        match fate {
            Fate::Keep => out.push_str(&render::value_item(&entry.value, indent)?),
            Fate::Replace(student) => out.push_str(&render::student_entry(student, indent)?),
            Fate::Drop => {}
        }
    }
    for student in &plan.appended {
        out.push_str(&render::student_entry(student, indent)?);
    }
    Ok(out)
}

fn append_block(
    source: &str,
    lines: &[Line],
    existing: &[ExistingEntry],
    plan: &MergePlan,
    newline: &str,
) -> Result<String, MergeError> {
    let insert_at = lines
        .iter()
        .find(|l| classify(l.text(source)) == Kind::DocEnd)
        .map_or(source.len(), |l| l.start);

    let items = render_sequence(existing, plan, 0)?;
    let mut block = format!("{STUDENT_RESPONSE_KEY}:");
    if items.is_empty() {
        block.push_str(" []\n");
    } else {
        block.push('\n');
        block.push_str(&items);
    }

    let mut out = String::with_capacity(source.len() + block.len() + 1);
    out.push_str(&source[..insert_at]);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push_str(newline);
    }
    out.push_str(&convert_newlines(&block, newline));
    out.push_str(&source[insert_at..]);
    Ok(out)
}

fn ensure_line_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Turns bare `\n` into `newline`; existing `\r\n` pairs are left alone.
fn convert_newlines(text: &str, newline: &str) -> String {
    if newline == "\n" {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut previous = '\0';
    for c in text.chars() {
        if c == '\n' && previous != '\r' {
            out.push('\r');
        }
        out.push(c);
        previous = c;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AnswerEntry, ExamRecord, StudentEntry};

    fn entry(first: &str, last: &str, content: &str) -> StudentEntry {
        StudentEntry {
            firstname: first.to_string(),
            lastname: last.to_string(),
            answers: vec![AnswerEntry::ungraded(1, content)],
        }
    }

    fn run(source: &str, fates: Vec<Fate>, appended: Vec<StudentEntry>) -> Option<String> {
        let record = ExamRecord::parse("exam.yaml", source).unwrap();
        let plan = MergePlan { fates, appended };
        splice(
            source,
            record.student_response(),
            record.root().contains_key(STUDENT_RESPONSE_KEY),
            &plan,
        )
        .unwrap()
    }

    const GRADED: &str = "\
title: Midterm # keep me
student_response:
# first student
- firstname: Ann
  lastname: Lee
  answers: []
  feedback: great   # graded by hand
# second student
- firstname: Bob
  lastname: Ray
  answers: []

# Rubric below
rubric:
  q1: 2 points
";

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), Kind::Blank);
        assert_eq!(classify("   "), Kind::Blank);
        assert_eq!(classify("# c"), Kind::Comment);
        assert_eq!(classify("  # c"), Kind::Comment);
        assert_eq!(classify("  a: b"), Kind::Indented);
        assert_eq!(classify("---"), Kind::DocStart);
        assert_eq!(classify("--- # doc"), Kind::DocStart);
        assert_eq!(classify("..."), Kind::DocEnd);
        assert_eq!(classify("%YAML 1.2"), Kind::Directive);
        assert_eq!(classify("- a"), Kind::SeqItem);
        assert_eq!(classify("-"), Kind::SeqItem);
        assert_eq!(classify("-key: 1"), Kind::Key);
        assert_eq!(classify("title: x"), Kind::Key);
    }

    #[test]
    fn test_key_value_offset() {
        assert_eq!(key_value_offset("student_response:"), Some(17));
        assert_eq!(key_value_offset("student_response: []"), Some(17));
        assert_eq!(key_value_offset("student_response :"), Some(18));
        assert_eq!(key_value_offset("\"student_response\":"), Some(19));
        assert_eq!(key_value_offset("'student_response': ~"), Some(19));
        assert_eq!(key_value_offset("student_responses:"), None);
        assert_eq!(key_value_offset("student_response_old: 1"), None);
        assert_eq!(key_value_offset("student_response:x"), None);
    }

    #[test]
    fn test_keep_everything_is_identity() {
        let out = run(GRADED, vec![Fate::Keep, Fate::Keep], vec![]).unwrap();
        assert_eq!(out, GRADED);
    }

    #[test]
    fn test_replace_second_keeps_first_byte_for_byte() {
        let out = run(GRADED, vec![Fate::Keep, Fate::Replace(entry("Bob", "Ray", "new"))], vec![]).unwrap();
        assert!(out.contains("  feedback: great   # graded by hand\n# second student\n- firstname: Bob\n"));
        assert!(out.contains("    content: new\n"));
        assert!(out.starts_with("title: Midterm # keep me\n"));
        assert!(out.ends_with("\n\n# Rubric below\nrubric:\n  q1: 2 points\n"));
    }

    #[test]
    fn test_append_goes_after_last_item_before_trailing_comments() {
        let out = run(GRADED, vec![Fate::Keep, Fate::Keep], vec![entry("Cy", "Dee", "x")]).unwrap();
        let appended = out.find("- firstname: Cy").unwrap();
        let rubric_comment = out.find("# Rubric below").unwrap();
        let bob = out.find("- firstname: Bob").unwrap();
        assert!(bob < appended && appended < rubric_comment);
    }

    #[test]
    fn test_drop_removes_item_but_keeps_comments() {
        let out = run(GRADED, vec![Fate::Keep, Fate::Drop], vec![]).unwrap();
        assert!(!out.contains("Bob"));
        assert!(out.contains("# second student\n"));
    }

    #[test]
    fn test_indented_sequence_keeps_indentation() {
        let source = "student_response:\n  - firstname: Ann\n    lastname: Lee\n    answers: []\n";
        let out = run(source, vec![Fate::Keep], vec![entry("Bob", "Ray", "x")]).unwrap();
        assert!(out.contains("\n  - firstname: Bob\n    lastname: Ray\n    answers:\n    - question_id: 1\n"));
    }

    #[test]
    fn test_inline_empty_sequence_is_rerendered() {
        let source = "# header\nstudent_response: []\nrubric: {}\n";
        let out = run(source, vec![], vec![entry("Ann", "Lee", "x")]).unwrap();
        assert!(out.starts_with("# header\nstudent_response:\n- firstname: Ann\n"));
        assert!(out.ends_with("correction_details: null\nrubric: {}\n"));
    }

    #[test]
    fn test_null_value_with_comment_is_rerendered() {
        let source = "student_response: # filled by import\nrubric: {}\n";
        let out = run(source, vec![], vec![entry("Ann", "Lee", "x")]).unwrap();
        assert!(out.starts_with("student_response:\n- firstname: Ann\n"));
    }

    #[test]
    fn test_missing_key_is_appended() {
        let source = "title: Quiz\nrubric:\n  q1: x # note\n";
        let out = run(source, vec![], vec![entry("Ann", "Lee", "x")]).unwrap();
        assert!(out.starts_with("title: Quiz\nrubric:\n  q1: x # note\nstudent_response:\n- firstname: Ann\n"));
    }

    #[test]
    fn test_missing_key_without_trailing_newline() {
        let out = run("title: Quiz", vec![], vec![]).unwrap();
        assert_eq!(out, "title: Quiz\nstudent_response: []\n");
    }

    #[test]
    fn test_empty_source() {
        let out = run("", vec![], vec![entry("Ann", "Lee", "x")]).unwrap();
        assert!(out.starts_with("student_response:\n- firstname: Ann\n"));
    }

    #[test]
    fn test_insert_before_document_end_marker() {
        let source = "---\ntitle: Quiz\n...\n";
        let out = run(source, vec![], vec![]).unwrap();
        assert_eq!(out, "---\ntitle: Quiz\nstudent_response: []\n...\n");
    }

    #[test]
    fn test_flow_root_is_unsupported() {
        assert!(run("{title: Quiz}\n", vec![], vec![]).is_none());
    }

    #[test]
    fn test_crlf_source_keeps_crlf() {
        let source = "title: Quiz\r\nstudent_response:\r\n- firstname: Ann\r\n  lastname: Lee\r\n  answers: []\r\n";
        let out = run(source, vec![Fate::Keep], vec![entry("Bob", "Ray", "x")]).unwrap();
        assert!(out.contains("- firstname: Bob\r\n  lastname: Ray\r\n"));
        assert!(!out.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn test_replacing_entry_removes_trailing_hash_lines_of_its_answer() {
        let source = "\
student_response:
- firstname: John
  lastname: Doe
  answers:
  - question_id: 1
    content: |
      x = 1
      # secret old answer
rubric: {}
";
        let out = run(source, vec![Fate::Replace(entry("John", "Doe", "new"))], vec![]).unwrap();
        assert!(!out.contains("secret old answer"), "{out}");
        assert!(out.ends_with("    correction_details: null\nrubric: {}\n"), "{out}");
    }

    #[test]
    fn test_shallow_comment_after_item_stays_a_gap() {
        let source = "student_response:\n- firstname: Ann\n  lastname: Lee\n  answers: []\n# next one\n- firstname: Bob\n  lastname: Ray\n  answers: []\n";
        let out = run(
            source,
            vec![Fate::Replace(entry("Ann", "Lee", "x")), Fate::Keep],
            vec![],
        )
        .unwrap();
        assert!(out.contains("    correction_details: null\n# next one\n- firstname: Bob\n"), "{out}");
    }

    #[test]
    fn test_literal_content_lines_stay_inside_item() {
        let source = "\
student_response:
- firstname: Ann
  lastname: Lee
  answers:
  - question_id: 1
    content: |
      - looks like an item
      # looks like a comment

      done
    points: null
    correction_details: null
- firstname: Bob
  lastname: Ray
  answers: []
";
        let record = ExamRecord::parse("exam.yaml", source).unwrap();
        let block = find_block(source, &split_lines(source)).unwrap();
        let items = block.items(source, &split_lines(source)).unwrap();
        let count = items.iter().filter(|s| matches!(s, Segment::Item(_))).count();
        assert_eq!(count, record.student_response().len());
    }
}
