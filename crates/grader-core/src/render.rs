//! YAML text for student entries.
//!
//! Entries are emitted by hand rather than through `serde_yaml` so that the
//! layout is stable and answer text lands in literal block scalars, where a
//! grader can read and edit it as-is.

use crate::record::{AnswerEntry, StudentEntry};
use serde_yaml::Value;

/// Renders `entry` as a block sequence item indented by `indent` spaces.
pub(crate) fn student_entry(entry: &StudentEntry, indent: usize) -> Result<String, serde_yaml::Error> {
    let pad = " ".repeat(indent);
    let mut out = String::new();

    out.push_str(&format!("{pad}- firstname: {}\n", inline_scalar(&entry.firstname)));
    out.push_str(&format!("{pad}  lastname: {}\n", inline_scalar(&entry.lastname)));
    if entry.answers.is_empty() {
        out.push_str(&format!("{pad}  answers: []\n"));
        return Ok(out);
    }
    out.push_str(&format!("{pad}  answers:\n"));
    for answer in &entry.answers {
        answer_entry(&mut out, answer, indent + 2)?;
    }
    Ok(out)
}

fn answer_entry(out: &mut String, answer: &AnswerEntry, indent: usize) -> Result<(), serde_yaml::Error> {
    let pad = " ".repeat(indent);
    out.push_str(&format!("{pad}- question_id: {}\n", answer.question_id));
    out.push_str(&format!("{pad}  content:"));
    match literal_block(&answer.content, indent + 2) {
        Some(block) => out.push_str(&block),
        None => {
            out.push(' ');
            out.push_str(&inline_scalar(&answer.content));
            out.push('\n');
        }
    }
    out.push_str(&format!("{pad}  points: {}\n", optional_points(answer.points)));
    out.push_str(&format!("{pad}  correction_details:"));
    out.push_str(&details(answer.correction_details.as_ref(), indent + 2)?);
    Ok(())
}

/// Value of `correction_details`, starting right after the key's colon.
fn details(value: Option<&Value>, parent_indent: usize) -> Result<String, serde_yaml::Error> {
    Ok(match value {
        None | Some(Value::Null) => " null\n".to_string(),
        Some(Value::String(text)) => format!(" {}\n", inline_scalar(text)),
        Some(Value::Mapping(map)) if !map.is_empty() => {
            format!("\n{}", indent_lines(&serde_yaml::to_string(map)?, parent_indent + 2))
        }
        Some(Value::Sequence(items)) if !items.is_empty() => {
            format!("\n{}", indent_lines(&serde_yaml::to_string(items)?, parent_indent + 2))
        }
        Some(other) => format!(" {}\n", serde_yaml::to_string(other)?.trim_end()),
    })
}

fn optional_points(points: Option<f64>) -> String {
    match points {
        None => "null".to_string(),
        Some(p) if p.is_nan() => ".nan".to_string(),
        Some(p) if p.is_infinite() => (if p > 0.0 { ".inf" } else { "-.inf" }).to_string(),
        Some(p) => format!("{p:?}"),
    }
}

/// Renders an opaque record value as a block sequence item.
pub(crate) fn value_item(value: &Value, indent: usize) -> Result<String, serde_yaml::Error> {
    let text = serde_yaml::to_string(&vec![value])?;
    Ok(indent_lines(&text, indent))
}

/// Prefixes every non-empty line with `indent` spaces.
pub(crate) fn indent_lines(text: &str, indent: usize) -> String {
    if indent == 0 {
        return text.to_string();
    }
    let pad = " ".repeat(indent);
    let mut out = String::with_capacity(text.len() + indent * 8);
    for line in text.split_inclusive('\n') {
        if line != "\n" {
            out.push_str(&pad);
        }
        out.push_str(line);
    }
    out
}

/// Renders `text` as a literal block scalar whose parent mapping sits at
/// column `parent_indent`. The result starts right after the key's colon and
/// ends with a newline.
///
/// Returns `None` when the text is single-line or cannot be represented
/// literally (carriage returns, trailing whitespace, non-printable characters).
pub(crate) fn literal_block(text: &str, parent_indent: usize) -> Option<String> {
    if !text.contains('\n') || !literal_safe(text) {
        return None;
    }

    let body = text.trim_end_matches('\n');
    if body.is_empty() {
        return None;
    }
    let trailing = text.len() - body.len();
    let chomp = match trailing {
        0 => "-",
        1 => "",
        _ => "+",
    };

    const STEP: usize = 2;
    let first_content = body.split('\n').find(|l| !l.is_empty()).unwrap_or_default();
    let indicator = if first_content.starts_with([' ', '\t']) {
        STEP.to_string()
    } else {
        String::new()
    };

    let pad = " ".repeat(parent_indent + STEP);
    let mut out = format!(" |{indicator}{chomp}\n");
    for line in body.split('\n') {
        if !line.is_empty() {
            out.push_str(&pad);
            out.push_str(line);
        }
        out.push('\n');
    }
    for _ in 1..trailing {
        out.push('\n');
    }
    Some(out)
}

fn literal_safe(text: &str) -> bool {
    text.chars().all(|c| c == '\n' || c == '\t' || printable(c))
        && text
            .split('\n')
            .all(|line| !line.ends_with([' ', '\t']))
}

/// Characters that can appear unescaped in any YAML scalar style.
fn printable(c: char) -> bool {
    matches!(c,
        ' '..='~'
        | '\u{a0}'..='\u{2027}'
        | '\u{202a}'..='\u{d7ff}'
        | '\u{e000}'..='\u{fefe}'
        | '\u{ff00}'..='\u{fffd}'
        | '\u{10000}'..='\u{10ffff}')
}

/// Renders a scalar on one line: plain when unambiguous, quoted otherwise.
pub(crate) fn inline_scalar(text: &str) -> String {
    if text.chars().all(printable) {
        if plain_safe(text) {
            text.to_string()
        } else {
            single_quoted(text)
        }
    } else {
        double_quoted(text)
    }
}

fn plain_safe(text: &str) -> bool {
    const LEADING: &[char] = &[
        '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@', '`',
    ];
    const ANYWHERE: &[char] = &[',', '[', ']', '{', '}'];

    if text.is_empty()
        || text.starts_with(LEADING)
        || text.starts_with(' ')
        || text.ends_with(' ')
        || text.ends_with(':')
        || text.contains(": ")
        || text.contains(" #")
        || text.contains(ANYWHERE)
    {
        return false;
    }
    // Anything that would load back as a number, bool or null needs quotes.
    matches!(serde_yaml::from_str::<Value>(text), Ok(Value::String(ref s)) if s == text)
}

fn single_quoted(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn double_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\u{85}' => out.push_str("\\N"),
            '\u{2028}' => out.push_str("\\L"),
            '\u{2029}' => out.push_str("\\P"),
            c if printable(c) => out.push(c),
            c if (c as u32) <= 0xff => out.push_str(&format!("\\x{:02x}", c as u32)),
            c if (c as u32) <= 0xffff => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push_str(&format!("\\U{:08x}", c as u32)),
        }
    }
    out.push('"');
    out
}
