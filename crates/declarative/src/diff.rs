//! Human-readable diffs of file content
//!
//! Output is plain text in unified format; coloring is left to whoever
//! owns the terminal.

use crate::content::decode_strict;
use similar::{Algorithm, DiffTag, capture_diff_slices, group_diff_ops};

/// Marker naming the desired content on the `+++` side
pub const CONTENT_MARKER: &str = "<converge content>";

/// Displayed lines are cut off after this many characters
pub const MAX_LINE_LENGTH: usize = 128;

const CONTEXT_LINES: usize = 3;

/// Produce a unified diff between the current and the desired content
///
/// Lines are compared as raw bytes. For display, each line is decoded as
/// UTF-8 first and then with `encoding_hint`; lines that decode with
/// neither are replaced by a placeholder.
pub fn diff(old: &[u8], new: &[u8], path: &str, encoding_hint: Option<&str>) -> String {
    let old_lines: Vec<&[u8]> = old.split_inclusive(|b| *b == b'\n').collect();
    let new_lines: Vec<&[u8]> = new.split_inclusive(|b| *b == b'\n').collect();

    let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);

    let mut out = format!("--- {path}\n+++ {CONTENT_MARKER}\n");
    for group in group_diff_ops(ops, CONTEXT_LINES) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(old_range.start, old_range.end),
            format_range(new_range.start, new_range.end)
        ));

        for op in &group {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => {
                    for line in &old_lines[old_range] {
                        push_line(&mut out, ' ', line, encoding_hint);
                    }
                }
                DiffTag::Delete => {
                    for line in &old_lines[old_range] {
                        push_line(&mut out, '-', line, encoding_hint);
                    }
                }
                DiffTag::Insert => {
                    for line in &new_lines[new_range] {
                        push_line(&mut out, '+', line, encoding_hint);
                    }
                }
                DiffTag::Replace => {
                    for line in &old_lines[old_range] {
                        push_line(&mut out, '-', line, encoding_hint);
                    }
                    for line in &new_lines[new_range] {
                        push_line(&mut out, '+', line, encoding_hint);
                    }
                }
            }
        }
    }
    out
}

/// Hunk range in unified format (`start,len`, or just `start` for one line)
fn format_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    match length {
        1 => format!("{}", start + 1),
        0 => format!("{start},0"),
        _ => format!("{},{}", start + 1, length),
    }
}

fn push_line(out: &mut String, prefix: char, line: &[u8], encoding_hint: Option<&str>) {
    out.push(prefix);
    out.push_str(&display_line(line, encoding_hint));
    out.push('\n');
}

/// Decode, truncate and annotate a single line for display
fn display_line(line: &[u8], encoding_hint: Option<&str>) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let (text, mut notes) = match std::str::from_utf8(line) {
        Ok(text) => (text.to_string(), Vec::new()),
        Err(_) => match encoding_hint.and_then(|hint| decode_strict(line, hint).map(|t| (hint, t))) {
            Some((hint, text)) => (text, vec![format!("line encoded in {hint}")]),
            None => {
                let note = match encoding_hint {
                    Some(hint) => format!("line not encoded in UTF-8 or {hint}"),
                    None => "line not encoded in UTF-8".to_string(),
                };
                (String::new(), vec![note])
            }
        },
    };

    let text = if text.chars().count() > MAX_LINE_LENGTH {
        notes.insert(0, format!("line truncated after {MAX_LINE_LENGTH} characters"));
        text.chars().take(MAX_LINE_LENGTH).collect()
    } else {
        text
    };

    let mut displayed = text;
    for note in notes {
        displayed.push_str(&format!(" ({note})"));
    }
    displayed
}
