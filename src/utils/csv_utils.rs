//! CSV utility functions
//!
//! Minimal RFC 4180 handling for the small CSV files patchkit reads and
//! writes: points files, label tables and tile listings.

use std::borrow::Cow;

use crate::errors::{PatchError, PatchResult};

/// One logical CSV record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// 1-based line on which the record starts
    pub line: usize,
    pub fields: Vec<String>,
}

/// Quote a field if it contains a separator, a quote or a line break
///
/// Embedded quotes are doubled.
pub fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Join fields into one CSV line, quoting where needed
pub fn format_record<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| quote_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Split one record into fields
///
/// Quoted fields keep their content verbatim, including separators, line
/// breaks and doubled quotes; unquoted fields are trimmed.
pub fn split_record(record: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = record.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c != '"' {
                field.push(c);
            } else if chars.peek() == Some(&'"') {
                chars.next();
                field.push('"');
            } else {
                in_quotes = false;
            }
            continue;
        }

        match c {
            '"' if !quoted && field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quoted = true;
            },
            ',' => {
                fields.push(finish_field(std::mem::take(&mut field), quoted));
                quoted = false;
            },
            // whitespace between a closing quote and the separator
            c if quoted && c.is_whitespace() => {},
            c => field.push(c),
        }
    }

    fields.push(finish_field(field, quoted));
    fields
}

fn finish_field(field: String, quoted: bool) -> String {
    if quoted {
        field
    } else {
        field.trim().to_string()
    }
}

/// Split CSV text into records
///
/// Blank lines and lines starting with `#` are skipped. A quoted field may
/// span several lines; an unterminated quote is an error reported against
/// the line where its record starts.
pub fn parse_records(content: &str) -> PatchResult<Vec<CsvRecord>> {
    let mut records = Vec::new();
    let mut pending = String::new();
    let mut start_line = 0;

    for (index, line) in content.lines().enumerate() {
        if pending.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            start_line = index + 1;
            pending.push_str(line);
        } else {
            pending.push('\n');
            pending.push_str(line);
        }

        // doubled quotes keep the count even, so odd means still inside a field
        if pending.matches('"').count() % 2 == 0 {
            records.push(CsvRecord { line: start_line, fields: split_record(&pending) });
            pending.clear();
        }
    }

    if !pending.is_empty() {
        return Err(PatchError::PointsError {
            line: start_line,
            message: "Unterminated quoted field".to_string(),
        });
    }

    Ok(records)
}
