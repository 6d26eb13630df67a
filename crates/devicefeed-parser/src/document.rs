use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::LineError;
use crate::model::DeviceRecord;
use crate::record::parse_record;

/// Runs of two or more ASCII spaces act as a column separator in
/// hand-edited input; they are collapsed to a single TAB before the
/// document is split into records. Single spaces stay part of the
/// field text.
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new("  +").expect("valid regex"));

pub fn normalize_separators(content: &str) -> Cow<'_, str> {
    MULTI_SPACE.replace_all(content, "\t")
}

/// Outcome of parsing one whole file: validated records plus the
/// line-level failures, both in source order.
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub records: Vec<DeviceRecord>,
    pub errors: Vec<LineError>,
}

impl ParsedDocument {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.errors.is_empty()
    }
}

/// Parse a normalized-and-split document.
///
/// Skips blank lines, `#` comments, and a single leading header
/// record (detected by its first field not parsing as an integer).
/// Line numbers are 1-based physical positions in the file.
pub fn parse_document(content: &str) -> ParsedDocument {
    let normalized = normalize_separators(content);

    let mut document = ParsedDocument::default();
    let mut leading_record = true;

    for (index, line) in normalized.lines().enumerate() {
        let line_number = (index + 1) as i32;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();

        if leading_record {
            leading_record = false;
            if fields[0].parse::<i64>().is_err() {
                continue;
            }
        }

        match parse_record(&fields, line_number) {
            Ok(record) => document.records.push(record),
            Err(error) => document
                .errors
                .push(LineError::new(line_number, line, error)),
        }
    }

    document
}
