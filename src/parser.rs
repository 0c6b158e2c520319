//! Delimited-text parsing for uploaded lead files.
//!
//! Produces the ordered header list and one [`RawRow`] per data line. Structural
//! problems (no header, unterminated quotes, ragged rows, repeated header names)
//! are reported as [`IngestError`] values before anything reaches the store.

use std::collections::{BTreeMap, HashSet};

use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    error::{IngestError, Result},
    io_utils,
    upload::UploadFile,
};

/// One source line keyed by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number in the uploaded file.
    pub line: u64,
    cells: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(line: u64, cells: BTreeMap<String, String>) -> Self {
        Self { line, cells }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub delimiter: u8,
}

impl ParsedCsv {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|header| header == name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

/// Decodes and parses an uploaded file.
pub fn parse_upload(file: &UploadFile, options: &ParseOptions) -> Result<ParsedCsv> {
    let delimiter = io_utils::resolve_delimiter(&file.name, options.delimiter);
    let text = io_utils::decode_bytes(&file.bytes, options.encoding)?;
    debug!(
        "Parsing '{}' ({} bytes, delimiter '{}')",
        file.name,
        file.bytes.len(),
        io_utils::printable_delimiter(delimiter)
    );
    parse_text(&text, delimiter)
}

pub fn parse_text(text: &str, delimiter: u8) -> Result<ParsedCsv> {
    if text.trim().is_empty() {
        return Err(IngestError::MissingHeader);
    }
    if let Some(line) = find_unterminated_quote(text, delimiter) {
        return Err(IngestError::UnterminatedQuote { line });
    }

    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let raw_headers = reader.headers().map_err(map_csv_error)?.clone();
    let headers = normalize_headers(raw_headers.iter())?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(map_csv_error)?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect::<BTreeMap<_, _>>();
        rows.push(RawRow::new(line, cells));
    }
    debug!(
        "Parsed {} column(s) and {} row(s)",
        headers.len(),
        rows.len()
    );

    Ok(ParsedCsv {
        headers,
        rows,
        delimiter,
    })
}

fn normalize_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for (idx, value) in raw.enumerate() {
        let trimmed = value.trim();
        let name = if trimmed.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            trimmed.to_string()
        };
        if !seen.insert(name.clone()) {
            return Err(IngestError::DuplicateHeader { name });
        }
        headers.push(name);
    }
    if headers.is_empty() {
        return Err(IngestError::MissingHeader);
    }
    Ok(headers)
}

fn map_csv_error(err: csv::Error) -> IngestError {
    if let csv::ErrorKind::UnequalLengths {
        pos,
        expected_len,
        len,
    } = err.kind()
    {
        return IngestError::FieldCount {
            line: pos.as_ref().map(|p| p.line()).unwrap_or_default(),
            expected: *expected_len as usize,
            found: *len as usize,
        };
    }
    IngestError::Csv(err)
}

/// Returns the line on which an unclosed quoted field starts, if any.
///
/// Mirrors the reader's dialect: a quote only opens a field when it is the
/// first character of that field, and `""` inside a quoted field is an escape.
fn find_unterminated_quote(text: &str, delimiter: u8) -> Option<u64> {
    let bytes = text.as_bytes();
    let mut line = 1u64;
    let mut opened_on = 0u64;
    let mut in_quotes = false;
    let mut field_start = true;
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if in_quotes {
            match byte {
                b'"' if bytes.get(idx + 1) == Some(&b'"') => idx += 1,
                b'"' => in_quotes = false,
                b'\n' => line += 1,
                _ => {}
            }
        } else if byte == b'"' && field_start {
            in_quotes = true;
            opened_on = line;
            field_start = false;
        } else if byte == delimiter || byte == b'\r' {
            field_start = true;
        } else if byte == b'\n' {
            line += 1;
            field_start = true;
        } else {
            field_start = false;
        }
        idx += 1;
    }
    in_quotes.then_some(opened_on)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_scanner_accepts_escaped_quotes() {
        let text = "name,note\n\"Jane\",\"said \"\"hi\"\"\"\n";
        assert_eq!(find_unterminated_quote(text, b','), None);
    }

    #[test]
    fn quote_scanner_ignores_mid_field_quotes() {
        let text = "name,height\nJane,5'11\"\n";
        assert_eq!(find_unterminated_quote(text, b','), None);
    }

    #[test]
    fn quote_scanner_reports_opening_line() {
        let text = "name,note\nJane,ok\nJohn,\"never closed\nstill going\n";
        assert_eq!(find_unterminated_quote(text, b','), Some(3));
    }

    #[test]
    fn blank_headers_receive_synthetic_names() {
        let headers = normalize_headers(["name", " ", "email"].into_iter()).expect("headers");
        assert_eq!(headers, vec!["name", "column_2", "email"]);
    }
}
