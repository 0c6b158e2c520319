//! I/O helpers shared by the parser, the report writer, and the CLI.
//!
//! - **Delimiter resolution**: extension-based detection (`.tsv` → tab,
//!   anything else → comma) with manual override.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8 with
//!   BOM sniffing.
//! - **Reader/writer construction**: one place that fixes quoting rules so the
//!   parser and the duplicate report agree on the dialect.

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::IngestError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, IngestError> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes()).ok_or_else(|| {
            IngestError::UnknownEncoding {
                label: value.to_string(),
            }
        }),
        None => Ok(UTF_8),
    }
}

/// Picks the delimiter for a file name, honouring an explicit override.
pub fn resolve_delimiter(file_name: &str, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| {
        match Path::new(file_name).extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
            _ => DEFAULT_CSV_DELIMITER,
        }
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

/// Decodes raw upload bytes. A leading BOM selects its own encoding and is stripped.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String, IngestError> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(IngestError::Decode {
            encoding: used.name().to_string(),
        })
    } else {
        Ok(text.into_owned())
    }
}

pub fn csv_writer<W: Write>(writer: W, delimiter: u8) -> csv::Writer<W> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

/// Opens `path` for writing, or stdout for `None` / `-`.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    })
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
