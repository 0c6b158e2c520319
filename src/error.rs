//! Error types for the lead ingestion pipeline.
//!
//! Every failure a caller can observe is a variant of [`IngestError`]. The
//! variants are grouped the way they surface to a user: input rejection,
//! mapping insufficiency, validation failure, and persistence failure.

use thiserror::Error;

/// Failure reported by a [`crate::store::LeadStore`] implementation.
///
/// The message is shown to the user verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can occur while ingesting an uploaded lead file.
#[derive(Debug, Error)]
pub enum IngestError {
    // === Input rejection ===
    /// Upload exceeds the configured size limit.
    #[error("file '{name}' is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// Upload is neither CSV nor plain text.
    #[error("file '{name}' is not a CSV or plain-text file")]
    UnsupportedFileType { name: String },

    /// Upload contains no bytes.
    #[error("file '{name}' is empty")]
    EmptyFile { name: String },

    /// Bytes could not be decoded with the selected encoding.
    #[error("failed to decode text with encoding {encoding}")]
    Decode { encoding: String },

    /// Unknown encoding label supplied by the caller.
    #[error("unknown encoding '{label}'")]
    UnknownEncoding { label: String },

    /// The file has no header row.
    #[error("no header row found")]
    MissingHeader,

    /// A quoted field is never closed.
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: u64 },

    /// A data row does not have as many fields as the header.
    #[error("line {line} has {found} field(s); the header declares {expected}")]
    FieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// Two header cells share the same name.
    #[error("duplicate column name '{name}' in header")]
    DuplicateHeader { name: String },

    /// Any other failure reported by the CSV reader.
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    // === Mapping insufficiency ===
    /// No source column has been assigned to a target field.
    #[error("map at least one column before previewing")]
    MappingInsufficient,

    /// A mapping refers to a column that the file does not contain.
    #[error("column '{column}' does not exist in the uploaded file")]
    UnknownColumn { column: String },

    // === Validation failure ===
    /// Nothing is left to import after normalization and deduplication.
    #[error("no valid records to import ({duplicates} duplicate(s), {dropped} empty row(s))")]
    NoValidRecords { duplicates: usize, dropped: usize },

    // === Persistence failure ===
    /// Existing-record lookup was rejected by the store.
    #[error("failed to look up existing leads: {0}")]
    Lookup(#[source] StoreError),

    /// A batch insert was rejected; earlier chunks remain committed.
    ///
    /// Chunk numbers count within the failed attempt. Through
    /// [`crate::session::UploadSession::commit`], `inserted` also includes
    /// leads saved by earlier attempts on the same preview.
    #[error(
        "insert failed on chunk {failed_chunk} of {total_chunks} ({inserted} record(s) already saved): {message}"
    )]
    Persistence {
        inserted: usize,
        failed_chunk: usize,
        total_chunks: usize,
        message: String,
    },

    // === Flow misuse ===
    /// Operation invoked in the wrong stage of the upload flow.
    #[error("cannot {operation} while {actual}")]
    InvalidState {
        operation: &'static str,
        actual: &'static str,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IngestError {
    /// True when the failure leaves the upload step recoverable by choosing another file.
    pub fn is_input_rejection(&self) -> bool {
        matches!(
            self,
            IngestError::FileTooLarge { .. }
                | IngestError::UnsupportedFileType { .. }
                | IngestError::EmptyFile { .. }
                | IngestError::Decode { .. }
                | IngestError::UnknownEncoding { .. }
                | IngestError::MissingHeader
                | IngestError::UnterminatedQuote { .. }
                | IngestError::FieldCount { .. }
                | IngestError::DuplicateHeader { .. }
                | IngestError::Csv(_)
        )
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
