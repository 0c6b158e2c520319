//! Upload acceptance checks that run before any parsing.

use std::path::Path;

use anyhow::Context;

use crate::{config::IngestConfig, error::IngestError};

const ACCEPTED_MIME_TYPES: &[&str] = &["text/csv", "text/plain", "text/tab-separated-values"];
const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "txt", "tsv"];

/// A user-supplied file as received from the upload control.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.map(str::to_string),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Reading upload {path:?}"))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, None, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn has_accepted_mime(&self) -> bool {
        self.mime_type.as_deref().is_some_and(|mime| {
            let essence = mime.split(';').next().unwrap_or("").trim();
            ACCEPTED_MIME_TYPES
                .iter()
                .any(|accepted| essence.eq_ignore_ascii_case(accepted))
        })
    }

    fn has_accepted_extension(&self) -> bool {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ACCEPTED_EXTENSIONS
                    .iter()
                    .any(|accepted| ext.eq_ignore_ascii_case(accepted))
            })
    }
}

/// Rejects files that are too large, empty, or not delimited text.
pub fn validate_upload(file: &UploadFile, config: &IngestConfig) -> Result<(), IngestError> {
    if !file.has_accepted_mime() && !file.has_accepted_extension() {
        return Err(IngestError::UnsupportedFileType {
            name: file.name.clone(),
        });
    }
    if file.size() > config.max_upload_bytes {
        return Err(IngestError::FileTooLarge {
            name: file.name.clone(),
            size: file.size(),
            limit: config.max_upload_bytes,
        });
    }
    if file.bytes.is_empty() {
        return Err(IngestError::EmptyFile {
            name: file.name.clone(),
        });
    }
    Ok(())
}
