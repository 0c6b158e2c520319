//! Pipeline settings, optionally loaded from a YAML file.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MONITOR_CAPACITY: usize = 256;
pub const DEFAULT_ABSENT_TOKENS: &[&str] = &["", "null", "undefined", "EMPTY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records per insert call.
    pub chunk_size: usize,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Trimmed cell values treated as absent (case-sensitive).
    pub absent_tokens: Vec<String>,
    /// Events retained by the monitor before the oldest are dropped.
    pub monitor_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            absent_tokens: DEFAULT_ABSENT_TOKENS
                .iter()
                .map(|token| token.to_string())
                .collect(),
            monitor_capacity: DEFAULT_MONITOR_CAPACITY,
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: IngestConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(IngestError::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.monitor_capacity == 0 {
            return Err(IngestError::Config(
                "monitor_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_absent(&self, trimmed: &str) -> bool {
        self.absent_tokens.iter().any(|token| token == trimmed)
    }
}
