//! The interactive upload flow.
//!
//! A session moves linearly through three stages and can step back at any
//! time, discarding everything computed after the stage it returns to:
//!
//! ```text
//! AwaitingFile --load_file--> ColumnsMapped --preview--> Previewed --commit--> AwaitingFile
//!      ^                           |   ^                     |
//!      +----------back-------------+   +--------back---------+
//! ```
//!
//! A failed commit leaves the session in `Previewed` so the same commit can be
//! retried without re-uploading.

use log::info;

use crate::{
    config::IngestConfig,
    dedup::{self, BatchStats, Classification, DuplicateRecord},
    emit,
    error::{IngestError, Result},
    mapping::{ColumnMapping, TargetField},
    monitor::{EventLevel, Monitor},
    normalize::{self, NormalizedLead},
    parser::{self, ParseOptions, ParsedCsv},
    report,
    store::{LeadStore, Scope},
    upload::{self, UploadFile},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedUpload {
    pub file_name: String,
    pub parsed: ParsedCsv,
    pub mapping: ColumnMapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub upload: MappedUpload,
    pub classification: Classification,
    /// Leads saved by earlier commit attempts that failed part way. They have
    /// already been removed from `classification.unique`.
    pub committed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadStage {
    #[default]
    AwaitingFile,
    ColumnsMapped(MappedUpload),
    Previewed(Preview),
}

impl UploadStage {
    pub fn name(&self) -> &'static str {
        match self {
            UploadStage::AwaitingFile => "awaiting a file",
            UploadStage::ColumnsMapped(_) => "mapping columns",
            UploadStage::Previewed(_) => "previewing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub chunks: usize,
    pub stats: BatchStats,
}

#[derive(Debug)]
pub struct UploadSession {
    config: IngestConfig,
    scope: Scope,
    parse_options: ParseOptions,
    monitor: Monitor,
    stage: UploadStage,
}

impl UploadSession {
    pub fn new(config: IngestConfig, scope: Scope, monitor: Monitor) -> Self {
        Self {
            config,
            scope,
            parse_options: ParseOptions::default(),
            monitor,
            stage: UploadStage::AwaitingFile,
        }
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    pub fn stage(&self) -> &UploadStage {
        &self.stage
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut Monitor {
        &mut self.monitor
    }

    pub fn into_monitor(self) -> Monitor {
        self.monitor
    }

    /// Validates and parses `file`, then auto-detects a column mapping.
    ///
    /// Rejected files leave the session awaiting a file.
    pub fn load_file(&mut self, file: UploadFile) -> Result<&MappedUpload> {
        if !matches!(self.stage, UploadStage::AwaitingFile) {
            return Err(self.invalid("load a file"));
        }
        let parsed = upload::validate_upload(&file, &self.config)
            .and_then(|_| parser::parse_upload(&file, &self.parse_options));
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                self.monitor.record(
                    EventLevel::Warn,
                    "upload_rejected",
                    err.to_string(),
                    [("file", file.name.as_str())],
                );
                return Err(err);
            }
        };
        let mapping = ColumnMapping::detect(&parsed.headers);
        self.monitor.record(
            EventLevel::Info,
            "file_loaded",
            format!("{} row(s), {} column(s)", parsed.row_count(), parsed.headers.len()),
            [
                ("file", file.name.clone()),
                ("mapped", mapping.len().to_string()),
            ],
        );
        self.stage = UploadStage::ColumnsMapped(MappedUpload {
            file_name: file.name,
            parsed,
            mapping,
        });
        match &self.stage {
            UploadStage::ColumnsMapped(mapped) => Ok(mapped),
            _ => unreachable!("stage was just set"),
        }
    }

    fn mapped_mut(&mut self, operation: &'static str) -> Result<&mut MappedUpload> {
        match &mut self.stage {
            UploadStage::ColumnsMapped(mapped) => Ok(mapped),
            other => Err(IngestError::InvalidState {
                operation,
                actual: other.name(),
            }),
        }
    }

    pub fn assign_column(&mut self, source: &str, target: TargetField) -> Result<()> {
        let mapped = self.mapped_mut("change the mapping")?;
        if !mapped.parsed.has_column(source) {
            return Err(IngestError::UnknownColumn {
                column: source.to_string(),
            });
        }
        mapped.mapping.assign(source, target);
        Ok(())
    }

    pub fn unassign_column(&mut self, source: &str) -> Result<Option<TargetField>> {
        let mapped = self.mapped_mut("change the mapping")?;
        Ok(mapped.mapping.unassign(source))
    }

    /// Replaces the detected mapping wholesale, e.g. with one loaded from disk.
    pub fn replace_mapping(&mut self, mapping: ColumnMapping) -> Result<()> {
        let mapped = self.mapped_mut("change the mapping")?;
        if let Some((column, _)) = mapping
            .iter()
            .find(|(column, _)| !mapped.parsed.has_column(column))
        {
            return Err(IngestError::UnknownColumn {
                column: column.to_string(),
            });
        }
        mapped.mapping = mapping;
        Ok(())
    }

    /// Normalizes every row, looks up stored contacts, and classifies the batch.
    pub fn preview<S>(&mut self, store: &S) -> Result<&Preview>
    where
        S: LeadStore + ?Sized,
    {
        let mapped = match &self.stage {
            UploadStage::ColumnsMapped(mapped) => mapped,
            _ => return Err(self.invalid("preview")),
        };
        if mapped.mapping.is_empty() {
            return Err(IngestError::MappingInsufficient);
        }
        let batch = normalize::normalize_batch(&mapped.parsed, &mapped.mapping, &self.config);
        let existing = match store.existing_contacts(&self.scope) {
            Ok(existing) => existing,
            Err(err) => {
                self.monitor
                    .error("lookup_failed", format!("{}: {}", self.scope, err.message));
                return Err(IngestError::Lookup(err));
            }
        };
        let classification = dedup::classify(batch, &existing);
        let stats = classification.stats;
        self.monitor.record(
            EventLevel::Info,
            "previewed",
            format!("{} valid of {} row(s)", stats.valid, stats.rows_parsed),
            [
                ("duplicates", stats.duplicates),
                ("existing_duplicates", stats.existing_duplicates),
                ("internal_duplicates", stats.internal_duplicates),
                ("dropped", stats.dropped),
            ],
        );

        let UploadStage::ColumnsMapped(upload) = std::mem::take(&mut self.stage) else {
            unreachable!("stage checked above");
        };
        self.stage = UploadStage::Previewed(Preview {
            upload,
            classification,
            committed: 0,
        });
        match &self.stage {
            UploadStage::Previewed(preview) => Ok(preview),
            _ => unreachable!("stage was just set"),
        }
    }

    pub fn preview_result(&self) -> Option<&Preview> {
        match &self.stage {
            UploadStage::Previewed(preview) => Some(preview),
            _ => None,
        }
    }

    pub fn unique_leads(&self) -> &[NormalizedLead] {
        self.preview_result()
            .map(|preview| preview.classification.unique.as_slice())
            .unwrap_or_default()
    }

    pub fn duplicates(&self) -> &[DuplicateRecord] {
        self.preview_result()
            .map(|preview| preview.classification.duplicates.as_slice())
            .unwrap_or_default()
    }

    /// CSV report of the previewed duplicates.
    pub fn duplicate_report(&self) -> anyhow::Result<String> {
        let preview = self
            .preview_result()
            .ok_or_else(|| self.invalid("build a duplicate report"))?;
        report::duplicate_report_string(&preview.classification.duplicates)
    }

    /// Inserts the previewed unique leads and resets the session on success.
    ///
    /// When a chunk fails, the leads saved before it are removed from the
    /// preview, so a retried commit resumes with the first unsaved lead.
    pub fn commit<S>(&mut self, store: &mut S) -> Result<CommitSummary>
    where
        S: LeadStore + ?Sized,
    {
        let UploadStage::Previewed(preview) = &mut self.stage else {
            return Err(self.invalid("commit"));
        };
        let stats = preview.classification.stats;
        if stats.valid == 0 {
            return Err(IngestError::NoValidRecords {
                duplicates: stats.duplicates,
                dropped: stats.dropped,
            });
        }
        let outcome = emit::emit_batches(
            store,
            &self.scope,
            &preview.classification.unique,
            self.config.chunk_size,
            &mut self.monitor,
        );
        let summary = match outcome {
            Ok(summary) => summary,
            Err(IngestError::Persistence {
                inserted,
                failed_chunk,
                total_chunks,
                message,
            }) => {
                preview.classification.unique.drain(..inserted);
                preview.committed += inserted;
                return Err(IngestError::Persistence {
                    inserted: preview.committed,
                    failed_chunk,
                    total_chunks,
                    message,
                });
            }
            Err(err) => return Err(err),
        };
        let inserted = preview.committed + summary.inserted;
        info!(
            "Committed {} lead(s) from '{}' into {}",
            inserted, preview.upload.file_name, self.scope
        );
        self.monitor.record(
            EventLevel::Info,
            "committed",
            format!("{inserted} lead(s) inserted"),
            [("chunks", summary.chunks)],
        );
        self.stage = UploadStage::AwaitingFile;
        Ok(CommitSummary {
            inserted,
            chunks: summary.chunks,
            stats,
        })
    }

    /// Steps back one stage, discarding forward state.
    pub fn back(&mut self) {
        self.stage = match std::mem::take(&mut self.stage) {
            UploadStage::AwaitingFile | UploadStage::ColumnsMapped(_) => UploadStage::AwaitingFile,
            UploadStage::Previewed(preview) => UploadStage::ColumnsMapped(preview.upload),
        };
    }

    pub fn reset(&mut self) {
        self.stage = UploadStage::AwaitingFile;
    }

    fn invalid(&self, operation: &'static str) -> IngestError {
        IngestError::InvalidState {
            operation,
            actual: self.stage.name(),
        }
    }
}
