//! Chunked, sequential insertion of unique leads.

use log::{debug, info};

use crate::{
    error::{IngestError, Result},
    monitor::{EventLevel, Monitor},
    normalize::NormalizedLead,
    store::{LeadInsert, LeadStore, Scope},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitSummary {
    pub inserted: usize,
    pub chunks: usize,
}

/// Sends `leads` to the store `chunk_size` records at a time.
///
/// Chunk N+1 is issued only after chunk N succeeded. The first rejected chunk
/// stops the loop; the error carries how many records were already committed.
pub fn emit_batches<S>(
    store: &mut S,
    scope: &Scope,
    leads: &[NormalizedLead],
    chunk_size: usize,
    monitor: &mut Monitor,
) -> Result<EmitSummary>
where
    S: LeadStore + ?Sized,
{
    if chunk_size == 0 {
        return Err(IngestError::Config(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    let total_chunks = leads.len().div_ceil(chunk_size);
    let mut inserted = 0usize;

    for (idx, chunk) in leads.chunks(chunk_size).enumerate() {
        let records = chunk
            .iter()
            .cloned()
            .map(|lead| LeadInsert::new(*scope, lead))
            .collect::<Vec<_>>();
        debug!(
            "Inserting chunk {}/{} ({} record(s)) into {}",
            idx + 1,
            total_chunks,
            records.len(),
            scope
        );
        if let Err(err) = store.insert_batch(&records) {
            monitor.record(
                EventLevel::Error,
                "insert_failed",
                err.message.clone(),
                [
                    ("chunk", (idx + 1).to_string()),
                    ("inserted", inserted.to_string()),
                    ("scope", scope.id.to_string()),
                ],
            );
            return Err(IngestError::Persistence {
                inserted,
                failed_chunk: idx + 1,
                total_chunks,
                message: err.message,
            });
        }
        inserted += records.len();
        monitor.record(
            EventLevel::Debug,
            "chunk_inserted",
            format!("chunk {} of {}", idx + 1, total_chunks),
            [("size", records.len())],
        );
    }

    info!("Inserted {inserted} lead(s) in {total_chunks} chunk(s) into {scope}");
    Ok(EmitSummary {
        inserted,
        chunks: total_chunks,
    })
}
