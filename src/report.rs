//! Duplicate report rendering.
//!
//! Built only from the in-memory duplicate list; the store is never queried.

use std::io::Write;

use anyhow::{Context, Result};

use crate::{dedup::DuplicateRecord, io_utils};

pub const REPORT_HEADERS: [&str; 6] = ["Name", "Phone", "Email", "Company", "Job Title", "Reason"];

pub fn write_duplicate_report<W: Write>(writer: W, duplicates: &[DuplicateRecord]) -> Result<()> {
    let mut writer = io_utils::csv_writer(writer, io_utils::DEFAULT_CSV_DELIMITER);
    writer
        .write_record(REPORT_HEADERS)
        .context("Writing report headers")?;
    for duplicate in duplicates {
        let lead = &duplicate.lead;
        writer
            .write_record([
                lead.name.as_deref().unwrap_or_default(),
                lead.phone.as_str(),
                lead.email.as_deref().unwrap_or_default(),
                lead.company_name.as_deref().unwrap_or_default(),
                lead.job_title.as_deref().unwrap_or_default(),
                duplicate.reason.as_str(),
            ])
            .with_context(|| format!("Writing report row for line {}", lead.line))?;
    }
    writer.flush().context("Flushing duplicate report")?;
    Ok(())
}

pub fn duplicate_report_string(duplicates: &[DuplicateRecord]) -> Result<String> {
    let mut buffer = Vec::new();
    write_duplicate_report(&mut buffer, duplicates)?;
    String::from_utf8(buffer).context("Duplicate report is not valid UTF-8")
}
