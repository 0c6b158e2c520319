//! Conversion of raw rows into typed lead records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::IngestConfig,
    mapping::{ColumnMapping, TargetField},
    parser::{ParsedCsv, RawRow},
};

/// A lead with its five target fields validated and trimmed.
///
/// `phone` is an empty string when absent because the destination column is
/// non-nullable; every other field uses `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLead {
    #[serde(skip)]
    pub line: u64,
    pub name: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
}

impl NormalizedLead {
    pub fn field(&self, field: TargetField) -> Option<&str> {
        match field {
            TargetField::Name => self.name.as_deref(),
            TargetField::Phone => Some(self.phone.as_str()).filter(|phone| !phone.is_empty()),
            TargetField::Email => self.email.as_deref(),
            TargetField::CompanyName => self.company_name.as_deref(),
            TargetField::JobTitle => self.job_title.as_deref(),
        }
    }

    pub fn phone_key(&self) -> Option<&str> {
        self.field(TargetField::Phone)
    }

    pub fn email_key(&self) -> Option<&str> {
        self.field(TargetField::Email)
    }

    /// A lead counts only when it carries a name, a phone, or an email.
    pub fn is_contactable(&self) -> bool {
        self.name.is_some() || !self.phone.is_empty() || self.email.is_some()
    }

    fn set(&mut self, field: TargetField, value: String) {
        match field {
            TargetField::Name => self.name = Some(value),
            TargetField::Phone => self.phone = value,
            TargetField::Email => self.email = Some(value),
            TargetField::CompanyName => self.company_name = Some(value),
            TargetField::JobTitle => self.job_title = Some(value),
        }
    }

    /// Re-expresses this lead as a raw row keyed by target field names and
    /// custom field names, with absent values rendered as empty cells.
    ///
    /// A custom field named exactly like a target field (possible when such a
    /// column was unassigned) is left out, since its cell would collide with
    /// the target's.
    pub fn as_raw_row(&self) -> (Vec<String>, RawRow) {
        let mut headers = Vec::new();
        let mut cells = BTreeMap::new();
        for field in TargetField::ALL {
            headers.push(field.as_str().to_string());
            cells.insert(
                field.as_str().to_string(),
                self.field(field).unwrap_or_default().to_string(),
            );
        }
        for (key, value) in &self.custom_fields {
            if is_target_name(key) {
                continue;
            }
            headers.push(key.clone());
            cells.insert(key.clone(), value.clone());
        }
        (headers, RawRow::new(self.line, cells))
    }
}

fn is_target_name(key: &str) -> bool {
    TargetField::ALL.iter().any(|field| field.as_str() == key)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Lead(NormalizedLead),
    /// Row had none of name, phone, or email.
    Dropped { line: u64 },
}

fn present<'a>(raw: Option<&'a str>, config: &IngestConfig) -> Option<&'a str> {
    let trimmed = raw?.trim();
    (!config.is_absent(trimmed)).then_some(trimmed)
}

pub fn normalize_row(
    row: &RawRow,
    headers: &[String],
    mapping: &ColumnMapping,
    config: &IngestConfig,
) -> Normalized {
    let mut lead = NormalizedLead {
        line: row.line,
        ..NormalizedLead::default()
    };
    for header in headers {
        let Some(value) = present(row.get(header), config) else {
            continue;
        };
        match mapping.target_for(header) {
            Some(field) => lead.set(field, value.to_string()),
            None => {
                lead.custom_fields.insert(header.clone(), value.to_string());
            }
        }
    }
    if lead.is_contactable() {
        Normalized::Lead(lead)
    } else {
        Normalized::Dropped { line: row.line }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub leads: Vec<NormalizedLead>,
    /// Line numbers of rows excluded before deduplication.
    pub dropped: Vec<u64>,
}

impl NormalizedBatch {
    pub fn rows_parsed(&self) -> usize {
        self.leads.len() + self.dropped.len()
    }
}

pub fn normalize_batch(
    parsed: &ParsedCsv,
    mapping: &ColumnMapping,
    config: &IngestConfig,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for row in &parsed.rows {
        match normalize_row(row, &parsed.headers, mapping, config) {
            Normalized::Lead(lead) => batch.leads.push(lead),
            Normalized::Dropped { line } => batch.dropped.push(line),
        }
    }
    batch
}
