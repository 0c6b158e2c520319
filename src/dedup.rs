//! Duplicate detection against the stored snapshot and within the batch.
//!
//! Phones and emails are tracked in two independent seen-maps seeded from the
//! store. Records are checked in input order; a duplicate is never added to the
//! maps, so the first occurrence of a value is the only one that survives.

use std::collections::HashMap;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    normalize::{NormalizedBatch, NormalizedLead},
    store::ExistingContacts,
};

pub const PHONE_EXISTS: &str = "Phone already exists";
pub const EMAIL_EXISTS: &str = "Email already exists";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    /// At least one matching value was already in the store.
    Existing,
    /// Every matching value came from an earlier row of this upload.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    pub lead: NormalizedLead,
    pub reason: String,
    pub kind: DuplicateKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Raw data rows read from the file, including dropped ones.
    pub rows_parsed: usize,
    /// Rows dropped before deduplication for lacking name, phone, and email.
    pub dropped: usize,
    /// Rows that reached deduplication; always `valid + duplicates`.
    pub total: usize,
    pub valid: usize,
    pub duplicates: usize,
    pub existing_duplicates: usize,
    pub internal_duplicates: usize,
}

impl BatchStats {
    pub fn is_consistent(&self) -> bool {
        self.total == self.valid + self.duplicates
            && self.duplicates == self.existing_duplicates + self.internal_duplicates
            && self.rows_parsed == self.total + self.dropped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub unique: Vec<NormalizedLead>,
    pub duplicates: Vec<DuplicateRecord>,
    pub stats: BatchStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Store,
    Batch,
}

#[derive(Debug, Default)]
struct SeenValues {
    phones: HashMap<String, Origin>,
    emails: HashMap<String, Origin>,
}

impl SeenValues {
    fn seeded(existing: &ExistingContacts) -> Self {
        let mut seen = Self::default();
        for pair in existing.iter() {
            let phone = pair.phone.trim();
            if !phone.is_empty() {
                seen.phones.insert(phone.to_string(), Origin::Store);
            }
            if let Some(email) = pair.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
                seen.emails.insert(email.to_string(), Origin::Store);
            }
        }
        seen
    }

    fn remember(&mut self, lead: &NormalizedLead) {
        if let Some(phone) = lead.phone_key() {
            self.phones.insert(phone.to_string(), Origin::Batch);
        }
        if let Some(email) = lead.email_key() {
            self.emails.insert(email.to_string(), Origin::Batch);
        }
    }
}

/// Splits a normalized batch into unique records and duplicates, preserving
/// input order. Rows the normalizer dropped are only counted.
pub fn classify(batch: NormalizedBatch, existing: &ExistingContacts) -> Classification {
    let NormalizedBatch { leads, dropped } = batch;
    let mut seen = SeenValues::seeded(existing);
    let mut result = Classification {
        stats: BatchStats {
            rows_parsed: leads.len() + dropped.len(),
            dropped: dropped.len(),
            total: leads.len(),
            ..BatchStats::default()
        },
        ..Classification::default()
    };

    for lead in leads {
        let phone_match = lead.phone_key().and_then(|phone| seen.phones.get(phone).copied());
        let email_match = lead.email_key().and_then(|email| seen.emails.get(email).copied());
        if phone_match.is_none() && email_match.is_none() {
            seen.remember(&lead);
            result.unique.push(lead);
            continue;
        }

        let reason = [
            phone_match.map(|_| PHONE_EXISTS),
            email_match.map(|_| EMAIL_EXISTS),
        ]
        .into_iter()
        .flatten()
        .join(", ");
        let kind = if phone_match == Some(Origin::Store) || email_match == Some(Origin::Store) {
            result.stats.existing_duplicates += 1;
            DuplicateKind::Existing
        } else {
            result.stats.internal_duplicates += 1;
            DuplicateKind::Internal
        };
        result.duplicates.push(DuplicateRecord { lead, reason, kind });
    }

    result.stats.valid = result.unique.len();
    result.stats.duplicates = result.duplicates.len();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(phone: &str, email: Option<&str>) -> NormalizedLead {
        NormalizedLead {
            phone: phone.to_string(),
            email: email.map(str::to_string),
            ..NormalizedLead::default()
        }
    }

    fn batch(leads: Vec<NormalizedLead>) -> NormalizedBatch {
        NormalizedBatch {
            leads,
            dropped: Vec::new(),
        }
    }

    #[test]
    fn chain_of_shared_phone_keeps_first() {
        let leads = vec![
            lead("+1555", None),
            lead("+1555", Some("b@x.io")),
            lead("+1555", Some("c@x.io")),
            lead("+1999", Some("b@x.io")),
        ];
        let result = classify(batch(leads), &ExistingContacts::new());
        assert_eq!(result.stats.internal_duplicates, 2);
        // The email of a duplicate row is never remembered.
        assert_eq!(result.unique.len(), 2);
        assert_eq!(result.unique[1].phone, "+1999");
    }

    #[test]
    fn both_reasons_are_joined() {
        let mut existing = ExistingContacts::new();
        existing.push("+1555", Some("a@b.com"));
        let result = classify(batch(vec![lead("+1555", Some("a@b.com"))]), &existing);
        assert_eq!(result.duplicates[0].reason, "Phone already exists, Email already exists");
        assert_eq!(result.duplicates[0].kind, DuplicateKind::Existing);
    }

    #[test]
    fn store_match_wins_over_batch_match() {
        let mut existing = ExistingContacts::new();
        existing.push("", Some("old@x.io"));
        let leads = vec![lead("+1", None), lead("+1", Some("old@x.io"))];
        let result = classify(batch(leads), &existing);
        assert_eq!(result.stats.existing_duplicates, 1);
        assert_eq!(result.stats.internal_duplicates, 0);
    }

    #[test]
    fn empty_existing_phone_is_not_seeded() {
        let mut existing = ExistingContacts::new();
        existing.push("", None);
        let result = classify(batch(vec![lead("", Some("a@b.com"))]), &existing);
        assert_eq!(result.stats.valid, 1);
        assert!(result.stats.is_consistent());
    }

    #[test]
    fn dropped_rows_count_toward_rows_parsed_only() {
        let result = classify(
            NormalizedBatch {
                leads: vec![lead("+1", None)],
                dropped: vec![3, 5],
            },
            &ExistingContacts::new(),
        );
        assert_eq!(result.stats.rows_parsed, 3);
        assert_eq!(result.stats.dropped, 2);
        assert_eq!(result.stats.total, 1);
        assert!(result.stats.is_consistent());
    }
}
