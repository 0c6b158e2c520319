//! Destination store interface and the two local implementations.
//!
//! The hosted backend is reached only through [`LeadStore`]: one lookup of the
//! contacts already stored for a scope, then chunked inserts. [`MemoryStore`]
//! backs tests; [`JsonFileStore`] lets the command-line tool run end to end
//! against a JSON document on disk.

use std::{
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::StoreError, normalize::NormalizedLead};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Campaign,
    List,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Campaign => f.write_str("campaign"),
            ScopeKind::List => f.write_str("list"),
        }
    }
}

/// The campaign or list that bounds duplicate detection and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: Uuid,
    pub owner: Uuid,
}

impl Scope {
    pub fn campaign(id: Uuid, owner: Uuid) -> Self {
        Self {
            kind: ScopeKind::Campaign,
            id,
            owner,
        }
    }

    pub fn list(id: Uuid, owner: Uuid) -> Self {
        Self {
            kind: ScopeKind::List,
            id,
            owner,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPair {
    pub phone: String,
    pub email: Option<String>,
}

/// Snapshot of `(phone, email)` pairs already stored for a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingContacts {
    pairs: Vec<ContactPair>,
}

impl ExistingContacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, phone: impl Into<String>, email: Option<&str>) {
        self.pairs.push(ContactPair {
            phone: phone.into(),
            email: email.map(str::to_string),
        });
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactPair> {
        self.pairs.iter()
    }
}

impl FromIterator<ContactPair> for ExistingContacts {
    fn from_iter<T: IntoIterator<Item = ContactPair>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// A lead ready to persist, with its scope and owner attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadInsert {
    pub id: Uuid,
    pub scope: Scope,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub lead: NormalizedLead,
}

impl LeadInsert {
    pub fn new(scope: Scope, lead: NormalizedLead) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            created_at: Utc::now(),
            lead,
        }
    }
}

pub trait LeadStore {
    /// Contacts currently stored for `scope`.
    fn existing_contacts(&self, scope: &Scope) -> Result<ExistingContacts, StoreError>;

    /// Persists every record or none of them.
    fn insert_batch(&mut self, records: &[LeadInsert]) -> Result<(), StoreError>;
}

fn contacts_for<'a>(
    records: impl Iterator<Item = &'a LeadInsert>,
    scope: &Scope,
) -> ExistingContacts {
    records
        .filter(|record| record.scope == *scope)
        .map(|record| ContactPair {
            phone: record.lead.phone.clone(),
            email: record.lead.email.clone(),
        })
        .collect()
}

/// In-process store with optional failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<LeadInsert>,
    insert_sizes: Vec<usize>,
    fail_insert_call: Option<usize>,
    fail_lookup: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<LeadInsert>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Makes the `call`-th insert (1-based) fail.
    pub fn fail_on_insert(mut self, call: usize) -> Self {
        self.fail_insert_call = Some(call);
        self
    }

    pub fn fail_lookup(mut self, message: impl Into<String>) -> Self {
        self.fail_lookup = Some(message.into());
        self
    }

    pub fn clear_failures(&mut self) {
        self.fail_insert_call = None;
        self.fail_lookup = None;
    }

    pub fn records(&self) -> &[LeadInsert] {
        &self.records
    }

    /// Sizes of every insert call made so far, including failed ones.
    pub fn insert_sizes(&self) -> &[usize] {
        &self.insert_sizes
    }
}

impl LeadStore for MemoryStore {
    fn existing_contacts(&self, scope: &Scope) -> Result<ExistingContacts, StoreError> {
        if let Some(message) = &self.fail_lookup {
            return Err(StoreError::new(message.clone()));
        }
        Ok(contacts_for(self.records.iter(), scope))
    }

    fn insert_batch(&mut self, records: &[LeadInsert]) -> Result<(), StoreError> {
        self.insert_sizes.push(records.len());
        if self.fail_insert_call == Some(self.insert_sizes.len()) {
            return Err(StoreError::new("insert rejected by store"));
        }
        self.records.extend_from_slice(records);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    leads: Vec<LeadInsert>,
}

/// Leads kept in a single JSON document, rewritten atomically per chunk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: StoreDocument,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let document: StoreDocument = if path.exists() {
            let file = File::open(path)
                .map_err(|err| StoreError::new(format!("opening store {path:?}: {err}")))?;
            serde_json::from_reader(BufReader::new(file))
                .map_err(|err| StoreError::new(format!("parsing store {path:?}: {err}")))?
        } else {
            StoreDocument::default()
        };
        debug!(
            "Opened store {:?} with {} lead(s)",
            path,
            document.leads.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn len(&self) -> usize {
        self.document.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.leads.is_empty()
    }

    pub fn leads(&self) -> &[LeadInsert] {
        &self.document.leads
    }

    fn write_document(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let temp = self.path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&temp)?);
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
            fs::rename(&temp, &self.path)
        };
        write().map_err(|err| StoreError::new(format!("writing store {:?}: {err}", self.path)))
    }
}

impl LeadStore for JsonFileStore {
    fn existing_contacts(&self, scope: &Scope) -> Result<ExistingContacts, StoreError> {
        Ok(contacts_for(self.document.leads.iter(), scope))
    }

    fn insert_batch(&mut self, records: &[LeadInsert]) -> Result<(), StoreError> {
        let mut next = self.document.clone();
        next.leads.extend_from_slice(records);
        self.write_document(&next)?;
        self.document = next;
        Ok(())
    }
}
