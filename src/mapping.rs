//! Source-column to target-field mapping and its detection heuristic.
//!
//! Detection lower-cases each header and looks for keyword substrings, trying
//! target fields in a fixed precedence. It is a starting point only; callers
//! correct it with [`ColumnMapping::assign`] and [`ColumnMapping::unassign`].

use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetField {
    Name,
    Phone,
    Email,
    CompanyName,
    JobTitle,
}

impl TargetField {
    /// Detection precedence.
    pub const ALL: [TargetField; 5] = [
        TargetField::Name,
        TargetField::Phone,
        TargetField::Email,
        TargetField::CompanyName,
        TargetField::JobTitle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetField::Name => "name",
            TargetField::Phone => "phone",
            TargetField::Email => "email",
            TargetField::CompanyName => "company_name",
            TargetField::JobTitle => "job_title",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            TargetField::Name => &["name", "full_name", "first_name"],
            TargetField::Phone => &["phone", "mobile", "cell"],
            TargetField::Email => &["email", "mail"],
            TargetField::CompanyName => &["company", "organization"],
            TargetField::JobTitle => &["title", "position", "job"],
        }
    }

    fn matches(self, lowered_header: &str) -> bool {
        self.keywords()
            .iter()
            .any(|keyword| lowered_header.contains(keyword))
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        TargetField::ALL
            .into_iter()
            .find(|field| field.as_str() == lowered)
            .ok_or_else(|| {
                format!(
                    "Unknown target field '{value}' (expected one of name, phone, email, company_name, job_title)"
                )
            })
    }
}

/// First target field whose keywords occur in `header`, ignoring case.
pub fn detect_target(header: &str) -> Option<TargetField> {
    let lowered = header.to_lowercase();
    TargetField::ALL
        .into_iter()
        .find(|field| field.matches(&lowered))
}

/// Source column → target field, with each target held by at most one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    columns: BTreeMap<String, TargetField>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Auto-populates a mapping from header names.
    ///
    /// A header whose first matching target is already taken falls through to
    /// its next matching target; with none left it stays unmapped.
    pub fn detect(headers: &[String]) -> Self {
        let mut mapping = Self::new();
        for header in headers {
            let lowered = header.to_lowercase();
            let candidate = TargetField::ALL
                .into_iter()
                .filter(|field| field.matches(&lowered))
                .find(|field| mapping.source_for(*field).is_none());
            if let Some(field) = candidate {
                mapping.columns.insert(header.clone(), field);
            }
        }
        mapping
    }

    /// Maps `source` to `target`, releasing any column that held `target` before.
    pub fn assign(&mut self, source: &str, target: TargetField) {
        self.columns.retain(|column, field| *field != target || column == source);
        self.columns.insert(source.to_string(), target);
    }

    pub fn unassign(&mut self, source: &str) -> Option<TargetField> {
        self.columns.remove(source)
    }

    pub fn target_for(&self, source: &str) -> Option<TargetField> {
        self.columns.get(source).copied()
    }

    pub fn source_for(&self, target: TargetField) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, field)| **field == target)
            .map(|(column, _)| column.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TargetField)> {
        self.columns
            .iter()
            .map(|(column, field)| (column.as_str(), *field))
    }

    /// Headers not assigned to any target, in header order.
    pub fn unmapped<'a>(&self, headers: &'a [String]) -> Vec<&'a str> {
        headers
            .iter()
            .filter(|header| !self.columns.contains_key(header.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Identity mapping over the target field names themselves.
    pub fn identity() -> Self {
        let mut mapping = Self::new();
        for field in TargetField::ALL {
            mapping.columns.insert(field.as_str().to_string(), field);
        }
        mapping
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
        let mapping: ColumnMapping = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing mapping YAML {path:?}"))?;
        Ok(mapping)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating mapping file {path:?}"))?;
        serde_yaml::to_writer(BufWriter::new(file), self).context("Writing mapping YAML")
    }
}
