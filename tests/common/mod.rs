#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use lead_ingest::{
    normalize::NormalizedLead,
    store::{LeadInsert, Scope},
    upload::UploadFile,
};
use tempfile::{TempDir, tempdir};
use uuid::Uuid;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn scope() -> Scope {
    Scope::campaign(
        Uuid::parse_str("5b0c7d2e-9a51-4c1e-8f0a-3d6f1b2c4e01").expect("scope id"),
        Uuid::parse_str("a1f3e2d4-0b6c-4d7e-9f8a-1c2b3d4e5f60").expect("owner id"),
    )
}

pub fn csv_upload(contents: &str) -> UploadFile {
    UploadFile::new("leads.csv", Some("text/csv"), contents.as_bytes().to_vec())
}

/// A stored lead carrying only contact fields.
pub fn stored(scope: Scope, phone: &str, email: Option<&str>) -> LeadInsert {
    LeadInsert::new(
        scope,
        NormalizedLead {
            name: Some("Existing".to_string()),
            phone: phone.to_string(),
            email: email.map(str::to_string),
            ..NormalizedLead::default()
        },
    )
}

/// `count` rows with distinct phones and emails.
pub fn unique_rows_csv(count: usize) -> String {
    let mut csv = String::from("Full Name,Phone,Email\n");
    for idx in 0..count {
        csv.push_str(&format!(
            "Lead {idx},+1555{idx:07},lead{idx}@example.com\n"
        ));
    }
    csv
}
