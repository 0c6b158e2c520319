use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::store::{Scope, ScopeKind};

#[derive(Debug, Parser)]
#[command(author, version, about = "Import CSV lead lists into campaigns and lists", long_about = None)]
pub struct Cli {
    /// YAML file overriding chunk size, upload limit, and absent-value tokens
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a lead file and show which columns map to which lead fields
    Detect(DetectArgs),
    /// Normalize and deduplicate a lead file without writing to the store
    Preview(PipelineArgs),
    /// Import the unique leads of a file into the store
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Lead file to read (.csv or .txt)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Write the detected mapping to this YAML file for editing
    #[arg(long = "save-mapping")]
    pub save_mapping: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum ScopeKindArg {
    Campaign,
    List,
}

impl From<ScopeKindArg> for ScopeKind {
    fn from(value: ScopeKindArg) -> Self {
        match value {
            ScopeKindArg::Campaign => ScopeKind::Campaign,
            ScopeKindArg::List => ScopeKind::List,
        }
    }
}

#[derive(Debug, Args)]
pub struct PipelineArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// JSON store holding previously imported leads
    #[arg(short = 's', long = "store")]
    pub store: PathBuf,
    /// Campaign or list identifier the leads belong to
    #[arg(long = "scope")]
    pub scope: Uuid,
    /// Whether --scope names a campaign or a list
    #[arg(long = "scope-kind", value_enum, default_value = "campaign")]
    pub scope_kind: ScopeKindArg,
    /// Owning user identifier
    #[arg(long = "owner")]
    pub owner: Uuid,
    /// Column mapping YAML replacing the detected mapping
    #[arg(short = 'm', long = "mapping")]
    pub mapping: Option<PathBuf>,
    /// Manual assignments such as `Cell=phone` applied after detection
    #[arg(long = "assign", action = clap::ArgAction::Append)]
    pub assign: Vec<String>,
    /// Number of classified rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// Write the duplicate report CSV to this path
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
}

impl PipelineArgs {
    pub fn scope(&self) -> Scope {
        Scope {
            kind: self.scope_kind.into(),
            id: self.scope,
            owner: self.owner,
        }
    }
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
    /// Export monitor events as JSON to this path
    #[arg(long = "events")]
    pub events: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() || first == '"' {
                return Err("Delimiter must be an ASCII character other than '\"'".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Splits `Column=field` into its parts.
pub fn parse_assignment(value: &str) -> Result<(String, crate::mapping::TargetField), String> {
    let (column, field) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("Assignment '{value}' must look like Column=field"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("Assignment '{value}' is missing a column name"));
    }
    Ok((column.to_string(), field.parse()?))
}
