//! YAML schema of per-entry records.
//!
//! Each project folder carries a `global.yaml` plus one record per version
//! under `versions/`. Keys missing from a version record are taken from the
//! global record before deserialization. Most of the length limits here are
//! limitations of the OpenTTD client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::EntryError;

/// Maximum number of region codes per entry.
pub const MAX_REGIONS: usize = 10;

/// Availability of one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Availability {
    /// Active: offered in listings for new games
    #[serde(rename = "new-games")]
    NewGames,
    /// Archived: reachable by exact key only
    #[serde(rename = "archived")]
    Archived,
}

impl Availability {
    /// Whether this version shows up in listings.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::NewGames)
    }
}

/// A classification value: a free-form string or a yes/no flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ClassificationValue {
    /// Flag classifications add their key as a tag when true
    Flag(bool),
    /// String classifications are added as tags verbatim
    Text(String),
}

/// Reference to another entry by project id and partial digest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawDependency {
    /// Folder name of the dependency's category
    pub content_type: String,
    /// Project id, 8 hex chars
    pub unique_id: String,
    /// First 8 hex chars of the dependency's digest
    pub md5sum_partial: String,
}

/// One compatibility clause: a branch name plus its version conditions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawCompatibility {
    /// Branch name, e.g. `vanilla`
    pub name: String,
    /// Conditions of the form `>=a.b.c` or `<a.b.c`
    pub conditions: Vec<String>,
}

/// A fully merged version record, before resolution against storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VersionRecord {
    /// Archive size in bytes
    pub filesize: u32,
    /// Display name (client limit: 31 chars)
    pub name: String,
    /// Version string (client limit: 15 chars)
    pub version: String,
    /// Project URL (client limit: 95 chars)
    #[serde(default)]
    pub url: String,
    /// Description (client limit: 511 chars)
    #[serde(default)]
    pub description: String,
    /// First 8 hex chars of the archive digest
    pub md5sum_partial: String,
    /// Upload time
    pub upload_date: DateTime<Utc>,
    /// Listing availability
    pub availability: Availability,
    /// Entries this version depends on
    #[serde(default)]
    pub dependencies: Vec<RawDependency>,
    /// Per-branch version constraints gating listing visibility
    #[serde(default)]
    pub compatibility: Vec<RawCompatibility>,
    /// Classification map feeding the tag list
    #[serde(default)]
    pub tagclassifications: BTreeMap<String, ClassificationValue>,
    /// Region codes (limit: 10)
    #[serde(default)]
    pub regions: Vec<String>,
}

impl VersionRecord {
    /// Enforce the client's field length limits.
    pub fn validate(&self) -> Result<(), EntryError> {
        check_len("name", &self.name, 31)?;
        check_len("version", &self.version, 15)?;
        check_len("url", &self.url, 95)?;
        check_len("description", &self.description, 511)?;
        if self.regions.len() > MAX_REGIONS {
            return Err(EntryError::Validation(format!(
                "{} regions exceed the limit of {MAX_REGIONS}",
                self.regions.len()
            )));
        }
        Ok(())
    }
}

fn check_len(field: &str, value: &str, limit: usize) -> Result<(), EntryError> {
    if value.len() > limit {
        return Err(EntryError::Validation(format!(
            "{field} of {} bytes exceeds the limit of {limit}",
            value.len()
        )));
    }
    Ok(())
}

/// Whether a `blacklisted` value marks the whole project as skipped.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64() != Some(0.0),
        _ => false,
    }
}

/// Merge keys missing from a version record in from the global record,
/// then deserialize.
pub fn merge_and_parse(version: Value, global: &Value) -> Result<VersionRecord, EntryError> {
    let mut version = version;
    if let (Value::Mapping(merged), Value::Mapping(defaults)) = (&mut version, global) {
        for (key, value) in defaults {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(serde_yaml::from_value(version)?)
}
