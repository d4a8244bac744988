//! Immutable catalog entries.

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use bananas_protocol::{ContentType, Md5Sum, ServerInfo, UniqueId};

use crate::regions;
use crate::schema::ClassificationValue;

/// Dotted version, e.g. `14.1` as `[14, 1]`. Compares lexicographically.
pub type VersionTuple = Vec<u32>;

/// A half-open `[min, max)` version range; either bound may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    /// Inclusive lower bound
    pub min: Option<VersionTuple>,
    /// Exclusive upper bound
    pub max: Option<VersionTuple>,
}

impl VersionRange {
    /// Whether a client version falls inside the range.
    pub fn contains(&self, version: &[u32]) -> bool {
        if let Some(min) = &self.min
            && version < min.as_slice()
        {
            return false;
        }
        if let Some(max) = &self.max
            && version >= max.as_slice()
        {
            return false;
        }
        true
    }
}

/// One version of one project, never mutated after publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Content category
    pub content_type: ContentType,
    /// Internal id, assigned at index build
    pub content_id: u32,
    /// Archive size in bytes
    pub filesize: u32,
    /// Display name
    pub name: String,
    /// Version string
    pub version: String,
    /// Project URL
    pub url: String,
    /// Description text
    pub description: String,
    /// Project id, in storage byte order
    pub unique_id: UniqueId,
    /// Upload time
    pub upload_date: DateTime<Utc>,
    /// Full digest of the archive
    pub md5sum: Md5Sum,
    /// Content ids of resolved dependencies
    pub dependencies: Vec<u32>,
    /// Per-branch version ranges gating listing visibility
    pub compatibility: HashMap<String, VersionRange>,
    /// Flat sorted tag list, synthesized at load
    pub tags: Vec<String>,
}

impl ContentEntry {
    /// Borrowed wire view for a metadata reply.
    pub fn server_info(&self) -> ServerInfo<'_> {
        ServerInfo {
            content_type: self.content_type,
            content_id: self.content_id,
            filesize: self.filesize,
            name: &self.name,
            version: &self.version,
            url: &self.url,
            description: &self.description,
            unique_id: self.unique_id,
            md5sum: self.md5sum,
            dependencies: &self.dependencies,
            tags: &self.tags,
            upload_date: self.upload_date.timestamp() as u32,
        }
    }

    /// Whether a client's branch-version map admits this entry.
    ///
    /// Entries without compatibility data are visible to everyone. With
    /// data, at least one of the client's branches must be known to the
    /// entry and fall inside its range.
    pub fn matches_versions(&self, branch_versions: &HashMap<String, VersionTuple>) -> bool {
        if self.compatibility.is_empty() {
            return true;
        }
        branch_versions.iter().any(|(branch, version)| {
            self.compatibility
                .get(branch)
                .is_some_and(|range| range.contains(version))
        })
    }
}

/// Build the transmitted tag list from classifications and regions.
///
/// String classifications are added verbatim, flag classifications add
/// their key when set, and each region contributes its lowercased name
/// plus all ancestors. The result is sorted and deduplicated.
pub fn synthesize_tags(
    classification: &BTreeMap<String, ClassificationValue>,
    region_codes: &[String],
) -> Vec<String> {
    let mut tags = Vec::new();
    for (key, value) in classification {
        match value {
            ClassificationValue::Text(text) => tags.push(text.clone()),
            ClassificationValue::Flag(true) => tags.push(key.clone()),
            ClassificationValue::Flag(false) => {}
        }
    }
    for code in region_codes {
        tags.extend(regions::expand_tags(code));
    }
    tags.sort();
    tags.dedup();
    tags
}
