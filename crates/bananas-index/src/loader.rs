//! Index loader: builds a catalog snapshot from the on-disk YAML tree.
//!
//! The tree is laid out as
//! `{root}/{type-folder}/{unique_id_hex}/global.yaml` plus one record per
//! version under `versions/`. Loading never fails on a single bad entry;
//! only an unreadable tree or an exhausted id space aborts the build.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_yaml::Value;
use tracing::{debug, info, warn};

use bananas_protocol::{ContentType, Md5Partial, Md5Sum, UniqueId, server_info_wire_size};

use crate::catalog::Catalog;
use crate::entry::{ContentEntry, VersionRange, VersionTuple, synthesize_tags};
use crate::error::{EntryError, IndexError};
use crate::schema::{self, VersionRecord};

/// Largest metadata frame an entry may occupy.
const MAX_ENTRY_WIRE_SIZE: usize = 1400;

/// Pre-computed mapping from partial digests to the full digests of the
/// archives actually present in storage.
#[derive(Debug, Default)]
pub struct Md5Mapping {
    map: HashMap<(ContentType, UniqueId, Md5Partial), Md5Sum>,
}

impl Md5Mapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one stored archive.
    pub fn insert(&mut self, content_type: ContentType, unique_id: UniqueId, md5sum: Md5Sum) {
        self.map
            .insert((content_type, unique_id, md5sum.partial()), md5sum);
    }

    /// Resolve a partial digest to the stored full digest.
    pub fn resolve(
        &self,
        content_type: ContentType,
        unique_id: UniqueId,
        partial: Md5Partial,
    ) -> Option<Md5Sum> {
        self.map.get(&(content_type, unique_id, partial)).copied()
    }

    /// Number of recorded archives.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no archives were recorded.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// An entry parsed from YAML, before id assignment and dependency
/// resolution.
struct PendingEntry {
    entry: ContentEntry,
    raw_dependencies: Vec<(ContentType, UniqueId, Md5Sum)>,
    active: bool,
}

/// Build a catalog snapshot from the YAML tree under `folder`.
///
/// # Errors
///
/// Returns [`IndexError::Io`] if a type folder cannot be enumerated and
/// [`IndexError::ContentIdSpaceExhausted`] when more than 255 entries share
/// one md5-tail id base. Per-entry problems are logged and skipped.
pub fn load_catalog(folder: &Path, mapping: &Md5Mapping) -> Result<Catalog, IndexError> {
    let mut pending: Vec<PendingEntry> = Vec::new();

    for content_type in ContentType::ALL {
        let type_dir = folder.join(content_type.folder_name());
        if !type_dir.is_dir() {
            continue;
        }

        let mut project_names = list_dir_sorted(&type_dir)?;
        let mut entries = 0usize;
        let mut archived = 0usize;

        for project_name in project_names.drain(..) {
            let Some(unique_id) = UniqueId::from_hex(&project_name) else {
                warn!(
                    "Skipping {} entry with malformed id folder {project_name:?}",
                    content_type.folder_name()
                );
                continue;
            };

            let before = pending.len();
            load_project(
                content_type,
                unique_id,
                &type_dir.join(&project_name),
                mapping,
                &mut pending,
            );
            for loaded in &pending[before..] {
                if loaded.active {
                    entries += 1;
                } else {
                    archived += 1;
                }
            }
        }

        info!(
            "Loaded {entries} entries and {archived} archived for {}",
            content_type.folder_name()
        );
    }

    assign_content_ids(&mut pending)?;
    Ok(build_views(pending))
}

fn list_dir_sorted(dir: &Path) -> Result<Vec<String>, IndexError> {
    let reader = std::fs::read_dir(dir).map_err(|source| IndexError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for dir_entry in reader {
        let dir_entry = dir_entry.map_err(|source| IndexError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        names.push(dir_entry.file_name().to_string_lossy().into_owned());
    }
    // Directory order is filesystem-dependent; sort so a given tree always
    // produces the same listing order.
    names.sort();
    Ok(names)
}

fn load_project(
    content_type: ContentType,
    unique_id: UniqueId,
    project_dir: &Path,
    mapping: &Md5Mapping,
    pending: &mut Vec<PendingEntry>,
) {
    let global_path = project_dir.join("global.yaml");
    let global: Value = match std::fs::read_to_string(&global_path)
        .map_err(EntryError::Io)
        .and_then(|text| serde_yaml::from_str(&text).map_err(EntryError::Yaml))
    {
        Ok(global) => global,
        Err(err) => {
            warn!("Failed to load {}: {err}. Skipping.", global_path.display());
            return;
        }
    };

    if schema::is_truthy(global.get("blacklisted")) {
        debug!("Skipping blacklisted entry {}", project_dir.display());
        return;
    }

    let versions_dir = project_dir.join("versions");
    let version_names = match list_dir_sorted(&versions_dir) {
        Ok(names) => names,
        Err(err) => {
            warn!("Failed to load {}: {err}. Skipping.", versions_dir.display());
            return;
        }
    };

    for version_name in version_names {
        let version_path = versions_dir.join(&version_name);
        match load_version(content_type, unique_id, &version_path, &global, mapping) {
            Ok(loaded) => pending.push(loaded),
            Err(err) => {
                warn!("Failed to load entry {}: {err}. Skipping.", version_path.display());
            }
        }
    }
}

fn load_version(
    content_type: ContentType,
    unique_id: UniqueId,
    path: &Path,
    global: &Value,
    mapping: &Md5Mapping,
) -> Result<PendingEntry, EntryError> {
    let text = std::fs::read_to_string(path).map_err(EntryError::Io)?;
    let raw: Value = serde_yaml::from_str(&text)?;
    let record = schema::merge_and_parse(raw, global)?;
    record.validate()?;

    let md5sum = resolve_partial(content_type, unique_id, &record.md5sum_partial, mapping)?;

    let mut raw_dependencies = Vec::with_capacity(record.dependencies.len());
    for dependency in &record.dependencies {
        let dep_type = ContentType::from_folder_name(&dependency.content_type).ok_or_else(|| {
            EntryError::Validation(format!(
                "unknown dependency content type {:?}",
                dependency.content_type
            ))
        })?;
        let dep_unique_id = UniqueId::from_hex(&dependency.unique_id).ok_or_else(|| {
            EntryError::Validation(format!(
                "malformed dependency unique id {:?}",
                dependency.unique_id
            ))
        })?;
        let dep_md5sum =
            resolve_partial(dep_type, dep_unique_id, &dependency.md5sum_partial, mapping)?;
        raw_dependencies.push((dep_type, dep_unique_id, dep_md5sum));
    }

    let compatibility = parse_compatibility(&record)?;
    let tags = synthesize_tags(&record.tagclassifications, &record.regions);

    let wire_size = server_info_wire_size(
        &record.name,
        &record.version,
        &record.url,
        &record.description,
        raw_dependencies.len(),
        &tags,
    );
    if wire_size > MAX_ENTRY_WIRE_SIZE {
        return Err(EntryError::Oversize(wire_size));
    }

    let active = record.availability.is_active();
    Ok(PendingEntry {
        entry: ContentEntry {
            content_type,
            content_id: 0,
            filesize: record.filesize,
            name: record.name,
            version: record.version,
            url: record.url,
            description: record.description,
            unique_id,
            upload_date: record.upload_date,
            md5sum,
            dependencies: Vec::new(),
            compatibility,
            tags,
        },
        raw_dependencies,
        active,
    })
}

fn resolve_partial(
    content_type: ContentType,
    unique_id: UniqueId,
    partial_hex: &str,
    mapping: &Md5Mapping,
) -> Result<Md5Sum, EntryError> {
    let partial = Md5Partial::from_hex(partial_hex)
        .ok_or_else(|| EntryError::Validation(format!("malformed md5sum-partial {partial_hex:?}")))?;
    mapping
        .resolve(content_type, unique_id, partial)
        .ok_or_else(|| EntryError::UnknownPartial(partial_hex.to_string()))
}

fn parse_compatibility(
    record: &VersionRecord,
) -> Result<HashMap<String, VersionRange>, EntryError> {
    let mut compatibility = HashMap::with_capacity(record.compatibility.len());
    for clause in &record.compatibility {
        let mut range = VersionRange::default();
        for condition in &clause.conditions {
            if let Some(version) = condition.strip_prefix(">=") {
                range.min = Some(parse_version_tuple(version)?);
            } else if let Some(version) = condition.strip_prefix('<') {
                range.max = Some(parse_version_tuple(version)?);
            } else {
                return Err(EntryError::Validation(format!(
                    "invalid compatibility condition {condition:?}"
                )));
            }
        }
        compatibility.insert(clause.name.clone(), range);
    }
    Ok(compatibility)
}

/// Parse a dotted version like `14.1` into its integer tuple.
pub fn parse_version_tuple(version: &str) -> Result<VersionTuple, EntryError> {
    version
        .split('.')
        .map(|part| {
            part.parse::<u32>()
                .map_err(|_| EntryError::Validation(format!("non-numeric version {version:?}")))
        })
        .collect()
}

/// Assign stable content ids over active and archived entries together.
///
/// The base candidate is the little-endian integer in the last 3 bytes of
/// the digest. Colliding entries are ordered by upload date (digest as the
/// tie break, so id assignment does not depend on traversal order) and get
/// an 8-bit counter in the top byte.
fn assign_content_ids(pending: &mut [PendingEntry]) -> Result<(), IndexError> {
    let mut groups: HashMap<u32, Vec<usize>> = HashMap::new();
    for (position, loaded) in pending.iter().enumerate() {
        groups
            .entry(loaded.entry.md5sum.tail24())
            .or_default()
            .push(position);
    }

    for (base, mut members) in groups {
        if members.len() > 255 {
            return Err(IndexError::ContentIdSpaceExhausted { base });
        }
        members.sort_by_key(|&position| {
            let entry = &pending[position].entry;
            (entry.upload_date, entry.md5sum.0)
        });
        for (counter, position) in members.into_iter().enumerate() {
            pending[position].entry.content_id = ((counter as u32) << 24) | base;
        }
    }

    Ok(())
}

fn build_views(pending: Vec<PendingEntry>) -> Catalog {
    // Everything is known now; resolve raw dependencies to content ids.
    let mut id_by_triple: HashMap<(ContentType, UniqueId, Md5Sum), u32> =
        HashMap::with_capacity(pending.len());
    for loaded in &pending {
        let entry = &loaded.entry;
        id_by_triple.insert(
            (entry.content_type, entry.unique_id, entry.md5sum),
            entry.content_id,
        );
    }

    let mut by_content_id = HashMap::with_capacity(pending.len());
    let mut by_content_type: HashMap<ContentType, Vec<Arc<ContentEntry>>> = HashMap::new();
    let mut by_unique_id: HashMap<(ContentType, UniqueId), Arc<ContentEntry>> = HashMap::new();
    let mut by_unique_id_and_md5sum = HashMap::with_capacity(pending.len());

    for loaded in pending {
        let mut entry = loaded.entry;
        for (dep_type, dep_unique_id, dep_md5sum) in loaded.raw_dependencies {
            match id_by_triple.get(&(dep_type, dep_unique_id, dep_md5sum)) {
                Some(&content_id) => entry.dependencies.push(content_id),
                None => {
                    tracing::error!(
                        "Invalid dependency {}/{dep_unique_id}/{dep_md5sum} of {}/{}; dropping",
                        dep_type.folder_name(),
                        entry.content_type.folder_name(),
                        entry.unique_id
                    );
                }
            }
        }

        let entry = Arc::new(entry);
        by_content_id.insert(entry.content_id, Arc::clone(&entry));
        by_unique_id_and_md5sum.insert(
            (entry.content_type, entry.unique_id, entry.md5sum),
            Arc::clone(&entry),
        );

        if loaded.active {
            by_content_type
                .entry(entry.content_type)
                .or_default()
                .push(Arc::clone(&entry));

            // Latest active version wins the project-level lookup.
            by_unique_id
                .entry((entry.content_type, entry.unique_id))
                .and_modify(|current| {
                    if entry.upload_date > current.upload_date {
                        *current = Arc::clone(&entry);
                    }
                })
                .or_insert_with(|| Arc::clone(&entry));
        }
    }

    Catalog::new(
        by_content_id,
        by_content_type,
        by_unique_id,
        by_unique_id_and_md5sum,
    )
}
