//! Catalog index for the OpenTTD content server.
//!
//! Loads the per-entry YAML tree into an immutable, multi-keyed snapshot
//! with stable, collision-resistant content-id assignment.
//!
//! # Architecture
//!
//! - `schema`: YAML record shapes, merging and field validation
//! - `regions`: the static region taxonomy feeding listing tags
//! - `entry`: immutable entries with version-range matching
//! - `loader`: tree traversal, digest resolution and id assignment
//! - `catalog`: the published snapshot with its four lookup views
//!
//! Snapshots are value types: once [`loader::load_catalog`] returns, the
//! catalog is never mutated. Reload replaces the whole snapshot.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod catalog;
pub mod entry;
pub mod error;
pub mod loader;
pub mod regions;
pub mod schema;

pub use catalog::Catalog;
pub use entry::{ContentEntry, VersionRange, VersionTuple, synthesize_tags};
pub use error::{EntryError, IndexError};
pub use loader::{Md5Mapping, load_catalog, parse_version_tuple};
pub use schema::{Availability, ClassificationValue, VersionRecord};
