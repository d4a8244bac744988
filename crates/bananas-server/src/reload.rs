//! Reload supervisor: single-in-flight catalog rebuilds.
//!
//! A reload drops the storage caches in the live process, runs the index
//! build on a dedicated blocking thread (the full YAML parse allocates
//! heavily and must not stall request handling), and atomically swaps the
//! published snapshot. Readers never see a partially built catalog; on
//! failure the previous snapshot stays in service.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use bananas_index::{Catalog, Md5Mapping, load_catalog};
use bananas_protocol::{ContentType, Md5Sum, UniqueId};
use bananas_storage::Storage;

use crate::error::ReloadError;
use crate::server::AppState;

/// Rebuild the catalog and swap it in. Re-entrant callers queue.
pub async fn reload(state: &AppState) -> Result<(), ReloadError> {
    let _busy = state.reload_lock().lock().await;

    // Drop per-process caches first so the build sees fresh listings.
    state.storage().clear_cache();

    let storage = state.storage_handle();
    let folder = state.index_folder().to_path_buf();
    let runtime = tokio::runtime::Handle::current();

    let result = tokio::task::spawn_blocking(move || {
        runtime.block_on(build_catalog(storage.as_ref(), &folder))
    })
    .await
    .map_err(|err| ReloadError::Worker(err.to_string()))?;

    match result {
        Ok(catalog) => {
            info!("Catalog reloaded with {} entries", catalog.len());
            state.metrics().reloads.with_label_values(&["ok"]).inc();
            state.swap_catalog(Arc::new(catalog));
            Ok(())
        }
        Err(err) => {
            state.metrics().reloads.with_label_values(&["error"]).inc();
            Err(err)
        }
    }
}

/// Enumerate storage and build the snapshot; runs off the event loop.
async fn build_catalog(storage: &dyn Storage, folder: &Path) -> Result<Catalog, ReloadError> {
    let mapping = build_md5_mapping(storage).await?;
    info!("Found {} stored archives", mapping.len());
    Ok(load_catalog(folder, &mapping)?)
}

/// Walk the content tree and map partial digests to the stored archives.
async fn build_md5_mapping(storage: &dyn Storage) -> Result<Md5Mapping, ReloadError> {
    let mut mapping = Md5Mapping::new();

    for content_type in ContentType::ALL {
        for unique_id_hex in storage.list_projects(content_type).await? {
            let Some(unique_id) = UniqueId::from_hex(&unique_id_hex) else {
                warn!(
                    "Skipping stored folder {}/{unique_id_hex}: not a unique id",
                    content_type.folder_name()
                );
                continue;
            };

            let archives = match storage.list_archives(content_type, &unique_id_hex).await {
                Ok(archives) => archives,
                Err(err) => {
                    warn!(
                        "Skipping stored folder {}/{unique_id_hex}: {err}",
                        content_type.folder_name()
                    );
                    continue;
                }
            };

            for filename in archives {
                // Archives are named "{md5_hex}.tar.gz".
                let digest_hex = filename.split('.').next().unwrap_or_default();
                let Some(md5sum) = Md5Sum::from_hex(digest_hex) else {
                    warn!(
                        "Skipping stored file {}/{unique_id_hex}/{filename}: no digest name",
                        content_type.folder_name()
                    );
                    continue;
                };
                mapping.insert(content_type, unique_id, md5sum);
            }
        }
    }

    Ok(mapping)
}
