//! Server state management and orchestration.
//!
//! Holds the shared state between the content and web listeners: the live
//! catalog snapshot, the storage backend, the CDN pool and the metrics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use prometheus::Registry;
use tokio::net::TcpListener;
use tracing::info;

use bananas_index::Catalog;
use bananas_protocol::UniqueId;
use bananas_storage::{LocalStorage, ObjectStorage, Storage};

use crate::cdn::CdnPool;
use crate::config::{ServerConfig, StorageKind};
use crate::connection;
use crate::error::{ConfigError, ReloadError, ServerError};
use crate::stats::{Metrics, VersionStats};

/// Shared application state for the content and web servers.
pub struct AppState {
    /// Live catalog snapshot; swapped atomically on reload
    catalog: RwLock<Arc<Catalog>>,

    /// Blob backend serving downloads
    storage: Arc<dyn Storage>,

    /// Root of the YAML index tree
    index_folder: PathBuf,

    /// Base graphics entry served first during client bootstrap
    bootstrap_unique_id: Option<UniqueId>,

    /// Shared secret gating `/reload`
    reload_secret: Option<String>,

    /// Whether X-Forwarded-Proto decides HTTPS URL rewrites
    trust_forwarded_proto: bool,

    /// Whether content connections start with a proxy-protocol preamble
    proxy_protocol: bool,

    /// Busy/idle gate serializing reloads
    reload_busy: tokio::sync::Mutex<()>,

    /// CDN mirror pool
    cdn: Arc<CdnPool>,

    /// Metric registry backing `/metrics`
    registry: Registry,

    /// All exported metrics
    metrics: Metrics,

    /// IP-deduplicated client version statistics
    version_stats: VersionStats,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("index_folder", &self.index_folder)
            .field("bootstrap_unique_id", &self.bootstrap_unique_id)
            .field("proxy_protocol", &self.proxy_protocol)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state from configuration.
    ///
    /// The catalog starts empty; run [`AppState::reload`] to populate it.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` on invalid configuration or when metrics
    /// cannot be registered.
    pub fn new(config: &ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let storage: Arc<dyn Storage> = match config.storage {
            StorageKind::Local => Arc::new(LocalStorage::new(&config.storage_local_folder)),
            StorageKind::S3 => {
                let bucket = config.storage_s3_bucket.clone().ok_or_else(|| {
                    ConfigError::MissingRequired("--storage-s3-bucket".to_string())
                })?;
                Arc::new(ObjectStorage::new(
                    bucket,
                    config.storage_s3_endpoint.clone(),
                ))
            }
        };

        let registry = Registry::new();
        let metrics = Metrics::new(&registry)?;

        Ok(Self {
            catalog: RwLock::new(Arc::new(Catalog::default())),
            storage,
            index_folder: config.index_local_folder.clone(),
            bootstrap_unique_id: config.bootstrap_id()?,
            reload_secret: config.reload_secret.clone(),
            trust_forwarded_proto: config.trust_forwarded_proto,
            proxy_protocol: config.proxy_protocol,
            reload_busy: tokio::sync::Mutex::new(()),
            cdn: Arc::new(CdnPool::new(config.cdn_urls.clone())),
            registry,
            metrics,
            version_stats: VersionStats::new(),
        })
    }

    /// The current catalog snapshot; the reference stays valid across a
    /// concurrent reload.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    /// Publish a freshly built snapshot.
    pub(crate) fn swap_catalog(&self, catalog: Arc<Catalog>) {
        *self.catalog.write() = catalog;
    }

    /// The blob backend.
    #[must_use]
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Owned handle to the blob backend, for the reload worker.
    #[must_use]
    pub(crate) fn storage_handle(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// Root of the YAML index tree.
    #[must_use]
    pub fn index_folder(&self) -> &Path {
        &self.index_folder
    }

    /// The configured bootstrap entry, if any.
    #[must_use]
    pub const fn bootstrap_unique_id(&self) -> Option<UniqueId> {
        self.bootstrap_unique_id
    }

    /// The configured reload secret, if any.
    #[must_use]
    pub fn reload_secret(&self) -> Option<&str> {
        self.reload_secret.as_deref()
    }

    /// Whether X-Forwarded-Proto decides HTTPS URL rewrites.
    #[must_use]
    pub const fn trust_forwarded_proto(&self) -> bool {
        self.trust_forwarded_proto
    }

    /// Whether content connections carry a proxy-protocol preamble.
    #[must_use]
    pub const fn proxy_protocol(&self) -> bool {
        self.proxy_protocol
    }

    /// The busy/idle gate serializing reloads.
    pub(crate) const fn reload_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.reload_busy
    }

    /// The CDN mirror pool.
    #[must_use]
    pub fn cdn(&self) -> &Arc<CdnPool> {
        &self.cdn
    }

    /// The metric registry backing `/metrics`.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// All exported metrics.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The client version statistics cache.
    #[must_use]
    pub const fn version_stats(&self) -> &VersionStats {
        &self.version_stats
    }

    /// Rebuild the catalog and swap it in. Re-entrant callers queue.
    ///
    /// # Errors
    ///
    /// Returns `ReloadError` when the build fails; the previous snapshot
    /// stays in service.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        crate::reload::reload(self).await
    }
}

/// Server orchestration.
pub struct Server {
    /// Shared application state
    state: Arc<AppState>,
    /// Server configuration
    config: ServerConfig,
}

impl Server {
    /// Create new server with configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the configuration is invalid.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let state = AppState::new(&config)?;
        Ok(Self {
            state: Arc::new(state),
            config,
        })
    }

    /// Shared application state.
    #[must_use]
    pub const fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run the server: initial catalog load, then both listeners until
    /// interrupted.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the initial load or a bind fails.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Loading catalog from {:?}", self.config.index_local_folder);
        self.state.reload().await?;

        if self.state.cdn().needs_probes() {
            let pool = Arc::clone(self.state.cdn());
            tokio::spawn(pool.run_probes(self.state.metrics().clone()));
        }

        let content_addr = self.config.content_addr();
        let listener =
            TcpListener::bind(content_addr)
                .await
                .map_err(|source| ServerError::ContentBindFailed {
                    addr: content_addr,
                    source,
                })?;

        let content_state = Arc::clone(&self.state);
        let content_server = tokio::spawn(async move {
            if let Err(e) = serve_content(listener, content_state).await {
                tracing::error!("Content server failed: {e}");
            }
        });

        let web_addr = self.config.web_addr();
        let web_state = Arc::clone(&self.state);
        let web_server = tokio::spawn(async move {
            if let Err(e) = crate::http::start_server(web_addr, web_state).await {
                tracing::error!("Web server failed: {e}");
            }
        });

        tokio::signal::ctrl_c().await.map_err(|e| {
            ServerError::Shutdown(format!("failed to listen for shutdown signal: {e}"))
        })?;

        info!("Shutdown signal received, stopping server");
        content_server.abort();
        web_server.abort();

        Ok(())
    }
}

/// Accept content connections until the listener dies.
///
/// # Errors
///
/// Returns `ServerError` when accepting fails fatally.
pub async fn serve_content(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Content server listening on {addr}");
    }

    loop {
        let (socket, addr) = listener.accept().await.map_err(|e| {
            ServerError::Shutdown(format!("failed to accept content connection: {e}"))
        })?;

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            connection::run_tcp_connection(state, socket, addr).await;
        });
    }
}
