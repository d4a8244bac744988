//! Server configuration management.
//!
//! Configuration can be provided via CLI arguments, environment variables
//! (prefix `BANANAS_SERVER_`) or default values, and is validated for
//! consistency (e.g. the object-store backend needs a bucket).

use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use bananas_protocol::UniqueId;

use crate::error::ConfigError;

/// Which blob backend serves downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// Local filesystem tree
    Local,
    /// S3-compatible object store
    S3,
}

/// Server configuration loaded from CLI args and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bananas-server",
    about = "Content-distribution server for OpenTTD clients",
    version
)]
pub struct ServerConfig {
    /// IP to bind both listeners to
    #[arg(long, env = "BANANAS_SERVER_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port of the binary content protocol
    #[arg(long, env = "BANANAS_SERVER_CONTENT_PORT", default_value_t = 3978)]
    pub content_port: u16,

    /// Port of the web server
    #[arg(long, env = "BANANAS_SERVER_WEB_PORT", default_value_t = 80)]
    pub web_port: u16,

    /// Blob backend serving the archives
    #[arg(long, env = "BANANAS_SERVER_STORAGE", value_enum, default_value_t = StorageKind::Local)]
    pub storage: StorageKind,

    /// Folder to use for storage (storage=local only)
    #[arg(
        long,
        env = "BANANAS_SERVER_STORAGE_LOCAL_FOLDER",
        default_value = "local_storage"
    )]
    pub storage_local_folder: PathBuf,

    /// Name of the bucket holding the archives (storage=s3 only)
    #[arg(long, env = "BANANAS_SERVER_STORAGE_S3_BUCKET")]
    pub storage_s3_bucket: Option<String>,

    /// Custom S3 endpoint, e.g. for MinIO or Ceph (storage=s3 only)
    #[arg(long, env = "BANANAS_SERVER_STORAGE_S3_ENDPOINT")]
    pub storage_s3_endpoint: Option<String>,

    /// Folder holding the YAML index tree
    #[arg(
        long,
        env = "BANANAS_SERVER_INDEX_LOCAL_FOLDER",
        default_value = "BaNaNaS"
    )]
    pub index_local_folder: PathBuf,

    /// Secret to allow an index reload. Always use this via an environment
    /// variable!
    #[arg(long, env = "BANANAS_SERVER_RELOAD_SECRET")]
    pub reload_secret: Option<String>,

    /// CDN base URLs clients fetch their HTTP downloads from; with more
    /// than one URL the pool is health-checked and balanced
    #[arg(
        long = "cdn-url",
        env = "BANANAS_SERVER_CDN_URL",
        default_value = "http://bananas.cdn.openttd.org",
        value_delimiter = ' '
    )]
    pub cdn_urls: Vec<String>,

    /// Unique-id of the base graphics entry to serve first during the
    /// client's bootstrap
    #[arg(long, env = "BANANAS_SERVER_BOOTSTRAP_UNIQUE_ID")]
    pub bootstrap_unique_id: Option<String>,

    /// Expect all incoming content streams to carry a Proxy Protocol (v1)
    /// header (HINT: for nginx, configure proxy_requests to 1)
    #[arg(long, env = "BANANAS_SERVER_PROXY_PROTOCOL")]
    pub proxy_protocol: bool,

    /// Trust the X-Forwarded-Proto header when rewriting balancer URLs to
    /// HTTPS. Only enable behind a proxy you control!
    #[arg(long, env = "BANANAS_SERVER_TRUST_FORWARDED_PROTO")]
    pub trust_forwarded_proto: bool,

    /// Only validate the index tree and exit
    #[arg(long = "validate", env = "BANANAS_SERVER_VALIDATE")]
    pub validate_only: bool,
}

impl ServerConfig {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Bind address of the content listener.
    #[must_use]
    pub const fn content_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.content_port)
    }

    /// Bind address of the web listener.
    #[must_use]
    pub const fn web_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.web_port)
    }

    /// The parsed bootstrap unique id, if configured.
    pub fn bootstrap_id(&self) -> Result<Option<UniqueId>, ConfigError> {
        self.bootstrap_unique_id
            .as_deref()
            .map(|hex_str| {
                UniqueId::from_hex(hex_str).ok_or_else(|| ConfigError::InvalidValue {
                    flag: "--bootstrap-unique-id".to_string(),
                    reason: format!("{hex_str:?} is not 8 hex characters"),
                })
            })
            .transpose()
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the selected storage backend misses its
    /// flags, no CDN URL is configured, or the bootstrap id is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage == StorageKind::S3 && self.storage_s3_bucket.is_none() {
            return Err(ConfigError::MissingRequired(
                "--storage-s3-bucket has to be given if storage is s3".to_string(),
            ));
        }

        if self.cdn_urls.is_empty() {
            return Err(ConfigError::MissingRequired(
                "at least one --cdn-url".to_string(),
            ));
        }

        self.bootstrap_id()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig::parse_from(["bananas-server"])
    }

    #[test]
    fn test_defaults() {
        let config = base_config();
        assert_eq!(config.content_addr().port(), 3978);
        assert_eq!(config.storage, StorageKind::Local);
        assert_eq!(config.cdn_urls, vec!["http://bananas.cdn.openttd.org"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_s3_requires_bucket() {
        let config = ServerConfig::parse_from(["bananas-server", "--storage", "s3"]);
        assert!(config.validate().is_err());

        let config = ServerConfig::parse_from([
            "bananas-server",
            "--storage",
            "s3",
            "--storage-s3-bucket",
            "bananas",
        ]);
        config.validate().unwrap();
    }

    #[test]
    fn test_bootstrap_id_parsing() {
        let config = ServerConfig::parse_from([
            "bananas-server",
            "--bootstrap-unique-id",
            "01020304",
        ]);
        assert_eq!(
            config.bootstrap_id().unwrap(),
            Some(UniqueId([0x01, 0x02, 0x03, 0x04]))
        );

        let config =
            ServerConfig::parse_from(["bananas-server", "--bootstrap-unique-id", "nope"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_cdn_urls() {
        let config = ServerConfig::parse_from([
            "bananas-server",
            "--cdn-url",
            "http://cdn-1.test",
            "--cdn-url",
            "http://cdn-2.test",
        ]);
        assert_eq!(config.cdn_urls.len(), 2);
    }
}
