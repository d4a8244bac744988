//! Content-distribution server for OpenTTD clients.
//!
//! Serves the binary content protocol (catalog queries and downloads over
//! TCP), a web surface with the CDN balancer and control endpoints, and a
//! reload pipeline that rebuilds the catalog while the live snapshot keeps
//! serving.
//!
//! # Architecture
//!
//! The server uses a library-first design with the following components:
//! - `server`: shared state and orchestration (content + web listeners)
//! - `config`: configuration loading and validation
//! - `connection`: per-connection state machine for the content protocol
//! - `application`: request routing against the catalog
//! - `reload`: single-in-flight catalog rebuilds with atomic swap
//! - `http`: web server and handlers
//! - `cdn`: health-checked CDN mirror pool
//! - `stats`: metrics and the client-version cache
//!
//! # Example
//!
//! ```no_run
//! use bananas_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tracing_subscriber::fmt::init();
//!
//!     let config = ServerConfig::from_args();
//!     config.validate()?;
//!
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod application;
pub mod cdn;
pub mod config;
pub mod connection;
pub mod error;
pub mod helpers;
pub mod http;
pub mod reload;
pub mod server;
pub mod stats;

pub use cdn::CdnPool;
pub use config::{ServerConfig, StorageKind};
pub use connection::Peer;
pub use error::{ConfigError, ConnectionError, ReloadError, ServerError};
pub use helpers::safe_filename;
pub use server::{AppState, Server, serve_content};
pub use stats::{Metrics, VersionStats};
