//! Content server binary entry point.
//!
//! A thin wrapper around the bananas-server library: parse configuration,
//! initialize logging, run the server (or just validate the index tree
//! with `--validate`).

use anyhow::Result;
use bananas_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_args();
    config.validate()?;

    tracing::info!(
        "Configuration loaded: content={}, web={}, index={:?}",
        config.content_addr(),
        config.web_addr(),
        config.index_local_folder
    );

    let server = Server::new(config.clone())?;

    if config.validate_only {
        server.state().reload().await?;
        tracing::info!("Index tree validated");
        return Ok(());
    }

    server.run().await?;

    tracing::info!("Shutting down bananas-server ...");
    Ok(())
}
