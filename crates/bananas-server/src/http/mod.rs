//! Web surface: balancer, control endpoints and the WebSocket tunnel.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::server::AppState;

pub mod handlers;

/// Create the router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", axum::routing::get(handlers::handle_tunnel))
        .route("/bananas", axum::routing::post(handlers::handle_balancer))
        .route("/reload", axum::routing::post(handlers::handle_reload))
        .route("/healthz", axum::routing::get(handlers::handle_healthz))
        .route("/metrics", axum::routing::get(handlers::handle_metrics))
        .fallback(handlers::handle_fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server.
///
/// # Errors
///
/// Returns `ServerError` if the server fails to bind or encounters a
/// runtime error.
pub async fn start_server(bind_addr: SocketAddr, state: Arc<AppState>) -> Result<(), ServerError> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::WebBindFailed {
            addr: bind_addr,
            source,
        })?;

    tracing::info!("Web server listening on {bind_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| ServerError::Shutdown(format!("web server error: {e}")))?;

    Ok(())
}
