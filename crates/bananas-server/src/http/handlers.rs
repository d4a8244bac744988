//! Request handlers for the web surface.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tracing::{info, warn};

use crate::connection::{Peer, run_ws_connection};
use crate::helpers::safe_filename;
use crate::server::AppState;

/// Handle `POST /bananas`: resolve newline-separated content ids into CSV
/// download descriptors pointing at a healthy CDN mirror.
pub async fn handle_balancer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let https = state.trust_forwarded_proto()
        && headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            == Some("https");

    let catalog = state.catalog();
    let mut response = String::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Ok(content_id) = line.parse::<u32>() else {
            info!("Invalid ID '{line}' requested; skipping ..");
            state
                .metrics()
                .balancer_lookups
                .with_label_values(&["miss"])
                .inc();
            continue;
        };

        let Some(entry) = catalog.by_content_id(content_id) else {
            info!("Invalid ID '{content_id}' requested; skipping ..");
            state
                .metrics()
                .balancer_lookups
                .with_label_values(&["miss"])
                .inc();
            continue;
        };
        state
            .metrics()
            .balancer_lookups
            .with_label_values(&["hit"])
            .inc();

        let mut cdn_url = state.cdn().pick();
        if https {
            cdn_url = cdn_url.replacen("http://", "https://", 1);
        }

        let _ = writeln!(
            response,
            "{content_id},{},{},{cdn_url}/{}/{}/{}/{}.tar.gz",
            entry.content_type.wire_value(),
            entry.filesize,
            entry.content_type.folder_name(),
            entry.unique_id.to_hex(),
            entry.md5sum.to_hex(),
            safe_filename(entry),
        );
    }

    (StatusCode::OK, response).into_response()
}

#[derive(Debug, Deserialize)]
struct ReloadRequest {
    secret: String,
}

/// Handle `POST /reload`: 404 unless the shared secret matches, then
/// trigger a catalog reload.
pub async fn handle_reload(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    let Some(secret) = state.reload_secret() else {
        return StatusCode::NOT_FOUND;
    };
    let Ok(request) = serde_json::from_str::<ReloadRequest>(&body) else {
        return StatusCode::NOT_FOUND;
    };
    if request.secret != secret {
        return StatusCode::NOT_FOUND;
    }

    match state.reload().await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(err) => {
            tracing::error!("Reload failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Handle `GET /healthz`.
pub async fn handle_healthz() -> StatusCode {
    StatusCode::OK
}

/// Handle `GET /metrics`: exposition-format dump of all metrics.
pub async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&state.registry().gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Handle `GET /`: accept a WebSocket tunnel carrying content frames.
///
/// The tunnel binds a fresh connection state machine with proxy-protocol
/// disabled; anything that is not an upgrade request 404s.
pub async fn handle_tunnel(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(upgrade) => upgrade
            .on_upgrade(move |socket| run_ws_connection(state, socket, Peer::from(addr)))
            .into_response(),
        Err(_) => {
            warn!("Unexpected URL: /");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Catch-all: log and 404.
pub async fn handle_fallback(uri: Uri) -> StatusCode {
    warn!("Unexpected URL: {uri}");
    StatusCode::NOT_FOUND
}
