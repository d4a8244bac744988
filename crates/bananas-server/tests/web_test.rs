//! Integration tests for the web surface.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tempfile::TempDir;

use bananas_protocol::{ContentType, Md5Sum};
use bananas_server::http::create_router;
use bananas_server::{AppState, ServerConfig};

fn md5(partial: [u8; 4], tail: [u8; 3]) -> Md5Sum {
    let mut digest = [0u8; 16];
    digest[..4].copy_from_slice(&partial);
    digest[13..].copy_from_slice(&tail);
    Md5Sum(digest)
}

fn add_entry(root: &Path, content_type: ContentType, unique_id_hex: &str, digest: Md5Sum) {
    let storage_dir = root
        .join("storage")
        .join(content_type.folder_name())
        .join(unique_id_hex);
    std::fs::create_dir_all(&storage_dir).unwrap();
    std::fs::write(
        storage_dir.join(format!("{}.tar.gz", digest.to_hex())),
        b"blob",
    )
    .unwrap();

    let index_dir = root
        .join("index")
        .join(content_type.folder_name())
        .join(unique_id_hex);
    std::fs::create_dir_all(index_dir.join("versions")).unwrap();
    std::fs::write(
        index_dir.join("global.yaml"),
        "name: North American Set\nurl: https://example.test\n",
    )
    .unwrap();
    std::fs::write(
        index_dir.join("versions").join("1.0.yaml"),
        format!(
            "filesize: 4\n\
             version: '2.1'\n\
             md5sum-partial: {}\n\
             upload-date: 2024-01-01T00:00:00+00:00\n\
             availability: new-games\n",
            &digest.to_hex()[..8],
        ),
    )
    .unwrap();
}

async fn build_state(root: &Path, extra_args: &[&str]) -> Arc<AppState> {
    std::fs::create_dir_all(root.join("storage")).unwrap();
    std::fs::create_dir_all(root.join("index")).unwrap();

    let mut args = vec![
        "bananas-server".to_string(),
        "--storage-local-folder".to_string(),
        root.join("storage").display().to_string(),
        "--index-local-folder".to_string(),
        root.join("index").display().to_string(),
    ];
    args.extend(extra_args.iter().map(ToString::to_string));

    let config = ServerConfig::parse_from(args);
    let state = Arc::new(AppState::new(&config).unwrap());
    state.reload().await.unwrap();
    state
}

async fn spawn_web(state: Arc<AppState>) -> String {
    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_balancer_resolves_ids_to_cdn_urls() {
    let root = TempDir::new().unwrap();
    let digest = md5([0x11, 0x11, 0x11, 0x11], [0xef, 0xcd, 0xab]);
    add_entry(root.path(), ContentType::NewGrf, "01020304", digest);

    let state = build_state(root.path(), &["--cdn-url", "http://cdn.test"]).await;
    let base = spawn_web(state).await;

    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/bananas"))
        .body(format!("{}\nnot-a-number\n999\n", 0x00ab_cdef))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    // One line for the valid id; the junk and the unknown id are skipped.
    assert_eq!(
        body,
        format!(
            "{},2,4,http://cdn.test/newgrf/01020304/{}/01020304-North_American_Set-2.1.tar.gz\n",
            0x00ab_cdef,
            digest.to_hex()
        )
    );
}

#[tokio::test]
async fn test_balancer_https_rewrite_needs_trust() {
    let root = TempDir::new().unwrap();
    let digest = md5([0x21, 0x21, 0x21, 0x21], [0x01, 0x00, 0x00]);
    add_entry(root.path(), ContentType::Ai, "0000aaaa", digest);

    // Trust enabled: the forwarded proto upgrades the URL scheme.
    let state = build_state(
        root.path(),
        &["--cdn-url", "http://cdn.test", "--trust-forwarded-proto"],
    )
    .await;
    let base = spawn_web(state).await;
    let client = reqwest::Client::new();

    let body = client
        .post(format!("{base}/bananas"))
        .header("X-Forwarded-Proto", "https")
        .body("1\n")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.starts_with("1,3,4,https://cdn.test/"), "{body}");

    // Trust disabled: the header is ignored.
    let state = build_state(root.path(), &["--cdn-url", "http://cdn.test"]).await;
    let base = spawn_web(state).await;
    let body = client
        .post(format!("{base}/bananas"))
        .header("X-Forwarded-Proto", "https")
        .body("1\n")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.starts_with("1,3,4,http://cdn.test/"), "{body}");
}

#[tokio::test]
async fn test_reload_endpoint_is_secret_gated() {
    let root = TempDir::new().unwrap();
    let client = reqwest::Client::new();

    // No secret configured: the endpoint does not exist.
    let state = build_state(root.path(), &[]).await;
    let base = spawn_web(state).await;
    let status = client
        .post(format!("{base}/reload"))
        .body(r#"{"secret": "sesame"}"#)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

    // With a secret: wrong body 404s, the right one reloads.
    let state = build_state(root.path(), &["--reload-secret", "sesame"]).await;
    let base = spawn_web(state).await;

    let status = client
        .post(format!("{base}/reload"))
        .body(r#"{"secret": "wrong"}"#)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

    let status = client
        .post(format!("{base}/reload"))
        .body(r#"{"secret": "sesame"}"#)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_healthz_metrics_and_fallback() {
    let root = TempDir::new().unwrap();
    let state = build_state(root.path(), &[]).await;
    let base = spawn_web(state).await;
    let client = reqwest::Client::new();

    let status = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::OK);

    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("bananas_server_reloads_total"));

    let status = client
        .get(format!("{base}/no-such-page"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}
