//! End-to-end tests of the content protocol over real TCP connections.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use bananas_protocol::{
    ContentType, DecodedServerInfo, Md5Sum, PacketType, PacketWriter, UniqueId,
};
use bananas_server::{AppState, ServerConfig, serve_content};
use clap::Parser;

fn md5(partial: [u8; 4], tail: [u8; 3]) -> Md5Sum {
    let mut digest = [0u8; 16];
    digest[..4].copy_from_slice(&partial);
    digest[13..].copy_from_slice(&tail);
    Md5Sum(digest)
}

fn add_entry(
    root: &Path,
    content_type: ContentType,
    unique_id_hex: &str,
    digest: Md5Sum,
    blob: &[u8],
    extra_yaml: &str,
) {
    let storage_dir = root
        .join("storage")
        .join(content_type.folder_name())
        .join(unique_id_hex);
    std::fs::create_dir_all(&storage_dir).unwrap();
    std::fs::write(storage_dir.join(format!("{}.tar.gz", digest.to_hex())), blob).unwrap();

    let index_dir = root
        .join("index")
        .join(content_type.folder_name())
        .join(unique_id_hex);
    std::fs::create_dir_all(index_dir.join("versions")).unwrap();
    std::fs::write(
        index_dir.join("global.yaml"),
        "name: Example Set\nurl: https://example.test\n",
    )
    .unwrap();
    std::fs::write(
        index_dir.join("versions").join("1.0.yaml"),
        format!(
            "filesize: {}\n\
             version: '1.0'\n\
             md5sum-partial: {}\n\
             upload-date: 2024-01-01T00:00:00+00:00\n\
             availability: new-games\n\
             {extra_yaml}",
            blob.len(),
            &digest.to_hex()[..8],
        ),
    )
    .unwrap();
}

async fn build_state(root: &Path, extra_args: &[&str]) -> Arc<AppState> {
    let storage_dir = root.join("storage");
    let index_dir = root.join("index");
    std::fs::create_dir_all(&storage_dir).unwrap();
    std::fs::create_dir_all(&index_dir).unwrap();

    let mut args = vec![
        "bananas-server".to_string(),
        "--storage-local-folder".to_string(),
        storage_dir.display().to_string(),
        "--index-local-folder".to_string(),
        index_dir.display().to_string(),
    ];
    args.extend(extra_args.iter().map(ToString::to_string));

    let config = ServerConfig::parse_from(args);
    let state = Arc::new(AppState::new(&config).unwrap());
    state.reload().await.unwrap();
    state
}

async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_content(listener, state));
    addr
}

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.unwrap();
    let length = u16::from_le_bytes(len_buf) as usize;
    let mut frame = len_buf.to_vec();
    frame.resize(length, 0);
    stream.read_exact(&mut frame[2..]).await.unwrap();
    frame
}

fn info_list_frame(content_type: ContentType, version_word: u32) -> Vec<u8> {
    let mut writer = PacketWriter::new(PacketType::ClientInfoList as u8);
    writer.uint8(content_type.wire_value());
    writer.uint32(version_word);
    writer.finish().unwrap().to_vec()
}

fn info_id_frame(content_ids: &[u32]) -> Vec<u8> {
    let mut writer = PacketWriter::new(PacketType::ClientInfoId as u8);
    writer.uint16(content_ids.len() as u16);
    for content_id in content_ids {
        writer.uint32(*content_id);
    }
    writer.finish().unwrap().to_vec()
}

fn content_frame(content_ids: &[u32]) -> Vec<u8> {
    let mut writer = PacketWriter::new(PacketType::ClientContent as u8);
    writer.uint16(content_ids.len() as u16);
    for content_id in content_ids {
        writer.uint32(*content_id);
    }
    writer.finish().unwrap().to_vec()
}

#[tokio::test]
async fn test_listing_filter_by_legacy_version() {
    let root = TempDir::new().unwrap();
    // Compatible from 0.9.0 on: included for client 0.10.11.
    add_entry(
        root.path(),
        ContentType::NewGrf,
        "01020304",
        md5([0x11, 0x11, 0x11, 0x11], [0x01, 0x00, 0x00]),
        b"blob-a",
        "compatibility:\n- name: vanilla\n  conditions:\n  - '>=0.9.0'\n",
    );
    // Gone from 0.10.0 on: excluded for client 0.10.11.
    add_entry(
        root.path(),
        ContentType::NewGrf,
        "0a0b0c0d",
        md5([0x22, 0x22, 0x22, 0x22], [0x02, 0x00, 0x00]),
        b"blob-b",
        "compatibility:\n- name: vanilla\n  conditions:\n  - '<0.10.0'\n",
    );

    let state = build_state(root.path(), &[]).await;
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Legacy version word for 0.10.11, then a by-id query as an ordering
    // fence: the fence reply directly follows the (single) listing reply.
    stream
        .write_all(&info_list_frame(ContentType::NewGrf, 0x0A0B_0000))
        .await
        .unwrap();
    stream.write_all(&info_id_frame(&[0x0000_0001])).await.unwrap();

    let listing = DecodedServerInfo::decode(&read_frame(&mut stream).await).unwrap();
    assert_eq!(listing.unique_id, UniqueId([0x01, 0x02, 0x03, 0x04]));

    let fence = DecodedServerInfo::decode(&read_frame(&mut stream).await).unwrap();
    assert_eq!(fence.content_id, 0x0000_0001);
}

#[tokio::test]
async fn test_bootstrap_entry_first_and_not_duplicated() {
    let root = TempDir::new().unwrap();
    add_entry(
        root.path(),
        ContentType::BaseGraphics,
        "0000aaaa",
        md5([0x31, 0x31, 0x31, 0x31], [0x03, 0x00, 0x00]),
        b"base-a",
        "",
    );
    add_entry(
        root.path(),
        ContentType::BaseGraphics,
        "0000bbbb",
        md5([0x32, 0x32, 0x32, 0x32], [0x04, 0x00, 0x00]),
        b"base-b",
        "",
    );

    let state = build_state(root.path(), &["--bootstrap-unique-id", "0000bbbb"]).await;
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&info_list_frame(ContentType::BaseGraphics, 0x0A0B_0000))
        .await
        .unwrap();
    stream.write_all(&info_id_frame(&[0x0000_0003])).await.unwrap();

    let first = DecodedServerInfo::decode(&read_frame(&mut stream).await).unwrap();
    assert_eq!(first.unique_id, UniqueId([0x00, 0x00, 0xbb, 0xbb]));

    let second = DecodedServerInfo::decode(&read_frame(&mut stream).await).unwrap();
    assert_eq!(second.unique_id, UniqueId([0x00, 0x00, 0xaa, 0xaa]));

    // The fence follows immediately: the bootstrap entry was not repeated.
    let fence = DecodedServerInfo::decode(&read_frame(&mut stream).await).unwrap();
    assert_eq!(fence.content_id, 0x0000_0003);
}

#[tokio::test]
async fn test_download_stream_chunking() {
    let root = TempDir::new().unwrap();
    let digest = md5([0x41, 0x41, 0x41, 0x41], [0xef, 0xcd, 0xab]);
    let blob = vec![0x5a; 4096];
    add_entry(
        root.path(),
        ContentType::Scenario,
        "00001111",
        digest,
        &blob,
        "",
    );

    let state = build_state(root.path(), &[]).await;
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&content_frame(&[0x00ab_cdef]))
        .await
        .unwrap();

    // Header frame names the transfer.
    let header = read_frame(&mut stream).await;
    assert_eq!(header[2], PacketType::ServerContent as u8);
    assert!(header.len() > 3);

    // 4096 bytes at 1457 per frame: 1457 + 1457 + 1182.
    let mut payload = Vec::new();
    for expected in [1457usize, 1457, 1182] {
        let frame = read_frame(&mut stream).await;
        assert_eq!(frame[2], PacketType::ServerContent as u8);
        assert_eq!(frame.len() - 3, expected);
        payload.extend_from_slice(&frame[3..]);
    }
    assert_eq!(payload, blob);

    // Empty terminator frame.
    let terminator = read_frame(&mut stream).await;
    assert_eq!(terminator.len(), 3);
}

#[tokio::test]
async fn test_proxy_preamble_consumed_before_frames() {
    let root = TempDir::new().unwrap();
    add_entry(
        root.path(),
        ContentType::Ai,
        "00002222",
        md5([0x51, 0x51, 0x51, 0x51], [0x05, 0x00, 0x00]),
        b"ai-blob",
        "",
    );

    let state = build_state(root.path(), &["--proxy-protocol"]).await;
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut raw = b"PROXY TCP4 10.1.2.3 10.0.0.1 54321 3978\r\n".to_vec();
    raw.extend_from_slice(&info_id_frame(&[0x0000_0005]));
    stream.write_all(&raw).await.unwrap();

    // The preamble was peeled off and the frame behind it decoded normally.
    let reply = DecodedServerInfo::decode(&read_frame(&mut stream).await).unwrap();
    assert_eq!(reply.content_id, 0x0000_0005);
}

#[tokio::test]
async fn test_reserved_packet_type_closes_connection() {
    let root = TempDir::new().unwrap();
    let state = build_state(root.path(), &[]).await;
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut writer = PacketWriter::new(7);
    writer.uint8(0);
    stream.write_all(&writer.finish().unwrap()).await.unwrap();

    // The server drops the connection without a reply.
    let mut buf = [0u8; 16];
    let read = stream.read(&mut buf).await.unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn test_reload_swap_keeps_old_readers_consistent() {
    let root = TempDir::new().unwrap();
    add_entry(
        root.path(),
        ContentType::Game,
        "00003333",
        md5([0x61, 0x61, 0x61, 0x61], [0x06, 0x00, 0x00]),
        b"script",
        "",
    );

    let state = build_state(root.path(), &[]).await;
    let before = state.catalog();
    assert_eq!(before.len(), 1);

    // A second entry lands on disk and a reload publishes it.
    add_entry(
        root.path(),
        ContentType::Game,
        "00004444",
        md5([0x62, 0x62, 0x62, 0x62], [0x07, 0x00, 0x00]),
        b"script-2",
        "",
    );
    state.reload().await.unwrap();

    // The pre-reload reader still sees its consistent snapshot; new
    // readers see the new one.
    assert_eq!(before.len(), 1);
    assert_eq!(state.catalog().len(), 2);
}
