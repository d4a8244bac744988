//! Per-connection state machine for the content protocol.
//!
//! Each connection runs three cooperating pieces: a reader that reassembles
//! frames (after the optional proxy-protocol preamble), a dispatch worker
//! that decodes and handles one request at a time, and a writer draining a
//! bounded reply channel. The bounded channel is the write-ready gate:
//! senders suspend while the peer is slow, and a closed transport surfaces
//! as [`ConnectionError::SocketClosed`] on the next send.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use bananas_protocol::{ClientRequest, FrameBuffer};

use crate::application;
use crate::error::ConnectionError;
use crate::server::AppState;

/// Reply frames buffered per connection before senders suspend.
///
/// Five frames of at most one MTU each bound per-connection memory while
/// retaining pipelining.
const REPLY_QUEUE_FRAMES: usize = 5;

/// Read size per transport chunk.
const READ_CHUNK: usize = 4096;

/// A proxy-protocol v1 line never exceeds this.
const PREAMBLE_LIMIT: usize = 107;

/// How long the writer gets to flush queued replies at teardown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The peer a connection speaks for; rewritten by the proxy preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    /// Source address
    pub ip: IpAddr,
    /// Source port
    pub port: u16,
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Handle for queueing reply frames, shared with the request handlers.
#[derive(Debug, Clone)]
pub(crate) struct ReplySink {
    tx: mpsc::Sender<Bytes>,
}

impl ReplySink {
    /// Queue one frame; suspends while the peer is slow.
    pub(crate) async fn send(&self, frame: Bytes) -> Result<(), ConnectionError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ConnectionError::SocketClosed)
    }
}

/// Serve one TCP connection until the peer goes away or misbehaves.
pub async fn run_tcp_connection(state: Arc<AppState>, socket: TcpStream, addr: SocketAddr) {
    let (mut read_half, write_half) = socket.into_split();

    let mut peer = Peer::from(addr);
    let mut buffer = FrameBuffer::new();

    if state.proxy_protocol() {
        match read_preamble(&mut read_half, peer, &mut buffer).await {
            Some(rewritten) => peer = rewritten,
            None => return,
        }
    }

    let (out_tx, out_rx) = mpsc::channel(REPLY_QUEUE_FRAMES);
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_frames(write_half, out_rx));
    let mut dispatcher = tokio::spawn(dispatch(
        Arc::clone(&state),
        peer,
        frame_rx,
        ReplySink { tx: out_tx },
    ));

    // Pump transport bytes into the dispatcher until either side ends.
    tokio::select! {
        () = pump_frames(&mut read_half, &mut buffer, &frame_tx, peer) => {}
        _ = &mut dispatcher => {}
    }

    // Connection loss cancels the dispatch worker; any held download
    // stream is released with it.
    dispatcher.abort();
    drop(frame_tx);
    if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
        debug!("Gave up flushing replies to {peer}");
    }
}

/// Serve one WebSocket tunnel; binary messages carry the same frames.
pub async fn run_ws_connection(
    state: Arc<AppState>,
    socket: axum::extract::ws::WebSocket,
    peer: Peer,
) {
    use axum::extract::ws::Message;

    let (mut ws_tx, mut ws_rx) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(REPLY_QUEUE_FRAMES);
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });
    let mut dispatcher = tokio::spawn(dispatch(
        Arc::clone(&state),
        peer,
        frame_rx,
        ReplySink { tx: out_tx },
    ));

    let mut buffer = FrameBuffer::new();
    let relay = async {
        while let Some(message) = ws_rx.next().await {
            let data = match message {
                Ok(Message::Binary(data)) => data,
                Ok(Message::Close(_)) | Err(_) => break,
                // Ping/pong is answered by the protocol layer; text has no
                // meaning in this tunnel.
                Ok(_) => continue,
            };
            buffer.extend(&data);
            if !peel_into(&mut buffer, &frame_tx, peer) {
                break;
            }
        }
    };

    tokio::select! {
        () = relay => {}
        _ = &mut dispatcher => {}
    }

    dispatcher.abort();
    drop(frame_tx);
    if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
        debug!("Gave up flushing replies to {peer}");
    }
}

/// Writer task: drain the bounded reply channel into the transport.
async fn write_frames(mut write_half: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Bytes>) {
    while let Some(frame) = out_rx.recv().await {
        if write_half.write_all(&frame).await.is_err() {
            // The transport is closing; senders observe SocketClosed once
            // the channel fills or drops.
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

/// Reader loop: reassemble frames and hand them to the dispatcher.
async fn pump_frames(
    read_half: &mut OwnedReadHalf,
    buffer: &mut FrameBuffer,
    frame_tx: &mpsc::UnboundedSender<Bytes>,
    peer: Peer,
) {
    // The preamble read may have left complete frames behind.
    if !peel_into(buffer, frame_tx, peer) {
        return;
    }

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(count) => {
                buffer.extend(&chunk[..count]);
                if !peel_into(buffer, frame_tx, peer) {
                    return;
                }
            }
        }
    }
}

/// Peel complete frames into the dispatch queue. False ends the connection.
fn peel_into(
    buffer: &mut FrameBuffer,
    frame_tx: &mpsc::UnboundedSender<Bytes>,
    peer: Peer,
) -> bool {
    loop {
        match buffer.next_frame() {
            Ok(Some(frame)) => {
                if frame_tx.send(frame).is_err() {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(err) => {
                info!("Dropping invalid packet from {peer}: {err}");
                return false;
            }
        }
    }
}

/// Dispatch worker: decode and handle one request at a time.
///
/// Within one connection replies keep request order; there is no
/// pipelined concurrent handling.
async fn dispatch(
    state: Arc<AppState>,
    peer: Peer,
    mut frame_rx: mpsc::UnboundedReceiver<Bytes>,
    sink: ReplySink,
) {
    while let Some(frame) = frame_rx.recv().await {
        let request = match ClientRequest::decode(&frame) {
            Ok(request) => request,
            Err(err) => {
                info!("Dropping invalid packet from {peer}: {err}");
                return;
            }
        };

        state.metrics().packets.with_label_values(&[request.kind()]).inc();

        match application::handle_request(&state, peer, request, &sink).await {
            Ok(()) => {}
            Err(ConnectionError::SocketClosed) => return,
            Err(ConnectionError::Packet(err)) => {
                info!("Dropping invalid packet from {peer}: {err}");
                return;
            }
            Err(ConnectionError::Storage(err)) => {
                error!("Storage error while serving {peer}: {err}");
                return;
            }
        }
    }
}

/// Consume the proxy-protocol v1 preamble and rewrite the peer.
///
/// A missing preamble is logged and the buffered bytes are processed as
/// frames unchanged. `None` means the transport died before a decision
/// could be made.
async fn read_preamble(
    read_half: &mut OwnedReadHalf,
    peer: Peer,
    buffer: &mut FrameBuffer,
) -> Option<Peer> {
    let mut preamble: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let count = match read_half.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(count) => count,
        };
        preamble.extend_from_slice(&chunk[..count]);

        let probe_len = preamble.len().min(5);
        if preamble[..probe_len] != b"PROXY"[..probe_len] {
            warn!("Missing proxy-protocol preamble from {peer}");
            buffer.extend(&preamble);
            return Some(peer);
        }

        if let Some(end) = preamble.windows(2).position(|pair| pair == b"\r\n") {
            let line = String::from_utf8_lossy(&preamble[..end]).into_owned();
            buffer.extend(&preamble[end + 2..]);
            return Some(parse_proxy_line(&line, peer));
        }

        if preamble.len() > PREAMBLE_LIMIT {
            warn!("Oversized proxy-protocol preamble from {peer}");
            buffer.extend(&preamble);
            return Some(peer);
        }
    }
}

/// Parse `PROXY TCP4 <src_ip> <dst_ip> <src_port> <dst_port>`.
fn parse_proxy_line(line: &str, fallback: Peer) -> Peer {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() != 6 || (fields[1] != "TCP4" && fields[1] != "TCP6") {
        warn!("Malformed proxy-protocol preamble {line:?}");
        return fallback;
    }

    match (fields[2].parse::<IpAddr>(), fields[4].parse::<u16>()) {
        (Ok(ip), Ok(port)) => Peer { ip, port },
        _ => {
            warn!("Malformed proxy-protocol preamble {line:?}");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback() -> Peer {
        Peer {
            ip: "192.0.2.1".parse().unwrap(),
            port: 40000,
        }
    }

    #[test]
    fn test_parse_proxy_line_tcp4() {
        let peer = parse_proxy_line("PROXY TCP4 10.1.2.3 10.0.0.1 54321 3978", fallback());
        assert_eq!(peer.ip, "10.1.2.3".parse::<IpAddr>().unwrap());
        assert_eq!(peer.port, 54321);
    }

    #[test]
    fn test_parse_proxy_line_tcp6() {
        let peer = parse_proxy_line("PROXY TCP6 2001:db8::2 2001:db8::1 4242 3978", fallback());
        assert_eq!(peer.ip, "2001:db8::2".parse::<IpAddr>().unwrap());
        assert_eq!(peer.port, 4242);
    }

    #[test]
    fn test_parse_proxy_line_malformed_falls_back() {
        assert_eq!(parse_proxy_line("PROXY UNKNOWN", fallback()), fallback());
        assert_eq!(
            parse_proxy_line("PROXY TCP4 not-an-ip 10.0.0.1 1 2", fallback()),
            fallback()
        );
    }
}
