//! Encoder primitives for content protocol frames.
//!
//! A frame is built incrementally behind a 2-byte length placeholder;
//! [`PacketWriter::finish`] rewrites the prefix with the actual length and
//! enforces the send MTU.

use bytes::Bytes;

use crate::error::PacketError;

/// Maximum size of a single frame, length prefix included.
pub const SEND_MTU: usize = 1460;

/// Bytes of framing overhead: 2-byte length plus 1-byte packet type.
pub const FRAME_HEADER: usize = 3;

/// Incremental frame builder.
#[derive(Debug)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Start a frame of the given packet type.
    pub fn new(packet_type: u8) -> Self {
        Self {
            buf: vec![0, 0, packet_type],
        }
    }

    /// Current frame size, length prefix included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the frame carries no payload yet.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == FRAME_HEADER
    }

    /// Append a `u8`.
    pub fn uint8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    /// Append a little-endian `u16`.
    pub fn uint16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a little-endian `u32`.
    pub fn uint32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a little-endian `u64`.
    pub fn uint64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a string followed by its NUL terminator.
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        self
    }

    /// Append raw bytes without framing.
    pub fn raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Finalize the frame: rewrite the length prefix and enforce the MTU.
    pub fn finish(mut self) -> Result<Bytes, PacketError> {
        if self.buf.len() > SEND_MTU {
            return Err(PacketError::TooBig(self.buf.len()));
        }
        let length = self.buf.len() as u16;
        self.buf[0..2].copy_from_slice(&length.to_le_bytes());
        Ok(Bytes::from(self.buf))
    }
}
