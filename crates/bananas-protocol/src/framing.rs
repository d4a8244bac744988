//! Frame reassembly over a raw byte stream.

use bytes::{Bytes, BytesMut};

use crate::error::PacketError;
use crate::write::FRAME_HEADER;

/// Accumulates raw transport bytes and peels off complete frames.
///
/// A frame is a little-endian `u16` length (inclusive of itself), a type
/// byte and a payload. Partial frames stay buffered until more bytes arrive.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Peel off the next complete frame, length prefix included.
    ///
    /// Returns `Ok(None)` when no complete frame is buffered. A frame
    /// announcing fewer bytes than its own header is invalid; without this
    /// check a zero-length prefix would stall the connection forever.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, PacketError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }

        let announced = u16::from_le_bytes([self.buf[0], self.buf[1]]) as usize;
        if announced < FRAME_HEADER {
            return Err(PacketError::InvalidSize {
                announced: announced as u16,
                actual: self.buf.len(),
            });
        }
        if self.buf.len() < announced {
            return Ok(None);
        }

        Ok(Some(self.buf.split_to(announced).freeze()))
    }

    /// Number of buffered bytes not yet peeled.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
