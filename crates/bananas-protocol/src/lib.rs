//! Wire codec for the OpenTTD content-distribution TCP protocol.
//!
//! A frame is a little-endian `u16` length (inclusive of itself), a type
//! byte and a payload; strings are NUL-terminated UTF-8 and frames never
//! exceed the 1460-byte send MTU. The codec exposes no I/O: bytes in,
//! bytes out.
//!
//! # Architecture
//!
//! - `content_type`: the closed category taxonomy and its folder names
//! - `types`: unique id and md5 digest value types, with wire byte order
//! - `read` / `write`: decoder and encoder primitives
//! - `framing`: frame reassembly over a raw byte stream
//! - `request`: decoding of the five incoming packet types
//! - `response`: encoding of metadata and file-transfer replies
//!
//! # Example
//!
//! ```
//! use bananas_protocol::{ClientRequest, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! buffer.extend(&[0x08, 0x00, 0x00, 0x02, 0x00, 0x00, 0x0b, 0x0a]);
//! let frame = buffer.next_frame().unwrap().unwrap();
//! let request = ClientRequest::decode(&frame).unwrap();
//! println!("{request:?}");
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod content_type;
pub mod error;
pub mod framing;
pub mod read;
pub mod request;
pub mod response;
pub mod types;
pub mod write;

pub use content_type::{CONTENT_TYPE_END, ContentType};
pub use error::PacketError;
pub use framing::FrameBuffer;
pub use read::PacketReader;
pub use request::{
    BranchVersion, ClientRequest, ExtId, ExtIdMd5, PACKET_CONTENT_END, PacketType,
    VERSION_BRANCHES_SENTINEL, VersionInfo,
};
pub use response::{
    DecodedServerInfo, MAX_CONTENT_CHUNK, ServerInfo, encode_content_chunk, encode_content_header,
    encode_content_terminator, server_info_wire_size,
};
pub use types::{Md5Partial, Md5Sum, UniqueId};
pub use write::{FRAME_HEADER, PacketWriter, SEND_MTU};
