//! Encoding of outgoing server packets.

use bytes::Bytes;

use crate::content_type::ContentType;
use crate::error::PacketError;
use crate::read::PacketReader;
use crate::request::PacketType;
use crate::types::{Md5Sum, UniqueId};
use crate::write::{FRAME_HEADER, PacketWriter, SEND_MTU};

/// Largest file-data payload per content frame.
pub const MAX_CONTENT_CHUNK: usize = SEND_MTU - FRAME_HEADER;

/// Borrowed view of one catalog entry as transmitted in a metadata reply.
#[derive(Debug, Clone, Copy)]
pub struct ServerInfo<'a> {
    /// Content category
    pub content_type: ContentType,
    /// Internal id assigned at index build
    pub content_id: u32,
    /// Archive size in bytes
    pub filesize: u32,
    /// Display name
    pub name: &'a str,
    /// Version string
    pub version: &'a str,
    /// Project URL
    pub url: &'a str,
    /// Description text
    pub description: &'a str,
    /// Project id, in storage byte order
    pub unique_id: UniqueId,
    /// Full digest of the archive
    pub md5sum: Md5Sum,
    /// Content ids of resolved dependencies
    pub dependencies: &'a [u32],
    /// Flat sorted tag list
    pub tags: &'a [String],
    /// Upload time, seconds since the Unix epoch
    pub upload_date: u32,
}

impl ServerInfo<'_> {
    /// Encode into a complete metadata frame.
    pub fn encode(&self) -> Result<Bytes, PacketError> {
        let mut writer = PacketWriter::new(PacketType::ServerInfo as u8);
        writer.uint8(self.content_type.wire_value());
        writer.uint32(self.content_id);
        writer.uint32(self.filesize);
        writer.string(self.name);
        writer.string(self.version);
        writer.string(self.url);
        writer.string(self.description);
        writer.uint32(self.unique_id.to_wire(self.content_type));
        writer.raw(&self.md5sum.0);
        writer.uint8(self.dependencies.len() as u8);
        for dependency in self.dependencies {
            writer.uint32(*dependency);
        }
        writer.uint8(self.tags.len() as u8);
        for tag in self.tags {
            writer.string(tag);
        }
        writer.uint32(self.upload_date);
        writer.finish()
    }

    /// Exact size of the encoded frame, length prefix included.
    pub fn wire_size(&self) -> usize {
        server_info_wire_size(
            self.name,
            self.version,
            self.url,
            self.description,
            self.dependencies.len(),
            self.tags,
        )
    }
}

/// Size a metadata frame would occupy on the wire.
///
/// Used at index build time to reject entries that would not fit a frame
/// before any request ever asks for them.
pub fn server_info_wire_size(
    name: &str,
    version: &str,
    url: &str,
    description: &str,
    dependency_count: usize,
    tags: &[String],
) -> usize {
    let mut size = FRAME_HEADER;
    size += 1 + 4 + 4; // content type, content id, filesize
    size += name.len() + 1;
    size += version.len() + 1;
    size += url.len() + 1;
    size += description.len() + 1;
    size += 4 + 16; // unique id, md5sum
    size += 1 + dependency_count * 4;
    size += 1 + tags.iter().map(|tag| tag.len() + 1).sum::<usize>();
    size += 4; // upload date
    size
}

/// Owned decode of a metadata frame; the inverse of [`ServerInfo::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedServerInfo {
    /// Content category
    pub content_type: ContentType,
    /// Internal id
    pub content_id: u32,
    /// Archive size in bytes
    pub filesize: u32,
    /// Display name
    pub name: String,
    /// Version string
    pub version: String,
    /// Project URL
    pub url: String,
    /// Description text
    pub description: String,
    /// Project id, in storage byte order
    pub unique_id: UniqueId,
    /// Full digest of the archive
    pub md5sum: Md5Sum,
    /// Content ids of dependencies
    pub dependencies: Vec<u32>,
    /// Tag list
    pub tags: Vec<String>,
    /// Upload time, seconds since the Unix epoch
    pub upload_date: u32,
}

impl DecodedServerInfo {
    /// Decode a complete metadata frame, length prefix included.
    pub fn decode(frame: &[u8]) -> Result<Self, PacketError> {
        let mut reader = PacketReader::new(frame);

        let announced = reader.uint16()?;
        if announced as usize != frame.len() {
            return Err(PacketError::InvalidSize {
                announced,
                actual: frame.len(),
            });
        }
        let packet_type = reader.uint8()?;
        if packet_type != PacketType::ServerInfo as u8 {
            return Err(PacketError::InvalidType(packet_type));
        }

        let content_type = ContentType::from_wire(reader.uint8()?)?;
        let content_id = reader.uint32()?;
        let filesize = reader.uint32()?;
        let name = reader.string()?;
        let version = reader.string()?;
        let url = reader.string()?;
        let description = reader.string()?;
        let unique_id = UniqueId::from_wire(reader.uint32()?, content_type);
        let mut md5sum = [0u8; 16];
        md5sum.copy_from_slice(reader.bytes(16)?);

        let dependency_count = reader.uint8()?;
        let mut dependencies = Vec::with_capacity(dependency_count as usize);
        for _ in 0..dependency_count {
            dependencies.push(reader.uint32()?);
        }

        let tag_count = reader.uint8()?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            tags.push(reader.string()?);
        }

        let upload_date = reader.uint32()?;
        reader.expect_end()?;

        Ok(Self {
            content_type,
            content_id,
            filesize,
            name,
            version,
            url,
            description,
            unique_id,
            md5sum: Md5Sum(md5sum),
            dependencies,
            tags,
            upload_date,
        })
    }
}

/// Encode the header frame announcing a file transfer.
pub fn encode_content_header(
    content_type: ContentType,
    content_id: u32,
    filesize: u32,
    filename: &str,
) -> Result<Bytes, PacketError> {
    let mut writer = PacketWriter::new(PacketType::ServerContent as u8);
    writer.uint8(content_type.wire_value());
    writer.uint32(content_id);
    writer.uint32(filesize);
    writer.string(filename);
    writer.finish()
}

/// Encode one raw file-data frame; `data` must not exceed
/// [`MAX_CONTENT_CHUNK`].
pub fn encode_content_chunk(data: &[u8]) -> Result<Bytes, PacketError> {
    let mut writer = PacketWriter::new(PacketType::ServerContent as u8);
    writer.raw(data);
    writer.finish()
}

/// Encode the empty frame terminating a file transfer.
pub fn encode_content_terminator() -> Result<Bytes, PacketError> {
    PacketWriter::new(PacketType::ServerContent as u8).finish()
}
