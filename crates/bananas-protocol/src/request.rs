//! Decoding of incoming client packets.

use crate::content_type::ContentType;
use crate::error::PacketError;
use crate::read::PacketReader;
use crate::types::{Md5Sum, UniqueId};

/// Wire values of the packet types in the content protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Query for a listing of a given content type
    ClientInfoList = 0,
    /// Query for a list of internal ids
    ClientInfoId = 1,
    /// Query for a list of external (project) ids
    ClientInfoExtid = 2,
    /// Query for a list of external ids with md5 digests
    ClientInfoExtidMd5 = 3,
    /// Reply carrying metadata of one entry
    ServerInfo = 4,
    /// Request for the file behind an internal id
    ClientContent = 5,
    /// Reply carrying file data
    ServerContent = 6,
}

/// Reserved sentinel one past the last packet type; never valid on the wire.
pub const PACKET_CONTENT_END: u8 = 7;

/// Client version information carried by a listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionInfo {
    /// Packed 32-bit version word (legacy and current encodings)
    Word(u32),
    /// Explicit per-branch versions, sent after the `0xFFFFFFFF` sentinel
    Branches(Vec<BranchVersion>),
}

/// One branch/version pair from the extended listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchVersion {
    /// Branch name, e.g. `vanilla`
    pub branch: String,
    /// Dotted version string, e.g. `14.1`
    pub version: String,
}

/// External reference to a project: category plus unique id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtId {
    /// Content category
    pub content_type: ContentType,
    /// Project id, in storage byte order
    pub unique_id: UniqueId,
}

/// External reference to an exact version: [`ExtId`] plus md5 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtIdMd5 {
    /// Content category
    pub content_type: ContentType,
    /// Project id, in storage byte order
    pub unique_id: UniqueId,
    /// Full digest selecting the exact version
    pub md5sum: Md5Sum,
}

/// A fully decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Listing of one content type, filtered by client version
    InfoList {
        /// Requested category
        content_type: ContentType,
        /// Client version information
        version: VersionInfo,
    },
    /// Metadata for a list of internal ids
    InfoId {
        /// Requested content ids
        content_ids: Vec<u32>,
    },
    /// Metadata for a list of project ids
    InfoExtid {
        /// Requested projects
        entries: Vec<ExtId>,
    },
    /// Metadata for a list of exact versions
    InfoExtidMd5 {
        /// Requested versions
        entries: Vec<ExtIdMd5>,
    },
    /// Download of the files behind a list of internal ids
    Content {
        /// Requested content ids
        content_ids: Vec<u32>,
    },
}

/// Sentinel version word announcing an explicit branch-versions map.
pub const VERSION_BRANCHES_SENTINEL: u32 = 0xFFFF_FFFF;

impl ClientRequest {
    /// Short name of the request kind, for logging and metric labels.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InfoList { .. } => "info_list",
            Self::InfoId { .. } => "info_id",
            Self::InfoExtid { .. } => "info_extid",
            Self::InfoExtidMd5 { .. } => "info_extid_md5",
            Self::Content { .. } => "content",
        }
    }

    /// Decode a complete frame, length prefix included.
    ///
    /// # Errors
    ///
    /// [`PacketError::InvalidSize`] when the prefix disagrees with the frame,
    /// [`PacketError::InvalidType`] for unknown or outgoing packet types and
    /// [`PacketError::InvalidData`] for malformed payloads, including
    /// payloads with trailing bytes.
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
        if packet_type >= PACKET_CONTENT_END {
            return Err(PacketError::InvalidType(packet_type));
        }

        let request = match packet_type {
            0 => Self::decode_info_list(&mut reader)?,
            1 => Self::InfoId {
                content_ids: decode_content_ids(&mut reader)?,
            },
            2 => Self::decode_info_extid(&mut reader)?,
            3 => Self::decode_info_extid_md5(&mut reader)?,
            5 => Self::Content {
                content_ids: decode_content_ids(&mut reader)?,
            },
            // ServerInfo and ServerContent are outgoing only.
            other => return Err(PacketError::InvalidType(other)),
        };

        reader.expect_end()?;
        Ok(request)
    }

    fn decode_info_list(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        let content_type = ContentType::from_wire(reader.uint8()?)?;
        let word = reader.uint32()?;

        let version = if word == VERSION_BRANCHES_SENTINEL {
            let count = reader.uint8()?;
            let mut branches = Vec::with_capacity(count as usize);
            for _ in 0..count {
                branches.push(BranchVersion {
                    branch: reader.string()?,
                    version: reader.string()?,
                });
            }
            VersionInfo::Branches(branches)
        } else {
            VersionInfo::Word(word)
        };

        Ok(Self::InfoList {
            content_type,
            version,
        })
    }

    fn decode_info_extid(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        let count = reader.uint8()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let content_type = ContentType::from_wire(reader.uint8()?)?;
            let unique_id = UniqueId::from_wire(reader.uint32()?, content_type);
            entries.push(ExtId {
                content_type,
                unique_id,
            });
        }
        Ok(Self::InfoExtid { entries })
    }

    fn decode_info_extid_md5(reader: &mut PacketReader<'_>) -> Result<Self, PacketError> {
        let count = reader.uint8()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let content_type = ContentType::from_wire(reader.uint8()?)?;
            let unique_id = UniqueId::from_wire(reader.uint32()?, content_type);
            let mut md5sum = [0u8; 16];
            md5sum.copy_from_slice(reader.bytes(16)?);
            entries.push(ExtIdMd5 {
                content_type,
                unique_id,
                md5sum: Md5Sum(md5sum),
            });
        }
        Ok(Self::InfoExtidMd5 { entries })
    }
}

fn decode_content_ids(reader: &mut PacketReader<'_>) -> Result<Vec<u32>, PacketError> {
    let count = reader.uint16()?;
    let mut content_ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        content_ids.push(reader.uint32()?);
    }
    Ok(content_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::PacketWriter;

    #[test]
    fn test_decode_info_list_bare() {
        let mut writer = PacketWriter::new(PacketType::ClientInfoList as u8);
        writer.uint8(ContentType::NewGrf.wire_value());
        writer.uint32(0x0A0B_0000);
        let frame = writer.finish().unwrap();

        let request = ClientRequest::decode(&frame).unwrap();
        assert_eq!(
            request,
            ClientRequest::InfoList {
                content_type: ContentType::NewGrf,
                version: VersionInfo::Word(0x0A0B_0000),
            }
        );
    }

    #[test]
    fn test_decode_info_list_branches() {
        let mut writer = PacketWriter::new(PacketType::ClientInfoList as u8);
        writer.uint8(ContentType::Ai.wire_value());
        writer.uint32(VERSION_BRANCHES_SENTINEL);
        writer.uint8(2);
        writer.string("vanilla");
        writer.string("14.1");
        writer.string("jgrpp");
        writer.string("0.60.1");
        let frame = writer.finish().unwrap();

        let request = ClientRequest::decode(&frame).unwrap();
        let ClientRequest::InfoList { version, .. } = request else {
            panic!("expected InfoList");
        };
        assert_eq!(
            version,
            VersionInfo::Branches(vec![
                BranchVersion {
                    branch: "vanilla".to_string(),
                    version: "14.1".to_string(),
                },
                BranchVersion {
                    branch: "jgrpp".to_string(),
                    version: "0.60.1".to_string(),
                },
            ])
        );
    }

    #[test]
    fn test_decode_extid_swaps_unique_id() {
        let mut writer = PacketWriter::new(PacketType::ClientInfoExtid as u8);
        writer.uint8(1);
        writer.uint8(ContentType::NewGrf.wire_value());
        writer.uint32(0x0102_0304);
        let frame = writer.finish().unwrap();

        let ClientRequest::InfoExtid { entries } = ClientRequest::decode(&frame).unwrap() else {
            panic!("expected InfoExtid");
        };
        assert_eq!(entries[0].unique_id, UniqueId([0x01, 0x02, 0x03, 0x04]));
    }

    #[test]
    fn test_decode_rejects_end_sentinel_and_outgoing_types() {
        for packet_type in [4u8, 6, 7, 200] {
            let mut writer = PacketWriter::new(packet_type);
            writer.uint8(0);
            let frame = writer.finish().unwrap();
            assert!(matches!(
                ClientRequest::decode(&frame),
                Err(PacketError::InvalidType(_))
            ));
        }
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut writer = PacketWriter::new(PacketType::ClientInfoId as u8);
        writer.uint16(0);
        writer.uint8(0xff);
        let frame = writer.finish().unwrap();
        assert!(matches!(
            ClientRequest::decode(&frame),
            Err(PacketError::InvalidData(_))
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_announced_size() {
        let mut writer = PacketWriter::new(PacketType::ClientInfoId as u8);
        writer.uint16(0);
        let mut raw = writer.finish().unwrap().to_vec();
        raw[0] = raw[0].wrapping_add(1);
        assert!(matches!(
            ClientRequest::decode(&raw),
            Err(PacketError::InvalidSize { .. })
        ));
    }
}
