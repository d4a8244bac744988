//! Identifier types shared between the wire codec and the catalog.

use std::fmt;

use crate::content_type::ContentType;

/// 4-byte stable identifier of a project; multiple versions share it.
///
/// Stored and handled in storage byte order. For the byte-swapped categories
/// (see [`ContentType::unique_id_is_big_endian`]) that is big-endian relative
/// to the wire; conversion happens only at the codec boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId(pub [u8; 4]);

impl UniqueId {
    /// Parse from the 8-hex-char folder name.
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let raw = hex::decode(hex_str).ok()?;
        Some(Self(raw.try_into().ok()?))
    }

    /// Hex representation as used for folder names.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Decode from a wire word, applying the per-category byte swap.
    pub fn from_wire(word: u32, content_type: ContentType) -> Self {
        if content_type.unique_id_is_big_endian() {
            Self(word.to_be_bytes())
        } else {
            Self(word.to_le_bytes())
        }
    }

    /// Encode to a wire word, applying the per-category byte swap.
    pub fn to_wire(self, content_type: ContentType) -> u32 {
        if content_type.unique_id_is_big_endian() {
            u32::from_be_bytes(self.0)
        } else {
            u32::from_le_bytes(self.0)
        }
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Full 16-byte md5 digest of a content archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Sum(pub [u8; 16]);

impl Md5Sum {
    /// Parse from 32 hex characters.
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let raw = hex::decode(hex_str).ok()?;
        Some(Self(raw.try_into().ok()?))
    }

    /// Hex representation as used for blob filenames.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// The public partial digest: the first 4 bytes (8 hex chars).
    pub fn partial(self) -> Md5Partial {
        Md5Partial([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Little-endian integer formed from the last 3 bytes of the digest.
    ///
    /// The first 8 hex chars are already public as the partial digest, so
    /// the tail decorrelates derived ids from the public prefix.
    pub fn tail24(self) -> u32 {
        u32::from_le_bytes([self.0[13], self.0[14], self.0[15], 0])
    }
}

impl fmt::Display for Md5Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// First 4 bytes of an md5 digest, as referenced by YAML records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Partial(pub [u8; 4]);

impl Md5Partial {
    /// Parse from 8 hex characters.
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let raw = hex::decode(hex_str).ok()?;
        Some(Self(raw.try_into().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_hex_round_trip() {
        let id = UniqueId([0x01, 0x02, 0x03, 0x04]);
        assert_eq!(id.to_hex(), "01020304");
        assert_eq!(UniqueId::from_hex("01020304"), Some(id));
        assert_eq!(UniqueId::from_hex("0102030"), None);
        assert_eq!(UniqueId::from_hex("010203045"), None);
    }

    #[test]
    fn test_unique_id_wire_swap() {
        let id = UniqueId([0x01, 0x02, 0x03, 0x04]);

        // Byte-swapped categories put the first storage byte in the top
        // wire byte.
        assert_eq!(id.to_wire(ContentType::NewGrf), 0x01020304);
        assert_eq!(id.to_wire(ContentType::Scenario), 0x01020304);

        // Everything else is little-endian on the wire.
        assert_eq!(id.to_wire(ContentType::Ai), 0x04030201);

        for content_type in [ContentType::NewGrf, ContentType::Ai] {
            let word = id.to_wire(content_type);
            assert_eq!(UniqueId::from_wire(word, content_type), id);
        }
    }

    #[test]
    fn test_md5_partial_and_tail() {
        let md5 = Md5Sum([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ]);
        assert_eq!(md5.partial(), Md5Partial([0x00, 0x11, 0x22, 0x33]));
        assert_eq!(md5.tail24(), 0x00ffeedd);
    }
}
