//! Content categories and their storage folder names.
//!
//! The category values are fixed by the OpenTTD client; the terminator value
//! (11) exists only as a wire sentinel and is rejected on decode.

use crate::error::PacketError;

/// Closed enumeration of add-on categories served by this system.
///
/// Each category maps bijectively to a folder name in the content tree and
/// on the CDN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ContentType {
    /// Base graphics sets
    BaseGraphics = 1,
    /// NewGRF extension sets
    NewGrf = 2,
    /// AI players
    Ai = 3,
    /// Libraries used by AI players
    AiLibrary = 4,
    /// Scenarios
    Scenario = 5,
    /// Heightmaps
    Heightmap = 6,
    /// Base sounds sets
    BaseSounds = 7,
    /// Base music sets
    BaseMusic = 8,
    /// Game scripts
    Game = 9,
    /// Libraries used by game scripts
    GameLibrary = 10,
}

/// Wire value one past the last valid category; never valid in a packet.
pub const CONTENT_TYPE_END: u8 = 11;

impl ContentType {
    /// All categories, in wire-value order.
    ///
    /// Iteration order here defines the directory traversal order of the
    /// index loader.
    pub const ALL: [Self; 10] = [
        Self::BaseGraphics,
        Self::NewGrf,
        Self::Ai,
        Self::AiLibrary,
        Self::Scenario,
        Self::Heightmap,
        Self::BaseSounds,
        Self::BaseMusic,
        Self::Game,
        Self::GameLibrary,
    ];

    /// Decode a wire value, rejecting the terminator and out-of-range values.
    pub fn from_wire(value: u8) -> Result<Self, PacketError> {
        match value {
            1 => Ok(Self::BaseGraphics),
            2 => Ok(Self::NewGrf),
            3 => Ok(Self::Ai),
            4 => Ok(Self::AiLibrary),
            5 => Ok(Self::Scenario),
            6 => Ok(Self::Heightmap),
            7 => Ok(Self::BaseSounds),
            8 => Ok(Self::BaseMusic),
            9 => Ok(Self::Game),
            10 => Ok(Self::GameLibrary),
            other => Err(PacketError::invalid_data(format!(
                "invalid content type {other}"
            ))),
        }
    }

    /// The wire value of this category.
    pub const fn wire_value(self) -> u8 {
        self as u8
    }

    /// Folder name used in the content tree, the index tree and CDN URLs.
    pub const fn folder_name(self) -> &'static str {
        match self {
            Self::BaseGraphics => "base-graphics",
            Self::NewGrf => "newgrf",
            Self::Ai => "ai",
            Self::AiLibrary => "ai-library",
            Self::Scenario => "scenario",
            Self::Heightmap => "heightmap",
            Self::BaseSounds => "base-sounds",
            Self::BaseMusic => "base-music",
            Self::Game => "game-script",
            Self::GameLibrary => "game-script-library",
        }
    }

    /// Reverse of [`ContentType::folder_name`].
    pub fn from_folder_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ct| ct.folder_name() == name)
    }

    /// Whether the 4-byte unique id of this category travels byte-swapped.
    ///
    /// NewGRF ids are sent byte-swapped by the client; scenario and heightmap
    /// ids are stored big-endian so the storage folders sort readably. The
    /// swap is applied symmetrically on decode and encode.
    pub const fn unique_id_is_big_endian(self) -> bool {
        matches!(self, Self::NewGrf | Self::Scenario | Self::Heightmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_name_bijection() {
        for content_type in ContentType::ALL {
            assert_eq!(
                ContentType::from_folder_name(content_type.folder_name()),
                Some(content_type)
            );
        }
    }

    #[test]
    fn test_from_wire_rejects_terminator() {
        assert!(ContentType::from_wire(CONTENT_TYPE_END).is_err());
        assert!(ContentType::from_wire(0).is_err());
        assert!(ContentType::from_wire(255).is_err());
    }

    #[test]
    fn test_from_wire_round_trip() {
        for content_type in ContentType::ALL {
            assert_eq!(
                ContentType::from_wire(content_type.wire_value()).ok(),
                Some(content_type)
            );
        }
    }

    #[test]
    fn test_byte_swapped_categories() {
        assert!(ContentType::NewGrf.unique_id_is_big_endian());
        assert!(ContentType::Scenario.unique_id_is_big_endian());
        assert!(ContentType::Heightmap.unique_id_is_big_endian());
        assert!(!ContentType::BaseGraphics.unique_id_is_big_endian());
        assert!(!ContentType::Game.unique_id_is_big_endian());
    }
}
