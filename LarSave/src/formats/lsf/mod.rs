//! LSF (Larian Studios Object File) binary format module

mod reader;
mod string_table;
mod values;
mod writer;

// Public API
pub use reader::{parse_lsf_bytes, read_lsf};
pub use string_table::{bucket_of, name_hash, StringTable, NUM_BUCKETS};
pub use values::{decode_value, encode_value, format_uuid, hex_string, parse_uuid};
pub use writer::{serialize_lsf, serialize_lsf_with_format, serialize_lsf_with_version, write_lsf};

use crate::error::{Error, Result};

pub const MAGIC: [u8; 4] = *b"LSOF";

pub const MIN_VERSION: u32 = 2;
pub const MAX_VERSION: u32 = 7;

/// Format version written for DOS2 documents.
pub const VERSION_DOS2: u32 = 3;
/// First version with the 64-bit engine version header (and versioned
/// TranslatedFSString payloads).
pub const VERSION_BG3_HEADER: u32 = 5;
/// First version with the extended metadata block and the node keys
/// section; written for BG3 documents.
pub const VERSION_BG3: u32 = 6;

/// Node/attribute table layout selector carried in the metadata block.
///
/// V2 entries are 12 bytes with implicit sibling/attribute order, V3
/// entries are 16 bytes with explicit sibling and next-attribute links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    V2,
    V3,
}

impl MetadataFormat {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(Self::V2),
            1 => Ok(Self::V3),
            other => Err(Error::Format(format!("unknown metadata format {other}"))),
        }
    }

    #[must_use]
    pub fn to_raw(self) -> u32 {
        match self {
            Self::V2 => 0,
            Self::V3 => 1,
        }
    }
}
