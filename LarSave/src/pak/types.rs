//! Types for LSV package handling

use crate::error::{Error, Result};

pub const MAGIC: [u8; 4] = *b"LSPK";

/// Fixed width of the name field in every file table entry.
pub const PATH_LENGTH: usize = 256;

/// Size of the BG3 start-of-file header.
pub const BG3_HEADER_SIZE: usize = 40;
/// Size of the DOS2 tail trailer (32-byte header + size + signature).
pub const DOS2_TRAILER_SIZE: usize = 40;

/// Offsets whose low 56 bits carry this value mark deleted entries.
pub const DELETED_OFFSET: u64 = 0xBEEF_DEAD_BEEF;
pub const DELETED_OFFSET_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// Supported package container versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PackageVersion {
    /// DOS2 classic.
    V10,
    /// DOS2 Definitive Edition.
    V13,
    /// BG3 early access.
    V15,
    /// BG3 release savegames.
    V16,
    /// BG3 data packages.
    V18,
}

impl PackageVersion {
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            10 => Ok(Self::V10),
            13 => Ok(Self::V13),
            15 => Ok(Self::V15),
            16 => Ok(Self::V16),
            18 => Ok(Self::V18),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    #[must_use]
    pub fn to_raw(self) -> u32 {
        match self {
            Self::V10 => 10,
            Self::V13 => 13,
            Self::V15 => 15,
            Self::V16 => 16,
            Self::V18 => 18,
        }
    }

    /// BG3 packages carry the header at the start of the file; DOS2
    /// packages carry a trailer at the end.
    #[must_use]
    pub fn is_bg3_layout(self) -> bool {
        matches!(self, Self::V15 | Self::V16 | Self::V18)
    }

    /// Width of one file table entry.
    #[must_use]
    pub fn entry_size(self) -> usize {
        match self {
            Self::V18 => 272,
            Self::V15 | Self::V16 => 304,
            Self::V10 | Self::V13 => 280,
        }
    }

    /// v10..v16 entries carry a CRC-32 over the compressed payload.
    #[must_use]
    pub fn has_crc(self) -> bool {
        !matches!(self, Self::V18)
    }

    /// Payload offsets in legacy packages are relative to the leading
    /// header block rather than the file start.
    #[must_use]
    pub fn data_offset(self) -> u64 {
        match self {
            Self::V10 => DOS2_TRAILER_SIZE as u64,
            _ => 0,
        }
    }
}

/// Parsed package header, from either layout.
#[derive(Debug, Clone)]
pub struct PackageHeader {
    pub version: PackageVersion,
    pub file_list_offset: u64,
    pub file_list_size: u32,
    pub flags: u8,
    pub priority: u8,
    pub md5: [u8; 16],
    pub num_parts: u16,
}

/// One file table entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub offset: u64,
    pub size_on_disk: u64,
    pub uncompressed_size: u64,
    pub part: u32,
    pub flags: u8,
    pub crc: u32,
}

impl FileEntry {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.offset & DELETED_OFFSET_MASK == DELETED_OFFSET
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.flags & 0x0F != 0
    }
}

/// A decompressed file from a package, with the flags needed to repack
/// it identically.
#[derive(Debug, Clone)]
pub struct PackagedFile {
    pub path: String,
    pub data: Vec<u8>,
    pub flags: u8,
}

/// Result of reading a whole package. File order matches the on-disk
/// table and is significant for byte-identical repacks.
#[derive(Debug)]
pub struct Package {
    pub version: PackageVersion,
    pub flags: u8,
    pub priority: u8,
    pub files: Vec<PackagedFile>,
}
