//! LSV package reader
//!
//! Header discovery is dual-layout: BG3 packages open with a 40-byte
//! header, DOS2 packages end with a 40-byte trailer repeating the header
//! fields. Both funnel into the same file table and extraction path.

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use super::types::{
    FileEntry, Package, PackageHeader, PackageVersion, PackagedFile, BG3_HEADER_SIZE,
    DOS2_TRAILER_SIZE, MAGIC, PATH_LENGTH,
};
use crate::compression;
use crate::error::{Error, Result};

/// LSV package reader. Owns the package bytes for the duration of a
/// single read.
pub struct LsvReader {
    data: Vec<u8>,
    header: Option<PackageHeader>,
    file_table: Vec<FileEntry>,
}

impl LsvReader {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, header: None, file_table: Vec::new() }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }

    /// Locate and parse the package header from either layout.
    pub fn read_header(&mut self) -> Result<&PackageHeader> {
        if self.data.len() >= 8 && self.data[..4] == MAGIC {
            let version = u32::from_le_bytes(self.data[4..8].try_into().unwrap());
            if matches!(version, 15 | 16 | 18) {
                return self.read_bg3_header();
            }
        }
        self.read_dos2_trailer()
    }

    /// BG3 layout: 40-byte header at the start of the file.
    fn read_bg3_header(&mut self) -> Result<&PackageHeader> {
        if self.data.len() < BG3_HEADER_SIZE {
            return Err(Error::CorruptHeader("file too short for header".to_string()));
        }
        let mut cursor = Cursor::new(&self.data[..BG3_HEADER_SIZE]);

        let mut signature = [0u8; 4];
        cursor.read_exact(&mut signature)?;
        let version = PackageVersion::from_raw(cursor.read_u32::<LittleEndian>()?)?;
        let file_list_offset = cursor.read_u64::<LittleEndian>()?;
        let file_list_size = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u8()?;
        let priority = cursor.read_u8()?;
        let mut md5 = [0u8; 16];
        cursor.read_exact(&mut md5)?;
        let num_parts = cursor.read_u16::<LittleEndian>()?;

        self.header = Some(PackageHeader {
            version,
            file_list_offset,
            file_list_size,
            flags,
            priority,
            md5,
            num_parts,
        });
        Ok(self.header.as_ref().unwrap())
    }

    /// DOS2 layout: 32-byte header, a `u32` total trailer size and the
    /// signature, all at the tail of the file.
    fn read_dos2_trailer(&mut self) -> Result<&PackageHeader> {
        if self.data.len() < DOS2_TRAILER_SIZE {
            return Err(Error::Format("not an LSV package".to_string()));
        }
        let trailer = &self.data[self.data.len() - DOS2_TRAILER_SIZE..];
        if trailer[36..40] != MAGIC {
            return Err(Error::Format("LSPK signature not found".to_string()));
        }

        let mut cursor = Cursor::new(trailer);
        let version = PackageVersion::from_raw(cursor.read_u32::<LittleEndian>()?)?;
        if version.is_bg3_layout() {
            return Err(Error::CorruptHeader(format!(
                "trailer carries BG3 version {}",
                version.to_raw()
            )));
        }
        let file_list_offset = u64::from(cursor.read_u32::<LittleEndian>()?);
        let file_list_size = cursor.read_u32::<LittleEndian>()?;
        let num_parts = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u8()?;
        let priority = cursor.read_u8()?;
        let mut md5 = [0u8; 16];
        cursor.read_exact(&mut md5)?;

        self.header = Some(PackageHeader {
            version,
            file_list_offset,
            file_list_size,
            flags,
            priority,
            md5,
            num_parts,
        });
        Ok(self.header.as_ref().unwrap())
    }

    /// Read and decompress the file table.
    pub fn read_file_table(&mut self) -> Result<&[FileEntry]> {
        if self.header.is_none() {
            self.read_header()?;
        }
        let header = self.header.clone().unwrap();
        let version = header.version;

        let list_start = header.file_list_offset as usize;
        if list_start + 4 > self.data.len() {
            return Err(Error::CorruptIndex(format!(
                "file list offset {list_start} past end of package"
            )));
        }
        let mut cursor = Cursor::new(&self.data[list_start..]);
        let num_files = cursor.read_u32::<LittleEndian>()? as usize;

        let compressed_size = if version.is_bg3_layout() {
            cursor.read_u32::<LittleEndian>()? as usize
        } else {
            // v13 stores only the total list size in the header.
            (header.file_list_size as usize).saturating_sub(4)
        };

        let mut compressed = vec![0u8; compressed_size];
        cursor
            .read_exact(&mut compressed)
            .map_err(|_| Error::CorruptIndex("file table truncated".to_string()))?;

        let table_size = num_files * version.entry_size();
        let table = compression::decompress_lz4(&compressed, table_size)
            .map_err(|e| Error::CorruptIndex(format!("file table decode failed: {e}")))?;
        if table.len() != table_size {
            return Err(Error::CorruptIndex(format!(
                "file table is {} bytes, expected {table_size}",
                table.len()
            )));
        }

        self.file_table.clear();
        self.file_table.reserve(num_files);
        for chunk in table.chunks_exact(version.entry_size()) {
            self.file_table.push(parse_entry(chunk, version)?);
        }

        Ok(&self.file_table)
    }

    /// Extract and decompress a single entry's payload.
    pub fn extract(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| Error::CorruptHeader("header not read yet".to_string()))?;

        let start = header
            .version
            .data_offset()
            .checked_add(entry.offset)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| Error::CorruptIndex(format!("entry {} offset overflow", entry.name)))?;
        let end = start
            .checked_add(entry.size_on_disk as usize)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| {
                Error::CorruptIndex(format!("entry {} extends past end of package", entry.name))
            })?;

        let payload = &self.data[start..end];
        if entry.is_compressed() {
            compression::decompress(payload, entry.uncompressed_size as usize, entry.flags)
        } else {
            Ok(payload.to_vec())
        }
    }

    /// Read the whole package: header, table, every live payload.
    pub fn read(mut self) -> Result<Package> {
        self.read_header()?;
        self.read_file_table()?;
        let header = self.header.clone().unwrap();

        tracing::debug!(
            "package v{} with {} entries",
            header.version.to_raw(),
            self.file_table.len()
        );

        let mut files = Vec::with_capacity(self.file_table.len());
        for entry in &self.file_table {
            if entry.is_deleted() {
                tracing::debug!("skipping deleted entry {}", entry.name);
                continue;
            }
            if entry.part != 0 {
                return Err(Error::Unsupported(format!(
                    "entry {} lives in archive part {}; multi-part packages are not handled",
                    entry.name, entry.part
                )));
            }
            let data = self.extract(entry)?;
            files.push(PackagedFile { path: entry.name.clone(), data, flags: entry.flags });
        }

        Ok(Package {
            version: header.version,
            flags: header.flags,
            priority: header.priority,
            files,
        })
    }

    /// List table entries without extracting payloads.
    pub fn list_files(&mut self) -> Result<Vec<FileEntry>> {
        if self.file_table.is_empty() {
            self.read_file_table()?;
        }
        Ok(self.file_table.clone())
    }
}

fn parse_entry(bytes: &[u8], version: PackageVersion) -> Result<FileEntry> {
    let name_end = bytes[..PATH_LENGTH]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(PATH_LENGTH);
    let name = String::from_utf8_lossy(&bytes[..name_end]).into_owned();

    let mut cursor = Cursor::new(&bytes[PATH_LENGTH..]);
    Ok(match version {
        PackageVersion::V18 => {
            let offset_low = cursor.read_u32::<LittleEndian>()?;
            let offset_high = cursor.read_u16::<LittleEndian>()?;
            let part = cursor.read_u8()?;
            let flags = cursor.read_u8()?;
            let size_on_disk = cursor.read_u32::<LittleEndian>()?;
            let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
            FileEntry {
                name,
                offset: u64::from(offset_low) | (u64::from(offset_high) << 32),
                size_on_disk: u64::from(size_on_disk),
                uncompressed_size: u64::from(uncompressed_size),
                part: u32::from(part),
                flags,
                crc: 0,
            }
        }
        PackageVersion::V15 | PackageVersion::V16 => {
            let offset = cursor.read_u64::<LittleEndian>()?;
            let size_on_disk = cursor.read_u64::<LittleEndian>()?;
            let uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            let part = cursor.read_u32::<LittleEndian>()?;
            let flags = cursor.read_u32::<LittleEndian>()?;
            let crc = cursor.read_u32::<LittleEndian>()?;
            FileEntry {
                name,
                offset,
                size_on_disk,
                uncompressed_size,
                part,
                flags: (flags & 0xFF) as u8,
                crc,
            }
        }
        PackageVersion::V10 | PackageVersion::V13 => {
            let offset = cursor.read_u32::<LittleEndian>()?;
            let size_on_disk = cursor.read_u32::<LittleEndian>()?;
            let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
            let part = cursor.read_u32::<LittleEndian>()?;
            let flags = cursor.read_u32::<LittleEndian>()?;
            let crc = cursor.read_u32::<LittleEndian>()?;
            FileEntry {
                name,
                offset: u64::from(offset),
                size_on_disk: u64::from(size_on_disk),
                uncompressed_size: u64::from(uncompressed_size),
                part,
                flags: (flags & 0xFF) as u8,
                crc,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_not_a_package() {
        let mut reader = LsvReader::new(vec![0u8; 64]);
        assert!(matches!(reader.read_header(), Err(Error::Format(_))));
    }

    #[test]
    fn short_input_is_rejected() {
        let mut reader = LsvReader::new(b"LS".to_vec());
        assert!(reader.read_header().is_err());
    }
}
