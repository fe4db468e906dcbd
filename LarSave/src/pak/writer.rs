//! LSV package writer

use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::types::{PackageVersion, DOS2_TRAILER_SIZE, MAGIC, PATH_LENGTH};
use crate::compression;
use crate::error::{Error, Result};

/// Alignment of payloads in DOS2 packages.
const DOS2_ALIGNMENT: usize = 64;
/// Padding byte between aligned payloads.
const DOS2_PADDING: u8 = 0xAD;

/// File queued for packing.
struct PendingFile {
    path: String,
    data: Vec<u8>,
    flags: u8,
}

struct WrittenEntry {
    path: String,
    offset: u64,
    size_on_disk: u64,
    uncompressed_size: u64,
    flags: u8,
    crc: u32,
}

/// LSV package writer. Files are emitted in insertion order, which is
/// what byte-identical repacks depend on.
pub struct LsvWriter {
    version: PackageVersion,
    flags: u8,
    priority: u8,
    files: Vec<PendingFile>,
}

impl LsvWriter {
    #[must_use]
    pub fn new(version: PackageVersion) -> Self {
        Self { version, flags: 0, priority: 0, files: Vec::new() }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Queue a file. `flags` selects the per-file compression method and
    /// level as stored in the table entry.
    pub fn add_file(&mut self, path: impl Into<String>, data: Vec<u8>, flags: u8) {
        self.files.push(PendingFile { path: path.into(), data, flags });
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Assemble the package.
    pub fn write(&self) -> Result<Vec<u8>> {
        if self.version == PackageVersion::V10 {
            // v10 payload offsets are relative to a legacy leading block
            // this writer does not produce.
            return Err(Error::Unsupported(
                "writing v10 packages is not supported".to_string(),
            ));
        }
        let bg3 = self.version.is_bg3_layout();
        // BG3 entries store absolute file offsets (the 40-byte header
        // included); DOS2 data starts at offset zero.
        let data_base: u64 = if bg3 { 40 } else { 0 };

        let mut data_section = Vec::new();
        let mut entries = Vec::with_capacity(self.files.len());

        for file in &self.files {
            // DOS2 payloads start on 64-byte boundaries, padded with 0xAD.
            if !bg3 && data_section.len() % DOS2_ALIGNMENT != 0 {
                let aligned = data_section.len().div_ceil(DOS2_ALIGNMENT) * DOS2_ALIGNMENT;
                data_section.resize(aligned, DOS2_PADDING);
            }

            let payload = if file.flags & 0x0F == 0 {
                file.data.clone()
            } else {
                compression::compress(&file.data, file.flags)?
            };
            let crc = if self.version.has_crc() {
                crc32fast::hash(&payload)
            } else {
                0
            };

            entries.push(WrittenEntry {
                path: file.path.clone(),
                offset: data_base + data_section.len() as u64,
                size_on_disk: payload.len() as u64,
                uncompressed_size: file.data.len() as u64,
                flags: file.flags,
                crc,
            });
            data_section.extend_from_slice(&payload);
        }

        let table = self.build_table(&entries)?;
        let compressed_table = lz4_flex::block::compress(&table);
        // Readers size their scratch buffers from the uncompressed side.
        if compressed_table.len() > table.len() {
            return Err(Error::Format(format!(
                "file table grew under compression ({} > {})",
                compressed_table.len(),
                table.len()
            )));
        }

        tracing::debug!(
            "packing {} files, {} data bytes, v{}",
            entries.len(),
            data_section.len(),
            self.version.to_raw()
        );

        if bg3 {
            self.assemble_bg3(&data_section, &entries, &compressed_table)
        } else {
            self.assemble_dos2(&data_section, &entries, &compressed_table)
        }
    }

    /// Write the package straight to disk.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.write()?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn build_table(&self, entries: &[WrittenEntry]) -> Result<Vec<u8>> {
        let mut table = Vec::with_capacity(entries.len() * self.version.entry_size());

        for entry in entries {
            let start = table.len();
            let name = entry.path.as_bytes();
            if name.len() >= PATH_LENGTH {
                return Err(Error::Format(format!(
                    "path {:?} exceeds {PATH_LENGTH} bytes",
                    entry.path
                )));
            }
            table.extend_from_slice(name);
            table.resize(start + PATH_LENGTH, 0);

            match self.version {
                PackageVersion::V18 => {
                    table.write_u32::<LittleEndian>((entry.offset & 0xFFFF_FFFF) as u32)?;
                    table.write_u16::<LittleEndian>((entry.offset >> 32) as u16)?;
                    table.push(0); // archive part
                    table.push(entry.flags);
                    table.write_u32::<LittleEndian>(entry.size_on_disk as u32)?;
                    table.write_u32::<LittleEndian>(entry.uncompressed_size as u32)?;
                }
                PackageVersion::V15 | PackageVersion::V16 => {
                    table.write_u64::<LittleEndian>(entry.offset)?;
                    table.write_u64::<LittleEndian>(entry.size_on_disk)?;
                    table.write_u64::<LittleEndian>(entry.uncompressed_size)?;
                    table.write_u32::<LittleEndian>(0)?; // archive part
                    table.write_u32::<LittleEndian>(u32::from(entry.flags))?;
                    table.write_u32::<LittleEndian>(entry.crc)?;
                    table.extend_from_slice(&[0u8; 12]); // reserved
                }
                PackageVersion::V10 | PackageVersion::V13 => {
                    table.write_u32::<LittleEndian>(entry.offset as u32)?;
                    table.write_u32::<LittleEndian>(entry.size_on_disk as u32)?;
                    table.write_u32::<LittleEndian>(entry.uncompressed_size as u32)?;
                    table.write_u32::<LittleEndian>(0)?; // archive part
                    table.write_u32::<LittleEndian>(u32::from(entry.flags))?;
                    table.write_u32::<LittleEndian>(entry.crc)?;
                }
            }
        }

        Ok(table)
    }

    /// BG3: `header ‖ data ‖ numFiles ‖ compressedListSize ‖ compressedList`.
    fn assemble_bg3(
        &self,
        data: &[u8],
        entries: &[WrittenEntry],
        compressed_table: &[u8],
    ) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(40 + data.len() + compressed_table.len() + 8);

        out.extend_from_slice(&MAGIC);
        out.write_u32::<LittleEndian>(self.version.to_raw())?;
        out.write_u64::<LittleEndian>(40 + data.len() as u64)?;
        out.write_u32::<LittleEndian>(compressed_table.len() as u32 + 8)?;
        out.push(self.flags);
        out.push(self.priority);
        out.extend_from_slice(&[0u8; 16]); // md5, not populated on write
        out.write_u16::<LittleEndian>(1)?; // single part

        out.extend_from_slice(data);
        out.write_u32::<LittleEndian>(entries.len() as u32)?;
        out.write_u32::<LittleEndian>(compressed_table.len() as u32)?;
        out.extend_from_slice(compressed_table);

        Ok(out)
    }

    /// DOS2: `data ‖ numFiles ‖ compressedList ‖ trailer`.
    fn assemble_dos2(
        &self,
        data: &[u8],
        entries: &[WrittenEntry],
        compressed_table: &[u8],
    ) -> Result<Vec<u8>> {
        let mut out =
            Vec::with_capacity(data.len() + compressed_table.len() + 4 + DOS2_TRAILER_SIZE);

        out.extend_from_slice(data);

        let file_list_offset = out.len() as u32;
        out.write_u32::<LittleEndian>(entries.len() as u32)?;
        out.extend_from_slice(compressed_table);

        // Trailer: the 32-byte header, the trailer size, the signature.
        out.write_u32::<LittleEndian>(self.version.to_raw())?;
        out.write_u32::<LittleEndian>(file_list_offset)?;
        out.write_u32::<LittleEndian>(compressed_table.len() as u32 + 4)?;
        out.write_u16::<LittleEndian>(1)?; // single part
        out.push(self.flags);
        out.push(self.priority);
        out.extend_from_slice(&[0u8; 16]); // md5, not populated on write
        out.write_u32::<LittleEndian>(DOS2_TRAILER_SIZE as u32)?;
        out.extend_from_slice(&MAGIC);

        Ok(out)
    }
}
