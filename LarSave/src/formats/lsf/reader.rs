//! LSF file reading and tree reconstruction

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use super::string_table::StringTable;
use super::{values, MetadataFormat, MAGIC, MAX_VERSION, MIN_VERSION, VERSION_BG3, VERSION_BG3_HEADER};
use crate::compression;
use crate::error::{Error, Result};
use crate::tree::{AttrType, AttrValue, Document, Node, Version};

/// Read an LSF file from disk.
pub fn read_lsf<P: AsRef<Path>>(path: P) -> Result<Document> {
    let buffer = std::fs::read(path)?;
    parse_lsf_bytes(&buffer)
}

/// Parse LSF data from a byte buffer.
pub fn parse_lsf_bytes(data: &[u8]) -> Result<Document> {
    LsfParser::new(data).parse()
}

/// Per-block size pair from the metadata block.
#[derive(Debug, Clone, Copy, Default)]
struct BlockSizes {
    uncompressed: usize,
    compressed: usize,
}

#[derive(Debug, Clone, Copy)]
struct NodeEntry {
    name_ref: u32,
    parent: i32,
    first_attr: i32,
}

#[derive(Debug, Clone, Copy)]
struct AttrEntry {
    name_ref: u32,
    type_and_length: u32,
    /// V3 only: next attribute of the owning node, -1 terminates.
    next: i32,
    /// V2 only: owning node index.
    node_index: i32,
    /// Offset into the value block; explicit for V3, cumulative for V2.
    value_offset: usize,
}

impl AttrEntry {
    fn type_id(&self) -> u32 {
        self.type_and_length & 0x3F
    }

    fn length(&self) -> usize {
        (self.type_and_length >> 6) as usize
    }
}

/// Single-shot parser; state lives only for the duration of one `parse`.
struct LsfParser<'a> {
    cursor: Cursor<&'a [u8]>,
    version: u32,
    compression_flags: u8,
    metadata_format: MetadataFormat,
}

impl<'a> LsfParser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            version: 0,
            compression_flags: 0,
            metadata_format: MetadataFormat::V2,
        }
    }

    fn parse(mut self) -> Result<Document> {
        let engine_version = self.read_header()?;
        let (strings, keys, nodes, attributes, values) = self.read_metadata()?;

        let strings_block = self.read_block(strings)?;
        let table = StringTable::from_bytes(&strings_block)?;

        // v6+ stores nodes, keys, attributes, values; older files have no
        // keys section at all.
        let nodes_block = self.read_block(nodes)?;
        let keys_block = if self.version >= VERSION_BG3 {
            self.read_block(keys)?
        } else {
            Vec::new()
        };
        let attrs_block = self.read_block(attributes)?;
        let values_block = self.read_value_block(values)?;

        let node_entries = self.parse_node_entries(&nodes_block)?;
        let attr_entries = self.parse_attr_entries(&attrs_block)?;
        let node_attrs = self.attribute_lists(&node_entries, &attr_entries)?;
        let node_keys = parse_keys(&keys_block, &table, node_entries.len())?;

        let root = self.build_tree(
            &table,
            &node_entries,
            &attr_entries,
            &node_attrs,
            node_keys,
            &values_block,
        )?;

        Ok(Document::new(root, engine_version))
    }

    fn read_header(&mut self) -> Result<Version> {
        let mut magic = [0u8; 4];
        self.cursor
            .read_exact(&mut magic)
            .map_err(|_| Error::Format("file too short for LSF header".to_string()))?;
        if magic != MAGIC {
            return Err(Error::Format(format!(
                "invalid LSF magic: expected LSOF, found {magic:?}"
            )));
        }

        self.version = self.cursor.read_u32::<LittleEndian>()?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&self.version) {
            return Err(Error::UnsupportedVersion(self.version));
        }

        if self.version >= VERSION_BG3_HEADER {
            Ok(Version::from_packed64(self.cursor.read_u64::<LittleEndian>()?))
        } else {
            Ok(Version::from_packed32(self.cursor.read_u32::<LittleEndian>()?))
        }
    }

    #[allow(clippy::type_complexity)]
    fn read_metadata(
        &mut self,
    ) -> Result<(BlockSizes, BlockSizes, BlockSizes, BlockSizes, BlockSizes)> {
        fn pair(cursor: &mut Cursor<&[u8]>) -> Result<BlockSizes> {
            Ok(BlockSizes {
                uncompressed: cursor.read_u32::<LittleEndian>()? as usize,
                compressed: cursor.read_u32::<LittleEndian>()? as usize,
            })
        }

        if self.version >= VERSION_BG3 {
            let strings = pair(&mut self.cursor)?;
            let keys = pair(&mut self.cursor)?;
            let nodes = pair(&mut self.cursor)?;
            let attributes = pair(&mut self.cursor)?;
            let values = pair(&mut self.cursor)?;

            self.compression_flags = self.cursor.read_u8()?;
            let mut reserved = [0u8; 3];
            self.cursor.read_exact(&mut reserved)?;
            self.metadata_format =
                MetadataFormat::from_raw(self.cursor.read_u32::<LittleEndian>()?)?;

            Ok((strings, keys, nodes, attributes, values))
        } else {
            let strings = pair(&mut self.cursor)?;
            let nodes = pair(&mut self.cursor)?;
            let attributes = pair(&mut self.cursor)?;
            let values = pair(&mut self.cursor)?;

            self.compression_flags = (self.cursor.read_u32::<LittleEndian>()? & 0xFF) as u8;
            let _reserved = self.cursor.read_u8()?;
            let _reserved2 = self.cursor.read_u16::<LittleEndian>()?;
            self.metadata_format =
                MetadataFormat::from_raw(u32::from(self.cursor.read_u8()?))?;

            Ok((strings, BlockSizes::default(), nodes, attributes, values))
        }
    }

    /// Read the raw on-disk bytes of one block.
    fn read_raw(&mut self, size: usize) -> Result<Vec<u8>> {
        let remaining = self
            .cursor
            .get_ref()
            .len()
            .saturating_sub(self.cursor.position() as usize);
        if size > remaining {
            return Err(Error::CorruptHeader(format!(
                "block of {size} bytes extends past end of file ({remaining} left)"
            )));
        }
        let mut buf = vec![0u8; size];
        self.cursor.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_block(&mut self, sizes: BlockSizes) -> Result<Vec<u8>> {
        // Zero on-disk size with a nonzero payload size marks a stored
        // (uncompressed) block.
        if sizes.compressed == 0 {
            return self.read_raw(sizes.uncompressed);
        }
        let raw = self.read_raw(sizes.compressed)?;
        compression::decompress(&raw, sizes.uncompressed, self.compression_flags)
            .map_err(|e| Error::CorruptBlock(format!("block decode failed: {e}")))
    }

    /// The value block of some BG3 level caches does not decode under the
    /// declared method. Fall back to zstd, then to the raw bytes padded
    /// with zeros to the declared size.
    fn read_value_block(&mut self, sizes: BlockSizes) -> Result<Vec<u8>> {
        if sizes.compressed == 0 {
            return self.read_raw(sizes.uncompressed);
        }
        let raw = self.read_raw(sizes.compressed)?;

        match compression::decompress(&raw, sizes.uncompressed, self.compression_flags) {
            Ok(block) => Ok(block),
            Err(primary) => {
                if let Ok(block) = compression::decompress_zstd(&raw, sizes.uncompressed) {
                    tracing::debug!("value block decoded via zstd fallback");
                    return Ok(block);
                }
                tracing::warn!(
                    "value block failed to decode ({primary}); keeping raw bytes zero-padded \
                     to {} bytes",
                    sizes.uncompressed
                );
                let mut block = raw;
                if block.len() < sizes.uncompressed {
                    block.resize(sizes.uncompressed, 0);
                }
                Ok(block)
            }
        }
    }

    fn parse_node_entries(&self, block: &[u8]) -> Result<Vec<NodeEntry>> {
        let entry_size = match self.metadata_format {
            MetadataFormat::V3 => 16,
            MetadataFormat::V2 => 12,
        };
        if block.len() % entry_size != 0 {
            return Err(Error::CorruptIndex(format!(
                "node table size {} is not a multiple of {entry_size}",
                block.len()
            )));
        }

        let mut cursor = Cursor::new(block);
        let mut entries = Vec::with_capacity(block.len() / entry_size);
        for index in 0..block.len() / entry_size {
            let entry = match self.metadata_format {
                MetadataFormat::V3 => {
                    let name_ref = cursor.read_u32::<LittleEndian>()?;
                    let parent = cursor.read_i32::<LittleEndian>()?;
                    let _next_sibling = cursor.read_i32::<LittleEndian>()?;
                    let first_attr = cursor.read_i32::<LittleEndian>()?;
                    NodeEntry { name_ref, parent, first_attr }
                }
                MetadataFormat::V2 => {
                    let name_ref = cursor.read_u32::<LittleEndian>()?;
                    let first_attr = cursor.read_i32::<LittleEndian>()?;
                    let parent = cursor.read_i32::<LittleEndian>()?;
                    NodeEntry { name_ref, parent, first_attr }
                }
            };

            // Flattening is preorder, so a parent always precedes its
            // children; anything else cannot be assembled into a tree.
            if entry.parent >= index as i32 {
                return Err(Error::CorruptIndex(format!(
                    "node {index} references parent {} ahead of it",
                    entry.parent
                )));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    fn parse_attr_entries(&self, block: &[u8]) -> Result<Vec<AttrEntry>> {
        let entry_size = match self.metadata_format {
            MetadataFormat::V3 => 16,
            MetadataFormat::V2 => 12,
        };
        if block.len() % entry_size != 0 {
            return Err(Error::CorruptIndex(format!(
                "attribute table size {} is not a multiple of {entry_size}",
                block.len()
            )));
        }

        let mut cursor = Cursor::new(block);
        let mut entries = Vec::with_capacity(block.len() / entry_size);
        let mut running_offset = 0usize;
        for _ in 0..block.len() / entry_size {
            let entry = match self.metadata_format {
                MetadataFormat::V3 => {
                    let name_ref = cursor.read_u32::<LittleEndian>()?;
                    let type_and_length = cursor.read_u32::<LittleEndian>()?;
                    let next = cursor.read_i32::<LittleEndian>()?;
                    let value_offset = cursor.read_u32::<LittleEndian>()? as usize;
                    AttrEntry { name_ref, type_and_length, next, node_index: -1, value_offset }
                }
                MetadataFormat::V2 => {
                    let name_ref = cursor.read_u32::<LittleEndian>()?;
                    let type_and_length = cursor.read_u32::<LittleEndian>()?;
                    let node_index = cursor.read_i32::<LittleEndian>()?;
                    // V2 stores attributes in declaration order; value
                    // offsets advance cumulatively through the stream.
                    let entry = AttrEntry {
                        name_ref,
                        type_and_length,
                        next: -1,
                        node_index,
                        value_offset: running_offset,
                    };
                    running_offset += entry.length();
                    entry
                }
            };
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Per-node attribute index lists, in declaration order.
    fn attribute_lists(
        &self,
        nodes: &[NodeEntry],
        attrs: &[AttrEntry],
    ) -> Result<Vec<Vec<usize>>> {
        let mut lists = vec![Vec::new(); nodes.len()];

        match self.metadata_format {
            MetadataFormat::V3 => {
                // Explicit chains; a visited set guards against loops in
                // malformed inputs.
                let mut visited = vec![false; attrs.len()];
                for (node_index, node) in nodes.iter().enumerate() {
                    let mut current = node.first_attr;
                    while current >= 0 {
                        let index = current as usize;
                        let entry = attrs.get(index).ok_or_else(|| {
                            Error::CorruptIndex(format!(
                                "attribute index {index} out of range"
                            ))
                        })?;
                        if visited[index] {
                            return Err(Error::CorruptIndex(format!(
                                "attribute chain of node {node_index} revisits entry {index}"
                            )));
                        }
                        visited[index] = true;
                        lists[node_index].push(index);
                        current = entry.next;
                    }
                }
            }
            MetadataFormat::V2 => {
                for (index, entry) in attrs.iter().enumerate() {
                    let node_index = entry.node_index;
                    if node_index < 0 || node_index as usize >= nodes.len() {
                        return Err(Error::CorruptIndex(format!(
                            "attribute {index} references node {node_index} out of range"
                        )));
                    }
                    lists[node_index as usize].push(index);
                }
            }
        }

        Ok(lists)
    }

    fn build_tree(
        &self,
        table: &StringTable,
        node_entries: &[NodeEntry],
        attr_entries: &[AttrEntry],
        node_attrs: &[Vec<usize>],
        node_keys: Vec<Option<String>>,
        values: &[u8],
    ) -> Result<Node> {
        let mut built: Vec<Option<Node>> = Vec::with_capacity(node_entries.len());

        for (index, entry) in node_entries.iter().enumerate() {
            let mut node = Node::new(table.resolve(entry.name_ref)?);
            node.key = node_keys.get(index).cloned().flatten();

            for &attr_index in &node_attrs[index] {
                let attr = &attr_entries[attr_index];
                let name = table.resolve(attr.name_ref)?;
                let ty = AttrType::from_id(attr.type_id()).ok_or_else(|| {
                    Error::Format(format!("unknown attribute type {}", attr.type_id()))
                })?;

                let start = attr.value_offset;
                let end = start + attr.length();
                let value = if end <= values.len() {
                    values::decode_value(&values[start..end], ty, self.version).map_err(
                        |e| Error::CorruptPayload(format!("attribute {name}: {e}")),
                    )?
                } else {
                    // Declared length runs past the value block; keep what
                    // is there as hex rather than dropping the attribute.
                    let clamped = values.get(start..).unwrap_or(&[]);
                    tracing::warn!(
                        "attribute {name} overruns the value block; rendering {} bytes as hex",
                        clamped.len()
                    );
                    AttrValue::String(values::hex_string(clamped))
                };

                node.set_attribute(name.to_string(), ty, value);
            }

            built.push(Some(node));
        }

        // Parents precede children, so attaching in reverse completes
        // every child list before its owner moves. Reverse-order pushes
        // build each list back-to-front, so flip it when the node moves.
        for index in (0..node_entries.len()).rev() {
            let parent = node_entries[index].parent;
            if parent >= 0 {
                let mut child = built[index].take().unwrap();
                child.children.reverse();
                built[parent as usize].as_mut().unwrap().children.push(child);
            }
        }
        for node in built.iter_mut().flatten() {
            node.children.reverse();
        }

        let regions: Vec<Node> = built.into_iter().flatten().collect();
        if regions.is_empty() {
            return Err(Error::Format("document contains no nodes".to_string()));
        }
        Ok(Node::from_regions(regions))
    }
}

/// Keys block: `{u32 nodeIndex, u32 nameRef}` records.
fn parse_keys(
    block: &[u8],
    table: &StringTable,
    node_count: usize,
) -> Result<Vec<Option<String>>> {
    let mut keys = vec![None; node_count];
    if block.is_empty() {
        return Ok(keys);
    }
    if block.len() % 8 != 0 {
        return Err(Error::CorruptIndex(format!(
            "keys table size {} is not a multiple of 8",
            block.len()
        )));
    }

    let mut cursor = Cursor::new(block);
    for _ in 0..block.len() / 8 {
        let node_index = cursor.read_u32::<LittleEndian>()? as usize;
        let name_ref = cursor.read_u32::<LittleEndian>()?;
        if node_index < keys.len() {
            keys[node_index] = Some(table.resolve(name_ref)?.to_string());
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let err = parse_lsf_bytes(b"FSOL\x06\x00\x00\x00").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut data = Vec::new();
        data.extend_from_slice(b"LSOF");
        data.extend_from_slice(&99u32.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        let err = parse_lsf_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(99)));
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(parse_lsf_bytes(b"LS").is_err());
    }
}
