//! LSF file writing and serialization

use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::string_table::StringTable;
use super::{values, MetadataFormat, MAGIC, VERSION_BG3, VERSION_BG3_HEADER, VERSION_DOS2};
use crate::compression;
use crate::error::{Error, Result};
use crate::tree::{Document, Node};

/// Compression flags stamped into the metadata block: LZ4 with the
/// high-compression hint.
const WRITE_COMPRESSION_FLAGS: u8 = 0x42;

/// Write an LSF document to disk.
pub fn write_lsf<P: AsRef<Path>>(doc: &Document, path: P) -> Result<()> {
    let bytes = serialize_lsf(doc)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Serialize a document to LSF bytes. The format version follows the
/// engine lineage: BG3 documents get v6, DOS2 documents v3.
pub fn serialize_lsf(doc: &Document) -> Result<Vec<u8>> {
    serialize_lsf_with_format(doc, None)
}

/// Serialize with an explicit table layout override.
pub fn serialize_lsf_with_format(
    doc: &Document,
    format: Option<MetadataFormat>,
) -> Result<Vec<u8>> {
    let lsf_version = if doc.version.is_bg3() { VERSION_BG3 } else { VERSION_DOS2 };
    serialize_lsf_with_version(doc, lsf_version, format)
}

/// Serialize targeting an explicit LSF format version (v3, v5 or v6).
pub fn serialize_lsf_with_version(
    doc: &Document,
    lsf_version: u32,
    format: Option<MetadataFormat>,
) -> Result<Vec<u8>> {
    if !matches!(lsf_version, VERSION_DOS2 | VERSION_BG3_HEADER | VERSION_BG3) {
        return Err(Error::UnsupportedVersion(lsf_version));
    }
    let metadata_format = format.unwrap_or(if doc.version.is_bg3() {
        MetadataFormat::V3
    } else {
        MetadataFormat::V2
    });

    let mut flat = Flattener::new(lsf_version);
    let mut prev_region: i32 = -1;
    for region in doc.root.regions() {
        let index = flat.visit(region, -1)?;
        if prev_region >= 0 {
            flat.nodes[prev_region as usize].next_sibling = index as i32;
        }
        prev_region = index as i32;
    }

    let strings_block = flat.table.to_bytes()?;
    let nodes_block = flat.nodes_block(metadata_format)?;
    let attrs_block = flat.attrs_block(metadata_format)?;
    let keys_block = flat.keys_block()?;
    let values_block = flat.values;

    let mut output = Vec::new();
    output.extend_from_slice(&MAGIC);
    output.write_u32::<LittleEndian>(lsf_version)?;
    if lsf_version >= VERSION_BG3_HEADER {
        output.write_u64::<LittleEndian>(doc.version.to_packed64())?;
    } else {
        output.write_u32::<LittleEndian>(doc.version.to_packed32())?;
    }

    let strings = CompressedBlock::build(&strings_block)?;
    let keys = CompressedBlock::build(&keys_block)?;
    let nodes = CompressedBlock::build(&nodes_block)?;
    let attributes = CompressedBlock::build(&attrs_block)?;
    let values = CompressedBlock::build(&values_block)?;

    if lsf_version >= VERSION_BG3 {
        strings.write_sizes(&mut output)?;
        keys.write_sizes(&mut output)?;
        nodes.write_sizes(&mut output)?;
        attributes.write_sizes(&mut output)?;
        values.write_sizes(&mut output)?;

        output.push(WRITE_COMPRESSION_FLAGS);
        output.extend_from_slice(&[0u8; 3]);
        output.write_u32::<LittleEndian>(metadata_format.to_raw())?;

        output.extend_from_slice(&strings.data);
        output.extend_from_slice(&nodes.data);
        output.extend_from_slice(&keys.data);
        output.extend_from_slice(&attributes.data);
        output.extend_from_slice(&values.data);
    } else {
        strings.write_sizes(&mut output)?;
        nodes.write_sizes(&mut output)?;
        attributes.write_sizes(&mut output)?;
        values.write_sizes(&mut output)?;

        output.write_u32::<LittleEndian>(u32::from(WRITE_COMPRESSION_FLAGS))?;
        output.push(0);
        output.write_u16::<LittleEndian>(0)?;
        output.push(metadata_format.to_raw() as u8);

        output.extend_from_slice(&strings.data);
        output.extend_from_slice(&nodes.data);
        output.extend_from_slice(&attributes.data);
        output.extend_from_slice(&values.data);
    }

    Ok(output)
}

/// One on-disk block: compressed bytes plus the metadata size pair.
struct CompressedBlock {
    uncompressed: usize,
    data: Vec<u8>,
}

impl CompressedBlock {
    fn build(block: &[u8]) -> Result<Self> {
        if block.is_empty() {
            return Ok(Self { uncompressed: 0, data: Vec::new() });
        }
        let data = compression::compress(block, WRITE_COMPRESSION_FLAGS)?;
        Ok(Self { uncompressed: block.len(), data })
    }

    fn write_sizes(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.uncompressed as u32)?;
        out.write_u32::<LittleEndian>(self.data.len() as u32)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct FlatNode {
    name_ref: u32,
    parent: i32,
    next_sibling: i32,
    first_attr: i32,
}

#[derive(Debug, Clone, Copy)]
struct FlatAttr {
    name_ref: u32,
    type_and_length: u32,
    next: i32,
    node_index: i32,
    value_offset: u32,
}

/// Depth-first flattener: interning order (node name, key, attribute
/// names, then children) must stay fixed because chain indices inside the
/// string table depend on first-visit order.
struct Flattener {
    table: StringTable,
    nodes: Vec<FlatNode>,
    attrs: Vec<FlatAttr>,
    values: Vec<u8>,
    keys: Vec<(u32, u32)>,
    lsf_version: u32,
}

impl Flattener {
    fn new(lsf_version: u32) -> Self {
        Self {
            table: StringTable::new(),
            nodes: Vec::new(),
            attrs: Vec::new(),
            values: Vec::new(),
            keys: Vec::new(),
            lsf_version,
        }
    }

    fn visit(&mut self, node: &Node, parent: i32) -> Result<usize> {
        let index = self.nodes.len();
        let name_ref = self.table.intern(&node.name);
        self.nodes.push(FlatNode { name_ref, parent, next_sibling: -1, first_attr: -1 });

        if let Some(key) = &node.key {
            if self.lsf_version >= VERSION_BG3 {
                let key_ref = self.table.intern(key);
                self.keys.push((index as u32, key_ref));
            } else {
                tracing::debug!("dropping node key {key:?}: no keys section before v6");
            }
        }

        let mut prev_attr: i32 = -1;
        for (attr_name, attr) in &node.attributes {
            let name_ref = self.table.intern(attr_name);
            let offset = self.values.len();
            let length =
                values::encode_value(&mut self.values, attr.ty, &attr.value, self.lsf_version)?;
            if length > (u32::MAX >> 6) as usize {
                return Err(Error::Format(format!(
                    "attribute {attr_name} value of {length} bytes exceeds the length field"
                )));
            }

            let attr_index = self.attrs.len() as i32;
            self.attrs.push(FlatAttr {
                name_ref,
                type_and_length: attr.ty.id() | ((length as u32) << 6),
                next: -1,
                node_index: index as i32,
                value_offset: offset as u32,
            });

            if prev_attr >= 0 {
                self.attrs[prev_attr as usize].next = attr_index;
            } else {
                self.nodes[index].first_attr = attr_index;
            }
            prev_attr = attr_index;
        }

        let mut prev_child: i32 = -1;
        for child in &node.children {
            let child_index = self.visit(child, index as i32)?;
            if prev_child >= 0 {
                self.nodes[prev_child as usize].next_sibling = child_index as i32;
            }
            prev_child = child_index as i32;
        }

        Ok(index)
    }

    fn nodes_block(&self, format: MetadataFormat) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for node in &self.nodes {
            match format {
                MetadataFormat::V3 => {
                    buf.write_u32::<LittleEndian>(node.name_ref)?;
                    buf.write_i32::<LittleEndian>(node.parent)?;
                    buf.write_i32::<LittleEndian>(node.next_sibling)?;
                    buf.write_i32::<LittleEndian>(node.first_attr)?;
                }
                MetadataFormat::V2 => {
                    buf.write_u32::<LittleEndian>(node.name_ref)?;
                    buf.write_i32::<LittleEndian>(node.first_attr)?;
                    buf.write_i32::<LittleEndian>(node.parent)?;
                }
            }
        }
        Ok(buf)
    }

    fn attrs_block(&self, format: MetadataFormat) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for attr in &self.attrs {
            match format {
                MetadataFormat::V3 => {
                    buf.write_u32::<LittleEndian>(attr.name_ref)?;
                    buf.write_u32::<LittleEndian>(attr.type_and_length)?;
                    buf.write_i32::<LittleEndian>(attr.next)?;
                    buf.write_u32::<LittleEndian>(attr.value_offset)?;
                }
                MetadataFormat::V2 => {
                    buf.write_u32::<LittleEndian>(attr.name_ref)?;
                    buf.write_u32::<LittleEndian>(attr.type_and_length)?;
                    buf.write_i32::<LittleEndian>(attr.node_index)?;
                }
            }
        }
        Ok(buf)
    }

    fn keys_block(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for (node_index, name_ref) in &self.keys {
            buf.write_u32::<LittleEndian>(*node_index)?;
            buf.write_u32::<LittleEndian>(*name_ref)?;
        }
        Ok(buf)
    }
}
