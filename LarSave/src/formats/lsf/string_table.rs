//! Hash-bucketed string table for LSF files
//!
//! The on-disk layout is a fixed array of buckets, each holding a chain of
//! length-prefixed UTF-8 strings. References are packed
//! `(bucket << 16) | chainIndex`. Bucket assignment must reproduce the
//! reference implementation (LSLib) exactly, down to its 32-bit overflow semantics,
//! otherwise re-serialized files stop being byte-identical.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Bucket count LSLib writes. Readers accept whatever
/// the file declares.
pub const NUM_BUCKETS: usize = 0x200;

/// 32-bit string hash matching `String.GetHashCode` as LSLib
/// observes it: a wrapping multiply-accumulate over UTF-16 code units.
/// 64-bit arithmetic here would shift bucket assignments.
#[must_use]
pub fn name_hash(s: &str) -> u32 {
    let mut hash: u32 = 0;
    for unit in s.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(u32::from(unit));
    }
    hash
}

/// Fold a hash into a bucket index.
#[must_use]
pub fn bucket_of(hash: u32) -> usize {
    ((hash ^ (hash >> 9) ^ (hash >> 18) ^ (hash >> 27)) & 0x1FF) as usize
}

#[derive(Debug, Clone)]
pub struct StringTable {
    buckets: Vec<Vec<String>>,
    index: HashMap<String, u32>,
}

impl StringTable {
    /// Empty write-side table with the canonical bucket count.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); NUM_BUCKETS],
            index: HashMap::new(),
        }
    }

    /// Parse a decompressed strings block.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let num_buckets = cursor.read_u32::<LittleEndian>()? as usize;

        let mut buckets = Vec::with_capacity(num_buckets);
        for _ in 0..num_buckets {
            let chain_len = cursor.read_u16::<LittleEndian>()? as usize;
            let mut chain = Vec::with_capacity(chain_len);
            for _ in 0..chain_len {
                let len = cursor.read_u16::<LittleEndian>()? as usize;
                let mut bytes = vec![0u8; len];
                cursor.read_exact(&mut bytes)?;
                chain.push(String::from_utf8_lossy(&bytes).into_owned());
            }
            buckets.push(chain);
        }

        Ok(Self { buckets, index: HashMap::new() })
    }

    /// Intern a string, returning its packed `(bucket << 16) | index`
    /// reference. Strings are assigned in first-visit order within their
    /// hash bucket.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&packed) = self.index.get(s) {
            return packed;
        }

        let bucket = bucket_of(name_hash(s));
        let chain_index = self.buckets[bucket].len();
        let packed = ((bucket as u32) << 16) | (chain_index as u32);

        self.buckets[bucket].push(s.to_string());
        self.index.insert(s.to_string(), packed);
        packed
    }

    /// Resolve a packed reference.
    pub fn resolve(&self, packed: u32) -> Result<&str> {
        let bucket = (packed >> 16) as usize;
        let chain_index = (packed & 0xFFFF) as usize;
        self.buckets
            .get(bucket)
            .and_then(|chain| chain.get(chain_index))
            .map(String::as_str)
            .ok_or_else(|| {
                Error::CorruptIndex(format!("string reference {packed:#010x} out of range"))
            })
    }

    /// Serialize to the on-disk strings block.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(self.buckets.len() as u32)?;
        for chain in &self.buckets {
            buf.write_u16::<LittleEndian>(chain.len() as u16)?;
            for s in chain {
                buf.write_u16::<LittleEndian>(s.len() as u16)?;
                buf.extend_from_slice(s.as_bytes());
            }
        }
        Ok(buf)
    }

    #[must_use]
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}
