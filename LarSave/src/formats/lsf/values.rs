//! LSF attribute value encoding and decoding
//!
//! Centralized both ways so the reader and writer cannot drift apart on
//! byte layout.

use std::io::{Cursor, Read};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::tree::{AttrType, AttrValue, FsStringArgument, TranslatedFsString, TranslatedString};

/// Nesting bound for TranslatedFSString argument chains. Malformed inputs
/// must not be able to recurse unboundedly.
const MAX_FS_DEPTH: usize = 64;

/// Version prefix emitted for BG3 TranslatedFSString payloads.
const FS_STRING_VERSION: u16 = 1;

/// Decode the value bytes of one attribute.
///
/// `lsf_version` selects version-dependent layouts (the u16 prefix of
/// BG3 TranslatedFSString payloads).
pub fn decode_value(bytes: &[u8], ty: AttrType, lsf_version: u32) -> Result<AttrValue> {
    let mut cursor = Cursor::new(bytes);

    Ok(match ty {
        AttrType::None => AttrValue::None,
        AttrType::Byte => AttrValue::Byte(cursor.read_u8()?),
        AttrType::Short => AttrValue::Short(cursor.read_i16::<LittleEndian>()?),
        AttrType::UShort => AttrValue::UShort(cursor.read_u16::<LittleEndian>()?),
        AttrType::Int => AttrValue::Int(cursor.read_i32::<LittleEndian>()?),
        AttrType::UInt => AttrValue::UInt(cursor.read_u32::<LittleEndian>()?),
        AttrType::Float => AttrValue::Float(cursor.read_f32::<LittleEndian>()?),
        AttrType::Double => AttrValue::Double(cursor.read_f64::<LittleEndian>()?),
        AttrType::IVec2 | AttrType::IVec3 | AttrType::IVec4 => {
            let n = ty.components().unwrap_or(0);
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(cursor.read_i32::<LittleEndian>()?);
            }
            AttrValue::IVec(v)
        }
        AttrType::Vec2
        | AttrType::Vec3
        | AttrType::Vec4
        | AttrType::Mat2
        | AttrType::Mat3
        | AttrType::Mat3x4
        | AttrType::Mat4x3
        | AttrType::Mat4 => {
            let n = ty.components().unwrap_or(0);
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(cursor.read_f32::<LittleEndian>()?);
            }
            AttrValue::Vec(v)
        }
        AttrType::Bool => AttrValue::Bool(cursor.read_u8()? != 0),
        AttrType::String
        | AttrType::Path
        | AttrType::FixedString
        | AttrType::LSString
        | AttrType::WString
        | AttrType::LSWString => AttrValue::String(terminated_string(bytes)),
        AttrType::ULongLong => AttrValue::ULongLong(cursor.read_u64::<LittleEndian>()?),
        AttrType::ScratchBuffer => AttrValue::Blob(BASE64.encode(bytes)),
        AttrType::Long | AttrType::Int64 => AttrValue::Long(cursor.read_i64::<LittleEndian>()?),
        AttrType::Int8 => AttrValue::Int8(cursor.read_i8()?),
        AttrType::TranslatedString => {
            AttrValue::TranslatedString(read_translated_string(&mut cursor)?)
        }
        AttrType::Uuid => {
            let mut raw = [0u8; 16];
            cursor.read_exact(&mut raw)?;
            AttrValue::Uuid(format_uuid(&raw))
        }
        AttrType::TranslatedFSString => {
            AttrValue::TranslatedFsString(read_translated_fs(&mut cursor, lsf_version, 0)?)
        }
    })
}

/// Append one attribute value to the value blob, returning the number of
/// bytes written.
pub fn encode_value(
    buf: &mut Vec<u8>,
    ty: AttrType,
    value: &AttrValue,
    lsf_version: u32,
) -> Result<usize> {
    let start = buf.len();

    match (ty, value) {
        (AttrType::None, AttrValue::None) => {}
        (AttrType::Byte, AttrValue::Byte(v)) => buf.push(*v),
        (AttrType::Short, AttrValue::Short(v)) => buf.write_i16::<LittleEndian>(*v)?,
        (AttrType::UShort, AttrValue::UShort(v)) => buf.write_u16::<LittleEndian>(*v)?,
        (AttrType::Int, AttrValue::Int(v)) => buf.write_i32::<LittleEndian>(*v)?,
        (AttrType::UInt, AttrValue::UInt(v)) => buf.write_u32::<LittleEndian>(*v)?,
        (AttrType::Float, AttrValue::Float(v)) => buf.write_f32::<LittleEndian>(*v)?,
        (AttrType::Double, AttrValue::Double(v)) => buf.write_f64::<LittleEndian>(*v)?,
        (AttrType::IVec2 | AttrType::IVec3 | AttrType::IVec4, AttrValue::IVec(v)) => {
            expect_components(ty, v.len())?;
            for x in v {
                buf.write_i32::<LittleEndian>(*x)?;
            }
        }
        (
            AttrType::Vec2
            | AttrType::Vec3
            | AttrType::Vec4
            | AttrType::Mat2
            | AttrType::Mat3
            | AttrType::Mat3x4
            | AttrType::Mat4x3
            | AttrType::Mat4,
            AttrValue::Vec(v),
        ) => {
            expect_components(ty, v.len())?;
            for x in v {
                buf.write_f32::<LittleEndian>(*x)?;
            }
        }
        (AttrType::Bool, AttrValue::Bool(v)) => buf.push(u8::from(*v)),
        (
            AttrType::String
            | AttrType::Path
            | AttrType::FixedString
            | AttrType::LSString
            | AttrType::WString
            | AttrType::LSWString,
            AttrValue::String(s),
        ) => {
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        (AttrType::ULongLong, AttrValue::ULongLong(v)) => buf.write_u64::<LittleEndian>(*v)?,
        (AttrType::ScratchBuffer, AttrValue::Blob(b64)) => {
            let decoded = BASE64
                .decode(b64)
                .map_err(|e| Error::Format(format!("invalid base64 ScratchBuffer: {e}")))?;
            buf.extend_from_slice(&decoded);
        }
        (AttrType::Long | AttrType::Int64, AttrValue::Long(v)) => {
            buf.write_i64::<LittleEndian>(*v)?;
        }
        (AttrType::Int8, AttrValue::Int8(v)) => buf.write_i8(*v)?,
        (AttrType::TranslatedString, AttrValue::TranslatedString(ts)) => {
            write_translated_string(buf, ts)?;
        }
        (AttrType::Uuid, AttrValue::Uuid(s)) => buf.extend_from_slice(&parse_uuid(s)),
        (AttrType::TranslatedFSString, AttrValue::TranslatedFsString(fs)) => {
            write_translated_fs(buf, fs, lsf_version, 0)?;
        }
        (ty, value) => {
            return Err(Error::Format(format!(
                "attribute value {value:?} does not match declared type {}",
                ty.name()
            )));
        }
    }

    Ok(buf.len() - start)
}

/// Strip trailing NUL terminators from a string payload.
fn terminated_string(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Length-prefixed string: `i32` length counts the NUL terminator, zero
/// means absent entirely.
fn read_prefixed_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_i32::<LittleEndian>()?.max(0) as usize;
    if len == 0 {
        return Ok(String::new());
    }
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(terminated_string(&bytes))
}

fn write_prefixed_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.is_empty() {
        buf.write_i32::<LittleEndian>(0)?;
    } else {
        buf.write_i32::<LittleEndian>(s.len() as i32 + 1)?;
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }
    Ok(())
}

/// Exact-length string without terminator, used by argument keys/values.
fn read_exact_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_i32::<LittleEndian>()?.max(0) as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_exact_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_i32::<LittleEndian>(s.len() as i32)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_translated_string(cursor: &mut Cursor<&[u8]>) -> Result<TranslatedString> {
    let value = read_prefixed_string(cursor)?;
    let handle = read_prefixed_string(cursor)?;
    Ok(TranslatedString { value, handle })
}

fn write_translated_string(buf: &mut Vec<u8>, ts: &TranslatedString) -> Result<()> {
    write_prefixed_string(buf, &ts.value)?;
    write_prefixed_string(buf, &ts.handle)?;
    Ok(())
}

fn read_translated_fs(
    cursor: &mut Cursor<&[u8]>,
    lsf_version: u32,
    depth: usize,
) -> Result<TranslatedFsString> {
    if depth > MAX_FS_DEPTH {
        return Err(Error::CorruptPayload(
            "TranslatedFSString arguments nested too deeply".to_string(),
        ));
    }

    if lsf_version >= super::VERSION_BG3_HEADER {
        let _version = cursor.read_u16::<LittleEndian>()?;
    }

    let value = read_prefixed_string(cursor)?;
    let handle = read_prefixed_string(cursor)?;

    let num_args = cursor.read_i32::<LittleEndian>()?.max(0) as usize;
    let mut arguments = Vec::with_capacity(num_args.min(256));
    for _ in 0..num_args {
        let key = read_exact_string(cursor)?;
        let string = read_translated_fs(cursor, lsf_version, depth + 1)?;
        let value = read_exact_string(cursor)?;
        let string = if string == TranslatedFsString::default() {
            None
        } else {
            Some(Box::new(string))
        };
        arguments.push(FsStringArgument { key, value, string });
    }

    Ok(TranslatedFsString { value, handle, arguments })
}

fn write_translated_fs(
    buf: &mut Vec<u8>,
    fs: &TranslatedFsString,
    lsf_version: u32,
    depth: usize,
) -> Result<()> {
    if depth > MAX_FS_DEPTH {
        return Err(Error::CorruptPayload(
            "TranslatedFSString arguments nested too deeply".to_string(),
        ));
    }

    if lsf_version >= super::VERSION_BG3_HEADER {
        buf.write_u16::<LittleEndian>(FS_STRING_VERSION)?;
    }

    write_prefixed_string(buf, &fs.value)?;
    write_prefixed_string(buf, &fs.handle)?;

    buf.write_i32::<LittleEndian>(fs.arguments.len() as i32)?;
    let empty = TranslatedFsString::default();
    for arg in &fs.arguments {
        write_exact_string(buf, &arg.key)?;
        let nested = arg.string.as_deref().unwrap_or(&empty);
        write_translated_fs(buf, nested, lsf_version, depth + 1)?;
        write_exact_string(buf, &arg.value)?;
    }

    Ok(())
}

fn expect_components(ty: AttrType, got: usize) -> Result<()> {
    let want = ty.components().unwrap_or(0);
    if got == want {
        Ok(())
    } else {
        Err(Error::Format(format!(
            "{} expects {want} components, got {got}",
            ty.name()
        )))
    }
}

/// Canonical string form of 16 stored UUID bytes.
///
/// Storage keeps the first three groups little-endian and the last eight
/// bytes as four swapped 2-byte groups; undoing both yields the canonical
/// `8-4-4-4-12` rendering.
#[must_use]
pub fn format_uuid(bytes: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[3], bytes[2], bytes[1], bytes[0],
        bytes[5], bytes[4],
        bytes[7], bytes[6],
        bytes[9], bytes[8],
        bytes[11], bytes[10],
        bytes[13], bytes[12],
        bytes[15], bytes[14]
    )
}

/// Storage bytes for a canonical UUID string. Malformed input produces the
/// nil UUID rather than failing the whole document.
#[must_use]
pub fn parse_uuid(s: &str) -> [u8; 16] {
    let clean: String = s.chars().filter(|c| *c != '-').collect();
    if clean.len() != 32 {
        return [0u8; 16];
    }

    let mut canonical = [0u8; 16];
    for i in 0..16 {
        match u8::from_str_radix(&clean[i * 2..i * 2 + 2], 16) {
            Ok(b) => canonical[i] = b,
            Err(_) => return [0u8; 16],
        }
    }

    [
        canonical[3], canonical[2], canonical[1], canonical[0],
        canonical[5], canonical[4],
        canonical[7], canonical[6],
        canonical[9], canonical[8],
        canonical[11], canonical[10],
        canonical[13], canonical[12],
        canonical[15], canonical[14],
    ]
}

/// Lowercase hex rendering used when an attribute's declared length runs
/// past the end of the value block.
#[must_use]
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uuid_byte_swap() {
        // Canonical 427baeec-054d-4354-* is stored EC AE 7B 42 4D 05 54 43 ...
        let canonical = "427baeec-054d-4354-8de5-2bd2f1861b9a";
        let stored = parse_uuid(canonical);
        assert_eq!(&stored[..8], &[0xEC, 0xAE, 0x7B, 0x42, 0x4D, 0x05, 0x54, 0x43]);
        assert_eq!(format_uuid(&stored), canonical);
    }

    #[test]
    fn malformed_uuid_becomes_nil() {
        assert_eq!(parse_uuid("not-a-uuid"), [0u8; 16]);
        assert_eq!(parse_uuid(""), [0u8; 16]);
    }

    #[test]
    fn string_round_trip_strips_terminator() {
        let mut buf = Vec::new();
        let n = encode_value(
            &mut buf,
            AttrType::FixedString,
            &AttrValue::String("Dwarf".to_string()),
            6,
        )
        .unwrap();
        assert_eq!(n, 6);
        assert_eq!(buf.last(), Some(&0u8));

        let decoded = decode_value(&buf, AttrType::FixedString, 6).unwrap();
        assert_eq!(decoded, AttrValue::String("Dwarf".to_string()));
    }

    #[test]
    fn translated_fs_string_nested_round_trip() {
        let inner = TranslatedFsString {
            value: "{1}".to_string(),
            handle: "hinner".to_string(),
            arguments: vec![FsStringArgument {
                key: "1".to_string(),
                value: "gold".to_string(),
                string: None,
            }],
        };
        let outer = TranslatedFsString {
            value: "You gain {0}".to_string(),
            handle: "houter".to_string(),
            arguments: vec![FsStringArgument {
                key: "0".to_string(),
                value: "loot".to_string(),
                string: Some(Box::new(inner)),
            }],
        };

        for lsf_version in [3u32, 6] {
            let mut buf = Vec::new();
            encode_value(
                &mut buf,
                AttrType::TranslatedFSString,
                &AttrValue::TranslatedFsString(outer.clone()),
                lsf_version,
            )
            .unwrap();
            let decoded = decode_value(&buf, AttrType::TranslatedFSString, lsf_version).unwrap();
            assert_eq!(decoded, AttrValue::TranslatedFsString(outer.clone()));
        }
    }

    #[test]
    fn type_value_mismatch_is_rejected() {
        let mut buf = Vec::new();
        let err = encode_value(&mut buf, AttrType::Int, &AttrValue::Bool(true), 6);
        assert!(err.is_err());
    }
}
