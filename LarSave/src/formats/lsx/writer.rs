//! LSX file writing
//!
//! Output is tuned for byte-identity with LSLib's output: UTF-8 BOM,
//! CRLF line endings, tab indentation, a space before self-closing tags,
//! and apostrophes left unescaped.

use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use super::float::{format_f32, format_f64};
use crate::error::Result;
use crate::formats::lsf::parse_uuid;
use crate::tree::{AttrType, AttrValue, Attribute, Document, Node, TranslatedFsString};

/// Output options.
#[derive(Debug, Clone, Default)]
pub struct LsxWriteOptions {
    /// Emit numeric type ids instead of type names. Defaults to the DOS2
    /// convention (`true` when the engine major version is below 4).
    pub numeric_types: Option<bool>,
    /// Value of the `lslib_meta` version attribute.
    pub lslib_meta: Option<String>,
}

/// Write an LSX document to disk.
pub fn write_lsx<P: AsRef<Path>>(doc: &Document, path: P) -> Result<()> {
    let xml = serialize_lsx(doc)?;
    std::fs::write(path, xml)?;
    Ok(())
}

/// Serialize a document to LSX text with default options.
pub fn serialize_lsx(doc: &Document) -> Result<String> {
    serialize_lsx_with_options(doc, &LsxWriteOptions::default())
}

/// Serialize a document to LSX text.
pub fn serialize_lsx_with_options(doc: &Document, options: &LsxWriteOptions) -> Result<String> {
    let numeric_types = options.numeric_types.unwrap_or(doc.version.major < 4);
    let lslib_meta = options.lslib_meta.as_deref().unwrap_or("v1,bswap_guids");
    let bswap_guids = lslib_meta.contains("bswap_guids");

    let mut output = Vec::new();
    let mut writer = Writer::new_with_indent(&mut output, b'\t', 1);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("save")))?;

    let mut version = BytesStart::new("version");
    version.push_attribute(("major", doc.version.major.to_string().as_str()));
    version.push_attribute(("minor", doc.version.minor.to_string().as_str()));
    version.push_attribute(("revision", doc.version.revision.to_string().as_str()));
    version.push_attribute(("build", doc.version.build.to_string().as_str()));
    version.push_attribute(("lslib_meta", lslib_meta));
    writer.write_event(Event::Empty(version))?;

    for region in doc.root.regions() {
        let mut region_tag = BytesStart::new("region");
        region_tag.push_attribute(("id", region.name.as_str()));
        writer.write_event(Event::Start(region_tag))?;

        write_node(&mut writer, region, numeric_types, bswap_guids)?;

        writer.write_event(Event::End(BytesEnd::new("region")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("save")))?;

    let xml = String::from_utf8(output)?;
    // CRLF line endings and spaced self-closing tags to match the
    // reference output; quick-xml escapes apostrophes, the reference
    // does not.
    let xml = xml.replace('\n', "\r\n").replace("/>", " />").replace("&apos;", "'");

    let mut result = String::with_capacity(xml.len() + 3);
    result.push('\u{feff}');
    result.push_str(&xml);
    Ok(result)
}

fn write_node<W: std::io::Write>(
    writer: &mut Writer<W>,
    node: &Node,
    numeric_types: bool,
    bswap_guids: bool,
) -> Result<()> {
    let mut start = BytesStart::new("node");
    start.push_attribute(("id", node.name.as_str()));
    if let Some(key) = &node.key {
        start.push_attribute(("key", key.as_str()));
    }

    if node.attributes.is_empty() && node.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;

    for (name, attr) in &node.attributes {
        write_attribute(writer, name, attr, numeric_types, bswap_guids)?;
    }

    if !node.children.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("children")))?;
        for child in &node.children {
            write_node(writer, child, numeric_types, bswap_guids)?;
        }
        writer.write_event(Event::End(BytesEnd::new("children")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("node")))?;
    Ok(())
}

fn write_attribute<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    attr: &Attribute,
    numeric_types: bool,
    bswap_guids: bool,
) -> Result<()> {
    let mut start = BytesStart::new("attribute");
    start.push_attribute(("id", name));

    let type_token = if numeric_types {
        attr.ty.id().to_string()
    } else {
        attr.ty.name().to_string()
    };
    start.push_attribute(("type", type_token.as_str()));

    match &attr.value {
        // TranslatedString puts the handle first; TranslatedFSString puts
        // the value first and carries an argument count.
        AttrValue::TranslatedString(ts) => {
            start.push_attribute(("handle", ts.handle.as_str()));
            start.push_attribute(("value", ts.value.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
        AttrValue::TranslatedFsString(fs) => {
            start.push_attribute(("value", fs.value.as_str()));
            start.push_attribute(("handle", fs.handle.as_str()));
            start.push_attribute(("arguments", fs.arguments.len().to_string().as_str()));
            if fs.arguments.is_empty() {
                writer.write_event(Event::Empty(start))?;
            } else {
                writer.write_event(Event::Start(start))?;
                write_fs_arguments(writer, fs)?;
                writer.write_event(Event::End(BytesEnd::new("attribute")))?;
            }
        }
        value => {
            let token = format_plain_value(attr.ty, value, bswap_guids);
            start.push_attribute(("value", token.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
    }

    Ok(())
}

fn write_fs_arguments<W: std::io::Write>(
    writer: &mut Writer<W>,
    fs: &TranslatedFsString,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("arguments")))?;

    for arg in &fs.arguments {
        let mut arg_tag = BytesStart::new("argument");
        arg_tag.push_attribute(("key", arg.key.as_str()));
        arg_tag.push_attribute(("value", arg.value.as_str()));

        if let Some(nested) = &arg.string {
            writer.write_event(Event::Start(arg_tag))?;

            let mut string_tag = BytesStart::new("string");
            string_tag.push_attribute(("value", nested.value.as_str()));
            string_tag.push_attribute(("handle", nested.handle.as_str()));
            string_tag.push_attribute(("arguments", nested.arguments.len().to_string().as_str()));

            if nested.arguments.is_empty() {
                writer.write_event(Event::Empty(string_tag))?;
            } else {
                writer.write_event(Event::Start(string_tag))?;
                write_fs_arguments(writer, nested)?;
                writer.write_event(Event::End(BytesEnd::new("string")))?;
            }

            writer.write_event(Event::End(BytesEnd::new("argument")))?;
        } else {
            writer.write_event(Event::Empty(arg_tag))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("arguments")))?;
    Ok(())
}

/// Render a scalar/vector value as its LSX token.
fn format_plain_value(ty: AttrType, value: &AttrValue, bswap_guids: bool) -> String {
    match value {
        AttrValue::None => String::new(),
        AttrValue::Byte(v) => v.to_string(),
        AttrValue::Short(v) => v.to_string(),
        AttrValue::UShort(v) => v.to_string(),
        AttrValue::Int(v) => v.to_string(),
        AttrValue::UInt(v) => v.to_string(),
        AttrValue::Float(v) => format_f32(*v),
        AttrValue::Double(v) => format_f64(*v),
        AttrValue::IVec(v) => {
            let parts: Vec<String> = v.iter().map(ToString::to_string).collect();
            parts.join(" ")
        }
        AttrValue::Vec(v) => {
            let parts: Vec<String> = v.iter().copied().map(format_f32).collect();
            parts.join(" ")
        }
        AttrValue::Bool(v) => if *v { "True" } else { "False" }.to_string(),
        AttrValue::Int8(v) => v.to_string(),
        AttrValue::String(s) | AttrValue::Blob(s) => s.clone(),
        AttrValue::Uuid(s) => {
            if bswap_guids {
                s.clone()
            } else {
                // Without the convention the stored byte order is shown
                // directly.
                let raw = parse_uuid(s);
                let hex: Vec<String> = raw.iter().map(|b| format!("{b:02x}")).collect();
                let flat = hex.concat();
                format!(
                    "{}-{}-{}-{}-{}",
                    &flat[0..8],
                    &flat[8..12],
                    &flat[12..16],
                    &flat[16..20],
                    &flat[20..32]
                )
            }
        }
        AttrValue::Long(v) => v.to_string(),
        AttrValue::ULongLong(v) => v.to_string(),
        AttrValue::TranslatedString(_) | AttrValue::TranslatedFsString(_) => {
            debug_assert!(false, "translated strings are written separately ({ty:?})");
            String::new()
        }
    }
}
