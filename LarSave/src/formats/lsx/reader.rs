//! LSX file reading

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::tree::{
    AttrType, AttrValue, Document, FsStringArgument, Node, TranslatedFsString, TranslatedString,
    Version,
};

/// Read an LSX file from disk.
pub fn read_lsx<P: AsRef<Path>>(path: P) -> Result<Document> {
    let content = std::fs::read_to_string(path)?;
    parse_lsx(&content)
}

/// An open TranslatedFSString scope while its `<arguments>` stream in.
enum FsFrame {
    /// The `<attribute>` element itself.
    Attribute { id: String, fs: TranslatedFsString },
    /// A nested `<string>` element inside an `<argument>`.
    Nested(TranslatedFsString),
}

impl FsFrame {
    fn fs_mut(&mut self) -> &mut TranslatedFsString {
        match self {
            Self::Attribute { fs, .. } | Self::Nested(fs) => fs,
        }
    }
}

/// Parse LSX text into a document tree.
pub fn parse_lsx(content: &str) -> Result<Document> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut version = Version::new(4, 0, 0, 0);
    let mut seen_save = false;
    let mut regions: Vec<Node> = Vec::new();
    let mut current_region: Option<(String, Vec<Node>)> = None;
    let mut node_stack: Vec<Node> = Vec::new();
    let mut fs_stack: Vec<FsFrame> = Vec::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"save" => seen_save = true,
                b"version" => version = parse_version(&e)?,
                b"region" => {
                    let id = find_attr(&e, b"id")?.unwrap_or_default();
                    current_region = Some((id, Vec::new()));
                }
                b"node" => node_stack.push(parse_node_start(&e)?),
                b"attribute" => {
                    let raw = RawAttribute::parse(&e)?;
                    if raw.ty == AttrType::TranslatedFSString {
                        // Arguments follow as child elements.
                        fs_stack.push(FsFrame::Attribute {
                            id: raw.id.clone(),
                            fs: raw.fs_string(),
                        });
                    } else {
                        attach_attribute(&mut node_stack, raw)?;
                    }
                }
                b"argument" => {
                    if let Some(frame) = fs_stack.last_mut() {
                        frame.fs_mut().arguments.push(parse_argument(&e)?);
                    }
                }
                b"string" => {
                    let fs = TranslatedFsString {
                        value: find_attr(&e, b"value")?.unwrap_or_default(),
                        handle: find_attr(&e, b"handle")?.unwrap_or_default(),
                        arguments: Vec::new(),
                    };
                    fs_stack.push(FsFrame::Nested(fs));
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"version" => version = parse_version(&e)?,
                b"node" => {
                    let node = parse_node_start(&e)?;
                    attach_node(&mut node_stack, &mut current_region, node);
                }
                b"attribute" => {
                    let raw = RawAttribute::parse(&e)?;
                    attach_attribute(&mut node_stack, raw)?;
                }
                b"argument" => {
                    if let Some(frame) = fs_stack.last_mut() {
                        frame.fs_mut().arguments.push(parse_argument(&e)?);
                    }
                }
                b"string" => {
                    let fs = TranslatedFsString {
                        value: find_attr(&e, b"value")?.unwrap_or_default(),
                        handle: find_attr(&e, b"handle")?.unwrap_or_default(),
                        arguments: Vec::new(),
                    };
                    attach_nested_string(&mut fs_stack, fs);
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"node" => {
                    if let Some(node) = node_stack.pop() {
                        attach_node(&mut node_stack, &mut current_region, node);
                    }
                }
                b"region" => {
                    if let Some((id, roots)) = current_region.take() {
                        regions.push(finalize_region(&id, roots)?);
                    }
                }
                b"attribute" => {
                    if let Some(FsFrame::Attribute { .. }) = fs_stack.last() {
                        let Some(FsFrame::Attribute { id, fs }) = fs_stack.pop() else {
                            unreachable!()
                        };
                        let raw = RawAttribute {
                            id,
                            ty: AttrType::TranslatedFSString,
                            value: String::new(),
                            handle: None,
                            fs: Some(fs),
                        };
                        attach_attribute(&mut node_stack, raw)?;
                    }
                }
                b"string" => {
                    if let Some(FsFrame::Nested(_)) = fs_stack.last() {
                        let Some(FsFrame::Nested(fs)) = fs_stack.pop() else { unreachable!() };
                        attach_nested_string(&mut fs_stack, fs);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    if !seen_save {
        return Err(Error::Format("missing <save> root element".to_string()));
    }
    if regions.is_empty() {
        return Err(Error::Format("document contains no <region> element".to_string()));
    }

    Ok(Document::new(Node::from_regions(regions), version))
}

fn parse_version(e: &BytesStart) -> Result<Version> {
    let mut version = Version::new(4, 0, 0, 0);
    for attr in e.attributes() {
        let attr = attr?;
        let value = String::from_utf8_lossy(&attr.value);
        match attr.key.as_ref() {
            b"major" => version.major = value.parse().unwrap_or(4),
            b"minor" => version.minor = value.parse().unwrap_or(0),
            b"revision" => version.revision = value.parse().unwrap_or(0),
            b"build" => version.build = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(version)
}

fn find_attr(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|err| Error::XmlAttr(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_node_start(e: &BytesStart) -> Result<Node> {
    let mut node = Node::new(find_attr(e, b"id")?.unwrap_or_default());
    node.key = find_attr(e, b"key")?;
    Ok(node)
}

fn attach_node(
    node_stack: &mut [Node],
    current_region: &mut Option<(String, Vec<Node>)>,
    node: Node,
) {
    if let Some(parent) = node_stack.last_mut() {
        parent.children.push(node);
    } else if let Some((_, roots)) = current_region {
        roots.push(node);
    }
}

fn attach_nested_string(fs_stack: &mut [FsFrame], fs: TranslatedFsString) {
    if let Some(frame) = fs_stack.last_mut() {
        if let Some(arg) = frame.fs_mut().arguments.last_mut() {
            arg.string = Some(Box::new(fs));
        }
    }
}

fn parse_argument(e: &BytesStart) -> Result<FsStringArgument> {
    Ok(FsStringArgument {
        key: find_attr(e, b"key")?.unwrap_or_default(),
        value: find_attr(e, b"value")?.unwrap_or_default(),
        string: None,
    })
}

/// A region must hold a single root node. A wrapper node with no
/// attributes and exactly one child named like the region is collapsed
/// away to avoid duplicated nesting.
fn finalize_region(id: &str, mut roots: Vec<Node>) -> Result<Node> {
    if roots.len() != 1 {
        return Err(Error::Format(format!(
            "region {id:?} must contain exactly one root node, found {}",
            roots.len()
        )));
    }
    let mut root = roots.pop().unwrap();
    if root.attributes.is_empty() && root.children.len() == 1 && root.children[0].name == id {
        root = root.children.pop().unwrap();
    }
    Ok(root)
}

struct RawAttribute {
    id: String,
    ty: AttrType,
    value: String,
    handle: Option<String>,
    fs: Option<TranslatedFsString>,
}

impl RawAttribute {
    fn parse(e: &BytesStart) -> Result<Self> {
        let mut id = String::new();
        let mut ty = AttrType::None;
        let mut value = String::new();
        let mut handle = None;

        for attr in e.attributes() {
            let attr = attr?;
            let text = attr
                .unescape_value()
                .map_err(|err| Error::XmlAttr(err.to_string()))?
                .into_owned();
            match attr.key.as_ref() {
                b"id" => id = text,
                b"type" => ty = AttrType::parse(&text),
                b"value" => value = text,
                b"handle" => handle = Some(text),
                _ => {}
            }
        }

        Ok(Self { id, ty, value, handle, fs: None })
    }

    fn fs_string(&self) -> TranslatedFsString {
        TranslatedFsString {
            value: self.value.clone(),
            handle: self.handle.clone().unwrap_or_default(),
            arguments: Vec::new(),
        }
    }
}

fn attach_attribute(node_stack: &mut [Node], raw: RawAttribute) -> Result<()> {
    let Some(node) = node_stack.last_mut() else {
        return Err(Error::Format(format!(
            "attribute {:?} appears outside of a node",
            raw.id
        )));
    };

    let value = match raw.ty {
        AttrType::TranslatedString => AttrValue::TranslatedString(TranslatedString {
            value: raw.value.clone(),
            handle: raw.handle.clone().unwrap_or_default(),
        }),
        AttrType::TranslatedFSString => {
            AttrValue::TranslatedFsString(raw.fs.clone().unwrap_or_else(|| raw.fs_string()))
        }
        ty => parse_value(ty, &raw.value),
    };

    node.set_attribute(raw.id, raw.ty, value);
    Ok(())
}

/// Parse an LSX value token. Numeric parse failures yield zero rather
/// than failing the document.
fn parse_value(ty: AttrType, s: &str) -> AttrValue {
    match ty {
        AttrType::None => AttrValue::None,
        AttrType::Byte => AttrValue::Byte(s.parse().unwrap_or(0)),
        AttrType::Short => AttrValue::Short(s.parse().unwrap_or(0)),
        AttrType::UShort => AttrValue::UShort(s.parse().unwrap_or(0)),
        AttrType::Int => AttrValue::Int(s.parse().unwrap_or(0)),
        AttrType::UInt => AttrValue::UInt(s.parse().unwrap_or(0)),
        AttrType::Float => AttrValue::Float(s.parse().unwrap_or(0.0)),
        AttrType::Double => AttrValue::Double(s.parse().unwrap_or(0.0)),
        AttrType::IVec2 | AttrType::IVec3 | AttrType::IVec4 => {
            AttrValue::IVec(parse_components(ty, s))
        }
        AttrType::Vec2
        | AttrType::Vec3
        | AttrType::Vec4
        | AttrType::Mat2
        | AttrType::Mat3
        | AttrType::Mat3x4
        | AttrType::Mat4x3
        | AttrType::Mat4 => AttrValue::Vec(parse_components(ty, s)),
        AttrType::Bool => AttrValue::Bool(matches!(s, "True" | "true" | "1")),
        AttrType::String
        | AttrType::Path
        | AttrType::FixedString
        | AttrType::LSString
        | AttrType::WString
        | AttrType::LSWString => AttrValue::String(s.to_string()),
        AttrType::ULongLong => AttrValue::ULongLong(s.parse().unwrap_or(0)),
        AttrType::ScratchBuffer => AttrValue::Blob(s.to_string()),
        AttrType::Long | AttrType::Int64 => AttrValue::Long(s.parse().unwrap_or(0)),
        AttrType::Int8 => AttrValue::Int8(s.parse().unwrap_or(0)),
        AttrType::Uuid => AttrValue::Uuid(s.to_string()),
        AttrType::TranslatedString | AttrType::TranslatedFSString => {
            // Handled by the caller from the element attributes.
            AttrValue::String(s.to_string())
        }
    }
}

fn parse_components<T: std::str::FromStr + Default + Clone>(ty: AttrType, s: &str) -> Vec<T> {
    let n = ty.components().unwrap_or(0);
    let mut out: Vec<T> = s
        .split_whitespace()
        .take(n)
        .map(|part| part.parse().unwrap_or_default())
        .collect();
    out.resize(n, T::default());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_save_is_an_error() {
        let err = parse_lsx("<region id=\"X\"><node id=\"X\" /></region>").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn parses_minimal_document() {
        let doc = parse_lsx(concat!(
            "<save>",
            "<version major=\"4\" minor=\"0\" revision=\"9\" build=\"331\" />",
            "<region id=\"Config\">",
            "<node id=\"Config\">",
            "<attribute id=\"Slot\" type=\"Int\" value=\"3\" />",
            "<attribute id=\"Name\" type=\"LSString\" value=\"Tav's save\" />",
            "</node>",
            "</region>",
            "</save>",
        ))
        .unwrap();

        assert_eq!(doc.version, Version::new(4, 0, 9, 331));
        assert_eq!(doc.root.name, "Config");
        assert_eq!(doc.root.attribute("Slot").unwrap().value, AttrValue::Int(3));
        assert_eq!(
            doc.root.attribute("Name").unwrap().value,
            AttrValue::String("Tav's save".to_string())
        );
    }

    #[test]
    fn collapses_duplicated_region_wrapper() {
        let doc = parse_lsx(concat!(
            "<save>",
            "<version major=\"3\" minor=\"6\" revision=\"4\" build=\"0\" />",
            "<region id=\"Tags\">",
            "<node id=\"Wrapper\">",
            "<children>",
            "<node id=\"Tags\">",
            "<attribute id=\"Count\" type=\"Int\" value=\"0\" />",
            "</node>",
            "</children>",
            "</node>",
            "</region>",
            "</save>",
        ))
        .unwrap();

        assert_eq!(doc.root.name, "Tags");
        assert!(doc.root.attribute("Count").is_some());
    }

    #[test]
    fn bool_tokens() {
        for (token, expected) in [("True", true), ("true", true), ("1", true), ("False", false)] {
            let xml = format!(
                "<save><version major=\"4\" minor=\"0\" revision=\"0\" build=\"0\" />\
                 <region id=\"R\"><node id=\"R\">\
                 <attribute id=\"Flag\" type=\"Bool\" value=\"{token}\" />\
                 </node></region></save>"
            );
            let doc = parse_lsx(&xml).unwrap();
            assert_eq!(
                doc.root.attribute("Flag").unwrap().value,
                AttrValue::Bool(expected),
                "token {token}"
            );
        }
    }
}
