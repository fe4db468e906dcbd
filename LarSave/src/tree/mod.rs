//! In-memory document tree shared by the LSF and LSX codecs
//!
//! A [`Node`] carries a name, an insertion-ordered attribute map and an
//! ordered child list. Attribute and child order is significant and is
//! preserved across every codec.

mod value;
mod version;

pub use value::{
    AttrType, AttrValue, FsStringArgument, TranslatedFsString, TranslatedString, TypeId,
};
pub use version::Version;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single typed attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub ty: AttrType,
    pub value: AttrValue,
}

impl Attribute {
    #[must_use]
    pub fn new(ty: AttrType, value: AttrValue) -> Self {
        Self { ty, value }
    }
}

/// A document tree node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub attributes: IndexMap<String, Attribute>,
    pub children: Vec<Node>,
    /// Optional free-form key carried by savegame dictionary nodes.
    pub key: Option<String>,
}

/// Name of the virtual root wrapping multi-region documents.
pub const SAVE_ROOT: &str = "save";

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
            key: None,
        }
    }

    /// Append a child node and return a mutable handle to it.
    pub fn add_child(&mut self, child: Node) -> &mut Node {
        self.children.push(child);
        self.children.last_mut().unwrap()
    }

    /// Insert or overwrite an attribute. Re-inserting an existing name
    /// replaces the value but keeps the original position.
    pub fn set_attribute(&mut self, name: impl Into<String>, ty: AttrType, value: AttrValue) {
        self.attributes.insert(name.into(), Attribute::new(ty, value));
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// True when the document root is the virtual multi-region wrapper.
    #[must_use]
    pub fn is_save_root(&self) -> bool {
        self.name == SAVE_ROOT && self.attributes.is_empty() && self.key.is_none()
    }

    /// The region nodes of a document rooted at `self`: the children of
    /// the virtual `save` wrapper, or `self` alone.
    #[must_use]
    pub fn regions(&self) -> Vec<&Node> {
        if self.is_save_root() {
            self.children.iter().collect()
        } else {
            vec![self]
        }
    }

    /// Wrap region roots into a document root: a single region is the
    /// root itself, several get the virtual `save` wrapper.
    #[must_use]
    pub fn from_regions(mut regions: Vec<Node>) -> Node {
        if regions.len() == 1 {
            regions.pop().unwrap()
        } else {
            let mut root = Node::new(SAVE_ROOT);
            root.children = regions;
            root
        }
    }
}

/// A parsed document: tree plus engine version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub root: Node,
    pub version: Version,
}

impl Document {
    #[must_use]
    pub fn new(root: Node, version: Version) -> Self {
        Self { root, version }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn attribute_overwrite_keeps_position() {
        let mut node = Node::new("Stats");
        node.set_attribute("A", AttrType::Int, AttrValue::Int(1));
        node.set_attribute("B", AttrType::Int, AttrValue::Int(2));
        node.set_attribute("A", AttrType::Int, AttrValue::Int(3));

        let names: Vec<&str> = node.attributes.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(node.attribute("A").unwrap().value, AttrValue::Int(3));
    }

    #[test]
    fn region_wrapping() {
        let single = Node::from_regions(vec![Node::new("Config")]);
        assert_eq!(single.name, "Config");
        assert_eq!(single.regions().len(), 1);

        let multi = Node::from_regions(vec![Node::new("A"), Node::new("B")]);
        assert!(multi.is_save_root());
        assert_eq!(multi.regions().len(), 2);
    }
}
