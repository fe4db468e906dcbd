//! # `LarSave`
//!
//! A pure-Rust library for reading, writing and byte-exactly
//! round-tripping the Larian Studios savegame container formats used by
//! Divinity: Original Sin 2 and Baldur's Gate 3.
//!
//! ## Supported Formats
//!
//! - **LSV packages** - the outer `LSPK` container with its per-file
//!   compressed payloads (DOS2 v10/v13 and BG3 v15/v16/v18 layouts)
//! - **LSF** - the binary tree serialization with string interning table
//!   (DOS2 v3, BG3 v5/v6)
//! - **LSX** - the XML projection of the same tree, formatted for
//!   byte-identity with LSLib's output
//!
//! ## Quick Start
//!
//! ### Working with packages
//!
//! ```no_run
//! use larsave::pak::{self, PackOptions};
//!
//! // Unpack a savegame; the manifest written alongside allows a
//! // byte-identical repack later.
//! let files = pak::unpack("Story.lsv", "unpacked/")?;
//! println!("Extracted {} files", files.len());
//!
//! pak::pack("unpacked/", "Repacked.lsv", &PackOptions::default())?;
//! # Ok::<(), larsave::Error>(())
//! ```
//!
//! ### Converting document formats
//!
//! ```no_run
//! use larsave::converter::convert;
//!
//! // LSF <-> LSX, dispatched on the input extension.
//! convert("meta.lsf", "meta.lsx")?;
//! # Ok::<(), larsave::Error>(())
//! ```
//!
//! ### Building documents
//!
//! ```
//! use larsave::prelude::*;
//!
//! let mut root = Node::new("Config");
//! root.set_attribute("Slot", AttrType::Int, AttrValue::Int(3));
//! let doc = Document::new(root, Version::new(4, 0, 9, 331));
//! let bytes = larsave::formats::lsf::serialize_lsf(&doc)?;
//! # Ok::<(), larsave::Error>(())
//! ```

pub mod compression;
pub mod converter;
pub mod error;
pub mod formats;
pub mod pak;
pub mod tree;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::converter;
    pub use crate::error::{Error, Result};
    pub use crate::formats::lsf::{parse_lsf_bytes, read_lsf, serialize_lsf, write_lsf};
    pub use crate::formats::lsx::{parse_lsx, read_lsx, serialize_lsx, write_lsx};
    pub use crate::pak::{LsvReader, LsvWriter, PackOptions, Package, PackageVersion};
    pub use crate::tree::{
        AttrType, AttrValue, Attribute, Document, Node, TranslatedFsString, TranslatedString,
        Version,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
