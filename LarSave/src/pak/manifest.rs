//! Unpack-directory manifest
//!
//! `__manifest__.json` records the file order and per-file flag bytes an
//! unpacked package needs to be repacked byte-identically. Packing
//! consults it when present and falls back to a directory scan.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::{Package, PackageVersion};
use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "__manifest__.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub version: PackageVersion,
    pub flags: u8,
    pub priority: u8,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub flags: u8,
}

impl PackageManifest {
    /// Capture the repack-relevant facts of a freshly-read package.
    #[must_use]
    pub fn from_package(package: &Package) -> Self {
        Self {
            version: package.version,
            flags: package.flags,
            priority: package.priority,
            files: package
                .files
                .iter()
                .map(|f| ManifestEntry { path: f.path.clone(), flags: f.flags })
                .collect(),
        }
    }

    /// Load the manifest from an unpack directory, if one exists.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Option<Self>> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let manifest = serde_json::from_str(&content)
            .map_err(|e| Error::Format(format!("malformed manifest: {e}")))?;
        Ok(Some(manifest))
    }

    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Format(format!("manifest serialization: {e}")))?;
        std::fs::write(dir.as_ref().join(MANIFEST_FILE), json)?;
        Ok(())
    }

    /// Rename an entry in place (used when conversions change extensions).
    pub fn rename(&mut self, from: &str, to: &str) {
        for entry in &mut self.files {
            if entry.path == from {
                entry.path = to.to_string();
            }
        }
    }
}
