//! Package-level operations consumed by external drivers
//!
//! These wrap the reader/writer pair into the unpack/pack/convert
//! contract: unpack directories carry a manifest so a later pack can
//! reproduce the original byte stream.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::manifest::{PackageManifest, MANIFEST_FILE};
use super::reader::LsvReader;
use super::types::PackageVersion;
use super::writer::LsvWriter;
use crate::error::{Error, Result};
use crate::formats::{lsf, lsx};

/// Options for [`pack`] and [`pack_lsx`].
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Target container version; defaults to the manifest's version, or
    /// v18 when packing a bare directory.
    pub version: Option<PackageVersion>,
    pub flags: Option<u8>,
    pub priority: Option<u8>,
}

/// Unpack a package into a directory, writing the repack manifest.
/// Returns the extracted paths in package order.
pub fn unpack<P: AsRef<Path>, Q: AsRef<Path>>(input_lsv: P, output_dir: Q) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    tracing::info!("Unpacking {:?} -> {:?}", input_lsv.as_ref(), output_dir);

    let package = LsvReader::from_file(&input_lsv)?.read()?;
    let manifest = PackageManifest::from_package(&package);

    std::fs::create_dir_all(output_dir)?;
    let mut extracted = Vec::with_capacity(package.files.len());
    for file in &package.files {
        let dest = output_dir.join(sanitize_path(&file.path)?);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, &file.data)?;
        extracted.push(dest);
    }

    manifest.save(output_dir)?;
    tracing::info!("Extracted {} files", extracted.len());
    Ok(extracted)
}

/// Unpack plus LSF -> LSX conversion of every binary document.
pub fn extract_lsx<P: AsRef<Path>, Q: AsRef<Path>>(
    input_lsv: P,
    output_dir: Q,
) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    let extracted = unpack(input_lsv, output_dir)?;
    let mut manifest = PackageManifest::load(output_dir)?
        .ok_or_else(|| Error::Format("unpack did not produce a manifest".to_string()))?;

    let mut results = Vec::with_capacity(extracted.len());
    for path in extracted {
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("lsf")) {
            let doc = lsf::read_lsf(&path)?;
            let lsx_path = path.with_extension("lsx");
            lsx::write_lsx(&doc, &lsx_path)?;
            std::fs::remove_file(&path)?;

            let rel = relative_package_path(output_dir, &path)?;
            let rel_lsx = relative_package_path(output_dir, &lsx_path)?;
            manifest.rename(&rel, &rel_lsx);
            results.push(lsx_path);
        } else {
            results.push(path);
        }
    }

    manifest.save(output_dir)?;
    Ok(results)
}

/// Pack a directory into a package, consulting `__manifest__.json` when
/// present and scanning otherwise.
pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_lsv: Q,
    options: &PackOptions,
) -> Result<()> {
    pack_inner(input_dir.as_ref(), output_lsv.as_ref(), options, false)
}

/// Pack with LSX -> LSF conversion: every `.lsx` entry enters the
/// package as its binary `.lsf` form.
pub fn pack_lsx<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_lsv: Q,
    options: &PackOptions,
) -> Result<()> {
    pack_inner(input_dir.as_ref(), output_lsv.as_ref(), options, true)
}

fn pack_inner(
    input_dir: &Path,
    output_lsv: &Path,
    options: &PackOptions,
    convert_lsx: bool,
) -> Result<()> {
    tracing::info!("Packing {input_dir:?} -> {output_lsv:?}");

    let manifest = PackageManifest::load(input_dir)?;
    let version = options
        .version
        .or(manifest.as_ref().map(|m| m.version))
        .unwrap_or(PackageVersion::V18);
    let flags = options
        .flags
        .or(manifest.as_ref().map(|m| m.flags))
        .unwrap_or(0);
    let priority = options
        .priority
        .or(manifest.as_ref().map(|m| m.priority))
        .unwrap_or(0);

    let entries: Vec<(String, u8)> = match &manifest {
        Some(m) => m.files.iter().map(|f| (f.path.clone(), f.flags)).collect(),
        None => scan_directory(input_dir, default_file_flags(version))?,
    };

    let mut writer = LsvWriter::new(version).with_flags(flags).with_priority(priority);
    for (rel, file_flags) in entries {
        let source = input_dir.join(sanitize_path(&rel)?);
        let data = std::fs::read(&source)?;

        if convert_lsx && rel.to_lowercase().ends_with(".lsx") {
            let doc = lsx::parse_lsx(&String::from_utf8(data)?)?;
            let lsf_bytes = lsf::serialize_lsf(&doc)?;
            let renamed = format!("{}.lsf", &rel[..rel.len() - 4]);
            writer.add_file(renamed, lsf_bytes, file_flags);
        } else {
            writer.add_file(rel, data, file_flags);
        }
    }

    writer.write_to_file(output_lsv)?;
    tracing::info!("Packed {} files", writer.file_count());
    Ok(())
}

/// Default per-file compression for scanned directories: LZ4 for BG3
/// packages, zlib for DOS2.
fn default_file_flags(version: PackageVersion) -> u8 {
    if version.is_bg3_layout() {
        0x22
    } else {
        0x21
    }
}

/// Sorted recursive scan of an input directory.
fn scan_directory(root: &Path, flags: u8) -> Result<Vec<(String, u8)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() == MANIFEST_FILE {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::Format(format!("path {:?} escapes input directory", entry.path())))?;
        files.push((package_path(rel), flags));
    }
    files.sort();
    Ok(files)
}

/// Package paths always use forward slashes.
fn package_path(rel: &Path) -> String {
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

fn relative_package_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| Error::Format(format!("path {path:?} escapes output directory")))?;
    Ok(package_path(rel))
}

/// Map a package path onto a relative filesystem path, rejecting
/// anything that would escape the target directory.
fn sanitize_path(package_path: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for part in package_path.split(['/', '\\']) {
        if part.is_empty() || part == "." || part == ".." || part.contains(':') {
            return Err(Error::Format(format!("unsafe package path {package_path:?}")));
        }
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        return Err(Error::Format("empty package path".to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_sanitizing() {
        assert!(sanitize_path("Mods/meta.lsx").is_ok());
        assert!(sanitize_path("../escape").is_err());
        assert!(sanitize_path("/abs").is_err());
        assert!(sanitize_path("C:\\windows").is_err());
        assert!(sanitize_path("").is_err());
    }
}
