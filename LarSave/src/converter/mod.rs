//! Path-level LSF <-> LSX conversions

use std::path::Path;

use crate::error::{Error, Result};
use crate::formats::{lsf, lsx};

/// Convert an LSF (binary) file to LSX (XML).
pub fn convert_lsf_to_lsx<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q) -> Result<()> {
    tracing::info!("Converting LSF -> LSX: {:?} -> {:?}", source.as_ref(), dest.as_ref());
    let doc = lsf::read_lsf(source)?;
    lsx::write_lsx(&doc, dest)?;
    Ok(())
}

/// Convert an LSX (XML) file to LSF (binary).
pub fn convert_lsx_to_lsf<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q) -> Result<()> {
    tracing::info!("Converting LSX -> LSF: {:?} -> {:?}", source.as_ref(), dest.as_ref());
    let content = std::fs::read_to_string(source)?;
    let doc = lsx::parse_lsx(&content)?;
    lsf::write_lsf(&doc, dest)?;
    Ok(())
}

/// Convert between LSF and LSX based on the input file's extension.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<()> {
    let ext = input
        .as_ref()
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "lsf" => convert_lsf_to_lsx(input, output),
        "lsx" => convert_lsx_to_lsf(input, output),
        other => Err(Error::Unsupported(format!(
            "cannot convert from .{other} files"
        ))),
    }
}
