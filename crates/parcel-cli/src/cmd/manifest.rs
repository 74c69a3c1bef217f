//! Manifest command

use anyhow::{Context, Result};
use parcel_core::ArchivePackage;
use std::io::Write;
use std::path::Path;

/// Rebuild the manifest of a package from its metadata and print or save it.
pub fn manifest(path: &Path, output: Option<&Path>) -> Result<()> {
    let package = ArchivePackage::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let manifest = package.to_manifest();

    match output {
        Some(output) => {
            let file = std::fs::File::create(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            manifest
                .save(std::io::BufWriter::new(file))
                .context("Failed to write manifest")?;
        }
        None => {
            let xml = manifest.to_xml_string().context("Failed to render manifest")?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{xml}")?;
        }
    }
    Ok(())
}
