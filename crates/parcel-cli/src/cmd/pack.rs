//! Pack command

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use parcel_core::PackageBuilder;
use std::path::Path;
use tempfile::NamedTempFile;

/// Build `{id}.{version}.nupkg` from a manifest into `output_dir`.
///
/// The archive is written to a temporary file next to its destination and
/// only renamed into place once it is complete.
pub fn pack(manifest: &Path, base_path: Option<&Path>, output_dir: &Path) -> Result<()> {
    let builder = PackageBuilder::from_manifest_path(manifest, base_path)
        .with_context(|| format!("Failed to load {}", manifest.display()))?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(builder.package_file_name());

    let temp = NamedTempFile::new_in(output_dir).context("Failed to create temporary file")?;
    tracing::debug!(
        files = builder.files.len(),
        temp = %temp.path().display(),
        "writing package"
    );
    let temp = builder.save(temp).context("Failed to build package")?;
    temp.persist(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} {}", "Created".green().bold(), path.display());
    Ok(())
}
