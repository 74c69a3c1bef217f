//! Check command

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use parcel_core::package_details;
use parcel_schema::{Manifest, SchemaTable};
use std::path::Path;

/// Read and validate a manifest, then report the schema it needs.
pub fn check(path: &Path) -> Result<()> {
    let manifest =
        Manifest::from_path(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let details = package_details(&manifest.metadata)
        .with_context(|| format!("Invalid metadata in {}", path.display()))?;

    let tier = manifest.minimum_schema_version();
    let namespace = SchemaTable::global().namespace_for(tier).unwrap_or_default();
    let lw = 12;

    println!("{} Manifest is valid", "✓".green());
    println!("  {:<lw$}{}", "id", details.id);
    println!("  {:<lw$}{}", "version", manifest.metadata.version);
    println!("  {:<lw$}{}", "schema", tier);
    println!("  {:<lw$}{}", "namespace", namespace.dark_grey());
    if let Some(files) = &manifest.files {
        println!("  {:<lw$}{}", "files", files.len());
    }
    Ok(())
}
