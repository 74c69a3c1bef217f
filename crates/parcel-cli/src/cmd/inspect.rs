//! Inspect command

use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use crossterm::style::Stylize;
use parcel_core::{ArchivePackage, CoreProperties};
use parcel_schema::{FrameworkMoniker, PackageDetails};
use serde::Serialize;
use std::path::Path;

/// Everything `inspect --json` prints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    metadata: &'a PackageDetails,
    schema_version: u32,
    files: Vec<String>,
    core_properties: Option<&'a CoreProperties>,
}

/// Show a package's metadata and files.
pub fn inspect(path: &Path, json: bool) -> Result<()> {
    let package = ArchivePackage::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let report = Report {
        metadata: package.metadata(),
        schema_version: package.manifest().minimum_schema_version(),
        files: package.files(),
        core_properties: package.core_properties(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let metadata = report.metadata;
    println!();
    println!(
        "  {} {}",
        metadata.id.as_str().white().bold(),
        package.manifest().metadata.version.as_str().dark_grey()
    );
    if !metadata.description.is_empty() {
        println!("  {}", metadata.description);
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);
    table.add_row(vec!["authors".to_string(), metadata.authors.join(", ")]);
    if !metadata.owners.is_empty() {
        table.add_row(vec!["owners".to_string(), metadata.owners.join(", ")]);
    }
    if !metadata.tags.is_empty() {
        table.add_row(vec!["tags".to_string(), metadata.tags.join(" ")]);
    }
    if let Some(url) = &metadata.project_url {
        table.add_row(vec!["project".to_string(), url.clone()]);
    }
    table.add_row(vec!["schema".to_string(), report.schema_version.to_string()]);
    for set in &metadata.dependency_sets {
        let framework = set
            .target_framework
            .as_ref()
            .map_or_else(|| "any".to_string(), FrameworkMoniker::short_name);
        let deps = set
            .dependencies
            .iter()
            .map(|dep| match &dep.version_range {
                Some(range) => format!("{} {range}", dep.id),
                None => dep.id.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![format!("dependencies ({framework})"), deps]);
    }
    for assembly in &metadata.framework_assemblies {
        let frameworks = assembly
            .supported_frameworks
            .iter()
            .map(FrameworkMoniker::short_name)
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            "framework assembly".to_string(),
            format!("{} {frameworks}", assembly.assembly_name),
        ]);
    }
    println!("{table}");

    let mut files = Table::new();
    files.load_preset(UTF8_FULL).set_header(vec!["Files"]);
    for file in &report.files {
        files.add_row(vec![file.as_str()]);
    }
    println!("{files}");
    Ok(())
}
