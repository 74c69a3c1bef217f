//! Conversion from manifest text to typed package metadata.

use parcel_schema::{
    FrameworkAssemblyReference, FrameworkMoniker, ManifestDependency, ManifestMetadata,
    PackageDependency, PackageDependencySet, PackageDetails, PackageVersion, RangeParseError,
    UnsupportedFramework, VersionParseError, VersionRange,
};
use thiserror::Error;

/// A manifest value that does not parse into its typed form.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The package version is malformed.
    #[error(transparent)]
    Version(#[from] VersionParseError),

    /// A dependency range is malformed.
    #[error("dependency '{dependency_id}': {source}")]
    Range {
        /// Dependency carrying the range.
        dependency_id: String,
        /// Parse failure.
        source: RangeParseError,
    },

    /// A target framework is not supported.
    #[error(transparent)]
    Framework(#[from] UnsupportedFramework),
}

/// Parse manifest metadata into [`PackageDetails`].
///
/// # Errors
///
/// Returns [`MetadataError`] for an unparsable version, dependency range or
/// framework moniker.
pub fn package_details(metadata: &ManifestMetadata) -> Result<PackageDetails, MetadataError> {
    let mut details = PackageDetails {
        id: metadata.id.clone(),
        version: Some(PackageVersion::parse(&metadata.version)?),
        title: metadata.title.clone(),
        icon_url: metadata.icon_url.clone(),
        license_url: metadata.license_url.clone(),
        project_url: metadata.project_url.clone(),
        require_license_acceptance: metadata.require_license_acceptance,
        description: metadata.description.clone(),
        summary: metadata.summary.clone(),
        release_notes: metadata.release_notes.clone(),
        copyright: metadata.copyright.clone(),
        language: metadata.language.clone(),
        ..PackageDetails::default()
    };

    for author in metadata.authors.split(',') {
        details.add_author(author);
    }
    for owner in metadata.owners.as_deref().unwrap_or_default().split(',') {
        details.add_owner(owner);
    }
    for tag in metadata.tags.as_deref().unwrap_or_default().split_whitespace() {
        details.add_tag(tag);
    }

    if !metadata.dependencies.is_empty() {
        details.dependency_sets.push(PackageDependencySet {
            target_framework: None,
            dependencies: dependencies(&metadata.dependencies)?,
        });
    }
    for group in &metadata.dependency_groups {
        details.dependency_sets.push(PackageDependencySet {
            target_framework: group
                .target_framework
                .as_deref()
                .map(FrameworkMoniker::parse)
                .transpose()?,
            dependencies: dependencies(&group.dependencies)?,
        });
    }

    for assembly in &metadata.framework_assemblies {
        let supported_frameworks = assembly
            .target_framework
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|fx| !fx.is_empty())
            .map(FrameworkMoniker::parse)
            .collect::<Result<Vec<_>, _>>()?;
        details.framework_assemblies.push(FrameworkAssemblyReference {
            assembly_name: assembly.assembly_name.clone(),
            supported_frameworks,
        });
    }

    details.references = metadata.references.iter().map(|r| r.file.clone()).collect();
    Ok(details)
}

fn dependencies(records: &[ManifestDependency]) -> Result<Vec<PackageDependency>, MetadataError> {
    records
        .iter()
        .map(|record| {
            let version_range = record
                .version
                .as_deref()
                .map(VersionRange::parse)
                .transpose()
                .map_err(|source| MetadataError::Range {
                    dependency_id: record.id.clone(),
                    source,
                })?;
            Ok(PackageDependency {
                id: record.id.clone(),
                version_range,
                exclude: record.exclude.clone(),
            })
        })
        .collect()
}
