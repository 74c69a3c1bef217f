//! Manifest validation.
//!
//! Field checks are collected rather than short-circuited so that one pass
//! reports every missing or malformed value. Dependency rules run only once the
//! fields are sound, and stop at the first offending dependency.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::version::PackageVersion;
use crate::version_range::VersionRange;

use super::{Manifest, ManifestDependency, ManifestError};

/// A single field-level problem in a manifest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A required value is missing or blank.
    #[error("{field} is required")]
    Required {
        /// Element or attribute name.
        field: &'static str,
    },

    /// A URL element is present but empty.
    #[error("{field} cannot be empty")]
    EmptyUrl {
        /// Element name.
        field: &'static str,
    },

    /// `requireLicenseAcceptance` is set without a license URL.
    #[error("enabling license acceptance requires a license url")]
    LicenseAcceptanceRequiresUrl,

    /// The package version does not parse.
    #[error("'{version}' is not a valid version string")]
    InvalidVersion {
        /// The version text.
        version: String,
    },

    /// A dependency group declares a blank `targetFramework`.
    #[error("a dependency group has an empty targetFramework")]
    EmptyTargetFramework,

    /// Both a flat dependency list and dependency groups are declared.
    #[error("dependencies and dependency groups cannot be mixed")]
    MixedDependencyGroups,
}

/// Every field-level problem found in one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationIssue>);

impl ValidationErrors {
    /// The individual issues, in document order.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, issue) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn require(issues: &mut Vec<ValidationIssue>, field: &'static str, value: &str) {
    if blank(value) {
        issues.push(ValidationIssue::Required { field });
    }
}

fn require_url(issues: &mut Vec<ValidationIssue>, field: &'static str, value: Option<&String>) {
    if value.is_some_and(|url| blank(url)) {
        issues.push(ValidationIssue::EmptyUrl { field });
    }
}

fn collect_issues(manifest: &Manifest) -> Vec<ValidationIssue> {
    let metadata = &manifest.metadata;
    let mut issues = Vec::new();

    require(&mut issues, "id", &metadata.id);
    require(&mut issues, "version", &metadata.version);
    if !blank(&metadata.version) && PackageVersion::try_parse(&metadata.version).is_none() {
        issues.push(ValidationIssue::InvalidVersion {
            version: metadata.version.clone(),
        });
    }
    require(&mut issues, "authors", &metadata.authors);
    require(&mut issues, "description", &metadata.description);

    require_url(&mut issues, "licenseUrl", metadata.license_url.as_ref());
    require_url(&mut issues, "projectUrl", metadata.project_url.as_ref());
    require_url(&mut issues, "iconUrl", metadata.icon_url.as_ref());
    if metadata.require_license_acceptance
        && metadata.license_url.as_deref().is_none_or(blank)
    {
        issues.push(ValidationIssue::LicenseAcceptanceRequiresUrl);
    }

    if !metadata.dependencies.is_empty() && !metadata.dependency_groups.is_empty() {
        issues.push(ValidationIssue::MixedDependencyGroups);
    }
    if metadata
        .dependency_groups
        .iter()
        .any(|group| group.target_framework.as_deref().is_some_and(blank))
    {
        issues.push(ValidationIssue::EmptyTargetFramework);
    }
    let dependencies = metadata
        .dependencies
        .iter()
        .chain(metadata.dependency_groups.iter().flat_map(|g| &g.dependencies));
    for dependency in dependencies {
        require(&mut issues, "dependency id", &dependency.id);
    }

    for assembly in &metadata.framework_assemblies {
        require(&mut issues, "frameworkAssembly assemblyName", &assembly.assembly_name);
    }
    for reference in &metadata.references {
        require(&mut issues, "reference file", &reference.file);
    }
    for file in manifest.files.iter().flatten() {
        require(&mut issues, "file src", &file.source);
    }

    issues
}

fn check_dependency_set(
    package_id: &str,
    dependencies: &[ManifestDependency],
) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for dependency in dependencies {
        if !seen.insert(dependency.id.to_lowercase()) {
            return Err(ManifestError::DuplicateDependency {
                package_id: package_id.to_string(),
                dependency_id: dependency.id.clone(),
            });
        }

        let Some(text) = dependency.version.as_deref() else {
            continue;
        };
        let valid = VersionRange::try_parse(text).is_some_and(|range| !range.is_empty_interval());
        if !valid {
            return Err(ManifestError::InvalidDependencyVersion {
                package_id: package_id.to_string(),
                dependency_id: dependency.id.clone(),
                range: text.to_string(),
            });
        }
    }
    Ok(())
}

/// Validate a manifest.
///
/// # Errors
///
/// Returns [`ManifestError::Validation`] with every field issue, or the first
/// dependency error when the fields are sound.
pub(super) fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    let issues = collect_issues(manifest);
    if !issues.is_empty() {
        return Err(ManifestError::Validation(ValidationErrors(issues)));
    }

    let metadata = &manifest.metadata;
    check_dependency_set(&metadata.id, &metadata.dependencies)?;
    for group in &metadata.dependency_groups {
        check_dependency_set(&metadata.id, &group.dependencies)?;
    }
    Ok(())
}
