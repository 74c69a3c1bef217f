//! Typed package metadata.
//!
//! [`PackageDetails`] is the parsed, strongly-typed counterpart of
//! [`ManifestMetadata`](crate::manifest::ManifestMetadata): versions and
//! ranges are parsed, framework monikers resolved, and list-valued fields
//! (authors, owners, tags) are held as duplicate-free lists.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::framework::FrameworkMoniker;
use crate::version::PackageVersion;
use crate::version_range::VersionRange;

/// Longest accepted package id.
pub const MAX_PACKAGE_ID_LENGTH: usize = 100;

static PACKAGE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+([_.-]\w+)*$").expect("package id pattern is valid"));

/// Whether `id` matches the package id grammar `\w+([_.-]\w+)*`.
///
/// Length is checked separately against [`MAX_PACKAGE_ID_LENGTH`].
pub fn is_valid_package_id(id: &str) -> bool {
    PACKAGE_ID.is_match(id)
}

/// A dependency on another package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDependency {
    /// Id of the package depended upon.
    pub id: String,
    /// Acceptable versions; `None` accepts any version.
    pub version_range: Option<VersionRange>,
    /// Comma-separated asset kinds excluded from the dependency.
    pub exclude: Option<String>,
}

impl PackageDependency {
    /// A dependency on `id` with an optional range.
    pub fn new(id: impl Into<String>, version_range: Option<VersionRange>) -> Self {
        Self {
            id: id.into(),
            version_range,
            exclude: None,
        }
    }
}

/// Dependencies that apply to one target framework (or to all of them).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageDependencySet {
    /// Framework the set applies to; `None` applies to every framework.
    pub target_framework: Option<FrameworkMoniker>,
    /// Dependencies in declaration order.
    pub dependencies: Vec<PackageDependency>,
}

/// A reference to an assembly shipped with the target framework itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameworkAssemblyReference {
    /// Assembly name, e.g. `System.Web`.
    pub assembly_name: String,
    /// Frameworks the reference applies to; empty means all.
    pub supported_frameworks: Vec<FrameworkMoniker>,
}

/// Read access to package metadata, whatever holds it.
///
/// Implemented by [`PackageDetails`]; external callers implement it on their
/// own types to project them into a [`Manifest`](crate::Manifest) with
/// [`Manifest::from_metadata`](crate::Manifest::from_metadata).
pub trait PackageMetadata {
    /// Package id.
    fn id(&self) -> &str;
    /// Package version, if one has been set.
    fn version(&self) -> Option<&PackageVersion>;
    /// Display title.
    fn title(&self) -> Option<&str>;
    /// Authors, without duplicates.
    fn authors(&self) -> &[String];
    /// Owners; empty means "same as authors".
    fn owners(&self) -> &[String];
    /// Icon URL.
    fn icon_url(&self) -> Option<&str>;
    /// License URL.
    fn license_url(&self) -> Option<&str>;
    /// Project URL.
    fn project_url(&self) -> Option<&str>;
    /// Whether consumers must accept the license.
    fn require_license_acceptance(&self) -> bool;
    /// Long description.
    fn description(&self) -> &str;
    /// Short summary.
    fn summary(&self) -> Option<&str>;
    /// Release notes.
    fn release_notes(&self) -> Option<&str>;
    /// Copyright notice.
    fn copyright(&self) -> Option<&str>;
    /// Locale, e.g. `en-US`.
    fn language(&self) -> Option<&str>;
    /// Tags, without duplicates.
    fn tags(&self) -> &[String];
    /// Dependency sets in declaration order.
    fn dependency_sets(&self) -> &[PackageDependencySet];
    /// Framework assembly references.
    fn framework_assemblies(&self) -> &[FrameworkAssemblyReference];
    /// Assembly file names that consumers should reference.
    fn references(&self) -> &[String];
}

/// Owned, typed package metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageDetails {
    /// Package id.
    pub id: String,
    /// Package version.
    pub version: Option<PackageVersion>,
    /// Display title.
    pub title: Option<String>,
    /// Authors; use [`PackageDetails::add_author`] to keep them unique.
    pub authors: Vec<String>,
    /// Owners; use [`PackageDetails::add_owner`] to keep them unique.
    pub owners: Vec<String>,
    /// Icon URL.
    pub icon_url: Option<String>,
    /// License URL.
    pub license_url: Option<String>,
    /// Project URL.
    pub project_url: Option<String>,
    /// Whether consumers must accept the license.
    pub require_license_acceptance: bool,
    /// Long description.
    pub description: String,
    /// Short summary.
    pub summary: Option<String>,
    /// Release notes.
    pub release_notes: Option<String>,
    /// Copyright notice.
    pub copyright: Option<String>,
    /// Locale.
    pub language: Option<String>,
    /// Tags; use [`PackageDetails::add_tag`] to keep them unique.
    pub tags: Vec<String>,
    /// Dependency sets.
    pub dependency_sets: Vec<PackageDependencySet>,
    /// Framework assembly references.
    pub framework_assemblies: Vec<FrameworkAssemblyReference>,
    /// Assembly references.
    pub references: Vec<String>,
}

impl PackageDetails {
    /// Add an author unless it is blank or already present.
    pub fn add_author(&mut self, author: &str) {
        push_unique(&mut self.authors, author);
    }

    /// Add an owner unless it is blank or already present.
    pub fn add_owner(&mut self, owner: &str) {
        push_unique(&mut self.owners, owner);
    }

    /// Add a tag unless it is blank or already present.
    pub fn add_tag(&mut self, tag: &str) {
        push_unique(&mut self.tags, tag);
    }

    /// Total number of dependencies across all sets.
    pub fn dependency_count(&self) -> usize {
        self.dependency_sets
            .iter()
            .map(|set| set.dependencies.len())
            .sum()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

impl PackageMetadata for PackageDetails {
    fn id(&self) -> &str {
        &self.id
    }
    fn version(&self) -> Option<&PackageVersion> {
        self.version.as_ref()
    }
    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
    fn authors(&self) -> &[String] {
        &self.authors
    }
    fn owners(&self) -> &[String] {
        &self.owners
    }
    fn icon_url(&self) -> Option<&str> {
        self.icon_url.as_deref()
    }
    fn license_url(&self) -> Option<&str> {
        self.license_url.as_deref()
    }
    fn project_url(&self) -> Option<&str> {
        self.project_url.as_deref()
    }
    fn require_license_acceptance(&self) -> bool {
        self.require_license_acceptance
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }
    fn release_notes(&self) -> Option<&str> {
        self.release_notes.as_deref()
    }
    fn copyright(&self) -> Option<&str> {
        self.copyright.as_deref()
    }
    fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
    fn tags(&self) -> &[String] {
        &self.tags
    }
    fn dependency_sets(&self) -> &[PackageDependencySet] {
        &self.dependency_sets
    }
    fn framework_assemblies(&self) -> &[FrameworkAssemblyReference] {
        &self.framework_assemblies
    }
    fn references(&self) -> &[String] {
        &self.references
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_id_grammar() {
        assert!(is_valid_package_id("Sample"));
        assert!(is_valid_package_id("Sample.Core-2_x"));
        assert!(!is_valid_package_id(""));
        assert!(!is_valid_package_id("Sample..Core"));
        assert!(!is_valid_package_id(".Sample"));
        assert!(!is_valid_package_id("Sample."));
        assert!(!is_valid_package_id("Sample Core"));
    }

    #[test]
    fn test_lists_ignore_duplicates_and_blanks() {
        let mut details = PackageDetails::default();
        details.add_author("alice");
        details.add_author(" alice ");
        details.add_author("bob");
        details.add_author("  ");
        details.add_tag("web");
        details.add_tag("web");
        assert_eq!(details.authors, vec!["alice", "bob"]);
        assert_eq!(details.tags, vec!["web"]);
    }

    #[test]
    fn test_dependency_count_spans_sets() {
        let details = PackageDetails {
            dependency_sets: vec![
                PackageDependencySet {
                    target_framework: None,
                    dependencies: vec![PackageDependency::new("A", None)],
                },
                PackageDependencySet {
                    target_framework: FrameworkMoniker::try_parse("net40"),
                    dependencies: vec![
                        PackageDependency::new("B", None),
                        PackageDependency::new("C", None),
                    ],
                },
            ],
            ..PackageDetails::default()
        };
        assert_eq!(details.dependency_count(), 3);
    }
}
