//! Schema tiers and the namespace lookup table.
//!
//! Each manifest schema revision ("tier") adds fields to the previous one. A
//! manifest is written at the lowest tier able to carry everything its author
//! populated, so documents stay readable by the oldest tools that can
//! understand them. Tier requirements are declared per field through
//! [`SchemaTier`] rather than discovered at runtime.

use std::sync::LazyLock;

use crate::version::PackageVersion;

use super::{
    ManifestDependency, ManifestDependencyGroup, ManifestFrameworkAssembly, ManifestMetadata,
    ManifestReference,
};

/// The original schema.
pub const BASELINE_SCHEMA_VERSION: u32 = 1;
/// Adds `releaseNotes`, `copyright` and `references`.
pub const REFERENCES_SCHEMA_VERSION: u32 = 2;
/// Allows prerelease labels in the package version.
pub const PRERELEASE_SCHEMA_VERSION: u32 = 3;
/// Allows dependency groups bound to a target framework.
pub const TARGET_FRAMEWORK_SCHEMA_VERSION: u32 = 4;
/// Highest tier this crate reads and writes.
pub const MAX_SCHEMA_VERSION: u32 = TARGET_FRAMEWORK_SCHEMA_VERSION;

const SCHEMA_NAMESPACES: &[(u32, &str)] = &[
    (
        BASELINE_SCHEMA_VERSION,
        "http://schemas.microsoft.com/packaging/2010/07/nuspec.xsd",
    ),
    (
        REFERENCES_SCHEMA_VERSION,
        "http://schemas.microsoft.com/packaging/2011/08/nuspec.xsd",
    ),
    (
        PRERELEASE_SCHEMA_VERSION,
        "http://schemas.microsoft.com/packaging/2011/10/nuspec.xsd",
    ),
    (
        TARGET_FRAMEWORK_SCHEMA_VERSION,
        "http://schemas.microsoft.com/packaging/2012/06/nuspec.xsd",
    ),
];

/// Description of one schema tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaResource {
    /// Tier number.
    pub version: u32,
    /// Document namespace URI.
    pub namespace: &'static str,
    /// Name of the XSD resource describing the tier.
    pub resource_name: &'static str,
}

const SCHEMA_RESOURCE_NAMES: &[&str] = &[
    "nuspec.v1.xsd",
    "nuspec.v2.xsd",
    "nuspec.v3.xsd",
    "nuspec.v4.xsd",
];

static GLOBAL_TABLE: LazyLock<SchemaTable> = LazyLock::new(SchemaTable::new);

/// Lookup between schema tiers and document namespaces.
///
/// Built once by the caller and passed by reference to the manifest codec.
#[derive(Debug, Clone)]
pub struct SchemaTable {
    entries: Vec<SchemaResource>,
}

impl SchemaTable {
    /// Build the table of every tier this crate understands.
    pub fn new() -> Self {
        let entries = SCHEMA_NAMESPACES
            .iter()
            .zip(SCHEMA_RESOURCE_NAMES)
            .map(|(&(version, namespace), &resource_name)| SchemaResource {
                version,
                namespace,
                resource_name,
            })
            .collect();
        Self { entries }
    }

    /// Shared table, built on first use.
    pub fn global() -> &'static SchemaTable {
        &GLOBAL_TABLE
    }

    /// Namespace new documents are written in.
    pub fn active_namespace(&self) -> &'static str {
        self.entries
            .last()
            .map_or(SCHEMA_NAMESPACES[SCHEMA_NAMESPACES.len() - 1].1, |e| {
                e.namespace
            })
    }

    /// Highest tier in the table.
    pub fn active_version(&self) -> u32 {
        self.entries
            .last()
            .map_or(MAX_SCHEMA_VERSION, |e| e.version)
    }

    /// Whether `id` is a known namespace URI or tier number.
    pub fn is_known_schema(&self, id: &str) -> bool {
        self.schema_resource(id).is_some()
    }

    /// Look up a tier by namespace URI (case-insensitive) or tier number.
    pub fn schema_resource(&self, id: &str) -> Option<SchemaResource> {
        let id = id.trim();
        if let Ok(version) = id.parse::<u32>() {
            return self.entries.iter().find(|e| e.version == version).copied();
        }
        self.entries
            .iter()
            .find(|e| e.namespace.eq_ignore_ascii_case(id))
            .copied()
    }

    /// Tier of a namespace URI.
    pub fn tier_for(&self, namespace: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.namespace.eq_ignore_ascii_case(namespace.trim()))
            .map(|e| e.version)
    }

    /// Namespace URI of a tier.
    pub fn namespace_for(&self, version: u32) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|e| e.version == version)
            .map(|e| e.namespace)
    }
}

impl Default for SchemaTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimum schema tier needed to represent a value without data loss.
pub trait SchemaTier {
    /// The tier; [`BASELINE_SCHEMA_VERSION`] when nothing newer is populated.
    fn schema_tier(&self) -> u32;
}

/// Tier of a field tagged `tier`, counted only when the field is populated.
fn tagged(tier: u32, populated: bool) -> u32 {
    if populated {
        tier
    } else {
        BASELINE_SCHEMA_VERSION
    }
}

fn text_populated(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

fn max_tier<T: SchemaTier>(items: &[T]) -> u32 {
    items
        .iter()
        .map(SchemaTier::schema_tier)
        .max()
        .unwrap_or(BASELINE_SCHEMA_VERSION)
}

impl SchemaTier for ManifestMetadata {
    fn schema_tier(&self) -> u32 {
        let prerelease = PackageVersion::try_parse(&self.version)
            .is_some_and(|version| version.is_prerelease());

        [
            tagged(PRERELEASE_SCHEMA_VERSION, prerelease),
            tagged(
                REFERENCES_SCHEMA_VERSION,
                text_populated(self.release_notes.as_ref()),
            ),
            tagged(
                REFERENCES_SCHEMA_VERSION,
                text_populated(self.copyright.as_ref()),
            ),
            tagged(REFERENCES_SCHEMA_VERSION, !self.references.is_empty()),
            max_tier(&self.references),
            max_tier(&self.dependencies),
            max_tier(&self.dependency_groups),
            max_tier(&self.framework_assemblies),
        ]
        .into_iter()
        .max()
        .unwrap_or(BASELINE_SCHEMA_VERSION)
    }
}

impl SchemaTier for ManifestDependencyGroup {
    fn schema_tier(&self) -> u32 {
        tagged(
            TARGET_FRAMEWORK_SCHEMA_VERSION,
            self.target_framework.is_some(),
        )
        .max(max_tier(&self.dependencies))
    }
}

impl SchemaTier for ManifestDependency {
    fn schema_tier(&self) -> u32 {
        BASELINE_SCHEMA_VERSION
    }
}

impl SchemaTier for ManifestFrameworkAssembly {
    fn schema_tier(&self) -> u32 {
        BASELINE_SCHEMA_VERSION
    }
}

impl SchemaTier for ManifestReference {
    fn schema_tier(&self) -> u32 {
        REFERENCES_SCHEMA_VERSION
    }
}

/// Lowest schema tier able to represent `metadata`.
///
/// ```
/// use parcel_schema::manifest::{ManifestMetadata, compute_minimum_schema_version};
///
/// let mut metadata = ManifestMetadata { version: "1.0".into(), ..Default::default() };
/// assert_eq!(compute_minimum_schema_version(&metadata), 1);
///
/// metadata.version = "1.0-beta".into();
/// assert_eq!(compute_minimum_schema_version(&metadata), 3);
/// ```
pub fn compute_minimum_schema_version(metadata: &ManifestMetadata) -> u32 {
    metadata.schema_tier()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ManifestMetadata {
        ManifestMetadata {
            id: "Sample".into(),
            version: "1.0.0".into(),
            authors: "alice".into(),
            description: "sample".into(),
            ..ManifestMetadata::default()
        }
    }

    fn group(target_framework: Option<&str>) -> ManifestDependencyGroup {
        ManifestDependencyGroup {
            target_framework: target_framework.map(str::to_string),
            dependencies: vec![ManifestDependency {
                id: "Dep".into(),
                version: Some("1.0".into()),
                exclude: None,
            }],
        }
    }

    #[test]
    fn test_baseline_tier() {
        assert_eq!(compute_minimum_schema_version(&metadata()), 1);
    }

    #[test]
    fn test_tier_two_fields() {
        let mut m = metadata();
        m.copyright = Some("(c) alice".into());
        assert_eq!(compute_minimum_schema_version(&m), 2);

        let mut m = metadata();
        m.references.push(ManifestReference {
            file: "Sample.dll".into(),
        });
        assert_eq!(compute_minimum_schema_version(&m), 2);

        let mut m = metadata();
        m.release_notes = Some(String::new());
        assert_eq!(compute_minimum_schema_version(&m), 1);
    }

    #[test]
    fn test_prerelease_version_is_tier_three() {
        let mut m = metadata();
        m.version = "1.0.0-beta".into();
        assert_eq!(compute_minimum_schema_version(&m), 3);
    }

    #[test]
    fn test_targeted_group_is_tier_four() {
        let mut m = metadata();
        m.dependency_groups.push(group(None));
        assert_eq!(compute_minimum_schema_version(&m), 1);
        m.dependency_groups.push(group(Some("net40")));
        assert_eq!(compute_minimum_schema_version(&m), 4);
    }

    #[test]
    fn test_tier_is_monotonic() {
        let mut m = metadata();
        m.copyright = Some("(c)".into());
        m.version = "2.0-rc".into();
        let before = compute_minimum_schema_version(&m);
        assert_eq!(before, 3);
        m.dependency_groups.push(group(Some("sl4")));
        let after = compute_minimum_schema_version(&m);
        assert!(after >= before);
        assert_eq!(after, 4);
    }

    #[test]
    fn test_schema_table_lookup() {
        let table = SchemaTable::new();
        assert_eq!(table.active_version(), MAX_SCHEMA_VERSION);
        assert_eq!(
            table.active_namespace(),
            "http://schemas.microsoft.com/packaging/2012/06/nuspec.xsd"
        );
        assert!(table.is_known_schema("2"));
        assert!(table.is_known_schema(
            "HTTP://schemas.microsoft.com/packaging/2010/07/nuspec.xsd"
        ));
        assert!(!table.is_known_schema("http://example.com/other.xsd"));
        assert!(!table.is_known_schema("9"));
        assert_eq!(
            table.tier_for("http://schemas.microsoft.com/packaging/2011/10/nuspec.xsd"),
            Some(3)
        );
        assert_eq!(table.namespace_for(9), None);
        assert_eq!(SchemaTable::global().active_version(), 4);
        assert_eq!(
            table.schema_resource("1").map(|r| r.resource_name),
            Some("nuspec.v1.xsd")
        );
    }
}
