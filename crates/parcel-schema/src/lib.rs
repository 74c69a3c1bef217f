//! Manifest model and grammars for parcel packages.
//!
//! Version numbers, version ranges and framework monikers are parsed here,
//! alongside the `.nuspec` manifest document and its schema tiers.

pub mod framework;
pub mod manifest;
pub mod package;
pub mod version;
pub mod version_range;

// Re-exports
pub use framework::{FrameworkMoniker, FrameworkVersion, UnsupportedFramework};
pub use manifest::{
    MANIFEST_EXTENSION, Manifest, ManifestDependency, ManifestDependencyGroup, ManifestError,
    ManifestFile, ManifestFrameworkAssembly, ManifestMetadata, ManifestReference, SchemaTable,
    compute_minimum_schema_version,
};
pub use package::{
    FrameworkAssemblyReference, MAX_PACKAGE_ID_LENGTH, PackageDependency, PackageDependencySet,
    PackageDetails, PackageMetadata, is_valid_package_id,
};
pub use version::{PackageVersion, VersionParseError};
pub use version_range::{RangeParseError, VersionRange};
