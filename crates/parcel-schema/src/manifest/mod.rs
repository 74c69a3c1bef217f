//! Package manifests (`.nuspec` documents).
//!
//! A [`Manifest`] is the loosely-typed, document-shaped view of a package's
//! metadata: every value is kept as written so that it can be validated,
//! reported on and written back without loss. [`PackageDetails`] is the typed
//! counterpart used when building archives.
//!
//! Reading goes through decode, normalization and validation; writing
//! validates first and always uses the active schema namespace.
//!
//! [`PackageDetails`]: crate::PackageDetails

mod schema;
mod validate;
mod xml;

use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::framework::FrameworkMoniker;
use crate::package::{PackageDependency, PackageMetadata};

pub use schema::{
    BASELINE_SCHEMA_VERSION, MAX_SCHEMA_VERSION, PRERELEASE_SCHEMA_VERSION,
    REFERENCES_SCHEMA_VERSION, SchemaResource, SchemaTable, SchemaTier,
    TARGET_FRAMEWORK_SCHEMA_VERSION, compute_minimum_schema_version,
};
pub use validate::{ValidationErrors, ValidationIssue};

/// File extension of manifest documents.
pub const MANIFEST_EXTENSION: &str = ".nuspec";

/// Errors raised while reading, validating or writing a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Reading or writing the underlying stream failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(String),

    /// The document is well-formed but does not have the manifest shape.
    #[error(
        "{message} (package '{}', schema version {schema_version})",
        .package_id.as_deref().unwrap_or("<unknown>")
    )]
    Structure {
        /// What is wrong.
        message: String,
        /// Package id, when the document declares one.
        package_id: Option<String>,
        /// Schema version the document declared or implied.
        schema_version: u32,
    },

    /// One or more field values are missing or malformed.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Two dependencies in the same set share an id.
    #[error("'{package_id}' already has a dependency on '{dependency_id}'")]
    DuplicateDependency {
        /// Package declaring the dependencies.
        package_id: String,
        /// The repeated dependency id.
        dependency_id: String,
    },

    /// A dependency version range is unparsable or empty.
    #[error(
        "dependency '{dependency_id}' of '{package_id}' has an \
         invalid version range '{range}'"
    )]
    InvalidDependencyVersion {
        /// Package declaring the dependency.
        package_id: String,
        /// Dependency with the bad range.
        dependency_id: String,
        /// The range as written.
        range: String,
    },
}

/// Document-shaped package metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    /// Package id.
    pub id: String,
    /// Package version as written.
    pub version: String,
    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Comma-separated authors.
    pub authors: String,
    /// Comma-separated owners; see [`ManifestMetadata::effective_owners`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owners: Option<String>,
    /// License URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    /// Project URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    /// Icon URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Whether consumers must accept the license.
    pub require_license_acceptance: bool,
    /// Long description.
    pub description: String,
    /// Short summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Release notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    /// Copyright notice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    /// Locale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Space-separated tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Dependencies that apply to every framework.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ManifestDependency>,
    /// Dependencies grouped by target framework.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependency_groups: Vec<ManifestDependencyGroup>,
    /// Framework assembly references.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub framework_assemblies: Vec<ManifestFrameworkAssembly>,
    /// Assemblies consumers should reference.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ManifestReference>,
}

impl ManifestMetadata {
    /// Owners, falling back to the authors when none are declared.
    pub fn effective_owners(&self) -> &str {
        match self.owners.as_deref() {
            Some(owners) if !owners.trim().is_empty() => owners,
            _ => &self.authors,
        }
    }
}

/// A `<dependency>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestDependency {
    /// Id of the package depended upon.
    pub id: String,
    /// Version range as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Excluded asset kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

/// A `<group>` of dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDependencyGroup {
    /// Target framework moniker; `None` applies to every framework.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    /// Dependencies in the group.
    pub dependencies: Vec<ManifestDependency>,
}

/// A `<frameworkAssembly>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFrameworkAssembly {
    /// Assembly name.
    pub assembly_name: String,
    /// Comma-separated target framework monikers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
}

/// A `<reference>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestReference {
    /// Assembly file name.
    pub file: String,
}

/// A `<file>` element mapping source files into the package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestFile {
    /// Source path or glob, relative to the base path.
    pub source: String,
    /// Target directory or path inside the package.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// `;`-separated globs to leave out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
}

/// A package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Package metadata.
    pub metadata: ManifestMetadata,
    /// File mappings; `None` when the document has no `<files>` element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<ManifestFile>>,
}

impl Manifest {
    /// Read, normalize and validate a manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the stream cannot be read, the document is
    /// malformed or has the wrong shape, or validation fails.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, ManifestError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    /// Read a manifest from a file.
    ///
    /// # Errors
    ///
    /// See [`Manifest::read_from`].
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let file = std::fs::File::open(path)?;
        Self::read_from(std::io::BufReader::new(file))
    }

    /// Parse a manifest document held in memory.
    ///
    /// # Errors
    ///
    /// See [`Manifest::read_from`].
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        Self::parse_with(text, SchemaTable::global())
    }

    /// Parse a manifest document against an explicit schema table.
    ///
    /// # Errors
    ///
    /// See [`Manifest::read_from`].
    pub fn parse_with(text: &str, table: &SchemaTable) -> Result<Self, ManifestError> {
        let mut manifest = xml::decode(text, table)?;
        manifest.normalize();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate and write the manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if validation fails or the writer errors.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), ManifestError> {
        self.save_with(writer, SchemaTable::global())
    }

    /// Validate and write the manifest using an explicit schema table.
    ///
    /// # Errors
    ///
    /// See [`Manifest::save`].
    pub fn save_with<W: Write>(
        &self,
        mut writer: W,
        table: &SchemaTable,
    ) -> Result<(), ManifestError> {
        let text = self.to_xml_string_with(table)?;
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Validate and render the manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if validation fails.
    pub fn to_xml_string(&self) -> Result<String, ManifestError> {
        self.to_xml_string_with(SchemaTable::global())
    }

    fn to_xml_string_with(&self, table: &SchemaTable) -> Result<String, ManifestError> {
        self.validate()?;
        xml::encode(self, table)
    }

    /// Check required fields, URLs and dependency rules.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Validation`] with every field issue found, or
    /// the first duplicate or invalid dependency.
    pub fn validate(&self) -> Result<(), ManifestError> {
        validate::validate(self)
    }

    /// Lowest schema tier able to represent this manifest.
    pub fn minimum_schema_version(&self) -> u32 {
        compute_minimum_schema_version(&self.metadata)
    }

    /// Expand `;`-separated file sources and trim every string value.
    ///
    /// An entry like `a.dll;b.dll` keeps `a.dll` in place; the remaining
    /// sources are appended as new entries with the same target and exclude.
    pub fn normalize(&mut self) {
        if let Some(files) = &mut self.files {
            let mut expanded = Vec::new();
            for file in files.iter_mut() {
                let mut sources = file
                    .source
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                let Some(first) = sources.next() else {
                    continue;
                };
                for source in sources {
                    expanded.push(ManifestFile {
                        source,
                        target: file.target.clone(),
                        exclude: file.exclude.clone(),
                    });
                }
                file.source = first;
            }
            files.extend(expanded);
        }
        self.trim();
    }

    fn trim(&mut self) {
        let m = &mut self.metadata;
        for value in [&mut m.id, &mut m.version, &mut m.authors, &mut m.description] {
            trim_in_place(value);
        }
        for value in [
            &mut m.title,
            &mut m.owners,
            &mut m.license_url,
            &mut m.project_url,
            &mut m.icon_url,
            &mut m.summary,
            &mut m.release_notes,
            &mut m.copyright,
            &mut m.language,
            &mut m.tags,
        ]
        .into_iter()
        .flatten()
        {
            trim_in_place(value);
        }

        let dependencies = m
            .dependencies
            .iter_mut()
            .chain(m.dependency_groups.iter_mut().flat_map(|g| &mut g.dependencies));
        for dependency in dependencies {
            trim_in_place(&mut dependency.id);
            dependency.version.iter_mut().for_each(trim_in_place);
            dependency.exclude.iter_mut().for_each(trim_in_place);
        }
        for group in &mut m.dependency_groups {
            group.target_framework.iter_mut().for_each(trim_in_place);
            if group.target_framework.as_deref() == Some("") {
                group.target_framework = None;
            }
        }
        for assembly in &mut m.framework_assemblies {
            trim_in_place(&mut assembly.assembly_name);
            assembly.target_framework.iter_mut().for_each(trim_in_place);
        }
        for reference in &mut m.references {
            trim_in_place(&mut reference.file);
        }
        for file in self.files.iter_mut().flatten() {
            trim_in_place(&mut file.source);
            file.target.iter_mut().for_each(trim_in_place);
            file.exclude.iter_mut().for_each(trim_in_place);
        }
    }

    /// Project typed metadata into a manifest.
    ///
    /// A single dependency set without a target framework becomes a flat
    /// dependency list; anything else becomes dependency groups. Owners fall
    /// back to the authors. The result has no `<files>` element.
    pub fn from_metadata(source: &dyn PackageMetadata) -> Self {
        let authors = source.authors().join(",");
        let owners = if source.owners().is_empty() {
            authors.clone()
        } else {
            source.owners().join(",")
        };

        let sets = source.dependency_sets();
        let (dependencies, dependency_groups) = match sets {
            [single] if single.target_framework.is_none() => {
                (single.dependencies.iter().map(dependency_record).collect(), Vec::new())
            }
            _ => (
                Vec::new(),
                sets.iter()
                    .map(|set| ManifestDependencyGroup {
                        target_framework: set
                            .target_framework
                            .as_ref()
                            .map(FrameworkMoniker::short_name),
                        dependencies: set.dependencies.iter().map(dependency_record).collect(),
                    })
                    .collect(),
            ),
        };

        let framework_assemblies = source
            .framework_assemblies()
            .iter()
            .map(|assembly| ManifestFrameworkAssembly {
                assembly_name: assembly.assembly_name.clone(),
                target_framework: (!assembly.supported_frameworks.is_empty()).then(|| {
                    assembly
                        .supported_frameworks
                        .iter()
                        .map(FrameworkMoniker::short_name)
                        .collect::<Vec<_>>()
                        .join(", ")
                }),
            })
            .collect();

        let tags = (!source.tags().is_empty()).then(|| source.tags().join(" "));

        let mut manifest = Self {
            metadata: ManifestMetadata {
                id: source.id().to_string(),
                version: source.version().map(ToString::to_string).unwrap_or_default(),
                title: source.title().map(str::to_string),
                authors,
                owners: Some(owners).filter(|o| !o.is_empty()),
                license_url: source.license_url().map(str::to_string),
                project_url: source.project_url().map(str::to_string),
                icon_url: source.icon_url().map(str::to_string),
                require_license_acceptance: source.require_license_acceptance(),
                description: source.description().to_string(),
                summary: source.summary().map(str::to_string),
                release_notes: source.release_notes().map(str::to_string),
                copyright: source.copyright().map(str::to_string),
                language: source.language().map(str::to_string),
                tags,
                dependencies,
                dependency_groups,
                framework_assemblies,
                references: source
                    .references()
                    .iter()
                    .map(|file| ManifestReference { file: file.clone() })
                    .collect(),
            },
            files: None,
        };
        manifest.trim();
        manifest
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn dependency_record(dependency: &PackageDependency) -> ManifestDependency {
    ManifestDependency {
        id: dependency.id.clone(),
        version: dependency.version_range.as_ref().map(ToString::to_string),
        exclude: dependency.exclude.clone(),
    }
}
