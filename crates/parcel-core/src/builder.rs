//! Package assembly.
//!
//! A [`PackageBuilder`] holds typed metadata and the list of files to pack.
//! It is filled either programmatically or from a manifest plus a base
//! directory, and then written as a package archive by
//! [`PackageBuilder::save`].
//!
//! Every check that can fail (package id, empty package, manifest validation,
//! assembly references) runs before the first byte of the archive is written.

use std::io::{self, Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use parcel_schema::{
    MANIFEST_EXTENSION, MAX_PACKAGE_ID_LENGTH, Manifest, ManifestError, ManifestFile,
    PackageDetails, is_valid_package_id,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{ArchiveError, CoreProperties, MANIFEST_RELATIONSHIP_TYPE, PackageWriter};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::metadata::{MetadataError, package_details};
use crate::package::{ArchivePackage, PACKAGE_EXTENSION, PackageError};
use crate::resolver::{
    ExcludeFilter, normalize_path, resolve_package_path, resolve_search_filter, search_files,
    to_package_path,
};

/// Source used when a manifest has no `<files>` element.
const DEFAULT_FILE_SOURCE: &str = r"**\*.*";

/// Directory whose files may be named by `<reference>` elements.
const LIB_DIRECTORY: &str = r"lib\";

/// Errors that can occur while assembling a package.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A non-wildcard file source matched nothing.
    #[error("could not find '{pattern}' in '{}'", directory.display())]
    FileNotFound {
        /// The source as written in the manifest.
        pattern: String,
        /// Directory that was searched.
        directory: PathBuf,
    },

    /// The package id does not match the id grammar.
    #[error("'{0}' is not a valid package id")]
    InvalidPackageId(String),

    /// The package id is longer than [`MAX_PACKAGE_ID_LENGTH`].
    #[error("the package id '{0}' is longer than {MAX_PACKAGE_ID_LENGTH} characters")]
    IdTooLong(String),

    /// The package has no files, dependencies or framework references.
    #[error("cannot create a package that has no dependencies nor content")]
    EmptyPackage,

    /// A `<reference>` names a file that is not packed under `lib\`.
    #[error("invalid assembly reference '{0}': no file with that name exists in the lib directory")]
    MissingReference(String),

    /// An I/O error occurred while reading source files.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Writing the archive failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The manifest does not validate.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A manifest value does not parse.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The written package could not be reopened.
    #[error(transparent)]
    Package(#[from] PackageError),
}

/// A file to pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFileSource {
    /// Where the file is read from.
    pub source_path: PathBuf,
    /// Package path, with `\` separators.
    pub target_path: String,
}

/// Assembles a package archive from metadata and files.
#[derive(Debug)]
pub struct PackageBuilder {
    /// Package metadata.
    pub metadata: PackageDetails,
    /// Files to pack, in order.
    pub files: Vec<PackageFileSource>,
    fs: Box<dyn FileSystem>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBuilder {
    /// An empty builder reading files from the local disk.
    pub fn new() -> Self {
        Self::with_file_system(Box::new(LocalFileSystem))
    }

    /// An empty builder reading files through `fs`.
    pub fn with_file_system(fs: Box<dyn FileSystem>) -> Self {
        Self {
            metadata: PackageDetails::default(),
            files: Vec::new(),
            fs,
        }
    }

    /// Load a manifest file. The base path defaults to the manifest's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read, or see
    /// [`PackageBuilder::from_manifest`].
    pub fn from_manifest_path(path: &Path, base_path: Option<&Path>) -> Result<Self, BuildError> {
        let manifest = Manifest::from_path(path)?;
        let base_path = base_path
            .or_else(|| path.parent())
            .filter(|base| !base.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_manifest(&manifest, Some(base_path))
    }

    /// Build from a manifest, resolving its file entries against `base_path`.
    ///
    /// Without a base path only the metadata is taken. With one and no
    /// `<files>` element, every file below the base path is packed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::FileNotFound`] if a non-wildcard source matches
    /// nothing, or an error if a manifest value does not parse.
    pub fn from_manifest(
        manifest: &Manifest,
        base_path: Option<&Path>,
    ) -> Result<Self, BuildError> {
        Self::from_manifest_with(manifest, base_path, Box::new(LocalFileSystem))
    }

    /// Like [`PackageBuilder::from_manifest`], reading files through `fs`.
    ///
    /// # Errors
    ///
    /// See [`PackageBuilder::from_manifest`].
    pub fn from_manifest_with(
        manifest: &Manifest,
        base_path: Option<&Path>,
        fs: Box<dyn FileSystem>,
    ) -> Result<Self, BuildError> {
        let mut builder = Self::with_file_system(fs);
        builder.metadata = package_details(&manifest.metadata)?;

        let Some(base_path) = base_path else {
            return Ok(builder);
        };
        let base_path = if base_path.as_os_str().is_empty() {
            Path::new(".")
        } else {
            base_path
        };
        let base_path = normalize_path(&std::path::absolute(base_path)?);

        let default_files;
        let files = match &manifest.files {
            Some(files) => files.as_slice(),
            None => {
                default_files = [ManifestFile {
                    source: DEFAULT_FILE_SOURCE.to_string(),
                    target: None,
                    exclude: None,
                }];
                &default_files[..]
            }
        };
        for file in files {
            builder.add_files(
                &base_path,
                &file.source,
                file.target.as_deref(),
                file.exclude.as_deref(),
            )?;
        }
        Ok(builder)
    }

    /// Add one file at an explicit package path.
    pub fn add_file(&mut self, source_path: impl Into<PathBuf>, target_path: &str) {
        self.files.push(PackageFileSource {
            source_path: source_path.into(),
            target_path: target_path.to_string(),
        });
    }

    /// Add every file `source` matches below `base_path`, placed under
    /// `target` and minus anything `exclude` matches.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::FileNotFound`] if `source` has no wildcard and
    /// matches nothing.
    pub fn add_files(
        &mut self,
        base_path: &Path,
        source: &str,
        target: Option<&str>,
        exclude: Option<&str>,
    ) -> Result<(), BuildError> {
        let filter = resolve_search_filter(base_path, source);
        let matches = search_files(self.fs.as_ref(), &filter)?;
        if matches.is_empty() && !filter.is_wildcard_search {
            return Err(BuildError::FileNotFound {
                pattern: source.to_string(),
                directory: filter.search_directory,
            });
        }

        let exclude = ExcludeFilter::new(base_path, exclude);
        let target = target.unwrap_or_default();
        for path in matches {
            if exclude.is_excluded(&path) {
                debug!(path = %path.display(), "excluded");
                continue;
            }
            let target_path = resolve_package_path(&filter, &path, target);
            debug!(path = %path.display(), target = %target_path, "mapped file");
            self.files.push(PackageFileSource {
                source_path: path,
                target_path,
            });
        }
        Ok(())
    }

    /// File name of the package, `{id}.{version}.nupkg`.
    pub fn package_file_name(&self) -> String {
        let version = self
            .metadata
            .version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        format!("{}.{version}{PACKAGE_EXTENSION}", self.metadata.id)
    }

    fn check(&self) -> Result<(), BuildError> {
        let id = &self.metadata.id;
        if id.chars().count() > MAX_PACKAGE_ID_LENGTH {
            return Err(BuildError::IdTooLong(id.clone()));
        }
        if !is_valid_package_id(id) {
            return Err(BuildError::InvalidPackageId(id.clone()));
        }
        if self.files.is_empty()
            && self.metadata.dependency_count() == 0
            && self.metadata.framework_assemblies.is_empty()
        {
            return Err(BuildError::EmptyPackage);
        }

        for reference in &self.metadata.references {
            let packed = self.files.iter().any(|file| {
                let target = file.target_path.to_ascii_lowercase();
                target.starts_with(LIB_DIRECTORY)
                    && target
                        .rsplit('\\')
                        .next()
                        .is_some_and(|name| name.eq_ignore_ascii_case(reference))
            });
            if !packed {
                return Err(BuildError::MissingReference(reference.clone()));
            }
        }
        Ok(())
    }

    fn core_properties(&self) -> CoreProperties {
        let metadata = &self.metadata;
        CoreProperties {
            creator: metadata.authors.join(","),
            description: metadata.description.clone(),
            identifier: metadata.id.clone(),
            version: metadata
                .version
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            language: metadata.language.clone(),
            keywords: (!metadata.tags.is_empty()).then(|| metadata.tags.join(" ")),
            last_modified_by: Some(format!("parcel, Version={}", env!("CARGO_PKG_VERSION"))),
        }
    }

    /// Write the package archive.
    ///
    /// A file whose package path is the manifest part, `{id}.nuspec`, is
    /// skipped; that part is generated from the metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is invalid (checked before writing) or
    /// if reading a source file or writing the archive fails.
    pub fn save<W: Write + Seek>(&self, writer: W) -> Result<W, BuildError> {
        self.check()?;
        let manifest = Manifest::from_metadata(&self.metadata);
        let manifest_xml = manifest.to_xml_string()?;

        let mut package = PackageWriter::new(writer);
        let mut count = 0usize;
        for file in &self.files {
            if is_manifest_path(&file.target_path, &self.metadata.id) {
                debug!(target = %file.target_path, "skipping manifest file");
                continue;
            }
            let mut content = self.fs.open(&file.source_path)?;
            package.add_part(&file.target_path, content.as_mut())?;
            count += 1;
        }

        let manifest_part = package.add_part(
            &manifest_part_path(&self.metadata.id),
            &mut manifest_xml.as_bytes(),
        )?;
        package.add_relationship(MANIFEST_RELATIONSHIP_TYPE, &manifest_part);
        let writer = package.finish(&self.core_properties())?;

        info!(
            id = %self.metadata.id,
            version = %manifest.metadata.version,
            files = count,
            "saved package"
        );
        Ok(writer)
    }

    /// Write the package into memory and open it for reading.
    ///
    /// # Errors
    ///
    /// See [`PackageBuilder::save`].
    pub fn build(&self) -> Result<ArchivePackage<Cursor<Vec<u8>>>, BuildError> {
        let bytes = self.save(Cursor::new(Vec::new()))?.into_inner();
        Ok(ArchivePackage::open(Cursor::new(bytes))?)
    }
}

/// Whether `target_path` is the package's own manifest part.
fn is_manifest_path(target_path: &str, package_id: &str) -> bool {
    to_package_path(target_path).eq_ignore_ascii_case(&manifest_part_path(package_id))
}

fn manifest_part_path(package_id: &str) -> String {
    format!("{package_id}{MANIFEST_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_schema::{PackageDependency, PackageDependencySet, PackageVersion};
    use std::collections::BTreeMap;
    use std::io::Read;

    /// In-memory files keyed by path.
    #[derive(Debug, Default)]
    struct MemoryFileSystem {
        files: BTreeMap<PathBuf, Vec<u8>>,
    }

    impl MemoryFileSystem {
        fn with(mut self, path: &str, content: &str) -> Self {
            self.files.insert(PathBuf::from(path), content.as_bytes().to_vec());
            self
        }
    }

    impl FileSystem for MemoryFileSystem {
        fn enumerate(
            &self,
            directory: &Path,
            option: crate::fs::SearchOption,
        ) -> io::Result<Vec<PathBuf>> {
            Ok(self
                .files
                .keys()
                .filter(|path| match option {
                    crate::fs::SearchOption::TopDirectoryOnly => path.parent() == Some(directory),
                    crate::fs::SearchOption::AllDirectories => path.starts_with(directory),
                })
                .cloned()
                .collect())
        }

        fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
            let bytes = self
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
            Ok(Box::new(Cursor::new(bytes)))
        }
    }

    fn builder(fs: MemoryFileSystem) -> PackageBuilder {
        let mut builder = PackageBuilder::with_file_system(Box::new(fs));
        builder.metadata.id = "Sample".into();
        builder.metadata.version = Some(PackageVersion::new(1, 0, 0));
        builder.metadata.description = "sample".into();
        builder.metadata.add_author("alice");
        builder
    }

    #[test]
    fn test_empty_package_is_rejected_before_writing() {
        let builder = builder(MemoryFileSystem::default());
        let mut out = Cursor::new(Vec::new());
        assert!(matches!(
            builder.save(&mut out),
            Err(BuildError::EmptyPackage)
        ));
        assert!(out.get_ref().is_empty());
    }

    #[test]
    fn test_dependency_only_package_is_allowed() {
        let mut builder = builder(MemoryFileSystem::default());
        builder.metadata.dependency_sets.push(PackageDependencySet {
            target_framework: None,
            dependencies: vec![PackageDependency::new("Json", None)],
        });
        let package = builder.build().unwrap();
        assert!(package.files().is_empty());
        assert_eq!(package.metadata().dependency_count(), 1);
    }

    #[test]
    fn test_invalid_ids() {
        let mut b = builder(MemoryFileSystem::default().with("/src/a.txt", "a"));
        b.add_file("/src/a.txt", "a.txt");
        b.metadata.id = "bad id".into();
        assert!(matches!(b.save(Cursor::new(Vec::new())), Err(BuildError::InvalidPackageId(_))));
        b.metadata.id = "a".repeat(101);
        assert!(matches!(b.save(Cursor::new(Vec::new())), Err(BuildError::IdTooLong(_))));
    }

    #[test]
    fn test_root_manifest_file_is_skipped() {
        let fs = MemoryFileSystem::default()
            .with("/src/Sample.nuspec", "<package/>")
            .with("/src/readme.txt", "hello");
        let mut manifest = Manifest::default();
        manifest.metadata.id = "Sample".into();
        manifest.metadata.version = "1.0".into();
        manifest.metadata.authors = "alice".into();
        manifest.metadata.description = "sample".into();

        let builder =
            PackageBuilder::from_manifest_with(&manifest, Some(Path::new("/src")), Box::new(fs))
                .unwrap();
        assert_eq!(builder.files.len(), 2);

        let mut package = builder.build().unwrap();
        assert_eq!(package.files(), vec!["readme.txt".to_string()]);
        assert_eq!(package.read_file("readme.txt").unwrap(), b"hello");
        let stored = String::from_utf8(package.read_file("Sample.nuspec").unwrap()).unwrap();
        assert!(stored.contains("<id>Sample</id>"));
    }

    #[test]
    fn test_only_the_manifest_part_is_skipped() {
        let fs = MemoryFileSystem::default()
            .with("/src/a.nuspec", "a")
            .with("/src/b.nuspec", "b")
            .with("/src/c.nuspec", "c");
        let mut b = builder(fs);
        b.add_file("/src/a.nuspec", "docs/x.nuspec");
        b.add_file("/src/b.nuspec", "other.nuspec");
        b.add_file("/src/c.nuspec", "SAMPLE.nuspec");

        let mut package = b.build().unwrap();
        assert_eq!(
            package.files(),
            vec![r"docs\x.nuspec".to_string(), "other.nuspec".to_string()]
        );
        let stored = String::from_utf8(package.read_file("Sample.nuspec").unwrap()).unwrap();
        assert!(stored.contains("<id>Sample</id>"));
    }

    #[test]
    fn test_missing_non_wildcard_source() {
        let mut manifest = Manifest::default();
        manifest.metadata.id = "Sample".into();
        manifest.metadata.version = "1.0".into();
        manifest.files = Some(vec![ManifestFile {
            source: "missing.dll".into(),
            target: None,
            exclude: None,
        }]);
        let err = PackageBuilder::from_manifest_with(
            &manifest,
            Some(Path::new("/src")),
            Box::new(MemoryFileSystem::default()),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BuildError::FileNotFound { ref pattern, .. } if pattern == "missing.dll"
        ));

        manifest.files = Some(vec![ManifestFile {
            source: "*.dll".into(),
            target: None,
            exclude: None,
        }]);
        let builder = PackageBuilder::from_manifest_with(
            &manifest,
            Some(Path::new("/src")),
            Box::new(MemoryFileSystem::default()),
        )
        .unwrap();
        assert!(builder.files.is_empty());
    }

    #[test]
    fn test_exclude_and_targets() {
        let fs = MemoryFileSystem::default()
            .with("/src/bin/a.dll", "a")
            .with("/src/bin/a.pdb", "p")
            .with("/src/bin/sub/b.dll", "b");
        let mut b = builder(fs);
        b.add_files(Path::new("/src"), r"bin\**\*.*", Some(r"lib\net40"), Some("**/*.pdb"))
            .unwrap();
        let targets: Vec<_> = b.files.iter().map(|f| f.target_path.as_str()).collect();
        assert_eq!(targets, vec![r"lib\net40\a.dll", r"lib\net40\sub\b.dll"]);
    }

    #[test]
    fn test_references_must_be_packed_in_lib() {
        let fs = MemoryFileSystem::default().with("/src/a.dll", "a");
        let mut b = builder(fs);
        b.add_file("/src/a.dll", r"lib\net40\a.dll");
        b.metadata.references.push("b.dll".into());
        assert!(matches!(
            b.save(Cursor::new(Vec::new())),
            Err(BuildError::MissingReference(_))
        ));
        b.metadata.references = vec!["A.dll".into()];
        assert!(b.save(Cursor::new(Vec::new())).is_ok());
    }

    #[test]
    fn test_package_file_name() {
        let b = builder(MemoryFileSystem::default());
        assert_eq!(b.package_file_name(), "Sample.1.0.0.nupkg");
    }
}
