//! Reading built packages.
//!
//! An [`ArchivePackage`] is a read-only view of a package archive: the
//! manifest found through the root relationship, the content files and the
//! core properties.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

use parcel_schema::{Manifest, ManifestError, PackageDetails, PackageVersion};
use thiserror::Error;

use crate::archive::{
    ArchiveError, CoreProperties, MANIFEST_RELATIONSHIP_TYPE, PackageReader, Relationship,
    is_layout_part, package_path, part_name,
};
use crate::metadata::{MetadataError, package_details};

/// File extension of package archives.
pub const PACKAGE_EXTENSION: &str = ".nupkg";

/// Errors that can occur when opening or reading a package.
#[derive(Error, Debug)]
pub enum PackageError {
    /// An I/O error occurred while reading the package file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The archive layout is invalid.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The package has no root relationship to a manifest.
    #[error("the package does not contain a manifest")]
    MissingManifest,

    /// The embedded manifest is invalid.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// The embedded manifest has values that do not parse.
    #[error("invalid manifest: {0}")]
    Metadata(#[from] MetadataError),
}

/// A package archive opened for reading.
#[derive(Debug)]
pub struct ArchivePackage<R: Read + Seek> {
    reader: PackageReader<R>,
    manifest_part: String,
    manifest: Manifest,
    metadata: PackageDetails,
}

impl ArchivePackage<BufReader<File>> {
    /// Open a package file.
    ///
    /// # Errors
    ///
    /// See [`ArchivePackage::open`].
    pub fn from_path(path: &Path) -> Result<Self, PackageError> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> ArchivePackage<R> {
    /// Open a package from any seekable reader.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError`] if the archive is invalid, has no manifest, or
    /// the manifest does not read and validate.
    pub fn open(reader: R) -> Result<Self, PackageError> {
        let mut reader = PackageReader::open(reader)?;
        let manifest_part = reader
            .relationship(MANIFEST_RELATIONSHIP_TYPE)
            .map(|r| r.target_part().to_string())
            .ok_or(PackageError::MissingManifest)?;

        let bytes = reader.read_part(&manifest_part)?;
        let manifest = Manifest::read_from(bytes.as_slice())?;
        let metadata = package_details(&manifest.metadata)?;

        Ok(Self {
            reader,
            manifest_part,
            manifest,
            metadata,
        })
    }

    /// Package id.
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Package version.
    pub fn version(&self) -> Option<&PackageVersion> {
        self.metadata.version.as_ref()
    }

    /// The manifest as stored in the package.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Typed package metadata.
    pub fn metadata(&self) -> &PackageDetails {
        &self.metadata
    }

    /// Name of the manifest part.
    pub fn manifest_part(&self) -> &str {
        &self.manifest_part
    }

    /// Package paths of the content files, excluding the manifest and the
    /// archive layout parts.
    pub fn files(&self) -> Vec<String> {
        self.reader
            .part_names()
            .into_iter()
            .filter(|name| !is_layout_part(name) && !name.eq_ignore_ascii_case(&self.manifest_part))
            .map(|name| package_path(&name))
            .collect()
    }

    /// Read a content file by package path.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Archive`] if the path is invalid or absent.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>, PackageError> {
        let name = part_name(path)?;
        Ok(self.reader.read_part(&name)?)
    }

    /// Root relationships.
    pub fn relationships(&self) -> &[Relationship] {
        self.reader.relationships()
    }

    /// Core properties, when present.
    pub fn core_properties(&self) -> Option<&CoreProperties> {
        self.reader.core_properties()
    }

    /// Rebuild a manifest from the package's typed metadata.
    pub fn to_manifest(&self) -> Manifest {
        Manifest::from_metadata(&self.metadata)
    }
}
