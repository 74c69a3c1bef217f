//! Package assembly for parcel.
//!
//! Resolves manifest file patterns against the disk, writes package archives
//! and reads them back.

pub mod archive;
pub mod builder;
pub mod fs;
pub mod metadata;
pub mod package;
pub mod resolver;

pub use archive::{ArchiveError, CoreProperties, Relationship};
pub use builder::{BuildError, PackageBuilder, PackageFileSource};
pub use fs::{FileSystem, LocalFileSystem, SearchOption};
pub use metadata::{MetadataError, package_details};
pub use package::{ArchivePackage, PACKAGE_EXTENSION, PackageError};
