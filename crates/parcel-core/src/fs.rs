//! File system access used while building packages.
//!
//! The builder only ever lists files and opens them for reading, so both
//! operations sit behind [`FileSystem`] and tests can substitute their own.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// How far below the search directory to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOption {
    /// Only files directly inside the directory.
    TopDirectoryOnly,
    /// Files in the directory and every subdirectory.
    AllDirectories,
}

/// Read-only file system operations.
pub trait FileSystem: fmt::Debug {
    /// List the files under `directory`, sorted by path.
    ///
    /// A directory that does not exist yields no files rather than an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory exists but cannot be read.
    fn enumerate(&self, directory: &Path, option: SearchOption) -> io::Result<Vec<PathBuf>>;

    /// Open a file for reading.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>>;
}

/// The local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn enumerate(&self, directory: &Path, option: SearchOption) -> io::Result<Vec<PathBuf>> {
        if !directory.is_dir() {
            return Ok(Vec::new());
        }

        let max_depth = match option {
            SearchOption::TopDirectoryOnly => 1,
            SearchOption::AllDirectories => usize::MAX,
        };

        let mut files = Vec::new();
        for entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            // Symlinked files are packed; symlinked directories are not descended
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if is_file {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}
