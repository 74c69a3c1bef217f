//! parcel - package authoring from the command line
#![allow(clippy::missing_errors_doc)]
//!
//! Builds `.nupkg` archives from `.nuspec` manifests, checks manifests, and
//! inspects or reconstructs the manifest of an existing package.
//!
//! # Logging
//!
//! Diagnostics go to stderr through `tracing`. `RUST_LOG` selects the filter;
//! `--verbose` turns on debug output when `RUST_LOG` is unset.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "parcel")]
#[command(author, version, about = "parcel - build and inspect .nupkg packages")]
pub struct Cli {
    /// Show debug logging (file matching, schema decisions)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a package from a manifest
    Pack {
        /// Path to the .nuspec manifest
        manifest: PathBuf,
        /// Directory file sources are resolved against (default: the manifest's directory)
        #[arg(long, short = 'b', env = "PARCEL_BASE_PATH")]
        base_path: Option<PathBuf>,
        /// Directory the package is written to
        #[arg(long, short = 'o', env = "PARCEL_OUTPUT_DIR", default_value = ".")]
        output_dir: PathBuf,
    },
    /// Read and validate a manifest
    Check {
        /// Path to the .nuspec manifest
        manifest: PathBuf,
    },
    /// Show the metadata and files of a package
    Inspect {
        /// Path to the .nupkg package
        package: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the manifest document of a package
    Manifest {
        /// Path to the .nupkg package
        package: PathBuf,
        /// Write to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}
