//! parcel - package authoring CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use parcel_cli::cmd;
use parcel_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only moves the default
    let default_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Commands::Pack {
            manifest,
            base_path,
            output_dir,
        } => cmd::pack::pack(&manifest, base_path.as_deref(), &output_dir),
        Commands::Check { manifest } => cmd::check::check(&manifest),
        Commands::Inspect { package, json } => cmd::inspect::inspect(&package, json),
        Commands::Manifest { package, output } => {
            cmd::manifest::manifest(&package, output.as_deref())
        }
    }
}
