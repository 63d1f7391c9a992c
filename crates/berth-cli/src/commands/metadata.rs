//! `berth metadata`: Create, list and obtain container metadata files.

use std::path::PathBuf;
use std::time::Duration;

use berth_metadata::MetadataStore;
use berth_metadata::export::{ExportOptions, export_container};
use berth_metadata::fetch::{FetchRequest, fetch};
use berth_metadata::install::install;
use clap::{Args, Subcommand};

use super::{GlobalArgs, connect};
use crate::output;

/// Arguments for the `metadata` command.
#[derive(Args, Debug)]
pub struct MetadataArgs {
    /// Metadata operation.
    #[command(subcommand)]
    pub command: MetadataCommand,
}

/// Metadata operations.
#[derive(Subcommand, Debug)]
pub enum MetadataCommand {
    /// Snapshot a container into metadata, pod manifest and service unit files.
    Create {
        /// Container ID, ID prefix or name.
        container: String,
        /// File name for the snapshot.
        #[arg(short, long)]
        outfile: Option<String>,
        /// Directory to write into instead of the user template directory.
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// List metadata files in the user and system template directories.
    List,
    /// Download a metadata file.
    Fetch {
        /// URL of the file.
        url: String,
        /// File name instead of the server-suggested one.
        #[arg(short, long)]
        outfile: Option<String>,
        /// Directory to save into instead of the user template directory.
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Copy a metadata file shipped inside an image.
    Install {
        /// Image carrying the file.
        image: String,
        /// File name under the image's metadata directory.
        file: String,
        /// Directory to save into instead of the system template directory.
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

/// Executes the `metadata` command.
///
/// # Errors
///
/// Returns an error if the engine, the network or the filesystem fails, or
/// a file exists without `--force`.
pub fn execute(args: MetadataArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let store = MetadataStore::from_config(&config.metadata);

    match args.command {
        MetadataCommand::Create {
            container,
            outfile,
            directory,
            force,
        } => {
            let console = connect(&config)?;
            let record = console.resolve_container(&container)?;
            let options = ExportOptions {
                outfile: outfile.as_deref(),
                directory: store.target_dir(directory.as_deref()),
                force,
                format: config.metadata.manifest_format,
            };
            let written = export_container(&console, &record.id, &options)?;
            output::print_lines(written.iter().map(|p| p.display()));
        }
        MetadataCommand::List => {
            let files = store.list()?;
            if files.is_empty() {
                output::print_lines(["No metadata files found."]);
            }
            output::print_lines(files.iter().map(|p| p.display()));
        }
        MetadataCommand::Fetch {
            url,
            outfile,
            directory,
            force,
        } => {
            let request = FetchRequest {
                url: &url,
                outfile: outfile.as_deref(),
                directory: store.target_dir(directory.as_deref()),
                force,
                timeout: Duration::from_secs(config.engine.timeout_secs),
            };
            let path = fetch(&request)?;
            output::print_lines([path.display()]);
        }
        MetadataCommand::Install {
            image,
            file,
            directory,
            force,
        } => {
            let console = connect(&config)?;
            let target = directory.as_deref().unwrap_or_else(|| store.system_dir());
            let path = install(console.engine(), &image, &file, target, force)?;
            output::print_lines([path.display()]);
        }
    }
    Ok(())
}
