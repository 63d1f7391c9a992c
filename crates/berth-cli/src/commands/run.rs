//! `berth run`: Launch a container from a metadata file.

use std::path::{Path, PathBuf};

use berth_metadata::export::run_snapshot;
use berth_metadata::launch::{self, render_command, run_args};
use berth_metadata::{MetadataStore, Snapshot};
use clap::Args;

use super::{GlobalArgs, connect};
use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Metadata file written by `berth metadata create`.
    pub file: PathBuf,

    /// Print the equivalent `docker run` command instead of launching.
    #[arg(long)]
    pub print: bool,

    /// Leave `--rm` out of the printed command.
    #[arg(long, requires = "print")]
    pub no_rm: bool,

    /// Directory for the new container's metadata files.
    #[arg(short, long)]
    pub directory: Option<PathBuf>,
}

/// Renders the `docker run` command line that recreates the container in
/// `file`.
///
/// # Errors
///
/// Returns an error if the file is not valid metadata.
pub fn docker_command(file: &Path, remove: bool) -> anyhow::Result<String> {
    let snapshot = Snapshot::load(file)?;
    let spec = launch::from_inspection(&snapshot.inspection)?;
    let mut command = vec!["run".to_string()];
    command.extend(run_args(&spec, remove));
    Ok(render_command("docker", &command))
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the file is not valid metadata or any engine step
/// fails.
pub fn execute(args: RunArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;

    if args.print {
        output::print_lines([docker_command(&args.file, !args.no_rm)?]);
        return Ok(());
    }

    let console = connect(&config)?;
    let store = MetadataStore::from_config(&config.metadata);
    let outcome = run_snapshot(
        &console,
        &args.file,
        store.target_dir(args.directory.as_deref()),
        config.metadata.manifest_format,
    )?;
    if outcome.pulled {
        tracing::info!("image pulled");
    }
    output::print_lines(
        std::iter::once(format!("Started {}", outcome.id.short()))
            .chain(outcome.artifacts.iter().map(|p| p.display().to_string())),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;

    use super::*;
    use crate::commands::Cli;

    #[test]
    fn no_rm_requires_print() {
        assert!(Cli::try_parse_from(["berth", "run", "web.json", "--no-rm"]).is_err());
        assert!(Cli::try_parse_from(["berth", "run", "web.json", "--print", "--no-rm"]).is_ok());
    }

    #[test]
    fn printed_command_recreates_container() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("web.json");
        let inspection = json!({
            "Name": "/web",
            "Config": { "Image": "nginx", "Cmd": ["nginx", "-g", "daemon off;"], "Env": ["MODE=prod"] },
            "HostConfig": { "PortBindings": { "80/tcp": [{ "HostIp": "", "HostPort": "8080" }] } }
        });
        let document = Snapshot::from_inspection(inspection).to_document().expect("document");
        std::fs::write(&path, document.to_string()).expect("write");

        assert_eq!(
            docker_command(&path, true).expect("command"),
            "docker run --env=MODE=prod --publish=8080:80 --rm --name=web nginx nginx -g 'daemon off;'"
        );
        assert!(!docker_command(&path, false).expect("command").contains("--rm"));
    }
}
