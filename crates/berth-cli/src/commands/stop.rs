//! `berth stop`: Stop containers.

use clap::Args;

use super::{GlobalArgs, connect, resolve_containers};
use crate::output;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container IDs, ID prefixes or names.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if a reference does not resolve or any stop fails.
pub fn execute(args: StopArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let console = connect(&config)?;
    let ids = resolve_containers(&console, &args.containers)?;
    tracing::info!(count = ids.len(), "stopping containers");
    output::finish(&console.stop_all(&ids)?)
}
