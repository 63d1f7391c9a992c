//! `berth start`: Start containers.

use clap::Args;

use super::{GlobalArgs, connect, resolve_containers};
use crate::output;

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container IDs, ID prefixes or names.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `start` command.
///
/// Every container is started on its own worker; the command returns once
/// all of them have finished.
///
/// # Errors
///
/// Returns an error if a reference does not resolve or any start fails.
pub fn execute(args: StartArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let console = connect(&config)?;
    let ids = resolve_containers(&console, &args.containers)?;
    tracing::info!(count = ids.len(), "starting containers");
    output::finish(&console.start_all(&ids)?)
}
