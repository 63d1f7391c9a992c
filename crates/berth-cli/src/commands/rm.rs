//! `berth rm`: Remove containers.

use clap::Args;

use super::{GlobalArgs, connect, resolve_containers};
use crate::output;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container IDs, ID prefixes or names.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `rm` command.
///
/// Running containers are refused by the engine and reported as failed.
///
/// # Errors
///
/// Returns an error if a reference does not resolve or any removal fails.
pub fn execute(args: RmArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let console = connect(&config)?;
    let ids = resolve_containers(&console, &args.containers)?;
    output::finish(&console.remove_containers(&ids))
}
