//! `berth ps`: List containers.

use clap::Args;

use super::{GlobalArgs, connect};
use crate::output;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {}

/// Executes the `ps` command.
///
/// Lists running containers, or all of them with `--all`.
///
/// # Errors
///
/// Returns an error if the engine cannot be reached.
pub fn execute(_args: PsArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let console = connect(&config)?;
    let containers = console.containers(config.list_scope())?;

    if containers.is_empty() {
        output::print_lines(["No containers found."]);
        return Ok(());
    }
    output::print_lines(output::container_rows(&containers));
    Ok(())
}
