//! `berth images`: List images.

use chrono::Local;
use clap::Args;

use super::{GlobalArgs, connect};
use crate::output;

/// Arguments for the `images` command.
#[derive(Args, Debug)]
pub struct ImagesArgs {}

/// Executes the `images` command.
///
/// Lists tagged top-level images, or intermediate images too with `--all`.
///
/// # Errors
///
/// Returns an error if the engine cannot be reached.
pub fn execute(_args: ImagesArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let console = connect(&config)?;
    let images = console.images(config.list_scope())?;

    if images.is_empty() {
        output::print_lines(["No images found."]);
        return Ok(());
    }
    output::print_lines(output::image_rows(&images, &Local));
    Ok(())
}
