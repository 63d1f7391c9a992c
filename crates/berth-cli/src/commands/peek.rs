//! `berth peek`: Open a shell inside a running container's namespaces.

use std::process::Command;

use clap::Args;

use super::{GlobalArgs, connect};

/// Arguments for the `peek` command.
#[derive(Args, Debug)]
pub struct PeekArgs {
    /// Container ID, ID prefix or name.
    pub container: String,

    /// Shell to run inside the container.
    #[arg(long, default_value = "/bin/bash")]
    pub shell: String,
}

/// `nsenter` arguments joining every namespace of `pid`.
#[must_use]
pub fn nsenter_args(pid: u32, shell: &str) -> Vec<String> {
    ["-m", "-u", "-n", "-i", "-p", "-t"]
        .into_iter()
        .map(str::to_string)
        .chain([pid.to_string(), shell.to_string()])
        .collect()
}

/// Returns whether the shell should open in a new `xterm` window.
fn use_xterm() -> bool {
    std::env::var("DISPLAY").is_ok_and(|d| !d.is_empty()) && which::which("xterm").is_ok()
}

/// Executes the `peek` command.
///
/// With a graphical display and `xterm` installed the shell opens in a new
/// window titled with the PID; otherwise it takes over the current terminal.
///
/// # Errors
///
/// Returns an error if the container is not running or `nsenter` fails.
pub fn execute(args: PeekArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let console = connect(&config)?;
    let container = console.resolve_container(&args.container)?;
    let pid = console.pid_of(&container.id)?;
    let nsenter = nsenter_args(pid, &args.shell);
    tracing::info!(id = %container.id.short(), pid, "entering container");

    if use_xterm() {
        let _ = Command::new("xterm")
            .arg("-T")
            .arg(pid.to_string())
            .arg("-e")
            .arg("nsenter")
            .args(&nsenter)
            .spawn()?;
        return Ok(());
    }

    let status = Command::new("nsenter").args(&nsenter).status()?;
    if !status.success() {
        anyhow::bail!("nsenter exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nsenter_joins_all_namespaces() {
        assert_eq!(
            nsenter_args(4242, "/bin/sh"),
            vec!["-m", "-u", "-n", "-i", "-p", "-t", "4242", "/bin/sh"]
        );
    }
}
