//! CLI command definitions and dispatch.

pub mod images;
pub mod metadata;
pub mod peek;
pub mod ps;
pub mod rm;
pub mod rmi;
pub mod run;
pub mod start;
pub mod stop;

use std::path::PathBuf;
use std::sync::Arc;

use berth_common::config::BerthConfig;
use berth_common::constants::SOCKET_ENV;
use berth_common::types::ContainerId;
use berth_engine::console::Console;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// berth: console for a local container engine.
#[derive(Parser, Debug)]
#[command(name = "berth", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Engine socket path.
    #[arg(long, global = true, env = SOCKET_ENV)]
    pub socket: Option<String>,

    /// Deadline for each engine call, in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Include stopped containers and intermediate images.
    #[arg(short, long, global = true)]
    pub all: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    /// Loads the config file and applies flag overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn config(&self) -> anyhow::Result<BerthConfig> {
        let mut config = BerthConfig::load(self.config.as_deref())?;
        if let Some(socket) = &self.socket {
            config.engine.socket = Some(socket.clone());
        }
        if let Some(timeout) = self.timeout {
            config.engine.timeout_secs = timeout;
        }
        if self.all {
            config.show_all = true;
        }
        Ok(config)
    }
}

/// Connects to the engine described by `config`.
///
/// # Errors
///
/// Returns an error if the engine does not answer.
pub fn connect(config: &BerthConfig) -> anyhow::Result<Console> {
    let engine = berth_engine::client::connect(&config.engine)?;
    Ok(Console::new(Arc::new(engine)))
}

/// Resolves container references, failing on the first that does not match.
///
/// # Errors
///
/// Returns an error if a reference is unknown, too short or ambiguous.
pub fn resolve_containers(console: &Console, references: &[String]) -> anyhow::Result<Vec<ContainerId>> {
    let mut ids: Vec<ContainerId> = Vec::with_capacity(references.len());
    for reference in references {
        let id = console.resolve_container(reference)?.id;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List containers.
    Ps(ps::PsArgs),
    /// List images.
    Images(images::ImagesArgs),
    /// Start containers.
    Start(start::StartArgs),
    /// Stop containers.
    Stop(stop::StopArgs),
    /// Remove containers.
    Rm(rm::RmArgs),
    /// Remove images with their dependent images and containers.
    Rmi(rmi::RmiArgs),
    /// Open a shell inside a running container's namespaces.
    Peek(peek::PeekArgs),
    /// Create, list and obtain container metadata files.
    Metadata(metadata::MetadataArgs),
    /// Launch a container from a metadata file.
    Run(run::RunArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let global = cli.global;
    match cli.command {
        Command::Ps(args) => ps::execute(args, &global),
        Command::Images(args) => images::execute(args, &global),
        Command::Start(args) => start::execute(args, &global),
        Command::Stop(args) => stop::execute(args, &global),
        Command::Rm(args) => rm::execute(args, &global),
        Command::Rmi(args) => rmi::execute(args, &global),
        Command::Peek(args) => peek::execute(args, &global),
        Command::Metadata(args) => metadata::execute(args, &global),
        Command::Run(args) => run::execute(args, &global),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "berth",
            "ps",
            "-a",
            "--timeout",
            "3",
            "--socket",
            "/tmp/engine.sock",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Command::Ps(_)));
        assert!(cli.global.all);
        assert_eq!(cli.global.timeout, Some(3));
        assert_eq!(cli.global.socket.as_deref(), Some("/tmp/engine.sock"));
        assert_eq!(cli.global.log_format, LogFormat::Json);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "show_all = false\n[engine]\nsocket = \"/run/file.sock\"\ntimeout_secs = 30\n",
        )
        .expect("write");

        let global = GlobalArgs {
            config: Some(path),
            socket: Some("/run/flag.sock".into()),
            timeout: None,
            all: true,
            log_format: LogFormat::Text,
        };
        let config = global.config().expect("config");
        assert_eq!(config.engine.socket.as_deref(), Some("/run/flag.sock"));
        assert_eq!(config.engine.timeout_secs, 30);
        assert!(config.show_all);
    }

    #[test]
    fn rmi_requires_an_image() {
        assert!(Cli::try_parse_from(["berth", "rmi"]).is_err());
    }
}
