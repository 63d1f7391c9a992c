//! System-wide constants and default paths.

use std::path::PathBuf;

/// Application name used in CLI output and config paths.
pub const APP_NAME: &str = "berth";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "berth";

/// Directory for metadata files written by users.
pub const USER_TEMPLATE_DIR: &str = "/var/container-template/user/";

/// Directory for metadata files installed from images.
pub const SYSTEM_TEMPLATE_DIR: &str = "/var/container-template/system/";

/// Directory inside an image that ships its metadata files.
pub const CONTAINER_METADATA_DIR: &str = "/container-metadata";

/// Default deadline for a single engine call, in seconds.
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 10;

/// Grace period the engine gives a container before killing it, in seconds.
pub const DEFAULT_STOP_GRACE_SECS: i64 = 10;

/// Default deadline for image pulls and archive copies, in seconds.
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 600;

/// Number of id characters shown in listings.
pub const SHORT_ID_LEN: usize = 8;

/// Shortest id prefix accepted when resolving user input.
pub const MIN_ID_PREFIX_LEN: usize = 3;

/// Environment variable that overrides the engine socket.
pub const SOCKET_ENV: &str = "BERTH_SOCKET";

/// Returns the per-user config file path, `$HOME/.config/berth/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join(APP_NAME)
                .join("config.toml")
        })
}
