//! Container engine abstraction.
//!
//! Everything berth does to the engine goes through [`EngineClient`], so the
//! planner and the CLI run the same way against a live daemon or against the
//! in-memory engine used for dry runs.

pub mod docker;
pub mod memory;

use berth_common::config::EngineConfig;
use berth_common::error::Result;
use berth_common::launch::LaunchSpec;
use berth_common::types::{ContainerId, ContainerRecord, ImageId, ImageRecord};

/// Full inspection of one container.
#[derive(Debug, Clone)]
pub struct Inspection {
    /// Typed summary of the container.
    pub record: ContainerRecord,
    /// The engine's inspection document, in its native JSON field names.
    pub document: serde_json::Value,
}

/// Operations berth needs from a container engine.
///
/// Implementors are shared across worker threads during fan-out.
pub trait EngineClient: Send + Sync {
    /// Checks that the engine answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    fn ping(&self) -> Result<()>;

    /// Lists images, including untagged intermediate layers when asked.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list images.
    fn list_images(&self, include_intermediate: bool) -> Result<Vec<ImageRecord>>;

    /// Lists containers, including stopped ones when asked.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list containers.
    fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>>;

    /// Returns the full inspection of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    fn inspect_container(&self, id: &ContainerId) -> Result<Inspection>;

    /// Starts a created or stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Stops a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be stopped.
    fn stop_container(&self, id: &ContainerId) -> Result<()>;

    /// Removes a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is running or missing.
    fn remove_container(&self, id: &ContainerId) -> Result<()>;

    /// Removes an image.
    ///
    /// # Errors
    ///
    /// Returns a conflict if child images or containers still reference it.
    fn remove_image(&self, id: &ImageId) -> Result<()>;

    /// Pulls an image by reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or engine rejects the pull.
    fn pull_image(&self, reference: &str) -> Result<()>;

    /// Creates (but does not start) a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the configuration.
    fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerId>;

    /// Returns a tar archive of `path` inside a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container or path does not exist.
    fn copy_from_container(&self, id: &ContainerId, path: &str) -> Result<Vec<u8>>;
}

/// Connects to the engine described by `config`.
///
/// # Errors
///
/// Returns [`EngineUnavailable`](berth_common::error::BerthError::EngineUnavailable)
/// if the engine does not answer a ping.
pub fn connect(config: &EngineConfig) -> Result<docker::DockerEngine> {
    let engine = docker::DockerEngine::connect(config)?;
    engine.ping()?;
    tracing::debug!(socket = ?config.socket, "connected to container engine");
    Ok(engine)
}
