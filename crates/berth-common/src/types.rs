//! Domain primitive types used across the berth workspace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::SHORT_ID_LEN;

/// Digest algorithm prefix the engine puts in front of content ids.
const DIGEST_PREFIX: &str = "sha256:";

fn strip_digest(id: &str) -> &str {
    id.strip_prefix(DIGEST_PREFIX).unwrap_or(id)
}

fn shorten(id: &str) -> &str {
    let bare = strip_digest(id);
    bare.get(..SHORT_ID_LEN).unwrap_or(bare)
}

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the abbreviated form shown in listings.
    #[must_use]
    pub fn short(&self) -> &str {
        shorten(&self.0)
    }

    /// Returns whether `prefix` abbreviates this id.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix) || strip_digest(&self.0).starts_with(prefix)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content identifier of a container image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new image ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses an optional engine field, treating the empty string as absent.
    #[must_use]
    pub fn from_optional(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the abbreviated form shown in listings.
    #[must_use]
    pub fn short(&self) -> &str {
        shorten(&self.0)
    }

    /// Returns whether `prefix` abbreviates this id.
    #[must_use]
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix) || strip_digest(&self.0).starts_with(prefix)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of one image as listed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Content identifier.
    pub id: ImageId,
    /// Image this one was built from, `None` for a root image.
    pub parent_id: Option<ImageId>,
    /// Human-readable `name:tag` references, in engine order.
    pub repo_tags: Vec<String>,
    /// Creation time reported by the engine.
    pub created_at: DateTime<Utc>,
    /// Size in bytes including all parent layers.
    pub virtual_size: u64,
}

impl ImageRecord {
    /// Creates a record with no tags, epoch creation time and zero size.
    #[must_use]
    pub fn new(id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: ImageId::new(id),
            parent_id: ImageId::from_optional(parent_id),
            repo_tags: Vec::new(),
            created_at: DateTime::<Utc>::default(),
            virtual_size: 0,
        }
    }

    /// Returns whether the image has no parent.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Returns whether any repo tag starts with `name`.
    #[must_use]
    pub fn has_tag_prefix(&self, name: &str) -> bool {
        self.repo_tags.iter().any(|tag| tag.starts_with(name))
    }
}

/// Snapshot of one container, running or stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container identifier.
    pub id: ContainerId,
    /// Image the container was instantiated from.
    pub image_id: ImageId,
    /// Image reference the container was created with, for display.
    pub image: String,
    /// Container name without the engine's leading `/`.
    pub name: String,
    /// Whether the container's process is alive.
    pub running: bool,
    /// Host PID of the container's init process while running.
    pub pid: Option<u32>,
    /// Engine status text, e.g. `Up 3 hours`.
    pub status: String,
}

impl ContainerRecord {
    /// Creates a stopped container record referencing `image_id`.
    #[must_use]
    pub fn new(id: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            id: ContainerId::new(id),
            image_id: ImageId::new(image_id),
            image: String::new(),
            name: String::new(),
            running: false,
            pid: None,
            status: String::new(),
        }
    }

    /// Marks the record as running with the given PID.
    #[must_use]
    pub const fn running_with_pid(mut self, pid: u32) -> Self {
        self.running = true;
        self.pid = Some(pid);
        self
    }

    /// Normalizes an engine container name by dropping its leading `/`.
    #[must_use]
    pub fn normalize_name(raw: &str) -> String {
        raw.strip_prefix('/').unwrap_or(raw).to_string()
    }
}

/// Which subset of engine resources a listing covers.
///
/// Threaded explicitly through every listing call instead of living in a
/// process-wide toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListScope {
    /// Running containers and top-level images only.
    #[default]
    Active,
    /// Stopped containers and intermediate images too.
    All,
}

impl ListScope {
    /// Builds a scope from an "include everything" flag.
    #[must_use]
    pub const fn from_all(all: bool) -> Self {
        if all { Self::All } else { Self::Active }
    }

    /// Returns whether stopped containers and intermediate images are included.
    #[must_use]
    pub const fn includes_all(self) -> bool {
        matches!(self, Self::All)
    }
}
