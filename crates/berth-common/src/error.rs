//! Unified error types for the berth workspace.
//!
//! Library crates return [`BerthError`]; the CLI wraps it in `anyhow` at the
//! command layer.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BerthError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or user-supplied argument is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The container engine could not be reached.
    #[error("container engine unavailable: {message}")]
    EngineUnavailable {
        /// Description of the connection failure.
        message: String,
    },

    /// The engine refused an operation because the resource is still in use.
    #[error("{kind} {id} is in use: {message}")]
    Conflict {
        /// Type of the conflicting resource.
        kind: &'static str,
        /// Identifier of the conflicting resource.
        id: String,
        /// Message reported by the engine.
        message: String,
    },

    /// The engine rejected a request for any other reason.
    #[error("engine error: {message}")]
    Engine {
        /// Message reported by the engine.
        message: String,
    },

    /// An engine call did not complete within its deadline.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Engine operation that timed out.
        operation: &'static str,
        /// Deadline that was exceeded.
        seconds: u64,
    },

    /// Image ancestry loops back on itself.
    #[error("cyclic image ancestry detected at {id}")]
    CyclicGraph {
        /// Image that was reached twice.
        id: String,
    },

    /// An output file exists and overwriting was not requested.
    #[error("{path} already exists, pass --force to override")]
    AlreadyExists {
        /// Path of the existing file.
        path: PathBuf,
    },

    /// A metadata document does not have the expected shape.
    #[error("invalid metadata: {message}")]
    InvalidMetadata {
        /// Description of the problem.
        message: String,
    },

    /// A remote metadata file could not be downloaded.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Transport or HTTP status failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BerthError {
    /// Returns `true` for errors that mean a resource is still referenced.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` for errors that mean a resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BerthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_resource() {
        let err = BerthError::Conflict {
            kind: "image",
            id: "abc".into(),
            message: "image has dependent child images".into(),
        };
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "image abc is in use: image has dependent child images"
        );
    }

    #[test]
    fn timeout_message_includes_deadline() {
        let err = BerthError::Timeout {
            operation: "list_images",
            seconds: 10,
        };
        assert_eq!(err.to_string(), "list_images timed out after 10s");
    }

    #[test]
    fn not_found_is_not_conflict() {
        let err = BerthError::NotFound {
            kind: "container",
            id: "x".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }
}
