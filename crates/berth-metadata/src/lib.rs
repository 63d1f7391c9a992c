//! # berth-metadata
//!
//! Turns a running container into reusable files and back.
//!
//! - **Snapshot**: scrubbed inspection document plus user parameters.
//! - **Launch**: typed [`LaunchSpec`](berth_common::launch::LaunchSpec) parsed
//!   from a snapshot, and its `docker run` argument form.
//! - **Artifacts**: pod manifest and systemd unit derived from a launch spec.
//! - **Store**: template directories, write policy and listing.
//! - **Fetch** / **Install**: metadata from a URL or from inside an image.
//! - **Export**: the end-to-end create and run-from-file flows.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod artifacts;
pub mod export;
pub mod fetch;
pub mod install;
pub mod launch;
pub mod naming;
pub mod snapshot;
pub mod store;

pub use snapshot::{Snapshot, UserParams};
pub use store::MetadataStore;
