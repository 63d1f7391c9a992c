//! Container engine access for berth.
//!
//! - [`client`]: the [`EngineClient`](client::EngineClient) trait with a Docker
//!   implementation and an in-memory one used for dry runs and tests.
//! - [`console`]: snapshot-based planning and execution of start, stop and
//!   cascading-delete operations with per-item outcomes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod client;
pub mod console;
pub mod outcome;
