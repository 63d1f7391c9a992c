//! # berth-graph
//!
//! Image dependency resolution for cascading deletes.
//!
//! - **Graph**: the parent/child image forest built from one engine snapshot,
//!   with child lookup and cycle-guarded descendant discovery.
//! - **Plan**: the ordered set of images to delete (descendants first) and the
//!   containers that must be stopped and removed before any image goes.
//!
//! Everything here is pure: it reads the snapshot it is given and never talks
//! to the engine.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod graph;
pub mod plan;

pub use graph::ImageGraph;
pub use plan::{DeletionPlan, find_referencing_containers, plan_deletion};
