//! Cascading-delete planning.
//!
//! A [`DeletionPlan`] lists the images to remove, descendants before their
//! ancestors, and the containers that pin any of them. Planning is pure;
//! executing the plan is the engine layer's job.

use std::collections::HashSet;

use berth_common::error::{BerthError, Result};
use berth_common::types::{ContainerRecord, ImageId};
use serde::Serialize;

use crate::graph::ImageGraph;

/// Images and blocking containers to remove for one target image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    /// Image the user asked to delete.
    pub target: ImageId,
    /// Images in deletion order: every image precedes its parent, the target
    /// comes last.
    pub images: Vec<ImageId>,
    /// Containers built from any planned image, in inventory order.
    pub containers: Vec<ContainerRecord>,
}

impl DeletionPlan {
    /// Returns whether containers must be removed before the images.
    #[must_use]
    pub fn requires_container_removal(&self) -> bool {
        !self.containers.is_empty()
    }

    /// Returns the blocking containers that are currently running.
    pub fn running_containers(&self) -> impl Iterator<Item = &ContainerRecord> {
        self.containers.iter().filter(|c| c.running)
    }

    /// Returns the images in discovery order, target first.
    #[must_use]
    pub fn discovery_order(&self) -> Vec<ImageId> {
        self.images.iter().rev().cloned().collect()
    }

    /// Returns whether `id` is scheduled for deletion.
    #[must_use]
    pub fn contains_image(&self, id: &ImageId) -> bool {
        self.images.contains(id)
    }
}

/// Returns every container whose image is one of `image_ids`.
///
/// Unknown ids simply match nothing.
#[must_use]
pub fn find_referencing_containers(
    image_ids: &[ImageId],
    containers: &[ContainerRecord],
) -> Vec<ContainerRecord> {
    let wanted: HashSet<&ImageId> = image_ids.iter().collect();
    containers
        .iter()
        .filter(|c| wanted.contains(&c.image_id))
        .cloned()
        .collect()
}

/// Plans the removal of `target` together with all images derived from it.
///
/// # Errors
///
/// Returns [`BerthError::NotFound`] if `target` is not in the graph and
/// [`BerthError::CyclicGraph`] if its descendants loop.
pub fn plan_deletion(
    target: &ImageId,
    graph: &ImageGraph,
    containers: &[ContainerRecord],
) -> Result<DeletionPlan> {
    if graph.get(target).is_none() {
        return Err(BerthError::NotFound {
            kind: "image",
            id: target.to_string(),
        });
    }

    let descendants = graph.crawl(target)?;
    let mut images = Vec::with_capacity(descendants.len() + 1);
    images.push(target.clone());
    images.extend(descendants);
    images.reverse();

    let containers = find_referencing_containers(&images, containers);
    tracing::debug!(
        image = %target,
        images = images.len(),
        containers = containers.len(),
        "deletion plan resolved"
    );

    Ok(DeletionPlan {
        target: target.clone(),
        images,
        containers,
    })
}
