//! Console service: what the CLI asks of the engine.
//!
//! Reads a fresh snapshot for every request, resolves user-supplied id
//! prefixes, plans cascading deletes with `berth-graph` and executes plans
//! step by step. Start and stop fan out one worker thread per container and
//! join all of them before returning.

use std::sync::Arc;

use berth_common::constants::MIN_ID_PREFIX_LEN;
use berth_common::error::{BerthError, Result};
use berth_common::types::{ContainerId, ContainerRecord, ImageId, ImageRecord, ListScope};
use berth_graph::{DeletionPlan, ImageGraph};

use crate::client::memory::MemoryEngine;
use crate::client::{EngineClient, Inspection};
use crate::outcome::{ExecutionReport, StepAction, StepOutcome};

/// Engine operation run by a fan-out worker.
type ContainerOp = fn(&dyn EngineClient, &ContainerId) -> Result<()>;

/// High-level operations over one container engine.
#[derive(Clone)]
pub struct Console {
    engine: Arc<dyn EngineClient>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

fn label(container: &ContainerRecord) -> String {
    if container.name.is_empty() {
        container.id.short().to_string()
    } else {
        container.name.clone()
    }
}

fn check_prefix(kind: &'static str, prefix: &str) -> Result<()> {
    if prefix.len() < MIN_ID_PREFIX_LEN {
        return Err(BerthError::Config {
            message: format!(
                "{kind} reference '{prefix}' is too short, use at least {MIN_ID_PREFIX_LEN} characters"
            ),
        });
    }
    Ok(())
}

fn ambiguous(kind: &'static str, prefix: &str, count: usize) -> BerthError {
    BerthError::Config {
        message: format!("{kind} reference '{prefix}' is ambiguous ({count} matches)"),
    }
}

impl Console {
    /// Creates a console over `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self { engine }
    }

    /// Returns the underlying engine client.
    #[must_use]
    pub fn engine(&self) -> &dyn EngineClient {
        self.engine.as_ref()
    }

    /// Lists images in `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list images.
    pub fn images(&self, scope: ListScope) -> Result<Vec<ImageRecord>> {
        self.engine.list_images(scope.includes_all())
    }

    /// Lists containers in `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list containers.
    pub fn containers(&self, scope: ListScope) -> Result<Vec<ContainerRecord>> {
        self.engine.list_containers(scope.includes_all())
    }

    /// Reads the full image graph and every container, stopped ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if either listing fails.
    pub fn snapshot(&self) -> Result<(ImageGraph, Vec<ContainerRecord>)> {
        let graph = ImageGraph::from_records(self.engine.list_images(true)?);
        let containers = self.engine.list_containers(true)?;
        tracing::debug!(
            images = graph.len(),
            containers = containers.len(),
            "engine snapshot"
        );
        Ok((graph, containers))
    }

    /// Resolves an image reference to a full id.
    ///
    /// An exact repo tag always resolves. Otherwise the reference is an id
    /// prefix of at least three characters that must match exactly one image.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches and `Config` when the prefix is
    /// too short or ambiguous.
    pub fn resolve_image(&self, reference: &str) -> Result<ImageId> {
        let graph = ImageGraph::from_records(self.engine.list_images(true)?);
        Self::resolve_in(&graph, reference)
    }

    fn resolve_in(graph: &ImageGraph, reference: &str) -> Result<ImageId> {
        let latest = format!("{reference}:latest");
        if let Some(tagged) = graph
            .records()
            .find(|r| r.repo_tags.iter().any(|t| *t == reference || *t == latest))
        {
            return Ok(tagged.id.clone());
        }
        check_prefix("image", reference)?;
        match graph.find_by_prefix(reference).as_slice() {
            [] => Err(BerthError::NotFound {
                kind: "image",
                id: reference.to_string(),
            }),
            [only] => Ok(only.id.clone()),
            many => Err(ambiguous("image", reference, many.len())),
        }
    }

    /// Resolves a container name or id prefix, stopped containers included.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches and `Config` when the prefix is
    /// too short or ambiguous.
    pub fn resolve_container(&self, reference: &str) -> Result<ContainerRecord> {
        let containers = self.engine.list_containers(true)?;
        if let Some(named) = containers.iter().find(|c| c.name == reference) {
            return Ok(named.clone());
        }
        check_prefix("container", reference)?;
        let mut matches: Vec<ContainerRecord> = containers
            .into_iter()
            .filter(|c| c.id.matches_prefix(reference))
            .collect();
        match matches.len() {
            0 => Err(BerthError::NotFound {
                kind: "container",
                id: reference.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            n => Err(ambiguous("container", reference, n)),
        }
    }

    /// Returns whether any image has a repo tag starting with `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list images.
    pub fn image_exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self
            .engine
            .list_images(true)?
            .iter()
            .any(|i| i.has_tag_prefix(name)))
    }

    /// Plans the cascading delete of the image `reference` names.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be listed, the reference does not
    /// resolve, or the ancestry loops.
    pub fn plan_deletion(&self, reference: &str) -> Result<DeletionPlan> {
        let (graph, containers) = self.snapshot()?;
        if !graph.is_acyclic() {
            tracing::warn!("image ancestry contains a loop");
        }
        let target = Self::resolve_in(&graph, reference)?;
        berth_graph::plan_deletion(&target, &graph, &containers)
    }

    /// Executes a deletion plan.
    ///
    /// Running blocking containers are stopped concurrently, blocking
    /// containers are removed, then images are removed in plan order. If any
    /// container step failed, every image step is skipped.
    #[must_use]
    pub fn execute_plan(&self, plan: &DeletionPlan) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        let running: Vec<&ContainerRecord> = plan.running_containers().collect();
        let stops = self.fan_out(StepAction::StopContainer, &running, |engine, id| {
            engine.stop_container(id)
        });
        let failed_stops: Vec<&str> = stops
            .iter()
            .filter(|s| s.is_failure())
            .map(|s| s.target.as_str())
            .collect();

        let mut removals = Vec::with_capacity(plan.containers.len());
        for container in &plan.containers {
            let outcome = if failed_stops.contains(&container.id.as_str()) {
                StepOutcome::skipped(
                    StepAction::RemoveContainer,
                    container.id.as_str(),
                    label(container),
                    "container could not be stopped",
                )
            } else {
                StepOutcome::from_result(
                    StepAction::RemoveContainer,
                    container.id.as_str(),
                    label(container),
                    self.engine.remove_container(&container.id),
                )
            };
            removals.push(outcome);
        }
        report.extend(stops);
        report.extend(removals);

        let blocked = !report.succeeded();
        for image in &plan.images {
            let outcome = if blocked {
                StepOutcome::skipped(
                    StepAction::RemoveImage,
                    image.as_str(),
                    image.short(),
                    "blocking containers were not removed",
                )
            } else {
                match self.engine.remove_image(image) {
                    // The engine may already have pruned an untagged parent.
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(id = %image.short(), "image already removed");
                        StepOutcome::skipped(
                            StepAction::RemoveImage,
                            image.as_str(),
                            image.short(),
                            "already removed",
                        )
                    }
                    result => {
                        if let Err(e) = &result {
                            tracing::warn!(id = %image.short(), error = %e, "image removal failed");
                        }
                        StepOutcome::from_result(
                            StepAction::RemoveImage,
                            image.as_str(),
                            image.short(),
                            result,
                        )
                    }
                }
            };
            report.steps.push(outcome);
        }

        tracing::info!(
            image = %plan.target.short(),
            steps = report.steps.len(),
            failures = report.failures().count(),
            "deletion plan executed"
        );
        report
    }

    /// Starts every listed container that is not already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list containers.
    pub fn start_all(&self, ids: &[ContainerId]) -> Result<ExecutionReport> {
        self.lifecycle_fan_out(ids, StepAction::StartContainer, |engine, id| {
            engine.start_container(id)
        })
    }

    /// Stops every listed container that is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot list containers.
    pub fn stop_all(&self, ids: &[ContainerId]) -> Result<ExecutionReport> {
        self.lifecycle_fan_out(ids, StepAction::StopContainer, |engine, id| {
            engine.stop_container(id)
        })
    }

    /// Removes containers one after another.
    #[must_use]
    pub fn remove_containers(&self, ids: &[ContainerId]) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        report.extend(ids.iter().map(|id| {
            StepOutcome::from_result(
                StepAction::RemoveContainer,
                id.as_str(),
                id.short(),
                self.engine.remove_container(id),
            )
        }));
        report
    }

    /// Returns the full inspection of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist.
    pub fn inspect(&self, id: &ContainerId) -> Result<Inspection> {
        self.engine.inspect_container(id)
    }

    /// Returns the host PID of a running container.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the container is not running.
    pub fn pid_of(&self, id: &ContainerId) -> Result<u32> {
        let inspection = self.inspect(id)?;
        inspection
            .record
            .pid
            .filter(|_| inspection.record.running)
            .ok_or_else(|| BerthError::Config {
                message: format!("container {} is not running", id.short()),
            })
    }

    /// Returns a console over an in-memory copy of the current inventory.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    pub fn dry_run(&self) -> Result<Self> {
        let (graph, containers) = self.snapshot()?;
        let copy = MemoryEngine::from_snapshot(graph.records().cloned().collect(), containers);
        Ok(Self::new(Arc::new(copy)))
    }

    fn lifecycle_fan_out(
        &self,
        ids: &[ContainerId],
        action: StepAction,
        op: ContainerOp,
    ) -> Result<ExecutionReport> {
        let inventory = self.engine.list_containers(true)?;
        let wants_running = action == StepAction::StopContainer;

        let mut report = ExecutionReport::default();
        let mut targets = Vec::new();
        for id in ids {
            match inventory.iter().find(|c| c.id == *id) {
                None => report.steps.push(StepOutcome::from_result(
                    action,
                    id.as_str(),
                    id.short(),
                    Err(BerthError::NotFound {
                        kind: "container",
                        id: id.to_string(),
                    }),
                )),
                Some(c) if c.running != wants_running => {
                    let reason = if c.running { "already running" } else { "not running" };
                    report
                        .steps
                        .push(StepOutcome::skipped(action, c.id.as_str(), label(c), reason));
                }
                Some(c) => targets.push(c),
            }
        }
        report.extend(self.fan_out(action, &targets, op));
        Ok(report)
    }

    /// Runs `op` for every container on its own thread and waits for all.
    fn fan_out(
        &self,
        action: StepAction,
        containers: &[&ContainerRecord],
        op: ContainerOp,
    ) -> Vec<StepOutcome> {
        let engine = self.engine.as_ref();
        std::thread::scope(|scope| {
            let workers: Vec<_> = containers
                .iter()
                .map(|&container| {
                    let worker = scope.spawn(move || op(engine, &container.id));
                    (container, worker)
                })
                .collect();

            workers
                .into_iter()
                .map(|(container, worker)| {
                    let result = worker.join().unwrap_or_else(|_| {
                        Err(BerthError::Engine {
                            message: format!("{action} worker panicked"),
                        })
                    });
                    match &result {
                        Ok(()) => tracing::info!(id = %container.id.short(), %action, "done"),
                        Err(e) => {
                            tracing::warn!(id = %container.id.short(), %action, error = %e, "failed");
                        }
                    }
                    StepOutcome::from_result(action, container.id.as_str(), label(container), result)
                })
                .collect()
        })
    }
}
