//! In-memory container engine.
//!
//! Holds images and containers in process and applies the same refusal rules
//! as a real engine: an image with child images or containers cannot be
//! removed, and neither can a running container. Dry runs execute plans
//! against a copy of the live inventory; tests seed it directly.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use berth_common::error::{BerthError, Result};
use berth_common::launch::{BindMount, LaunchSpec};
use berth_common::types::{ContainerId, ContainerRecord, ImageId, ImageRecord};
use chrono::Utc;
use serde_json::{Value, json};

use super::{EngineClient, Inspection};

/// First PID handed out to started containers.
const FIRST_PID: u32 = 4000;

#[derive(Debug, Default)]
struct State {
    images: Vec<ImageRecord>,
    containers: Vec<ContainerRecord>,
    documents: HashMap<ContainerId, Value>,
    files: HashMap<(ImageId, String), Vec<u8>>,
    failures: HashSet<(&'static str, String)>,
    pulls: Vec<String>,
    next_serial: u32,
    prune: bool,
}

impl State {
    fn image_index(&self, id: &ImageId) -> Result<usize> {
        self.images
            .iter()
            .position(|i| i.id == *id)
            .ok_or_else(|| BerthError::NotFound {
                kind: "image",
                id: id.to_string(),
            })
    }

    fn container_index(&self, id: &ContainerId) -> Result<usize> {
        self.containers
            .iter()
            .position(|c| c.id == *id)
            .ok_or_else(|| BerthError::NotFound {
                kind: "container",
                id: id.to_string(),
            })
    }

    fn check_failure(&self, operation: &'static str, id: &str) -> Result<()> {
        if self.failures.contains(&(operation, id.to_string())) {
            return Err(BerthError::Engine {
                message: format!("{operation} rejected for {id}"),
            });
        }
        Ok(())
    }

    /// Finds an image by exact id, exact tag or tag without `:latest`.
    fn lookup_reference(&self, reference: &str) -> Option<&ImageRecord> {
        let latest = format!("{reference}:latest");
        self.images.iter().find(|i| {
            i.id.as_str() == reference || i.repo_tags.iter().any(|t| *t == reference || *t == latest)
        })
    }

    fn has_children(&self, id: &ImageId) -> bool {
        self.images.iter().any(|i| i.parent_id.as_ref() == Some(id))
    }

    /// Removes untagged ancestors of a removed image that nothing else holds.
    fn prune_parents(&mut self, mut parent: Option<ImageId>) {
        while let Some(id) = parent.take() {
            let Ok(idx) = self.image_index(&id) else {
                break;
            };
            let record = &self.images[idx];
            if !record.repo_tags.is_empty()
                || self.has_children(&id)
                || self.containers.iter().any(|c| c.image_id == id)
            {
                break;
            }
            let removed = self.images.remove(idx);
            tracing::debug!(id = %id.short(), "memory engine: untagged parent pruned");
            parent = removed.parent_id;
        }
    }

    fn serial(&mut self) -> u32 {
        self.next_serial += 1;
        self.next_serial
    }
}

/// Container engine backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine holding a copy of an engine inventory.
    #[must_use]
    pub fn from_snapshot(images: Vec<ImageRecord>, containers: Vec<ContainerRecord>) -> Self {
        Self {
            state: Mutex::new(State {
                images,
                containers,
                ..State::default()
            }),
        }
    }

    /// Sets the inspection document returned for a container.
    #[must_use]
    pub fn with_inspection(mut self, id: &ContainerId, document: Value) -> Self {
        if let Ok(state) = self.state.get_mut() {
            let _ = state.documents.insert(id.clone(), document);
        }
        self
    }

    /// Places a file at `path` inside every container created from `image`.
    #[must_use]
    pub fn with_file(mut self, image: &ImageId, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        if let Ok(state) = self.state.get_mut() {
            let _ = state
                .files
                .insert((image.clone(), path.to_string()), contents.into());
        }
        self
    }

    /// Prunes untagged parents on image removal, as the engine does by default.
    #[must_use]
    pub fn with_pruning(mut self) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.prune = true;
        }
        self
    }

    /// Makes `operation` (an [`EngineClient`] method name) fail for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn fail_on(&self, operation: &'static str, id: &str) -> Result<()> {
        let _ = self.lock()?.failures.insert((operation, id.to_string()));
        Ok(())
    }

    /// Returns the current images.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn images(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.lock()?.images.clone())
    }

    /// Returns the current containers.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn containers(&self) -> Result<Vec<ContainerRecord>> {
        Ok(self.lock()?.containers.clone())
    }

    /// Returns every reference pulled so far, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn pulls(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.pulls.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| BerthError::Engine {
            message: "in-memory engine lock poisoned".into(),
        })
    }
}

/// Builds an inspection document for a container that was never seeded with one.
fn synthesize_document(record: &ContainerRecord) -> Value {
    json!({
        "Id": record.id.as_str(),
        "Name": format!("/{}", record.name),
        "Image": record.image_id.as_str(),
        "Config": { "Image": record.image, "Hostname": record.id.short() },
        "State": {
            "Running": record.running,
            "Pid": record.pid.unwrap_or(0),
            "Status": if record.running { "running" } else { "exited" },
        },
        "HostConfig": {},
    })
}

/// Builds the inspection document a real engine reports after a create.
fn created_document(id: &ContainerId, image: &ImageId, spec: &LaunchSpec) -> Value {
    let port_bindings: serde_json::Map<String, Value> = spec
        .ports
        .iter()
        .map(|p| {
            let binding = json!([{
                "HostIp": p.host_ip.clone().unwrap_or_default(),
                "HostPort": p.host_port.map(|h| h.to_string()).unwrap_or_default(),
            }]);
            (p.port_key(), binding)
        })
        .collect();
    let binds: Vec<String> = spec.binds.iter().map(BindMount::to_bind_string).collect();

    json!({
        "Id": id.as_str(),
        "Name": format!("/{}", spec.name.clone().unwrap_or_default()),
        "Image": image.as_str(),
        "Config": {
            "Image": spec.image,
            "Cmd": spec.command,
            "Entrypoint": spec.entrypoint,
            "Env": spec.env,
            "Hostname": spec.hostname.clone().unwrap_or_else(|| id.short().to_string()),
            "Domainname": spec.domainname.clone().unwrap_or_default(),
            "User": spec.user.clone().unwrap_or_default(),
            "WorkingDir": spec.working_dir.clone().unwrap_or_default(),
            "Tty": spec.tty,
            "NetworkDisabled": spec.network_disabled,
        },
        "HostConfig": {
            "Binds": binds,
            "PortBindings": port_bindings,
            "Memory": spec.memory_bytes.unwrap_or(0),
            "MemorySwap": spec.memory_swap_bytes.unwrap_or(0),
            "CpuShares": spec.cpu_shares.unwrap_or(0),
            "CpusetCpus": spec.cpuset.clone().unwrap_or_default(),
            "Dns": spec.dns,
            "DnsSearch": spec.dns_search,
            "Links": spec.links,
            "Privileged": spec.privileged,
            "PublishAllPorts": spec.publish_all_ports,
            "NetworkMode": spec.network_mode.clone().unwrap_or_default(),
            "CapAdd": spec.cap_add,
            "CapDrop": spec.cap_drop,
            "VolumesFrom": spec.volumes_from,
        },
        "State": { "Running": false, "Pid": 0, "Status": "created" },
    })
}

/// Packs one file into a tar archive the way the engine's archive endpoint does.
fn archive_file(path: &str, contents: &[u8]) -> Result<Vec<u8>> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let archive_error = |e: std::io::Error| BerthError::Engine {
        message: format!("failed to archive {path}: {e}"),
    };
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, name, contents)
        .map_err(archive_error)?;
    builder.into_inner().map_err(archive_error)
}

impl EngineClient for MemoryEngine {
    fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    fn list_images(&self, include_intermediate: bool) -> Result<Vec<ImageRecord>> {
        let state = self.lock()?;
        Ok(state
            .images
            .iter()
            .filter(|i| include_intermediate || !i.repo_tags.is_empty() || !state.has_children(&i.id))
            .cloned()
            .collect())
    }

    fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>> {
        Ok(self
            .lock()?
            .containers
            .iter()
            .filter(|c| include_stopped || c.running)
            .cloned()
            .collect())
    }

    fn inspect_container(&self, id: &ContainerId) -> Result<Inspection> {
        let state = self.lock()?;
        let record = state.containers[state.container_index(id)?].clone();
        let mut document = state
            .documents
            .get(id)
            .cloned()
            .unwrap_or_else(|| synthesize_document(&record));
        if let Some(live) = document.get_mut("State").and_then(Value::as_object_mut) {
            let _ = live.insert("Running".into(), json!(record.running));
            let _ = live.insert("Pid".into(), json!(record.pid.unwrap_or(0)));
        }
        Ok(Inspection { record, document })
    }

    fn start_container(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock()?;
        state.check_failure("start_container", id.as_str())?;
        let idx = state.container_index(id)?;
        if !state.containers[idx].running {
            let pid = FIRST_PID + state.serial();
            let container = &mut state.containers[idx];
            container.running = true;
            container.pid = Some(pid);
            container.status = "Up Less than a second".into();
        }
        tracing::debug!(id = %id.short(), "memory engine: container started");
        Ok(())
    }

    fn stop_container(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock()?;
        state.check_failure("stop_container", id.as_str())?;
        let idx = state.container_index(id)?;
        let container = &mut state.containers[idx];
        container.running = false;
        container.pid = None;
        container.status = "Exited (0)".into();
        tracing::debug!(id = %id.short(), "memory engine: container stopped");
        Ok(())
    }

    fn remove_container(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock()?;
        state.check_failure("remove_container", id.as_str())?;
        let idx = state.container_index(id)?;
        if state.containers[idx].running {
            return Err(BerthError::Conflict {
                kind: "container",
                id: id.to_string(),
                message: "cannot remove a running container, stop it first".into(),
            });
        }
        let _ = state.containers.remove(idx);
        let _ = state.documents.remove(id);
        tracing::debug!(id = %id.short(), "memory engine: container removed");
        Ok(())
    }

    fn remove_image(&self, id: &ImageId) -> Result<()> {
        let mut state = self.lock()?;
        state.check_failure("remove_image", id.as_str())?;
        let idx = state.image_index(id)?;
        if state.has_children(id) {
            return Err(BerthError::Conflict {
                kind: "image",
                id: id.to_string(),
                message: "image has dependent child images".into(),
            });
        }
        if let Some(user) = state.containers.iter().find(|c| c.image_id == *id) {
            return Err(BerthError::Conflict {
                kind: "image",
                id: id.to_string(),
                message: format!("image is being used by container {}", user.id.short()),
            });
        }
        let removed = state.images.remove(idx);
        tracing::debug!(id = %id.short(), "memory engine: image removed");
        if state.prune {
            state.prune_parents(removed.parent_id);
        }
        Ok(())
    }

    fn pull_image(&self, reference: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.check_failure("pull_image", reference)?;
        state.pulls.push(reference.to_string());
        if state.lookup_reference(reference).is_none() {
            let tag = if reference.contains(':') {
                reference.to_string()
            } else {
                format!("{reference}:latest")
            };
            let serial = state.serial();
            let mut record = ImageRecord::new(format!("sha256:{serial:064x}"), None);
            record.repo_tags = vec![tag];
            record.created_at = Utc::now();
            state.images.push(record);
        }
        Ok(())
    }

    fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerId> {
        let mut state = self.lock()?;
        state.check_failure("create_container", &spec.image)?;
        let image_id = state
            .lookup_reference(&spec.image)
            .map(|i| i.id.clone())
            .ok_or_else(|| BerthError::NotFound {
                kind: "image",
                id: spec.image.clone(),
            })?;
        if let Some(name) = &spec.name {
            if state.containers.iter().any(|c| c.name == *name) {
                return Err(BerthError::Conflict {
                    kind: "container",
                    id: name.clone(),
                    message: "container name is already in use".into(),
                });
            }
        }

        let serial = state.serial();
        let id = ContainerId::new(format!("{serial:064x}"));
        let mut record = ContainerRecord::new(id.as_str(), image_id.as_str());
        record.image = spec.image.clone();
        record.name = spec.name.clone().unwrap_or_else(|| format!("ctr{serial}"));
        record.status = "Created".into();

        let mut document = created_document(&id, &image_id, spec);
        document["Name"] = json!(format!("/{}", record.name));
        let _ = state.documents.insert(id.clone(), document);
        state.containers.push(record);
        tracing::debug!(id = %id.short(), image = %spec.image, "memory engine: container created");
        Ok(id)
    }

    fn copy_from_container(&self, id: &ContainerId, path: &str) -> Result<Vec<u8>> {
        let state = self.lock()?;
        let image = state.containers[state.container_index(id)?].image_id.clone();
        let contents = state
            .files
            .get(&(image, path.to_string()))
            .ok_or_else(|| BerthError::NotFound {
                kind: "path",
                id: path.to_string(),
            })?;
        archive_file(path, contents)
    }
}
