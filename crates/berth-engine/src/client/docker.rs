//! Docker Engine API client built on `bollard`.
//!
//! `bollard` is async; this client owns a small `tokio` runtime and blocks on
//! each request so the rest of berth stays synchronous. Every request runs
//! under the configured deadline.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use berth_common::config::EngineConfig;
use berth_common::error::{BerthError, Result};
use berth_common::launch::{BindMount, LaunchSpec};
use berth_common::types::{ContainerId, ContainerRecord, ImageId, ImageRecord};
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{ContainerInspectResponse, HostConfig, PortBinding, RestartPolicy};
use chrono::DateTime;
use futures_util::StreamExt;

use super::{EngineClient, Inspection};

/// Client for a Docker-compatible engine on a local socket.
pub struct DockerEngine {
    docker: Docker,
    runtime: tokio::runtime::Runtime,
    timeout: Duration,
    stop_timeout: Duration,
    transfer_timeout: Duration,
    stop_grace_secs: i64,
}

impl std::fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerEngine")
            .field("timeout", &self.timeout)
            .field("stop_timeout", &self.stop_timeout)
            .field("transfer_timeout", &self.transfer_timeout)
            .field("stop_grace_secs", &self.stop_grace_secs)
            .finish_non_exhaustive()
    }
}

impl DockerEngine {
    /// Creates a client for the configured socket, or the local default.
    ///
    /// Does not contact the engine; see [`super::connect`].
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot start or the socket address is
    /// invalid.
    pub fn connect(config: &EngineConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| BerthError::EngineUnavailable {
                message: format!("failed to start I/O runtime: {e}"),
            })?;

        // Deadlines are enforced per call in `block`; the client's own
        // timeout must not cut the longest of them short.
        let client_timeout = config.longest_timeout();
        let docker = {
            let _guard = runtime.enter();
            match &config.socket {
                Some(socket) => Docker::connect_with_unix(
                    socket,
                    client_timeout.as_secs(),
                    bollard::API_DEFAULT_VERSION,
                ),
                None => Docker::connect_with_local_defaults(),
            }
        }
        .map_err(|e| BerthError::EngineUnavailable {
            message: e.to_string(),
        })?
        .with_timeout(client_timeout);

        Ok(Self {
            docker,
            runtime,
            timeout: config.call_timeout(),
            stop_timeout: config.stop_timeout(),
            transfer_timeout: config.transfer_timeout(),
            stop_grace_secs: config.stop_grace_secs,
        })
    }

    /// Runs one engine request to completion under the call deadline.
    fn block<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = std::result::Result<T, DockerError>>,
    ) -> Result<std::result::Result<T, DockerError>> {
        self.block_within(operation, self.timeout, request)
    }

    /// Runs one engine request to completion under `deadline`.
    fn block_within<T>(
        &self,
        operation: &'static str,
        deadline: Duration,
        request: impl Future<Output = std::result::Result<T, DockerError>>,
    ) -> Result<std::result::Result<T, DockerError>> {
        tracing::trace!(operation, deadline_secs = deadline.as_secs(), "engine request");
        self.runtime
            .block_on(async { tokio::time::timeout(deadline, request).await })
            .map_err(|_| BerthError::Timeout {
                operation,
                seconds: deadline.as_secs(),
            })
    }

    fn container_record(response: &ContainerInspectResponse) -> ContainerRecord {
        let state = response.state.as_ref();
        let running = state.and_then(|s| s.running).unwrap_or(false);
        let pid = state
            .and_then(|s| s.pid)
            .filter(|&p| running && p > 0)
            .and_then(|p| u32::try_from(p).ok());
        let status = state
            .and_then(|s| s.status.as_ref())
            .map(ToString::to_string)
            .unwrap_or_default();

        ContainerRecord {
            id: ContainerId::new(response.id.clone().unwrap_or_default()),
            image_id: ImageId::new(response.image.clone().unwrap_or_default()),
            image: response
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            name: ContainerRecord::normalize_name(response.name.as_deref().unwrap_or_default()),
            running,
            pid,
            status,
        }
    }

    fn inspect_raw(&self, id: &ContainerId) -> Result<ContainerInspectResponse> {
        self.block(
            "inspect_container",
            self.docker
                .inspect_container(id.as_str(), None::<InspectContainerOptions>),
        )?
        .map_err(|e| map_error(e, "container", id.as_str()))
    }
}

/// Maps a Docker API error onto the workspace error taxonomy.
fn map_error(err: DockerError, kind: &'static str, id: &str) -> BerthError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => BerthError::NotFound {
            kind,
            id: id.to_string(),
        },
        DockerError::DockerResponseServerError {
            status_code: 409,
            message,
        } => BerthError::Conflict {
            kind,
            id: id.to_string(),
            message,
        },
        DockerError::DockerResponseServerError { message, .. } => BerthError::Engine { message },
        err @ (DockerError::SocketNotFoundError(_)
        | DockerError::IOError { .. }
        | DockerError::HyperResponseError { .. }) => BerthError::EngineUnavailable {
            message: err.to_string(),
        },
        other => BerthError::Engine {
            message: other.to_string(),
        },
    }
}

fn non_empty<T>(values: &[T]) -> Option<Vec<T>>
where
    T: Clone,
{
    (!values.is_empty()).then(|| values.to_vec())
}

/// Translates a launch spec into the engine's create-container body.
fn create_body(spec: &LaunchSpec) -> Config<String> {
    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for port in &spec.ports {
        let key = port.port_key();
        let _ = exposed_ports.insert(key.clone(), HashMap::new());
        if port.host_port.is_some() || port.host_ip.is_some() {
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: port.host_ip.clone(),
                    host_port: port.host_port.map(|p| p.to_string()),
                });
        }
    }

    let volumes: HashMap<String, HashMap<(), ()>> = spec
        .volumes
        .iter()
        .map(|v| (v.clone(), HashMap::new()))
        .collect();
    let binds: Vec<String> = spec.binds.iter().map(BindMount::to_bind_string).collect();
    let restart_policy = spec.restart_policy.as_deref().and_then(|name| {
        serde_json::from_value::<RestartPolicy>(serde_json::json!({ "Name": name })).ok()
    });

    let host_config = HostConfig {
        binds: non_empty(&binds),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        memory: spec.memory_bytes,
        memory_swap: spec.memory_swap_bytes,
        cpu_shares: spec.cpu_shares,
        cpuset_cpus: spec.cpuset.clone(),
        dns: non_empty(&spec.dns),
        dns_search: non_empty(&spec.dns_search),
        links: non_empty(&spec.links),
        privileged: Some(spec.privileged),
        publish_all_ports: Some(spec.publish_all_ports),
        network_mode: spec.network_mode.clone(),
        restart_policy,
        cap_add: non_empty(&spec.cap_add),
        cap_drop: non_empty(&spec.cap_drop),
        volumes_from: non_empty(&spec.volumes_from),
        ..HostConfig::default()
    };

    let attached = |stream: &str| Some(spec.attach.iter().any(|a| a == stream));
    Config {
        image: Some(spec.image.clone()),
        cmd: non_empty(&spec.command),
        entrypoint: non_empty(&spec.entrypoint),
        hostname: spec.hostname.clone(),
        domainname: spec.domainname.clone(),
        user: spec.user.clone(),
        working_dir: spec.working_dir.clone(),
        env: non_empty(&spec.env),
        tty: Some(spec.tty),
        attach_stdin: attached("stdin"),
        attach_stdout: attached("stdout"),
        attach_stderr: attached("stderr"),
        network_disabled: Some(spec.network_disabled),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        volumes: (!volumes.is_empty()).then_some(volumes),
        host_config: Some(host_config),
        ..Config::default()
    }
}

impl EngineClient for DockerEngine {
    fn ping(&self) -> Result<()> {
        self.block("ping", self.docker.ping())?
            .map(|_| ())
            .map_err(|e| BerthError::EngineUnavailable {
                message: e.to_string(),
            })
    }

    fn list_images(&self, include_intermediate: bool) -> Result<Vec<ImageRecord>> {
        let options = ListImagesOptions::<String> {
            all: include_intermediate,
            ..Default::default()
        };
        let summaries = self
            .block("list_images", self.docker.list_images(Some(options)))?
            .map_err(|e| map_error(e, "image", "*"))?;

        Ok(summaries
            .into_iter()
            .map(|s| ImageRecord {
                id: ImageId::new(s.id),
                parent_id: ImageId::from_optional(Some(s.parent_id.as_str())),
                repo_tags: s.repo_tags,
                created_at: DateTime::from_timestamp(s.created, 0).unwrap_or_default(),
                virtual_size: u64::try_from(s.size).unwrap_or(0),
            })
            .collect())
    }

    fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let summaries = self
            .block("list_containers", self.docker.list_containers(Some(options)))?
            .map_err(|e| map_error(e, "container", "*"))?;

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let id = ContainerId::new(summary.id.unwrap_or_default());
            let running = summary.state.as_deref() == Some("running");
            let pid = if running {
                let inspected = self.inspect_raw(&id)?;
                Self::container_record(&inspected).pid
            } else {
                None
            };
            records.push(ContainerRecord {
                id,
                image_id: ImageId::new(summary.image_id.unwrap_or_default()),
                image: summary.image.unwrap_or_default(),
                name: summary
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| ContainerRecord::normalize_name(&n))
                    .unwrap_or_default(),
                running,
                pid,
                status: summary.status.unwrap_or_default(),
            });
        }
        Ok(records)
    }

    fn inspect_container(&self, id: &ContainerId) -> Result<Inspection> {
        let response = self.inspect_raw(id)?;
        let record = Self::container_record(&response);
        let document = serde_json::to_value(&response)?;
        Ok(Inspection { record, document })
    }

    fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.block(
            "start_container",
            self.docker
                .start_container(id.as_str(), None::<StartContainerOptions<String>>),
        )?
        .map_err(|e| map_error(e, "container", id.as_str()))?;
        tracing::info!(id = %id.short(), "container started");
        Ok(())
    }

    fn stop_container(&self, id: &ContainerId) -> Result<()> {
        let options = StopContainerOptions {
            t: self.stop_grace_secs,
        };
        self.block_within(
            "stop_container",
            self.stop_timeout,
            self.docker.stop_container(id.as_str(), Some(options)),
        )?
        .map_err(|e| map_error(e, "container", id.as_str()))?;
        tracing::info!(id = %id.short(), "container stopped");
        Ok(())
    }

    fn remove_container(&self, id: &ContainerId) -> Result<()> {
        let options = RemoveContainerOptions {
            v: false,
            force: false,
            link: false,
        };
        self.block(
            "remove_container",
            self.docker.remove_container(id.as_str(), Some(options)),
        )?
        .map_err(|e| map_error(e, "container", id.as_str()))?;
        tracing::info!(id = %id.short(), "container removed");
        Ok(())
    }

    fn remove_image(&self, id: &ImageId) -> Result<()> {
        // Untagged parents are removed by their own plan step.
        let options = RemoveImageOptions {
            force: false,
            noprune: true,
        };
        let deleted = self
            .block(
                "remove_image",
                self.docker.remove_image(id.as_str(), Some(options), None),
            )?
            .map_err(|e| map_error(e, "image", id.as_str()))?;
        for item in deleted {
            if let Some(tag) = item.untagged {
                tracing::debug!(%tag, "untagged");
            }
            if let Some(layer) = item.deleted {
                tracing::debug!(%layer, "deleted");
            }
        }
        tracing::info!(id = %id.short(), "image removed");
        Ok(())
    }

    fn pull_image(&self, reference: &str) -> Result<()> {
        let options = CreateImageOptions::<String> {
            from_image: reference.to_string(),
            ..Default::default()
        };
        let pull = async {
            let mut progress = self.docker.create_image(Some(options), None, None);
            while let Some(item) = progress.next().await {
                if let Some(status) = item?.status {
                    tracing::info!(image = reference, %status, "pull");
                }
            }
            Ok::<(), DockerError>(())
        };
        self.block_within("pull_image", self.transfer_timeout, pull)?
            .map_err(|e| map_error(e, "image", reference))
    }

    fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerId> {
        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });
        let response = self
            .block(
                "create_container",
                self.docker.create_container(options, create_body(spec)),
            )?
            .map_err(|e| map_error(e, "image", &spec.image))?;
        for warning in &response.warnings {
            tracing::warn!(%warning, "engine warning on create");
        }
        tracing::info!(id = %response.id, image = %spec.image, "container created");
        Ok(ContainerId::new(response.id))
    }

    fn copy_from_container(&self, id: &ContainerId, path: &str) -> Result<Vec<u8>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let download = async {
            let mut archive = Vec::new();
            let mut chunks = self.docker.download_from_container(id.as_str(), Some(options));
            while let Some(chunk) = chunks.next().await {
                archive.extend_from_slice(&chunk?);
            }
            Ok::<Vec<u8>, DockerError>(archive)
        };
        self.block_within("copy_from_container", self.transfer_timeout, download)?
            .map_err(|e| map_error(e, "path", path))
    }
}

#[cfg(test)]
mod tests {
    use berth_common::launch::PortMapping;

    use super::*;

    #[test]
    fn server_404_maps_to_not_found() {
        let err = map_error(
            DockerError::DockerResponseServerError {
                status_code: 404,
                message: "No such image".into(),
            },
            "image",
            "abc",
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn server_409_maps_to_conflict() {
        let err = map_error(
            DockerError::DockerResponseServerError {
                status_code: 409,
                message: "image has dependent child images".into(),
            },
            "image",
            "abc",
        );
        assert!(err.is_conflict());
        assert!(err.to_string().contains("dependent child images"));
    }

    #[test]
    fn other_server_errors_keep_message() {
        let err = map_error(
            DockerError::DockerResponseServerError {
                status_code: 500,
                message: "boom".into(),
            },
            "container",
            "x",
        );
        assert!(matches!(err, BerthError::Engine { ref message } if message == "boom"));
    }

    #[test]
    fn create_body_groups_port_bindings() {
        let spec = LaunchSpec {
            image: "nginx".into(),
            command: vec!["nginx".into(), "-g".into(), "daemon off;".into()],
            ports: vec![
                PortMapping {
                    container_port: 80,
                    protocol: "tcp".into(),
                    host_ip: None,
                    host_port: Some(8080),
                },
                PortMapping {
                    container_port: 80,
                    protocol: "tcp".into(),
                    host_ip: Some("127.0.0.1".into()),
                    host_port: Some(8081),
                },
            ],
            binds: vec![BindMount {
                host_path: "/srv".into(),
                container_path: "/usr/share/nginx/html".into(),
                read_only: true,
            }],
            restart_policy: Some("always".into()),
            ..LaunchSpec::default()
        };
        let body = create_body(&spec);
        assert_eq!(body.image.as_deref(), Some("nginx"));
        assert_eq!(body.cmd.as_ref().map(Vec::len), Some(3));
        assert!(body.exposed_ports.expect("exposed").contains_key("80/tcp"));

        let host = body.host_config.expect("host config");
        let bindings = host.port_bindings.expect("bindings");
        let web = bindings["80/tcp"].as_ref().expect("80/tcp");
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].host_port.as_deref(), Some("8080"));
        assert_eq!(
            host.binds,
            Some(vec!["/srv:/usr/share/nginx/html:ro".to_string()])
        );
        assert!(host.restart_policy.is_some());
    }

    #[test]
    fn create_body_omits_empty_lists() {
        let body = create_body(&LaunchSpec {
            image: "busybox".into(),
            ..LaunchSpec::default()
        });
        assert!(body.cmd.is_none());
        assert!(body.env.is_none());
        assert!(body.exposed_ports.is_none());
        assert!(body.host_config.expect("host").dns.is_none());
    }
}
