//! End-to-end metadata flows.
//!
//! [`export_container`] writes the snapshot, pod manifest and service unit for
//! an existing container. [`run_snapshot`] recreates a container from a
//! snapshot file and exports fresh artifacts for it.

use std::path::{Path, PathBuf};

use berth_common::config::ManifestFormat;
use berth_common::error::{BerthError, Result};
use berth_common::types::ContainerId;
use berth_engine::console::Console;

use crate::artifacts::{manifest_extension, pod_manifest, render_manifest, service_unit};
use crate::launch;
use crate::naming::{ArtifactNames, output_name};
use crate::snapshot::Snapshot;
use crate::store::write_file;

/// Output options for [`export_container`].
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions<'a> {
    /// Snapshot file name instead of the derived one.
    pub outfile: Option<&'a str>,
    /// Directory to write into.
    pub directory: &'a Path,
    /// Overwrite existing files.
    pub force: bool,
    /// Pod manifest format.
    pub format: ManifestFormat,
}

/// Snapshots `id` and writes its three artifacts.
///
/// Returns the written paths: snapshot, pod manifest, unit. A container
/// without a name gets no unit file.
///
/// # Errors
///
/// Returns an error if the container cannot be inspected, an existing file
/// would be overwritten without `force`, or a write fails.
pub fn export_container(
    console: &Console,
    id: &ContainerId,
    options: &ExportOptions<'_>,
) -> Result<Vec<PathBuf>> {
    let inspection = console.inspect(id)?;
    let snapshot = Snapshot::from_inspection(inspection.document);
    let file_name = output_name(
        options.outfile,
        snapshot.container_name().unwrap_or_default(),
        id.short(),
    );
    let names = ArtifactNames::from_snapshot(&file_name, manifest_extension(options.format));
    let spec = launch::from_inspection(&snapshot.inspection)?;

    let snapshot_path = options.directory.join(&names.snapshot);
    let pod_path = options.directory.join(&names.pod);
    let unit_path = options.directory.join(&names.unit);
    if !options.force {
        for path in [&snapshot_path, &pod_path, &unit_path] {
            if path.exists() {
                return Err(BerthError::AlreadyExists { path: path.clone() });
            }
        }
    }

    let document = serde_json::to_string_pretty(&snapshot.to_document()?)?;
    write_file(&snapshot_path, document.as_bytes(), options.force)?;
    let manifest = render_manifest(&pod_manifest(&spec), options.format)?;
    write_file(&pod_path, manifest.as_bytes(), options.force)?;
    let mut written = vec![snapshot_path, pod_path];

    match service_unit(&spec) {
        Ok(unit) => {
            write_file(&unit_path, unit.as_bytes(), options.force)?;
            written.push(unit_path);
        }
        Err(e) => tracing::warn!(id = %id.short(), error = %e, "skipping service unit"),
    }
    Ok(written)
}

/// Result of recreating a container from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The new container.
    pub id: ContainerId,
    /// Whether the image had to be pulled first.
    pub pulled: bool,
    /// Artifacts written for the new container.
    pub artifacts: Vec<PathBuf>,
}

/// Creates and starts a container from the snapshot at `path`.
///
/// The image is pulled when no repo tag starts with its name. Fresh artifacts
/// for the new container are written to `directory`, overwriting.
///
/// # Errors
///
/// Returns an error if the snapshot is invalid or any engine step fails.
pub fn run_snapshot(
    console: &Console,
    path: &Path,
    directory: &Path,
    format: ManifestFormat,
) -> Result<RunOutcome> {
    let snapshot = Snapshot::load(path)?;
    let spec = launch::from_inspection(&snapshot.inspection)?;
    let engine = console.engine();

    let pulled = !console.image_exists_by_name(&spec.image)?;
    if pulled {
        tracing::info!(image = %spec.image, "image not present, pulling");
        engine.pull_image(&spec.image)?;
    }
    let id = engine.create_container(&spec)?;
    tracing::info!(id = %id.short(), "created container");
    engine.start_container(&id)?;

    let options = ExportOptions {
        outfile: None,
        directory,
        force: true,
        format,
    };
    let artifacts = export_container(console, &id, &options)?;
    Ok(RunOutcome {
        id,
        pulled,
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use berth_common::types::{ContainerRecord, ImageRecord};
    use berth_engine::client::EngineClient;
    use berth_engine::client::memory::MemoryEngine;
    use serde_json::{Value, json};

    use super::*;

    fn inspection(name: &str) -> Value {
        json!({
            "Id": "f00dfeed0000",
            "Name": format!("/{name}"),
            "Image": "sha256:1234",
            "HostsPath": "/var/lib/docker/containers/f00d/hosts",
            "Config": {
                "Image": "nginx",
                "Hostname": "f00dfeed0000",
                "Cmd": ["nginx"],
                "Env": ["MODE=prod"]
            },
            "HostConfig": {
                "PortBindings": { "80/tcp": [{ "HostIp": "", "HostPort": "8080" }] }
            },
            "State": { "Running": true, "StartedAt": "2024-01-01T00:00:00Z" }
        })
    }

    fn console_with(name: &str) -> (Console, Arc<MemoryEngine>) {
        let mut image = ImageRecord::new("sha256:1234", None);
        image.repo_tags = vec!["nginx:latest".into()];
        let mut container = ContainerRecord::new("f00dfeed0000", "sha256:1234").running_with_pid(99);
        container.name = name.into();
        let id = container.id.clone();
        let engine = Arc::new(
            MemoryEngine::from_snapshot(vec![image], vec![container])
                .with_inspection(&id, inspection(name)),
        );
        (Console::new(engine.clone()), engine)
    }

    fn options(dir: &Path, force: bool) -> ExportOptions<'_> {
        ExportOptions {
            outfile: None,
            directory: dir,
            force,
            format: ManifestFormat::Json,
        }
    }

    #[test]
    fn export_writes_three_named_files() {
        let (console, _) = console_with("web");
        let dir = tempfile::tempdir().expect("tempdir");
        let id = ContainerId::new("f00dfeed0000");
        let written = export_container(&console, &id, &options(dir.path(), false)).expect("export");

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["web.json", "web-pod.json", "web.service"]);

        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(&written[0]).expect("read")).expect("json");
        assert_eq!(saved[0]["Id"], "");
        assert_eq!(saved[0]["HostsPath"], "");
        assert_eq!(saved[0]["State"]["StartedAt"], "");
        assert_eq!(saved[1]["UserParams"]["sig-proxy"], "");

        let pod: Value =
            serde_json::from_str(&std::fs::read_to_string(&written[1]).expect("read")).expect("json");
        assert_eq!(pod["desiredState"]["manifest"]["containers"][0]["ports"][0]["hostPort"], 8080);
    }

    #[test]
    fn export_uses_short_id_for_generated_names() {
        let (console, _) = console_with("jolly_turing");
        let dir = tempfile::tempdir().expect("tempdir");
        let id = ContainerId::new("f00dfeed0000");
        let written = export_container(&console, &id, &options(dir.path(), false)).expect("export");
        assert!(written[0].ends_with("f00dfeed.json"));
    }

    #[test]
    fn export_refuses_to_overwrite() {
        let (console, _) = console_with("web");
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("web.service"), "old").expect("write");
        let id = ContainerId::new("f00dfeed0000");

        let err = export_container(&console, &id, &options(dir.path(), false)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(!dir.path().join("web.json").exists());

        let _ = export_container(&console, &id, &options(dir.path(), true)).expect("forced");
    }

    #[test]
    fn run_snapshot_pulls_creates_starts_and_exports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshot_path = dir.path().join("api.json");
        let mut doc = inspection("api");
        doc["Config"]["Image"] = json!("registry.local/api:2");
        let body = Snapshot::from_inspection(doc).to_document().expect("document");
        std::fs::write(&snapshot_path, body.to_string()).expect("write");

        let engine = Arc::new(MemoryEngine::new());
        let console = Console::new(engine.clone());
        let out = dir.path().join("out");
        let outcome =
            run_snapshot(&console, &snapshot_path, &out, ManifestFormat::Yaml).expect("run");

        assert!(outcome.pulled);
        assert_eq!(engine.pulls().expect("pulls"), vec!["registry.local/api:2"]);
        let created = engine.containers().expect("containers");
        assert_eq!(created.len(), 1);
        assert!(created[0].running);
        assert_eq!(created[0].name, "api");
        assert!(out.join("api.json").exists());
        assert!(out.join("api-pod.yaml").exists());
        assert!(out.join("api.service").exists());
        assert_eq!(outcome.artifacts.len(), 3);
    }

    #[test]
    fn run_snapshot_skips_pull_for_present_image() {
        let (console, engine) = console_with("web");
        engine.stop_container(&ContainerId::new("f00dfeed0000")).expect("stop");
        engine.remove_container(&ContainerId::new("f00dfeed0000")).expect("rm");

        let dir = tempfile::tempdir().expect("tempdir");
        let snapshot_path = dir.path().join("web.json");
        let body = Snapshot::from_inspection(inspection("web")).to_document().expect("document");
        std::fs::write(&snapshot_path, body.to_string()).expect("write");

        let outcome =
            run_snapshot(&console, &snapshot_path, dir.path(), ManifestFormat::Json).expect("run");
        assert!(!outcome.pulled);
        assert!(engine.pulls().expect("pulls").is_empty());
    }
}
