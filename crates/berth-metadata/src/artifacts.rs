//! Derived artifacts: orchestration pod manifest and systemd unit.

use berth_common::config::ManifestFormat;
use berth_common::error::{BerthError, Result};
use berth_common::launch::LaunchSpec;
use serde_json::{Value, json};

/// Splits `KEY=value` on the first `=`; a bare key gets an empty value.
fn env_entry(raw: &str) -> Value {
    let (name, value) = raw.split_once('=').unwrap_or((raw, ""));
    json!({ "name": name, "value": value })
}

/// Builds a `v1beta1` pod document for the container `spec` describes.
#[must_use]
pub fn pod_manifest(spec: &LaunchSpec) -> Value {
    let name = spec.name.clone().unwrap_or_default();
    let env: Vec<Value> = spec.env.iter().map(|e| env_entry(e)).collect();

    let mut volume_mounts = Vec::with_capacity(spec.binds.len());
    let mut volumes = Vec::with_capacity(spec.binds.len());
    for bind in &spec.binds {
        let volume_name = bind.host_path.replace('/', "");
        volume_mounts.push(json!({
            "name": volume_name,
            "readOnly": bind.read_only,
            "mountPath": bind.container_path,
        }));
        volumes.push(json!({
            "name": volume_name,
            "source": { "hostDir": { "path": bind.host_path } },
        }));
    }

    let ports: Vec<Value> = spec
        .ports
        .iter()
        .filter_map(|p| {
            p.host_port
                .map(|host| json!({ "containerPort": p.container_port, "hostPort": host }))
        })
        .collect();

    json!({
        "kind": "Pod",
        "id": name,
        "labels": { "name": name },
        "apiVersion": "v1beta1",
        "namespace": null,
        "creationTimestamp": null,
        "selfLink": null,
        "desiredState": {
            "manifest": {
                "version": "v1beta1",
                "id": null,
                "containers": [{
                    "name": name,
                    "image": spec.image,
                    "command": spec.command,
                    "env": env,
                    "ports": ports,
                    "volumeMounts": volume_mounts,
                }],
                "volumes": volumes,
            }
        }
    })
}

/// Serializes a manifest in the configured format.
///
/// # Errors
///
/// Returns an error if the manifest cannot be serialized.
pub fn render_manifest(manifest: &Value, format: ManifestFormat) -> Result<String> {
    match format {
        ManifestFormat::Json => Ok(serde_json::to_string_pretty(manifest)?),
        ManifestFormat::Yaml => {
            serde_yaml::to_string(manifest).map_err(|e| BerthError::InvalidMetadata {
                message: format!("cannot render manifest as YAML: {e}"),
            })
        }
    }
}

/// File extension for manifests in `format`.
#[must_use]
pub const fn manifest_extension(format: ManifestFormat) -> &'static str {
    match format {
        ManifestFormat::Json => "json",
        ManifestFormat::Yaml => "yaml",
    }
}

/// Renders a systemd unit that runs the container under the engine service.
///
/// # Errors
///
/// Returns [`BerthError::InvalidMetadata`] if the launch spec carries no container
/// name, since the unit addresses the container by name.
pub fn service_unit(spec: &LaunchSpec) -> Result<String> {
    let name = spec
        .name
        .as_deref()
        .ok_or_else(|| BerthError::InvalidMetadata {
            message: "a service unit needs a container name".into(),
        })?;
    let image = &spec.image;
    let mut run = format!("/usr/bin/docker run --name {name} {image}");
    for arg in &spec.command {
        run.push(' ');
        run.push_str(arg);
    }

    Ok(format!(
        "[Unit]
Description={name}
After=docker.service
Requires=docker.service

[Service]
TimeoutStartSec=0
ExecStartPre=-/usr/bin/docker kill {name}
ExecStartPre=-/usr/bin/docker rm {name}
ExecStartPre=/usr/bin/docker pull {image}
ExecStart={run}

[Install]
WantedBy=multi-user.target
"
    ))
}
