//! Launch specifications recovered from inspection snapshots.
//!
//! Parsing accepts both the current inspection layout (`Mounts`, resource
//! limits under `HostConfig`) and the legacy one (`Volumes`/`VolumesRW`,
//! limits under `Config`).

use berth_common::error::{BerthError, Result};
use berth_common::launch::{BindMount, LaunchSpec, PortMapping};
use serde_json::{Map, Value};

fn section<'a>(doc: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    doc.get(key).and_then(Value::as_object)
}

fn text(map: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    map?.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn flag(map: Option<&Map<String, Value>>, key: &str) -> bool {
    map.and_then(|m| m.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn number(map: Option<&Map<String, Value>>, key: &str) -> Option<i64> {
    map?.get(key).and_then(Value::as_i64).filter(|&n| n != 0)
}

/// Reads a list field that the engine may report as an array, a single
/// string, or null.
fn strings(map: Option<&Map<String, Value>>, key: &str) -> Vec<String> {
    match map.and_then(|m| m.get(key)) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn parse_port_key(key: &str) -> Option<(u16, String)> {
    let (port, protocol) = key.split_once('/').unwrap_or((key, "tcp"));
    port.parse().ok().map(|p| (p, protocol.to_string()))
}

fn parse_bind(raw: &str) -> Option<BindMount> {
    let mut parts = raw.split(':');
    let host_path = parts.next().filter(|s| !s.is_empty())?.to_string();
    let container_path = parts.next().filter(|s| !s.is_empty())?.to_string();
    let read_only = parts.next().is_some_and(|opts| opts.split(',').any(|o| o == "ro"));
    Some(BindMount {
        host_path,
        container_path,
        read_only,
    })
}

fn collect_ports(
    host: Option<&Map<String, Value>>,
    config: Option<&Map<String, Value>>,
) -> Vec<PortMapping> {
    let mut ports = Vec::new();
    if let Some(bindings) = host.and_then(|h| h.get("PortBindings")).and_then(Value::as_object) {
        for (key, value) in bindings {
            let Some((container_port, protocol)) = parse_port_key(key) else {
                tracing::warn!(key = %key, "skipping unparsable port key");
                continue;
            };
            let entries = value.as_array().map(Vec::as_slice).unwrap_or_default();
            if entries.is_empty() {
                ports.push(PortMapping {
                    container_port,
                    protocol: protocol.clone(),
                    host_ip: None,
                    host_port: None,
                });
            }
            for entry in entries {
                let binding = entry.as_object();
                ports.push(PortMapping {
                    container_port,
                    protocol: protocol.clone(),
                    host_ip: text(binding, "HostIp"),
                    host_port: text(binding, "HostPort").and_then(|p| p.parse().ok()),
                });
            }
        }
    }

    if let Some(exposed) = config.and_then(|c| c.get("ExposedPorts")).and_then(Value::as_object) {
        for key in exposed.keys() {
            if let Some((container_port, protocol)) = parse_port_key(key) {
                let known = ports
                    .iter()
                    .any(|p| p.container_port == container_port && p.protocol == protocol);
                if !known {
                    ports.push(PortMapping {
                        container_port,
                        protocol,
                        host_ip: None,
                        host_port: None,
                    });
                }
            }
        }
    }
    ports.sort_by(|a, b| (a.container_port, &a.protocol).cmp(&(b.container_port, &b.protocol)));
    ports
}

/// Returns `(binds, anonymous volumes)`.
fn collect_mounts(doc: &Value, host: Option<&Map<String, Value>>) -> (Vec<BindMount>, Vec<String>) {
    let mut binds: Vec<BindMount> = strings(host, "Binds")
        .iter()
        .filter_map(|b| parse_bind(b))
        .collect();
    let mut volumes = Vec::new();

    if let Some(mounts) = doc.get("Mounts").and_then(Value::as_array) {
        for mount in mounts.iter().filter_map(Value::as_object) {
            let Some(destination) = text(Some(mount), "Destination") else {
                continue;
            };
            match mount.get("Type").and_then(Value::as_str) {
                Some("bind") => {
                    if !binds.iter().any(|b| b.container_path == destination) {
                        binds.push(BindMount {
                            host_path: text(Some(mount), "Source").unwrap_or_default(),
                            container_path: destination,
                            read_only: !mount.get("RW").and_then(Value::as_bool).unwrap_or(true),
                        });
                    }
                }
                _ => volumes.push(destination),
            }
        }
    } else if let Some(legacy) = section(doc, "Volumes") {
        let writable = section(doc, "VolumesRW");
        for (container_path, host_path) in legacy {
            volumes.push(container_path.clone());
            if let Some(rw) = writable.and_then(|w| w.get(container_path)).and_then(Value::as_bool) {
                binds.push(BindMount {
                    host_path: host_path.as_str().unwrap_or_default().to_string(),
                    container_path: container_path.clone(),
                    read_only: !rw,
                });
            }
        }
    }

    for path in section(doc, "Config")
        .and_then(|c| c.get("Volumes"))
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(Map::keys)
    {
        if !volumes.contains(path) {
            volumes.push(path.clone());
        }
    }
    volumes.retain(|v| !binds.iter().any(|b| b.container_path == *v));
    (binds, volumes)
}

/// Extracts launch parameters from an inspection document.
///
/// Memory comes from `Memory` (never from `MemorySwap`).
///
/// # Errors
///
/// Returns [`BerthError::InvalidMetadata`] if the document names no image.
pub fn from_inspection(doc: &Value) -> Result<LaunchSpec> {
    let config = section(doc, "Config");
    let host = section(doc, "HostConfig");

    let image = text(config, "Image").ok_or_else(|| BerthError::InvalidMetadata {
        message: "snapshot has no Config.Image".into(),
    })?;
    let name = doc
        .get("Name")
        .and_then(Value::as_str)
        .map(|n| n.strip_prefix('/').unwrap_or(n))
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let attach = [("AttachStdin", "stdin"), ("AttachStdout", "stdout"), ("AttachStderr", "stderr")]
        .into_iter()
        .filter(|(key, _)| flag(config, key))
        .map(|(_, stream)| stream.to_string())
        .collect();
    let (binds, volumes) = collect_mounts(doc, host);

    let restart_policy = host
        .and_then(|h| h.get("RestartPolicy"))
        .and_then(Value::as_object)
        .and_then(|p| text(Some(p), "Name"))
        .filter(|n| n != "no");

    Ok(LaunchSpec {
        name,
        image,
        command: strings(config, "Cmd"),
        entrypoint: strings(config, "Entrypoint"),
        hostname: text(config, "Hostname"),
        domainname: text(config, "Domainname"),
        user: text(config, "User"),
        working_dir: text(config, "WorkingDir"),
        env: strings(config, "Env"),
        memory_bytes: number(host, "Memory").or_else(|| number(config, "Memory")),
        memory_swap_bytes: number(host, "MemorySwap").or_else(|| number(config, "MemorySwap")),
        cpu_shares: number(host, "CpuShares").or_else(|| number(config, "CpuShares")),
        cpuset: text(host, "CpusetCpus").or_else(|| text(config, "Cpuset")),
        tty: flag(config, "Tty"),
        attach,
        network_disabled: flag(config, "NetworkDisabled"),
        dns: strings(host, "Dns"),
        dns_search: strings(host, "DnsSearch"),
        volumes,
        binds,
        ports: collect_ports(host, config),
        publish_all_ports: flag(host, "PublishAllPorts"),
        links: strings(host, "Links"),
        privileged: flag(host, "Privileged"),
        network_mode: text(host, "NetworkMode").filter(|m| m != "default"),
        restart_policy,
        cap_add: strings(host, "CapAdd"),
        cap_drop: strings(host, "CapDrop"),
        volumes_from: strings(host, "VolumesFrom"),
    })
}

fn push_all(args: &mut Vec<String>, key: &str, values: &[String]) {
    args.extend(values.iter().map(|v| format!("--{key}={v}")));
}

fn push_opt(args: &mut Vec<String>, key: &str, value: Option<impl std::fmt::Display>) {
    if let Some(v) = value {
        args.push(format!("--{key}={v}"));
    }
}

fn push_flag(args: &mut Vec<String>, key: &str, on: bool) {
    if on {
        args.push(format!("--{key}=true"));
    }
}

/// Renders a port the way `--publish` expects, protocol dropped.
fn publish_value(port: &PortMapping) -> Option<String> {
    let host_port = port.host_port?;
    Some(match &port.host_ip {
        Some(ip) => format!("{ip}:{host_port}:{}", port.container_port),
        None => format!("{host_port}:{}", port.container_port),
    })
}

/// Renders `spec` as `docker run` arguments, without the leading `run`.
///
/// Empty and zero values are left out, as is the hostname `localhost`.
/// `--rm` is added when `remove` is set, followed by `--name`, the image and
/// the command.
#[must_use]
pub fn run_args(spec: &LaunchSpec, remove: bool) -> Vec<String> {
    let mut args = Vec::new();
    push_all(&mut args, "attach", &spec.attach);
    push_opt(&mut args, "cpu-shares", spec.cpu_shares);
    push_opt(&mut args, "cpuset", spec.cpuset.as_deref());
    push_all(&mut args, "env", &spec.env);
    push_opt(
        &mut args,
        "hostname",
        spec.hostname.as_deref().filter(|h| *h != "localhost"),
    );
    push_opt(&mut args, "memory", spec.memory_bytes);
    push_flag(&mut args, "tty", spec.tty);
    push_opt(&mut args, "user", spec.user.as_deref());
    push_opt(&mut args, "workdir", spec.working_dir.as_deref());
    push_all(&mut args, "cap-add", &spec.cap_add);
    push_all(&mut args, "cap-drop", &spec.cap_drop);
    push_all(&mut args, "dns", &spec.dns);
    push_all(&mut args, "dns-search", &spec.dns_search);
    push_all(&mut args, "link", &spec.links);
    push_opt(&mut args, "net", spec.network_mode.as_deref());
    let published: Vec<String> = spec.ports.iter().filter_map(publish_value).collect();
    push_all(&mut args, "publish", &published);
    push_flag(&mut args, "privileged", spec.privileged);
    push_flag(&mut args, "publish-all", spec.publish_all_ports);
    let binds: Vec<String> = spec.binds.iter().map(BindMount::to_bind_string).collect();
    push_all(&mut args, "volume", &binds);
    push_all(&mut args, "volume", &spec.volumes);

    if remove {
        args.push("--rm".into());
    }
    if let Some(name) = &spec.name {
        args.push(format!("--name={name}"));
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// Joins arguments into a shell command line, quoting where needed.
#[must_use]
pub fn render_command(program: &str, args: &[String]) -> String {
    let quoted = args.iter().map(|a| {
        if a.is_empty() || a.chars().any(|c| c.is_whitespace() || "'\"$`\\;&|<>".contains(c)) {
            format!("'{}'", a.replace('\'', r"'\''"))
        } else {
            a.clone()
        }
    });
    std::iter::once(program.to_string())
        .chain(quoted)
        .collect::<Vec<_>>()
        .join(" ")
}
