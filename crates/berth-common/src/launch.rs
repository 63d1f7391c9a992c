//! Typed launch parameters for recreating a container.
//!
//! A [`LaunchSpec`] is what the metadata toolkit extracts from an inspection
//! snapshot and what engine clients consume to create a container.

use serde::{Deserialize, Serialize};

/// Host directory bound into a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Directory on the host.
    pub host_path: String,
    /// Mount point inside the container.
    pub container_path: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl BindMount {
    /// Renders the engine bind syntax `host:container[:ro]`.
    #[must_use]
    pub fn to_bind_string(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host_path, self.container_path)
        } else {
            format!("{}:{}", self.host_path, self.container_path)
        }
    }
}

/// A published container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Transport protocol, `tcp` or `udp`.
    pub protocol: String,
    /// Host interface address, `None` for all interfaces.
    pub host_ip: Option<String>,
    /// Host port, `None` to let the engine choose.
    pub host_port: Option<u16>,
}

impl PortMapping {
    /// Returns the engine port key, e.g. `80/tcp`.
    #[must_use]
    pub fn port_key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

/// Everything needed to launch a container equivalent to an inspected one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Container name without the leading `/`.
    pub name: Option<String>,
    /// Image reference.
    pub image: String,
    /// Command arguments.
    pub command: Vec<String>,
    /// Entrypoint override.
    pub entrypoint: Vec<String>,
    /// Hostname inside the container.
    pub hostname: Option<String>,
    /// Domain name inside the container.
    pub domainname: Option<String>,
    /// User the process runs as.
    pub user: Option<String>,
    /// Working directory of the process.
    pub working_dir: Option<String>,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
    /// Memory limit in bytes.
    pub memory_bytes: Option<i64>,
    /// Memory plus swap limit in bytes.
    pub memory_swap_bytes: Option<i64>,
    /// CPU shares (relative weight).
    pub cpu_shares: Option<i64>,
    /// CPUs the container may run on.
    pub cpuset: Option<String>,
    /// Whether a TTY is allocated.
    pub tty: bool,
    /// Attached standard streams (`stdin`, `stdout`, `stderr`).
    pub attach: Vec<String>,
    /// Whether networking is disabled.
    pub network_disabled: bool,
    /// DNS servers.
    pub dns: Vec<String>,
    /// DNS search domains.
    pub dns_search: Vec<String>,
    /// Anonymous volume mount points.
    pub volumes: Vec<String>,
    /// Host directory binds.
    pub binds: Vec<BindMount>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Whether every exposed port is published.
    pub publish_all_ports: bool,
    /// Container links.
    pub links: Vec<String>,
    /// Whether the container runs privileged.
    pub privileged: bool,
    /// Network mode, e.g. `bridge` or `host`.
    pub network_mode: Option<String>,
    /// Restart policy name.
    pub restart_policy: Option<String>,
    /// Added capabilities.
    pub cap_add: Vec<String>,
    /// Dropped capabilities.
    pub cap_drop: Vec<String>,
    /// Containers whose volumes are mounted.
    pub volumes_from: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_string_marks_read_only() {
        let bind = BindMount {
            host_path: "/srv/data".into(),
            container_path: "/data".into(),
            read_only: true,
        };
        assert_eq!(bind.to_bind_string(), "/srv/data:/data:ro");
    }

    #[test]
    fn bind_string_read_write() {
        let bind = BindMount {
            host_path: "/srv".into(),
            container_path: "/srv".into(),
            read_only: false,
        };
        assert_eq!(bind.to_bind_string(), "/srv:/srv");
    }

    #[test]
    fn port_key_includes_protocol() {
        let port = PortMapping {
            container_port: 53,
            protocol: "udp".into(),
            ..PortMapping::default()
        };
        assert_eq!(port.port_key(), "53/udp");
    }
}
