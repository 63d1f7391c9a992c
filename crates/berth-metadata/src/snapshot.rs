//! Inspection snapshots.
//!
//! A snapshot file is a JSON array: the container's inspection document with
//! host-specific fields blanked, followed by a `UserParams` object.

use std::path::Path;

use berth_common::error::{BerthError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inspection fields that only make sense on the host that produced them.
const SCRUBBED_FIELDS: &[&[&str]] = &[
    &["HostsPath"],
    &["Image"],
    &["State", "FinishedAt"],
    &["State", "StartedAt"],
    &["ResolvConfPath"],
    &["HostnamePath"],
    &["Config", "Hostname"],
    &["Id"],
];

/// Run-time choices that are not part of the inspection document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserParams {
    /// Restart policy requested by the user.
    #[serde(default)]
    pub restart: String,
    /// Whether the container is removed on exit.
    #[serde(default)]
    pub rm: String,
    /// Engine sub-command used to launch (`run`).
    #[serde(default)]
    pub dockercommand: String,
    /// Whether signals are proxied to the container.
    #[serde(default, rename = "sig-proxy")]
    pub sig_proxy: String,
}

#[derive(Serialize, Deserialize)]
struct UserParamsEntry {
    #[serde(rename = "UserParams")]
    user_params: UserParams,
}

/// A container inspection stored for later reuse.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Scrubbed inspection document, engine field names.
    pub inspection: Value,
    /// User parameters stored alongside.
    pub user_params: UserParams,
}

fn field_mut<'a>(document: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(document, |node, key| node.get_mut(*key))
}

/// Blanks every host-specific field present in `document`.
pub fn scrub(document: &mut Value) {
    for path in SCRUBBED_FIELDS {
        if let Some(field) = field_mut(document, path) {
            *field = Value::String(String::new());
        }
    }
}

impl Snapshot {
    /// Builds a snapshot from a live inspection document.
    #[must_use]
    pub fn from_inspection(mut inspection: Value) -> Self {
        scrub(&mut inspection);
        Self {
            inspection,
            user_params: UserParams::default(),
        }
    }

    /// Returns the on-disk document.
    ///
    /// # Errors
    ///
    /// Returns an error if the user parameters cannot be serialized.
    pub fn to_document(&self) -> Result<Value> {
        let params = serde_json::to_value(UserParamsEntry {
            user_params: self.user_params.clone(),
        })?;
        Ok(Value::Array(vec![self.inspection.clone(), params]))
    }

    /// Parses an on-disk document.
    ///
    /// The first element must be an inspection object; a `UserParams` entry
    /// anywhere after it is picked up when present.
    ///
    /// # Errors
    ///
    /// Returns [`BerthError::InvalidMetadata`] if the document is not an array
    /// starting with an object.
    pub fn from_document(document: Value) -> Result<Self> {
        let Value::Array(entries) = document else {
            return Err(BerthError::InvalidMetadata {
                message: "expected a JSON array".into(),
            });
        };
        let mut entries = entries.into_iter();
        let inspection = match entries.next() {
            Some(first @ Value::Object(_)) => first,
            _ => {
                return Err(BerthError::InvalidMetadata {
                    message: "first entry must be an inspection object".into(),
                });
            }
        };
        let user_params = entries
            .find_map(|e| serde_json::from_value::<UserParamsEntry>(e).ok())
            .map(|e| e.user_params)
            .unwrap_or_default();
        Ok(Self {
            inspection,
            user_params,
        })
    }

    /// Reads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BerthError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let document: Value =
            serde_json::from_str(&text).map_err(|e| BerthError::InvalidMetadata {
                message: format!("{}: {e}", path.display()),
            })?;
        Self::from_document(document)
    }

    /// Returns the container name recorded in the snapshot, without its
    /// leading `/`.
    #[must_use]
    pub fn container_name(&self) -> Option<&str> {
        self.inspection
            .get("Name")
            .and_then(Value::as_str)
            .map(|n| n.strip_prefix('/').unwrap_or(n))
            .filter(|n| !n.is_empty())
    }
}
