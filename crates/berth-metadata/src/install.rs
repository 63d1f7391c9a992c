//! Installing metadata shipped inside an image.
//!
//! Images may carry metadata files under `/container-metadata`. Installing
//! one pulls the image, creates a throwaway container from it, copies the
//! file out and removes the container again.

use std::io::Read;
use std::path::{Path, PathBuf};

use berth_common::constants::CONTAINER_METADATA_DIR;
use berth_common::error::{BerthError, Result};
use berth_common::launch::LaunchSpec;
use berth_engine::client::EngineClient;

use crate::store::write_file;

/// Returns the first regular file in a tar archive.
///
/// # Errors
///
/// Returns [`BerthError::InvalidMetadata`] if the archive is unreadable or
/// holds no regular file.
pub fn first_file(archive: &[u8]) -> Result<Vec<u8>> {
    let invalid = |message: String| BerthError::InvalidMetadata { message };
    let mut reader = tar::Archive::new(archive);
    let entries = reader
        .entries()
        .map_err(|e| invalid(format!("unreadable archive: {e}")))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(format!("unreadable archive entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let mut contents = Vec::new();
        let _ = entry
            .read_to_end(&mut contents)
            .map_err(|e| invalid(format!("unreadable archive entry: {e}")))?;
        return Ok(contents);
    }
    Err(invalid("archive holds no file".into()))
}

/// Copies `file` out of `image` into `target_dir`.
///
/// # Errors
///
/// Returns an error if `file` is not a plain file name, the pull or copy
/// fails, or the target exists without `force`.
pub fn install(
    engine: &dyn EngineClient,
    image: &str,
    file: &str,
    target_dir: &Path,
    force: bool,
) -> Result<PathBuf> {
    if file.is_empty() || file.contains('/') || file == ".." {
        return Err(BerthError::Config {
            message: format!("'{file}' is not a metadata file name"),
        });
    }
    let target = target_dir.join(file);
    if !force && target.exists() {
        return Err(BerthError::AlreadyExists { path: target });
    }

    engine.pull_image(image)?;
    let spec = LaunchSpec {
        image: image.to_string(),
        command: vec!["bash".into()],
        ..LaunchSpec::default()
    };
    let container = engine.create_container(&spec)?;
    let source = format!("{CONTAINER_METADATA_DIR}/{file}");
    let copied = engine
        .copy_from_container(&container, &source)
        .and_then(|archive| first_file(&archive));

    if let Err(e) = engine.remove_container(&container) {
        tracing::warn!(id = %container.short(), error = %e, "failed to remove helper container");
    }

    write_file(&target, &copied?, force)?;
    tracing::info!(image, file, path = %target.display(), "installed metadata");
    Ok(target)
}
