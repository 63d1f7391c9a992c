//! Template directories holding metadata files.

use std::path::{Path, PathBuf};

use berth_common::config::MetadataConfig;
use berth_common::error::{BerthError, Result};

/// User and system template directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStore {
    user_dir: PathBuf,
    system_dir: PathBuf,
}

/// Returns whether a directory entry is a metadata file.
#[must_use]
pub fn is_metadata_file(file_name: &str) -> bool {
    file_name.contains("service") || file_name.ends_with("json")
}

impl MetadataStore {
    /// Creates a store over explicit directories.
    #[must_use]
    pub fn new(user_dir: impl Into<PathBuf>, system_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: user_dir.into(),
            system_dir: system_dir.into(),
        }
    }

    /// Creates a store from configuration.
    #[must_use]
    pub fn from_config(config: &MetadataConfig) -> Self {
        Self::new(&config.user_dir, &config.system_dir)
    }

    /// Directory for user-written files.
    #[must_use]
    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// Directory for files installed from images.
    #[must_use]
    pub fn system_dir(&self) -> &Path {
        &self.system_dir
    }

    /// Returns `directory` when given, otherwise the user directory.
    #[must_use]
    pub fn target_dir<'a>(&'a self, directory: Option<&'a Path>) -> &'a Path {
        directory.unwrap_or(&self.user_dir)
    }

    /// Lists metadata files in both directories, user directory first, each
    /// sorted by name. Missing directories are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing directory cannot be read.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for dir in [&self.user_dir, &self.system_dir] {
            if !dir.is_dir() {
                tracing::debug!(dir = %dir.display(), "template directory missing, skipping");
                continue;
            }
            let entries = std::fs::read_dir(dir).map_err(|e| BerthError::Io {
                path: dir.clone(),
                source: e,
            })?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
                .filter(|e| e.file_name().to_str().is_some_and(is_metadata_file))
                .map(|e| e.path())
                .collect();
            files.sort();
            found.extend(files);
        }
        Ok(found)
    }
}

/// Writes `contents` to `path`, refusing to overwrite unless `force`.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`BerthError::AlreadyExists`] if the file exists and `force` is
/// false, or an I/O error if the write fails.
pub fn write_file(path: &Path, contents: &[u8], force: bool) -> Result<()> {
    if !force && path.exists() {
        return Err(BerthError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BerthError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, contents).map_err(|e| BerthError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote metadata file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matches_json_and_service_files() {
        assert!(is_metadata_file("web.json"));
        assert!(is_metadata_file("web-pod.json"));
        assert!(is_metadata_file("web.service"));
        assert!(is_metadata_file("service-notes.txt"));
        assert!(!is_metadata_file("web.yaml"));
        assert!(!is_metadata_file("README"));
    }

    #[test]
    fn list_walks_user_then_system() {
        let user = tempfile::tempdir().expect("user dir");
        let system = tempfile::tempdir().expect("system dir");
        for name in ["b.json", "a.service", "notes.txt"] {
            std::fs::write(user.path().join(name), "x").expect("write");
        }
        std::fs::write(system.path().join("cockpit.json"), "[]").expect("write");
        std::fs::create_dir(user.path().join("nested.json")).expect("mkdir");

        let store = MetadataStore::new(user.path(), system.path());
        let names: Vec<String> = store
            .list()
            .expect("list")
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.service", "b.json", "cockpit.json"]);
    }

    #[test]
    fn list_skips_missing_directories() {
        let store = MetadataStore::new("/nonexistent/berth/user", "/nonexistent/berth/system");
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn write_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sub").join("web.json");
        write_file(&path, b"one", false).expect("first write");

        let err = write_file(&path, b"two", false).unwrap_err();
        assert!(matches!(err, BerthError::AlreadyExists { .. }));
        assert_eq!(std::fs::read(&path).expect("read"), b"one");

        write_file(&path, b"two", true).expect("forced write");
        assert_eq!(std::fs::read(&path).expect("read"), b"two");
    }

    #[test]
    fn target_dir_prefers_explicit_directory() {
        let store = MetadataStore::new("/u", "/s");
        assert_eq!(store.target_dir(None), Path::new("/u"));
        assert_eq!(store.target_dir(Some(Path::new("/tmp"))), Path::new("/tmp"));
    }
}
