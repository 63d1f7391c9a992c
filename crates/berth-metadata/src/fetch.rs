//! Downloading metadata files over HTTP.

use std::path::{Path, PathBuf};
use std::time::Duration;

use berth_common::error::{BerthError, Result};
use reqwest::header::CONTENT_DISPOSITION;

use crate::store::write_file;

/// Where and how a fetched file is saved.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    /// URL to download.
    pub url: &'a str,
    /// File name to use instead of the server-suggested one.
    pub outfile: Option<&'a str>,
    /// Directory to save into.
    pub directory: &'a Path,
    /// Overwrite an existing file.
    pub force: bool,
    /// Request deadline.
    pub timeout: Duration,
}

/// Extracts the `filename` parameter of a `Content-Disposition` header.
///
/// Only the final path component is kept.
#[must_use]
pub fn disposition_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .and_then(|value| value.rsplit(['/', '\\']).next())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
}

/// Falls back to the last URL path segment.
fn url_filename(url: &reqwest::Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Downloads `request.url` into the target directory and returns the path.
///
/// The file is named by `outfile`, else by the `Content-Disposition`
/// filename, else by the last URL path segment.
///
/// # Errors
///
/// Returns [`BerthError::Fetch`] on transport or HTTP errors,
/// [`BerthError::InvalidMetadata`] when no file name can be determined, and
/// [`BerthError::AlreadyExists`] when the file exists without `force`.
pub fn fetch(request: &FetchRequest<'_>) -> Result<PathBuf> {
    let fetch_error = |message: String| BerthError::Fetch {
        url: request.url.to_string(),
        message,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(request.timeout)
        .build()
        .map_err(|e| fetch_error(e.to_string()))?;
    tracing::info!(url = request.url, "fetching metadata");
    let response = client
        .get(request.url)
        .send()
        .map_err(|e| fetch_error(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fetch_error(format!("HTTP {}", response.status())));
    }

    let file_name = match request.outfile {
        Some(name) => name.to_string(),
        None => response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .or_else(|| url_filename(response.url()))
            .ok_or_else(|| BerthError::InvalidMetadata {
                message: format!("no file name for {}, pass --outfile", request.url),
            })?,
    };
    let path = request.directory.join(file_name);
    if !request.force && path.exists() {
        return Err(BerthError::AlreadyExists { path });
    }

    let body = response.bytes().map_err(|e| fetch_error(e.to_string()))?;
    write_file(&path, &body, request.force)?;
    Ok(path)
}
