//! URI classification, existence and size checks and input expansion.
//!
//! Nothing here reads file content. Local sources are `stat`ed, remote objects
//! get a HEAD request, zarr stores are recognized by their marker documents.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::error::{InspectError, Result};
use crate::model::{BackendKind, DatasetSource, Location};
use crate::store::{open_store, MetadataStore};

/// File extensions picked up when walking a directory.
pub const DATA_EXTENSIONS: [&str; 8] = ["nc", "nc4", "grb", "grib", "grib2", "grb2", "h5", "hdf5"];

const NETCDF_EXTENSIONS: [&str; 6] = ["nc", "nc4", "netcdf", "h5", "hdf5", "he5"];

/// Documents whose presence marks a directory as a zarr store.
pub const ZARR_MARKERS: [&str; 4] = [".zgroup", ".zmetadata", "zarr.json", ".zarray"];

/// Split a locator into its physical location.
pub fn parse_location(uri: &str) -> Result<Location> {
    match uri.split_once("://") {
        None => Ok(Location::Local {
            path: expand_home(uri),
        }),
        Some(("file", path)) => Ok(Location::Local {
            path: expand_home(path),
        }),
        Some(("s3", rest)) => {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            let key = key.trim_matches('/');
            if bucket.is_empty() || key.is_empty() {
                return Err(InspectError::unsupported(
                    uri,
                    "object storage URIs need a bucket and a key",
                ));
            }
            Ok(Location::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        }
        Some((scheme, _)) => Err(InspectError::unsupported(
            uri,
            format!("unsupported scheme '{}'", scheme),
        )),
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path.trim_end_matches('/'))
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn kind_for_file(path: &str) -> BackendKind {
    match extension_of(path) {
        Some(ext) if NETCDF_EXTENSIONS.contains(&ext.as_str()) => BackendKind::Hdf5Netcdf,
        _ => BackendKind::Other,
    }
}

fn is_zarr_dir(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("zarr"))
        || ZARR_MARKERS.iter().any(|marker| path.join(marker).is_file())
}

/// Classify `uri` and look up its existence and stored size.
pub async fn resolve(uri: &str, storage: &StorageConfig) -> Result<DatasetSource> {
    let location = parse_location(uri)?;
    let (backend_kind, byte_size) = match &location {
        Location::Local { path } => resolve_local(uri, path).await?,
        Location::S3 { bucket, key } => resolve_s3(uri, bucket, key, storage).await?,
    };
    debug!(uri = %uri, backend = %backend_kind, byte_size, "Resolved source");
    Ok(DatasetSource {
        uri: uri.to_string(),
        location,
        backend_kind,
        byte_size,
    })
}

async fn resolve_local(uri: &str, path: &Path) -> Result<(BackendKind, u64)> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => InspectError::SourceNotFound {
            uri: uri.to_string(),
        },
        _ => InspectError::Io(e),
    })?;

    if meta.is_file() {
        return Ok((kind_for_file(uri), meta.len()));
    }
    if !is_zarr_dir(path) {
        return Err(InspectError::unsupported(uri, "directory is not a zarr store"));
    }
    let root = path.to_path_buf();
    let size = tokio::task::spawn_blocking(move || directory_size(&root))
        .await
        .map_err(|e| InspectError::Io(std::io::Error::other(e)))?;
    Ok((BackendKind::Zarr, size))
}

fn directory_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

async fn resolve_s3(
    uri: &str,
    bucket: &str,
    key: &str,
    storage: &StorageConfig,
) -> Result<(BackendKind, u64)> {
    let bucket_root = Location::S3 {
        bucket: bucket.to_string(),
        key: String::new(),
    };
    let store = open_store(uri, &bucket_root, storage)?;

    let looks_like_zarr = extension_of(key).as_deref() == Some("zarr");
    if !looks_like_zarr {
        if let Some(size) = store.size(key).await.map_err(|e| e.into_inspect(uri))? {
            return Ok((kind_for_file(key), size));
        }
    }

    if has_zarr_marker(store.as_ref(), key)
        .await
        .map_err(|e| e.into_inspect(uri))?
    {
        let size = store
            .total_size(key)
            .await
            .map_err(|e| e.into_inspect(uri))?;
        return Ok((BackendKind::Zarr, size));
    }

    Err(InspectError::SourceNotFound {
        uri: uri.to_string(),
    })
}

async fn has_zarr_marker(
    store: &dyn MetadataStore,
    prefix: &str,
) -> std::result::Result<bool, crate::store::StoreError> {
    for marker in ZARR_MARKERS {
        if store.size(&format!("{}/{}", prefix, marker)).await?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_remote(input: &str) -> bool {
    matches!(input.split_once("://"), Some((scheme, _)) if scheme != "file")
}

fn has_data_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DATA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn is_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Data files and zarr stores matching a shell-style pattern, sorted.
fn glob_sources(pattern: &Path) -> Result<Vec<String>> {
    let text = pattern.to_string_lossy();
    let paths = glob::glob(&text).map_err(|e| InspectError::Config {
        message: format!("invalid pattern '{}': {}", text, e),
    })?;
    let mut found: Vec<String> = paths
        .filter_map(|entry| entry.ok())
        .filter(|p| (p.is_file() && has_data_extension(p)) || (p.is_dir() && is_zarr_dir(p)))
        .map(|p| p.display().to_string())
        .collect();
    found.sort();
    Ok(found)
}

fn walk_sorted(root: &Path, keep: impl Fn(&walkdir::DirEntry) -> bool) -> Vec<String> {
    let mut found: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| keep(entry))
        .map(|entry| entry.path().display().to_string())
        .collect();
    found.sort();
    found
}

/// Expand caller inputs into source locators.
///
/// Directories are walked for known data files, zarr stores stay whole,
/// inputs containing `*`, `?` or `[` are expanded as glob patterns.
/// Input order across arguments is kept; each expansion is sorted.
pub fn expand_inputs<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<String>> {
    let mut sources = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if is_remote(input) {
            sources.push(input.to_string());
            continue;
        }
        let path = expand_home(input.strip_prefix("file://").unwrap_or(input));

        if path.is_dir() {
            if is_zarr_dir(&path) {
                sources.push(path.display().to_string());
            } else {
                let found = walk_sorted(&path, |e| e.file_type().is_file() && has_data_extension(e.path()));
                debug!(input = %input, count = found.len(), "Expanded directory");
                sources.extend(found);
            }
        } else if path.exists() {
            sources.push(path.display().to_string());
        } else if is_pattern(input) {
            let matched = glob_sources(&path)?;
            if matched.is_empty() {
                warn!(input = %input, "Pattern matched no files");
            }
            sources.extend(matched);
        } else {
            sources.push(input.to_string());
        }
    }

    if sources.is_empty() {
        return Err(InspectError::NoSources);
    }
    Ok(sources)
}
