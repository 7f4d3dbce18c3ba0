//! Narrow async view of a storage location: get a key, size a key, list one
//! level, sum a prefix. Backed by `object_store` for local directories and S3.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::prefix::PrefixStore;
use object_store::{ObjectStore, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::error::InspectError;
use crate::model::Location;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),

    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl StoreError {
    pub fn into_inspect(self, uri: &str) -> InspectError {
        InspectError::unreachable(uri, self.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Direct children of a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Child "directories", as bare names
    pub prefixes: Vec<String>,
    /// Objects directly under the prefix, as bare names
    pub keys: Vec<String>,
}

/// Read-only key/value access used for metadata documents.
///
/// Keys are relative to the store root and use `/` separators. A missing key
/// is `Ok(None)`, never an error.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    async fn size(&self, key: &str) -> StoreResult<Option<u64>>;

    async fn list_dir(&self, prefix: &str) -> StoreResult<Listing>;

    /// Sum of the sizes of every object below `prefix`.
    async fn total_size(&self, prefix: &str) -> StoreResult<u64>;
}

/// Map `NotFound` to `None`, pass other errors through.
fn handle_result<T>(result: object_store::Result<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(object_store::Error::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// A [`MetadataStore`] rooted at a prefix of an [`ObjectStore`].
#[derive(Debug)]
pub struct ObjectMetadataStore {
    inner: Arc<dyn ObjectStore>,
    root: String,
}

impl ObjectMetadataStore {
    pub fn new(inner: Arc<dyn ObjectStore>, root: &str) -> Self {
        Self {
            inner,
            root: root.trim_matches('/').to_string(),
        }
    }

    fn path(&self, key: &str) -> StoreResult<Option<StorePath>> {
        let key = key.trim_matches('/');
        if key.split('/').any(|part| part == "..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let full = match (self.root.is_empty(), key.is_empty()) {
            (true, true) => return Ok(None),
            (true, false) => key.to_string(),
            (false, true) => self.root.clone(),
            (false, false) => format!("{}/{}", self.root, key),
        };
        Ok(Some(StorePath::from(full.as_str())))
    }

    fn object_path(&self, key: &str) -> StoreResult<StorePath> {
        self.path(key)?
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl MetadataStore for ObjectMetadataStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let path = self.object_path(key)?;
        match handle_result(self.inner.get(&path).await)? {
            Some(result) => Ok(Some(result.bytes().await?)),
            None => Ok(None),
        }
    }

    async fn size(&self, key: &str) -> StoreResult<Option<u64>> {
        let path = self.object_path(key)?;
        Ok(handle_result(self.inner.head(&path).await)?.map(|meta| meta.size as u64))
    }

    async fn list_dir(&self, prefix: &str) -> StoreResult<Listing> {
        let path = self.path(prefix)?;
        let result = self.inner.list_with_delimiter(path.as_ref()).await?;
        let name = |p: &StorePath| p.filename().map(str::to_string);
        let mut prefixes: Vec<String> = result.common_prefixes.iter().filter_map(name).collect();
        let mut keys: Vec<String> = result.objects.iter().filter_map(|m| name(&m.location)).collect();
        prefixes.sort();
        keys.sort();
        Ok(Listing { prefixes, keys })
    }

    async fn total_size(&self, prefix: &str) -> StoreResult<u64> {
        let path = self.path(prefix)?;
        let total = self
            .inner
            .list(path.as_ref())
            .try_fold(0_u64, |acc, meta| async move { Ok(acc + meta.size as u64) })
            .await?;
        Ok(total)
    }
}

/// Build the S3 client for one bucket from environment credentials and the
/// storage settings.
pub fn s3_object_store(bucket: &str, storage: &StorageConfig) -> object_store::Result<AmazonS3> {
    let retry = RetryConfig {
        max_retries: 2,
        retry_timeout: Duration::from_secs(10),
        ..Default::default()
    };
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_retry(retry);
    if let Some(endpoint) = &storage.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(false);
    }
    if let Some(region) = &storage.region {
        builder = builder.with_region(region);
    }
    if storage.allow_http {
        builder = builder.with_allow_http(true);
    }
    if storage.skip_signature {
        builder = builder.with_skip_signature(true);
    }
    builder.build()
}

/// Open the object store rooted at `location`, so keys are relative to the
/// dataset. Shared by the metadata view and the zarr array reader.
pub fn open_object_store(
    uri: &str,
    location: &Location,
    storage: &StorageConfig,
) -> crate::error::Result<Arc<dyn ObjectStore>> {
    match location {
        Location::Local { path } => {
            let fs = LocalFileSystem::new_with_prefix(path).map_err(|e| match e {
                object_store::Error::NotFound { .. } => InspectError::SourceNotFound {
                    uri: uri.to_string(),
                },
                other => InspectError::Io(std::io::Error::other(other.to_string())),
            })?;
            Ok(Arc::new(fs))
        }
        Location::S3 { bucket, key } => {
            let s3 = s3_object_store(bucket, storage)
                .map_err(|e| InspectError::unreachable(uri, e.to_string()))?;
            let key = key.trim_matches('/');
            if key.is_empty() {
                Ok(Arc::new(s3))
            } else {
                Ok(Arc::new(PrefixStore::new(s3, key)))
            }
        }
    }
}

/// Open a metadata store rooted at `location`.
pub fn open_store(
    uri: &str,
    location: &Location,
    storage: &StorageConfig,
) -> crate::error::Result<Arc<dyn MetadataStore>> {
    let inner = open_object_store(uri, location, storage)?;
    Ok(Arc::new(ObjectMetadataStore::new(inner, "")))
}

/// HTTP(S) URL of an S3 object, for libraries that do their own byte-range reads.
pub fn s3_http_url(bucket: &str, key: &str, storage: &StorageConfig) -> String {
    match &storage.endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => {
            let region = storage.region.as_deref().unwrap_or("us-east-1");
            format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
        }
    }
}
