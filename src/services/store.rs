//! src/services/store.rs
//!
//! ObjectStore — the seam between the proxy and the remote blob backend.
//! `RemoteObjectStore` adapts any `object_store` backend (S3 in production,
//! local disk or memory elsewhere) and performs true ranged GETs so a
//! random-access client never pulls a whole multi-gigabyte object.

use crate::models::{
    object::{ObjectHandle, ObjectPath},
    range::RangeSpec,
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use object_store::{
    GetOptions, GetRange, ObjectStore as Backend, ObjectStoreScheme, aws::AmazonS3Builder,
    parse_url, path::Path,
};
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Key probed by readiness checks. It is not expected to exist.
const READINESS_PROBE_KEY: &str = ".igv-file-proxy-readyz";

/// Sequential stream of object bytes.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] object_store::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only access to remote objects.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Metadata probe. Every failure, including access errors, is reported
    /// as `NotFound`.
    async fn resolve(&self, path: &ObjectPath) -> StoreResult<ObjectHandle>;

    /// Open a stream over exactly the requested bytes.
    async fn fetch(&self, handle: &ObjectHandle, range: &RangeSpec) -> StoreResult<ByteStream>;

    /// Cheap reachability check used by `/readyz`.
    async fn check_ready(&self) -> StoreResult<()>;

    fn size(&self, handle: &ObjectHandle) -> u64 {
        handle.size()
    }
}

/// `ObjectStore` over an `object_store` backend rooted at `prefix`.
#[derive(Clone)]
pub struct RemoteObjectStore {
    backend: Arc<dyn Backend>,
    prefix: Path,
}

impl RemoteObjectStore {
    pub fn new(backend: Arc<dyn Backend>, prefix: Path) -> Self {
        Self { backend, prefix }
    }

    /// Build the backend client once from a store URL such as
    /// `s3://bucket/prefix`, `file:///srv/bams` or `memory:///`.
    pub fn from_url(store_url: &str) -> anyhow::Result<Self> {
        let url = store_url
            .parse::<Url>()
            .with_context(|| format!("parsing store url `{}`", store_url))?;
        let (scheme, _) = ObjectStoreScheme::parse(&url)
            .map_err(|err| anyhow!("unsupported store url `{}`: {}", store_url, err))?;

        match scheme {
            ObjectStoreScheme::AmazonS3 => {
                // AWS_* variables from the environment take precedence over
                // instance metadata credentials.
                let s3 = AmazonS3Builder::from_env()
                    .with_url(store_url)
                    .build()
                    .with_context(|| format!("building S3 client for `{}`", store_url))?;
                let prefix = Path::from_url_path(url.path())
                    .with_context(|| format!("store url path `{}`", url.path()))?;
                Ok(Self::new(Arc::new(s3), prefix))
            }
            _ => {
                let (backend, prefix) = parse_url(&url)
                    .with_context(|| format!("opening store url `{}`", store_url))?;
                Ok(Self::new(Arc::from(backend), prefix))
            }
        }
    }

    /// Map a client path to a backend location. Keys that `object_store`
    /// refuses (empty segments, `.`/`..`) or would rewrite (leading or
    /// trailing `/`) never resolve.
    fn location(&self, path: &ObjectPath) -> Option<Path> {
        let key = Path::parse(path.as_str()).ok()?;
        if key.parts().next().is_none() || key.as_ref() != path.as_str() {
            return None;
        }
        Some(Path::from_iter(self.prefix.parts().chain(key.parts())))
    }
}

#[async_trait]
impl ObjectStore for RemoteObjectStore {
    async fn resolve(&self, path: &ObjectPath) -> StoreResult<ObjectHandle> {
        let not_found = || StoreError::NotFound(path.to_string());
        let location = self.location(path).ok_or_else(not_found)?;

        match self.backend.head(&location).await {
            Ok(meta) => Ok(ObjectHandle::new(path.clone(), location, meta.size)),
            Err(object_store::Error::NotFound { .. }) => {
                debug!("object {} does not exist", location);
                Err(not_found())
            }
            Err(err) => {
                warn!("metadata probe for {} failed: {}", location, err);
                Err(not_found())
            }
        }
    }

    async fn fetch(&self, handle: &ObjectHandle, range: &RangeSpec) -> StoreResult<ByteStream> {
        let options = match range {
            RangeSpec::Full => GetOptions::default(),
            RangeSpec::Partial { .. } => GetOptions {
                range: Some(GetRange::Bounded(range.span(handle.size()).range())),
                ..Default::default()
            },
        };

        let result = self
            .backend
            .get_opts(&handle.location, options)
            .await
            .map_err(|err| match err {
                object_store::Error::NotFound { .. } => {
                    StoreError::NotFound(handle.path.to_string())
                }
                other => StoreError::Backend(other),
            })?;

        Ok(result
            .into_stream()
            .map_err(io::Error::other)
            .boxed())
    }

    async fn check_ready(&self) -> StoreResult<()> {
        let probe = Path::from_iter(
            self.prefix
                .parts()
                .chain(Path::from(READINESS_PROBE_KEY).parts()),
        );
        match self.backend.head(&probe).await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(StoreError::Backend(err)),
        }
    }
}
