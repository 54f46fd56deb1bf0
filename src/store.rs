//! Object store collaborator.
//!
//! The backup engine only needs two operations from a remote store: an
//! existence check and a streaming write. [`LocalStore`] implements them on
//! top of a local directory, which is enough for mounted network shares and
//! synced folders, and serves as the reference backend in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{self, AsyncRead, AsyncWriteExt};

use crate::error::StoreError;

/// Directory under the store root holding in-flight writes. Never a key segment.
pub const STAGING_DIR: &str = ".obackup-staging";

/// Reader handed to [`ObjectStore::write_stream`].
pub type ObjectReader<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// A remote namespace of objects addressed by `/`-separated keys.
///
/// Implementations are shared read-only across concurrent uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns `true` if an object is stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Streams `reader` into the object at `key`.
    ///
    /// Only `Ok(true)` means the object was stored. Callers treat
    /// `Ok(false)` as a failed write.
    async fn write_stream(&self, key: &str, reader: ObjectReader<'_>) -> Result<bool, StoreError>;
}

/// Stores objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps `key` to a path under the root, rejecting keys that would escape it
    /// or reach into the staging directory.
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment == STAGING_DIR
                || segment.contains('\\')
            {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_stream(&self, key: &str, reader: ObjectReader<'_>) -> Result<bool, StoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;

        // The temp file is removed when `temp_path` drops without persisting.
        let (file, temp_path) = tempfile::Builder::new()
            .prefix("obk-")
            .suffix(".part")
            .tempfile_in(&staging)?
            .into_parts();
        let mut file = fs::File::from_std(file);
        io::copy(reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        temp_path.persist(&path).map_err(|e| e.error)?;
        Ok(true)
    }
}
