//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that abort a run before any file is processed.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Source directory '{}' is unavailable: {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("Failed to enumerate source files: {0}")]
    Enumeration(#[from] tokio::task::JoinError),
}

impl BackupError {
    pub(crate) fn source_unavailable(path: &std::path::Path, reason: impl ToString) -> Self {
        BackupError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by an object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Invalid object key '{0}'")]
    InvalidKey(String),
    #[error("{0}")]
    Backend(String),
}

/// Why a single upload attempt failed.
///
/// When a file runs out of attempts, the last of these is what the run
/// report carries for it.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to open file stream: {0}")]
    StreamOpen(#[source] io::Error),
    #[error("Upload failed: {0}")]
    BackendWrite(#[source] StoreError),
    #[error("Upload was not confirmed by the backend")]
    NotConfirmed,
    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}

/// Report delivery failures. These never change the outcome of a run.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Report delivery failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Report delivery rejected with HTTP status {0}")]
    Rejected(u16),
}

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't get the configuration directory")]
    NoConfigDir,
    #[error("Error reading config file '{}': {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Error parsing config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Error writing config file '{}': {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}
