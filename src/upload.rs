//! Per-file upload with bounded retries.

use std::num::NonZeroU32;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::error::UploadError;
use crate::source::SourceFile;
use crate::store::ObjectStore;

/// Why a file was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An object already exists under the file's remote key.
    AlreadyExists,
}

/// The single result produced for every enumerated file.
#[derive(Debug)]
pub enum UploadOutcome {
    Uploaded { bytes: u64 },
    Skipped(SkipReason),
    Failed { error: UploadError, attempts: u32 },
}

/// Attempt bookkeeping for one file. Dropped once the file resolves.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
    last_error: Option<UploadError>,
}

impl RetryState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn begin(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    fn fail(&mut self, error: UploadError) {
        self.last_error = Some(error);
    }

    /// Resolves to `Failed`, carrying the last concrete error.
    fn into_failed(self) -> UploadOutcome {
        UploadOutcome::Failed {
            error: self.last_error.unwrap_or(UploadError::Cancelled),
            attempts: self.attempts,
        }
    }
}

/// Streams files into an [`ObjectStore`], retrying failed attempts.
pub struct Uploader<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    max_retries: NonZeroU32,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl<'a, S: ObjectStore + ?Sized> Uploader<'a, S> {
    pub fn new(store: &'a S, max_retries: NonZeroU32, backoff: Backoff) -> Self {
        Self {
            store,
            max_retries,
            backoff,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops further attempts and backoff waits once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Uploads `file` to `key`, making at most `max_retries` attempts.
    ///
    /// Never returns `Skipped`. A write already in progress when the token
    /// fires runs to completion.
    pub async fn upload(&self, file: &SourceFile, key: &str) -> UploadOutcome {
        let mut state = RetryState::default();
        loop {
            if self.cancel.is_cancelled() {
                state.fail(UploadError::Cancelled);
                return state.into_failed();
            }
            let attempt = state.begin();
            match self.attempt(file, key).await {
                Ok(()) => {
                    debug!(key, attempt, "Upload confirmed");
                    return UploadOutcome::Uploaded { bytes: file.size };
                }
                Err(error) => {
                    warn!(key, attempt, error = %error, "Upload attempt failed");
                    state.fail(error);
                }
            }
            if attempt >= self.max_retries.get() {
                return state.into_failed();
            }

            let wait = self.backoff.wait(attempt);
            debug!(key, attempt, wait_ms = whole_millis(wait), "Waiting before retry");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => {
                    state.fail(UploadError::Cancelled);
                    return state.into_failed();
                }
            }
        }
    }

    /// One attempt: open a fresh stream and write it. The stream is closed
    /// when this returns, whatever the result.
    async fn attempt(&self, file: &SourceFile, key: &str) -> Result<(), UploadError> {
        let mut stream = file.open().await.map_err(UploadError::StreamOpen)?;
        match self.store.write_stream(key, &mut stream).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(UploadError::NotConfirmed),
            Err(e) => Err(UploadError::BackendWrite(e)),
        }
    }
}

/// Milliseconds in `wait`, saturating at `u64::MAX`.
fn whole_millis(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
}
