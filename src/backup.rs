//! Backup orchestration: enumerate, skip or upload, and fold into a report.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Duration, Local};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::Backoff;
use crate::error::BackupError;
use crate::report::{ReportBuilder, RunReport};
use crate::source::{self, SourceFile};
use crate::store::ObjectStore;
use crate::upload::{SkipReason, UploadOutcome, Uploader};

/// Default root prefix for remote keys.
pub const DEFAULT_PREFIX: &str = "backup";
/// Default number of attempts per file.
pub const DEFAULT_MAX_RETRIES: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Options for a single backup run.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Fixed root of every remote key.
    pub base_prefix: String,
    /// Nest the run under a run-start timestamp below `base_prefix`.
    pub timestamped: bool,
    /// Skip files whose remote key already exists.
    pub skip_existing: bool,
    /// Attempts per file, including the first.
    pub max_retries: NonZeroU32,
    /// Files uploaded at the same time.
    pub concurrency: usize,
    pub backoff: Backoff,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            base_prefix: DEFAULT_PREFIX.to_string(),
            timestamped: false,
            skip_existing: false,
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: 1,
            backoff: Backoff::default(),
        }
    }
}

/// Last run-start time handed out in this process, in epoch milliseconds.
static LAST_RUN_START_MS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Returns a run-start time strictly later, at millisecond precision, than
/// any previously returned one, so timestamped prefixes never repeat.
fn next_run_start(now: DateTime<Local>) -> DateTime<Local> {
    let wanted = now.timestamp_millis();
    let last = match LAST_RUN_START_MS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(wanted.max(last.saturating_add(1)))
    }) {
        Ok(last) | Err(last) => last,
    };
    let issued = wanted.max(last.saturating_add(1));
    now + Duration::milliseconds(issued - wanted)
}

/// Root under which one run stores its objects. Fixed at run start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePrefix(String);

impl RemotePrefix {
    /// Builds the prefix for a run started at `started_at`.
    ///
    /// Timestamped prefixes look like `backup/2024-05-01_134502_117`.
    pub fn new(base: &str, timestamped: bool, started_at: DateTime<Local>) -> Self {
        let base = base.trim_end_matches('/');
        if timestamped {
            let stamp = started_at.format("%Y-%m-%d_%H%M%S_%3f");
            if base.is_empty() {
                RemotePrefix(stamp.to_string())
            } else {
                RemotePrefix(format!("{base}/{stamp}"))
            }
        } else {
            RemotePrefix(base.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Remote key for a `/`-separated relative path.
    pub fn key(&self, relative: &str) -> String {
        if self.0.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{relative}", self.0)
        }
    }
}

/// Runs backups of a source tree into an object store.
pub struct Backup<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    options: BackupOptions,
    cancel: CancellationToken,
}

impl<S: ObjectStore + ?Sized> Backup<S> {
    pub fn new(store: Arc<S>, options: BackupOptions) -> Self {
        Self {
            store,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Files not yet finished when `cancel` fires are reported as cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    /// Backs up every regular file under `source_root`.
    ///
    /// Individual file failures are recorded in the returned report; every
    /// enumerated file is attempted.
    ///
    /// # Errors
    /// Returns [`BackupError::SourceUnavailable`] if `source_root` is missing,
    /// not a directory, or unreadable. No report is produced in that case.
    pub async fn run(&self, source_root: &Path) -> Result<RunReport, BackupError> {
        self.run_at(source_root, next_run_start(Local::now())).await
    }

    /// Like [`Backup::run`] with an explicit run-start time for the prefix.
    ///
    /// Unlike `run`, two calls with the same `started_at` share a prefix.
    pub async fn run_at(
        &self,
        source_root: &Path,
        started_at: DateTime<Local>,
    ) -> Result<RunReport, BackupError> {
        let started = Instant::now();
        source::check_source(source_root)?;

        let root: PathBuf = source_root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || source::enumerate(&root)).await?;
        let total = files.len();

        let prefix = RemotePrefix::new(
            &self.options.base_prefix,
            self.options.timestamped,
            started_at,
        );
        info!(
            source = %source_root.display(),
            prefix = prefix.as_str(),
            files = total,
            "Starting backup"
        );

        let uploader = Uploader::new(
            self.store.as_ref(),
            self.options.max_retries,
            self.options.backoff,
        )
        .with_cancellation(self.cancel.clone());

        let mut builder = ReportBuilder::new();
        let mut outcomes = stream::iter(files)
            .map(|file| {
                let prefix = &prefix;
                let uploader = &uploader;
                async move {
                    let outcome = self.process(uploader, prefix, &file).await;
                    (file, outcome)
                }
            })
            .buffered(self.options.concurrency.max(1));

        while let Some((file, outcome)) = outcomes.next().await {
            log_outcome(&file, &outcome);
            builder.record(&file.relative, outcome);
        }
        drop(outcomes);

        debug_assert_eq!(builder.processed(), total);
        let report = builder.finalize(started, started_at);
        info!(
            uploaded = report.success_count(),
            skipped = report.skipped_count(),
            failed = report.fail_count(),
            bytes = report.total_bytes(),
            "Backup {}",
            report.status()
        );
        Ok(report)
    }

    async fn process(
        &self,
        uploader: &Uploader<'_, S>,
        prefix: &RemotePrefix,
        file: &SourceFile,
    ) -> UploadOutcome {
        let key = prefix.key(&file.relative);
        if self.options.skip_existing && !self.cancel.is_cancelled() {
            match self.store.exists(&key).await {
                Ok(true) => return UploadOutcome::Skipped(SkipReason::AlreadyExists),
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Existence check failed, uploading anyway")
                }
            }
        }
        uploader.upload(file, &key).await
    }
}

fn log_outcome(file: &SourceFile, outcome: &UploadOutcome) {
    match outcome {
        UploadOutcome::Uploaded { bytes } => {
            info!(file = %file.relative, bytes, "Backup successful")
        }
        UploadOutcome::Skipped(_) => info!(file = %file.relative, "Skipped, already backed up"),
        UploadOutcome::Failed { error, attempts } => error!(
            file = %file.relative,
            attempts,
            error = %error,
            "Backup failed"
        ),
    }
}
