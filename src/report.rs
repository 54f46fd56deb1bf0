//! Run report: per-run accounting and the human-readable summary.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::upload::UploadOutcome;

/// A file that ran out of attempts, with the last error it hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub file: String,
    pub error: String,
    pub attempts: u32,
}

/// Overall status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    CompletedSuccessfully,
    CompletedWithErrors,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::CompletedSuccessfully => "completed successfully",
            RunStatus::CompletedWithErrors => "completed with errors",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates outcomes while a run is in progress.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    success_count: usize,
    fail_count: usize,
    skipped_count: usize,
    total_bytes: u64,
    failures: Vec<FailureRecord>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the outcome of one file into the counters.
    ///
    /// Exactly one counter moves per call. Bytes are only added for
    /// uploads and a failure record is only kept for terminal failures.
    pub fn record(&mut self, relative: &str, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded { bytes } => {
                self.success_count += 1;
                self.total_bytes += bytes;
            }
            UploadOutcome::Skipped(_) => self.skipped_count += 1,
            UploadOutcome::Failed { error, attempts } => {
                self.fail_count += 1;
                self.failures.push(FailureRecord {
                    file: relative.to_string(),
                    error: error.to_string(),
                    attempts,
                });
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.success_count + self.fail_count + self.skipped_count
    }

    /// Freezes the accounting into a [`RunReport`].
    pub fn finalize(self, started: Instant, started_at: DateTime<Local>) -> RunReport {
        RunReport {
            success_count: self.success_count,
            fail_count: self.fail_count,
            skipped_count: self.skipped_count,
            total_bytes: self.total_bytes,
            failures: self.failures,
            started_at,
            finalized_at: Local::now(),
            elapsed: started.elapsed(),
        }
    }
}

/// The immutable outcome of one backup run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    success_count: usize,
    fail_count: usize,
    skipped_count: usize,
    total_bytes: u64,
    failures: Vec<FailureRecord>,
    started_at: DateTime<Local>,
    finalized_at: DateTime<Local>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    elapsed: Duration,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunReport {
    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn fail_count(&self) -> usize {
        self.fail_count
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_count
    }

    /// Total of the files counted as processed.
    pub fn total_files(&self) -> usize {
        self.success_count + self.fail_count + self.skipped_count
    }

    /// Sum of the enumerated sizes of uploaded files.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Terminal failures, in enumeration order.
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn finalized_at(&self) -> DateTime<Local> {
        self.finalized_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_success(&self) -> bool {
        self.fail_count == 0
    }

    pub fn status(&self) -> RunStatus {
        if self.is_success() {
            RunStatus::CompletedSuccessfully
        } else {
            RunStatus::CompletedWithErrors
        }
    }

    /// Elapsed seconds rounded to two decimals, as shown in summaries.
    pub fn duration_secs(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).round() / 100.0
    }
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "  BACKUP SUMMARY")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "  ✓ Successful:  {}", self.success_count)?;
        if self.skipped_count > 0 {
            writeln!(f, "  ⊘ Skipped:     {}", self.skipped_count)?;
        }
        if self.fail_count > 0 {
            writeln!(f, "  ✗ Failed:      {}", self.fail_count)?;
        }
        writeln!(f, "  ◉ Total size:  {}", format_bytes(self.total_bytes))?;
        writeln!(f, "  ⏱ Duration:    {}s", self.duration_secs())?;
        writeln!(f, "{RULE}")?;

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed Files:")?;
            for failed in &self.failures {
                writeln!(f, "  • {}", failed.file)?;
                writeln!(f, "    Error: {}", failed.error)?;
            }
        }

        if self.fail_count > 0 {
            writeln!(f)?;
            write!(f, "✗ Backup completed with errors.")
        } else if self.success_count > 0 {
            writeln!(f)?;
            write!(f, "✓ Backup completed successfully!")
        } else if self.skipped_count > 0 {
            writeln!(f)?;
            write!(f, "✓ Nothing to upload, all files already backed up.")
        } else {
            writeln!(f)?;
            write!(f, "No files found to backup.")
        }
    }
}

/// Formats a byte count with binary units, e.g. `1536` as `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}
