//! obackup: back up a local directory tree into an object store.
//!
//! A run enumerates every regular file below a source directory, skips files
//! whose remote key already exists (optionally), uploads the rest with
//! bounded exponential-backoff retries, and folds every outcome into a
//! [`RunReport`](report::RunReport). Individual file failures never abort a
//! run; only an unavailable source directory does.

pub mod backoff;
pub mod backup;
pub mod commands;
pub mod config;
pub mod error;
pub mod notify;
pub mod report;
pub mod source;
pub mod store;
pub mod sysexits;
pub mod upload;

pub use backup::{Backup, BackupOptions, RemotePrefix};
pub use error::BackupError;
pub use report::RunReport;
pub use store::{LocalStore, ObjectStore};
