use std::collections::HashSet;
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use obackup::backoff::Backoff;
use obackup::error::StoreError;
use obackup::store::ObjectReader;
use obackup::{Backup, BackupError, BackupOptions, LocalStore, ObjectStore};
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

/// Local store that refuses writes to selected keys and counts every write.
struct FlakyStore {
    inner: LocalStore,
    failing: HashSet<String>,
    writes: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn new(root: &Path, failing: &[&str]) -> Self {
        Self {
            inner: LocalStore::new(root),
            failing: failing.iter().map(|k| k.to_string()).collect(),
            writes: Mutex::new(vec![]),
        }
    }

    fn writes(&self, key: &str) -> usize {
        self.writes.lock().unwrap().iter().filter(|k| *k == key).count()
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn write_stream(&self, key: &str, reader: ObjectReader<'_>) -> Result<bool, StoreError> {
        self.writes.lock().unwrap().push(key.to_string());
        if self.failing.contains(key) {
            return Err(StoreError::Backend("simulated outage".to_string()));
        }
        self.inner.write_stream(key, reader).await
    }
}

fn source_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (name, data) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
    dir
}

fn fast_options() -> BackupOptions {
    BackupOptions {
        backoff: Backoff::new(Duration::from_millis(1)),
        ..BackupOptions::default()
    }
}

fn list_keys(root: &Path) -> HashSet<String> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap();
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect()
}

#[tokio::test]
async fn test_success_failure_and_skip_in_one_run() {
    let src = source_tree(&[("A", "alpha"), ("B", "bravo"), ("C", "charlie")]);
    let dest = tempdir().unwrap();
    fs::create_dir_all(dest.path().join("backup")).unwrap();
    fs::write(dest.path().join("backup/C"), "remote copy").unwrap();

    let store = Arc::new(FlakyStore::new(dest.path(), &["backup/B"]));
    let options = BackupOptions {
        skip_existing: true,
        max_retries: NonZeroU32::new(3).unwrap(),
        ..fast_options()
    };
    let report = Backup::new(store.clone(), options).run(src.path()).await.unwrap();

    assert_eq!(report.success_count(), 1);
    assert_eq!(report.fail_count(), 1);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.total_bytes(), 5);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].file, "B");
    assert_eq!(report.failures()[0].error, "Upload failed: simulated outage");
    assert_eq!(store.writes("backup/B"), 3);
    assert_eq!(store.writes("backup/C"), 0);
    assert_eq!(fs::read_to_string(dest.path().join("backup/A")).unwrap(), "alpha");
    assert_eq!(fs::read_to_string(dest.path().join("backup/C")).unwrap(), "remote copy");
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_rerun_with_skip_existing_uploads_nothing() {
    let src = source_tree(&[("a.txt", "1"), ("sub/b.txt", "22"), ("sub/deep/c.txt", "333")]);
    let dest = tempdir().unwrap();
    let store = Arc::new(LocalStore::new(dest.path()));
    let options = BackupOptions {
        skip_existing: true,
        ..fast_options()
    };
    let backup = Backup::new(store, options);

    let first = backup.run(src.path()).await.unwrap();
    assert_eq!(first.success_count(), 3);
    assert_eq!(first.total_bytes(), 6);

    let second = backup.run(src.path()).await.unwrap();
    assert_eq!(second.success_count(), 0);
    assert_eq!(second.skipped_count(), 3);
    assert_eq!(second.total_bytes(), 0);
    assert!(second.is_success());
}

#[tokio::test]
async fn test_timestamped_runs_do_not_collide() {
    let src = source_tree(&[("x.bin", "x"), ("y/z.bin", "z")]);
    let dest = tempdir().unwrap();
    let store = Arc::new(LocalStore::new(dest.path()));
    let options = BackupOptions {
        timestamped: true,
        base_prefix: "gbackup".to_string(),
        ..fast_options()
    };
    let backup = Backup::new(store, options);

    let first_at = Local.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
    let second_at = first_at + chrono::Duration::milliseconds(1);
    backup.run_at(src.path(), first_at).await.unwrap();
    let after_first = list_keys(dest.path());
    backup.run_at(src.path(), second_at).await.unwrap();
    let all = list_keys(dest.path());

    assert_eq!(after_first.len(), 2);
    assert_eq!(all.len(), 4);
    assert!(after_first.contains("gbackup/2024-03-01_020000_000/y/z.bin"));
    assert!(all.contains("gbackup/2024-03-01_020000_001/x.bin"));
}

#[tokio::test]
async fn test_back_to_back_timestamped_runs_get_distinct_prefixes() {
    let src = source_tree(&[("only.txt", "1")]);
    let dest = tempdir().unwrap();
    let options = BackupOptions {
        timestamped: true,
        ..fast_options()
    };
    let backup = Backup::new(Arc::new(LocalStore::new(dest.path())), options);

    for _ in 0..25 {
        let report = backup.run(src.path()).await.unwrap();
        assert_eq!(report.success_count(), 1);
    }
    let keys = list_keys(dest.path());
    assert_eq!(keys.len(), 25);
    assert!(keys.iter().all(|k| k.starts_with("backup/") && k.ends_with("/only.txt")));
}

#[tokio::test]
async fn test_empty_source_is_success() {
    let src = tempdir().unwrap();
    fs::create_dir_all(src.path().join("only/dirs")).unwrap();
    let dest = tempdir().unwrap();
    let backup = Backup::new(Arc::new(LocalStore::new(dest.path())), fast_options());

    let report = backup.run(src.path()).await.unwrap();
    assert_eq!(report.total_files(), 0);
    assert_eq!(report.total_bytes(), 0);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_missing_source_is_fatal() {
    let dest = tempdir().unwrap();
    let missing = dest.path().join("no_such_source");
    let backup = Backup::new(Arc::new(LocalStore::new(dest.path())), fast_options());

    let err = backup.run(&missing).await.unwrap_err();
    assert!(matches!(err, BackupError::SourceUnavailable { .. }));
    assert!(list_keys(dest.path()).is_empty());
}

#[tokio::test]
async fn test_file_as_source_is_fatal() {
    let src = source_tree(&[("file.txt", "data")]);
    let dest = tempdir().unwrap();
    let backup = Backup::new(Arc::new(LocalStore::new(dest.path())), fast_options());

    let err = backup.run(&src.path().join("file.txt")).await.unwrap_err();
    assert!(err.to_string().contains("not a directory"));
}

#[tokio::test]
async fn test_cancelled_run_still_reports_every_file() {
    let src = source_tree(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let dest = tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let backup = Backup::new(Arc::new(LocalStore::new(dest.path())), fast_options())
        .with_cancellation(cancel);

    let report = backup.run(src.path()).await.unwrap();
    assert_eq!(report.total_files(), 3);
    assert_eq!(report.fail_count(), 3);
    assert!(report.failures().iter().all(|f| f.error == "Upload cancelled"));
    assert!(list_keys(dest.path()).is_empty());
}

#[tokio::test]
async fn test_parallel_run_counts_every_file() {
    let names: Vec<String> = (0..20).map(|i| format!("d{}/f{i:02}.txt", i % 4)).collect();
    let entries: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "abc")).collect();
    let src = source_tree(&entries);
    let dest = tempdir().unwrap();
    let failing = ["backup/d1/f05.txt", "backup/d3/f11.txt"];
    let store = Arc::new(FlakyStore::new(dest.path(), &failing));
    let options = BackupOptions {
        concurrency: 6,
        max_retries: NonZeroU32::new(2).unwrap(),
        ..fast_options()
    };

    let report = Backup::new(store.clone(), options).run(src.path()).await.unwrap();
    assert_eq!(report.total_files(), 20);
    assert_eq!(report.success_count(), 18);
    assert_eq!(report.fail_count(), 2);
    assert_eq!(report.total_bytes(), 54);
    let failed: Vec<_> = report.failures().iter().map(|f| f.file.as_str()).collect();
    assert_eq!(failed, vec!["d1/f05.txt", "d3/f11.txt"]);
    assert_eq!(store.writes("backup/d1/f05.txt"), 2);
    assert_eq!(list_keys(dest.path()).len(), 18);
}
