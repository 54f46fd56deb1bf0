//! Local source tree: precondition check and file enumeration.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::BackupError;

/// A regular file captured at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on the local filesystem.
    pub path: PathBuf,
    /// Path relative to the source root, always `/`-separated.
    pub relative: String,
    /// Size in bytes as reported by the filesystem during enumeration.
    pub size: u64,
}

impl SourceFile {
    /// Opens a fresh read stream positioned at the start of the file.
    pub async fn open(&self) -> std::io::Result<File> {
        File::open(&self.path).await
    }
}

/// Checks that `root` exists, is a directory, and can be listed.
///
/// # Errors
/// Returns [`BackupError::SourceUnavailable`] naming the path otherwise.
pub fn check_source(root: &Path) -> Result<(), BackupError> {
    let metadata = fs::metadata(root).map_err(|e| BackupError::source_unavailable(root, e))?;
    if !metadata.is_dir() {
        return Err(BackupError::source_unavailable(root, "not a directory"));
    }
    fs::read_dir(root).map_err(|e| BackupError::source_unavailable(root, e))?;
    Ok(())
}

/// Recursively lists every regular file under `root`, sorted by relative path.
///
/// Entries that cannot be read are logged and left out; symlinks are not followed.
pub fn enumerate(root: &Path) -> Vec<SourceFile> {
    let mut files = vec![];
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping file without metadata");
                continue;
            }
        };
        let path = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path().to_path_buf());
        files.push(SourceFile {
            path,
            relative: relative_key(rel),
            size,
        });
    }
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    files
}

/// Joins the normal components of `rel` with `/`.
fn relative_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_check_source_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no_such_dir");
        let err = check_source(&missing).unwrap_err();
        assert!(matches!(err, BackupError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("no_such_dir"));
    }

    #[test]
    fn test_check_source_file_is_not_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"data").unwrap();
        let err = check_source(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_enumerate_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(enumerate(dir.path()).is_empty());
    }

    #[test]
    fn test_enumerate_sorted_and_recursive() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("c.txt"), b"ccc").unwrap();
        fs::write(dir.path().join("b/nested/d.txt"), b"dddd").unwrap();
        fs::write(dir.path().join("a/e.txt"), b"").unwrap();

        let files = enumerate(dir.path());
        let rels: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rels, vec!["a/e.txt", "b/nested/d.txt", "c.txt"]);
        assert_eq!(files[0].size, 0);
        assert_eq!(files[1].size, 4);
        assert!(files.iter().all(|f| f.path.is_absolute()));
    }

    #[test]
    fn test_relative_key_uses_forward_slashes() {
        let rel: PathBuf = ["x", "y", "z.bin"].iter().collect();
        assert_eq!(relative_key(&rel), "x/y/z.bin");
    }
}
