//! Removal of downloaded analysis files after a run.

use std::path::Path;

use tracing::{info, warn};

use crate::download::DATA_DIR_NAME;

/// Files and bytes found under `dir`.
fn tally(dir: &Path) -> (u64, u64) {
    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in walkdir::WalkDir::new(dir).into_iter().flatten() {
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    (files, bytes)
}

/// Delete `<download_dir>/noaa-gfs-bdp-pds-data` unless `keep` is set.
///
/// Failures are logged, never returned: the tensors are already written.
pub async fn cleanup(download_dir: &Path, keep: bool) {
    let data_dir = download_dir.join(DATA_DIR_NAME);

    if keep {
        info!(path = %data_dir.display(), "Keeping downloaded data");
        return;
    }

    if !data_dir.exists() {
        return;
    }

    let (files, bytes) = tally(&data_dir);
    match tokio::fs::remove_dir_all(&data_dir).await {
        Ok(()) => info!(path = %data_dir.display(), files, bytes, "Removed downloaded data"),
        Err(e) => warn!(path = %data_dir.display(), error = %e, "Failed to remove downloaded data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path) -> std::path::PathBuf {
        let dir = root.join(DATA_DIR_NAME).join("20240115").join("12");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("gdas.t12z.pgrb2.0p25.f000");
        std::fs::write(&file, b"GRIB....").unwrap();
        file
    }

    #[tokio::test]
    async fn test_removes_data_dir() {
        let root = tempfile::tempdir().unwrap();
        populate(root.path());
        std::fs::write(root.path().join("unrelated.txt"), b"x").unwrap();

        assert_eq!(tally(&root.path().join(DATA_DIR_NAME)), (1, 8));
        cleanup(root.path(), false).await;

        assert!(!root.path().join(DATA_DIR_NAME).exists());
        assert!(root.path().join("unrelated.txt").exists());
    }

    #[tokio::test]
    async fn test_keep_leaves_data() {
        let root = tempfile::tempdir().unwrap();
        let file = populate(root.path());
        cleanup(root.path(), true).await;
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_missing_dir_is_noop() {
        let root = tempfile::tempdir().unwrap();
        cleanup(root.path(), false).await;
        assert!(root.path().exists());
    }
}
