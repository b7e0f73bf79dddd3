//! Locating optional real-data files and scratch directories for tests.

use std::path::PathBuf;

/// Workspace root, two levels above this crate's manifest.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .map(|p| p.to_path_buf())
        .unwrap_or(manifest_dir)
}

/// Find a real GDAS file by name.
///
/// `$TEST_DATA_DIR` is searched first, then `testdata/` under the parser and
/// tensor crates and the workspace root.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let root = workspace_root();
    std::env::var_os("TEST_DATA_DIR")
        .map(|dir| PathBuf::from(dir).join(name))
        .into_iter()
        .chain(
            ["crates/grib2-parser/testdata", "crates/tensor-prep/testdata", "testdata"]
                .iter()
                .map(|dir| root.join(dir).join(name)),
        )
        .find(|path| path.is_file())
}

/// Scratch directory removed on drop.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("gdas-prep-test-")
        .tempdir()
        .expect("failed to create test directory")
}
