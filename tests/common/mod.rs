use std::{path::PathBuf, sync::Mutex};

use once_cell::sync::Lazy;
use tally::{Bookkeeper, Config};
use tempfile::TempDir;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// A fresh data root that outlives the calling test.
pub fn temp_root() -> PathBuf {
    let temp = TempDir::new().expect("create temp dir");
    let root = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    root
}

/// A file-backed bookkeeper under its own data root.
pub fn setup_bookkeeper() -> (Bookkeeper, PathBuf) {
    let root = temp_root();
    let keeper = Bookkeeper::open_at(Config::default(), &root).expect("open bookkeeper");
    (keeper, root)
}
