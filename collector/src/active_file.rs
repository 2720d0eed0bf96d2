use std::path::PathBuf;
use tokio::sync::Mutex;

/// The collector's current hourly CSV target (spec.md §3 "Active file
/// handle"), guarded by a rotation lock so writers and the rotator never
/// observe a torn filename (spec.md §4.1 "Concurrency").
#[derive(Debug)]
pub struct ActiveFile {
    path: Mutex<PathBuf>,
}

impl ActiveFile {
    pub fn new(initial: PathBuf) -> Self {
        Self {
            path: Mutex::new(initial),
        }
    }

    /// Snapshots the current path under the rotation lock, for the writer to
    /// append to (spec.md §4.2 "Writer snapshots under the lock before each
    /// append").
    pub async fn snapshot(&self) -> PathBuf {
        self.path.lock().await.clone()
    }

    /// Swaps in `new_path`, returning the previous path (the one to hand to
    /// the uploader).
    pub async fn swap(&self, new_path: PathBuf) -> PathBuf {
        let mut guard = self.path.lock().await;
        std::mem::replace(&mut *guard, new_path)
    }
}
