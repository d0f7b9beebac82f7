//! Per-run registry of intermediate files.
//!
//! Every run owns a fresh [`TempDir`]; each markup, footer and rendered PDF
//! gets a unique name inside it and is recorded here. Files are deleted when
//! released, and whatever is left is removed when the registry is dropped,
//! whether the run succeeded, failed, panicked or was cancelled.
//!
//! With `keep = true` nothing is deleted and the directory survives the run,
//! so the generated HTML can be opened in a browser for debugging.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub struct TempRegistry {
    dir: Option<TempDir>,
    root: PathBuf,
    tracked: Mutex<Vec<PathBuf>>,
    keep: bool,
}

impl TempRegistry {
    /// Create a fresh working directory under the system temp dir.
    pub fn new(keep: bool) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("report-assembler-")
            .tempdir()?;
        let root = dir.path().to_path_buf();
        debug!("Working directory: {}", root.display());
        Ok(Self {
            dir: Some(dir),
            root,
            tracked: Mutex::new(Vec::new()),
            keep,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a unique path `<stem>-<uuid>.<ext>` and track it.
    ///
    /// The file itself is not created.
    pub fn allocate(&self, stem: &str, ext: &str) -> PathBuf {
        let path = self
            .root
            .join(format!("{}-{}.{}", stem, uuid::Uuid::new_v4().simple(), ext));
        self.lock().push(path.clone());
        path
    }

    /// Delete a tracked file now. No-op when files are kept.
    pub fn release(&self, path: &Path) {
        if self.keep {
            return;
        }
        remove_quietly(path);
        self.lock().retain(|p| p != path);
    }

    /// Paths currently tracked, in allocation order.
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Delete every tracked file. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        if self.keep {
            return 0;
        }
        let paths: Vec<PathBuf> = self.lock().drain(..).collect();
        paths.iter().filter(|p| remove_quietly(p)).count()
    }

    // A panicking render task must not make cleanup impossible.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for TempRegistry {
    fn drop(&mut self) {
        if self.keep {
            if let Some(dir) = self.dir.take() {
                #[allow(deprecated)]
                let kept = dir.into_path();
                info!("Intermediate files kept in {}", kept.display());
            }
            return;
        }
        let removed = self.cleanup();
        if removed > 0 {
            debug!("Removed {} leftover intermediate files", removed);
        }
        // TempDir removes the directory itself on drop.
    }
}

fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Could not remove {}: {}", path.display(), e);
            false
        }
    }
}
