use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, warn};

/// Per-run scratch directory shared by the run's workers.
///
/// Removal is idempotent; the directory is also removed when the last clone
/// is dropped, so every exit path cleans up.
#[derive(Clone, Debug)]
pub struct ScratchDir {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    removed: AtomicBool,
}

impl ScratchDir {
    pub fn create(path: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(ScratchDir {
            inner: Arc::new(Inner {
                path,
                removed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn remove(&self) -> io::Result<()> {
        self.inner.remove()
    }

    pub fn is_removed(&self) -> bool {
        self.inner.removed.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn remove(&self) -> io::Result<()> {
        if self.removed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Scratch directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn removed_when_last_handle_drops() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("run-1");
        let scratch = ScratchDir::create(path.clone()).unwrap();
        std::fs::write(path.join("feed.csv"), "id\n1\n").unwrap();

        let clone = scratch.clone();
        drop(scratch);
        assert!(path.exists());
        drop(clone);
        assert!(!path.exists());
    }

    #[test]
    fn explicit_remove_is_idempotent() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchDir::create(root.path().join("run-2")).unwrap();
        scratch.remove().unwrap();
        scratch.remove().unwrap();
        assert!(scratch.is_removed());
        assert!(!scratch.path().exists());
    }
}
