//! Exclusive scratch workspace for one job run
//!
//! The workspace root holds a lock file plus two directories:
//!
//! - `artifacts/` receives the produced (and downloaded) archives
//! - `staging/` receives the private copy of the data root in folder mode
//!
//! Occupancy is guarded by an exclusive, non-blocking `fd-lock` on `.lock`, so a second
//! process pointed at the same workspace fails fast instead of racing.

use fd_lock::RwLock;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCK_FILE: &str = ".lock";
const ARTIFACTS_DIR: &str = "artifacts";
const STAGING_DIR: &str = "staging";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Workspace {} is busy (another job holds the lock)", .0.display())]
    Busy(PathBuf),

    #[error("Workspace I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Run `job` while holding the workspace lock.
    ///
    /// The workspace is prepared before `job` runs and emptied afterwards, whether the job
    /// succeeded or not. Cleanup failures are logged, never returned.
    pub fn occupy<T, E, F>(&self, job: F) -> Result<T, E>
    where
        F: FnOnce(&Workspace) -> Result<T, E>,
        E: From<WorkspaceError>,
    {
        fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;

        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(io_err(&lock_path))?;

        let mut lock = RwLock::new(file);
        let _guard = lock
            .try_write()
            .map_err(|_| WorkspaceError::Busy(self.root.clone()))?;
        debug!("Acquired workspace lock: {:?}", lock_path);

        self.prepare()?;
        let _cleanup = CleanupGuard { workspace: self };

        job(self)
    }

    /// Create the directory layout, clearing leftovers of an interrupted run
    pub fn prepare(&self) -> Result<(), WorkspaceError> {
        for dir in [self.artifacts_dir(), self.staging_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
            }
            fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        }
        Ok(())
    }

    /// Delete everything the job produced
    pub fn cleanup(&self) -> Result<(), WorkspaceError> {
        info!("Deleting temporary files...");
        for dir in [self.artifacts_dir(), self.staging_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
            }
        }
        info!("Deleting temporary files...done");
        Ok(())
    }
}

struct CleanupGuard<'a> {
    workspace: &'a Workspace,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.workspace.cleanup() {
            warn!("Failed to clean up workspace: {}", e);
        }
    }
}
