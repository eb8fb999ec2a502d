//! Storage backends
//!
//! Every backend moves finished artifacts between the local workspace and a destination,
//! and enforces retention there. The backend is chosen once during configuration
//! resolution and built per job run with [`open`].

mod ftp;
mod local;
pub mod retention;
mod s3;
mod ssh;

pub use ftp::FtpStorage;
pub use local::LocalStorage;
pub use retention::{is_expired, select_expired, RemoteEntry, RetentionPruner};
pub use s3::S3Storage;
pub use ssh::SshStorage;

use crate::config::BackendConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{backend} connection failed: {message}")]
    Connection {
        backend: &'static str,
        message: String,
    },

    #[error("{name} not found on {backend} storage")]
    NotFound { backend: &'static str, name: String },

    #[error("{backend} transfer failed: {message}")]
    Transfer {
        backend: &'static str,
        message: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Result of a retention pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    Pruned { deleted: Vec<String> },
    /// The protocol cannot list modification times
    Unsupported,
}

/// Destination for backup artifacts
#[cfg_attr(test, mockall::automock)]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs and notifications
    fn name(&self) -> &'static str;

    /// Human readable location of `file_name` on this backend
    fn location(&self, file_name: &str) -> String;

    /// Store a local artifact under its file name. Readers never observe a partial file.
    fn upload(&self, local_path: &Path) -> Result<()>;

    /// Fetch `remote_name` into `local_dir`, returning the local path
    fn download(&self, remote_name: &str, local_dir: &Path) -> Result<PathBuf>;

    /// Delete artifacts older than `retention_days`
    fn prune(&self, retention_days: u32) -> Result<PruneOutcome>;
}

/// Build the backend described by `config`
pub fn open(config: &BackendConfig) -> Result<Box<dyn StorageBackend>> {
    debug!("Opening {} storage", config.kind());
    Ok(match config {
        BackendConfig::Local(local) => Box::new(LocalStorage::new(local)),
        BackendConfig::S3(s3) => Box::new(S3Storage::connect(s3)?),
        BackendConfig::Ssh(ssh) => Box::new(SshStorage::new(ssh)),
        BackendConfig::Ftp(ftp) => Box::new(FtpStorage::new(ftp)),
    })
}

/// Names the retention pass may touch
pub fn is_artifact_name(name: &str) -> bool {
    name.contains(".tar") && !name.ends_with(".part")
}

/// Hidden in-flight name used while a transfer is incomplete
pub(crate) fn partial_name(name: &str) -> String {
    format!(".{}.part", name)
}

/// Join a remote directory and a file name with `/`
pub(crate) fn remote_join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

pub(crate) fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StorageError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        })
}

pub(crate) fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}
