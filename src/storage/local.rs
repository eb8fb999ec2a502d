use super::retention::{select_expired, RemoteEntry};
use super::{file_name_of, io_err, is_artifact_name, partial_name, PruneOutcome, Result, StorageBackend, StorageError};
use crate::config::LocalConfig;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const NAME: &str = "local";

/// Copies artifacts into a directory on the local filesystem (usually a mounted volume)
#[derive(Debug, Clone)]
pub struct LocalStorage {
    destination: PathBuf,
}

impl LocalStorage {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            destination: config.destination.clone(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    fn list(&self) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let dir = match fs::read_dir(&self.destination) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(io_err(&self.destination)(e)),
        };

        for entry in dir {
            let entry = entry.map_err(io_err(&self.destination))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().map_err(io_err(&entry.path()))?;
            if !meta.is_file() || !is_artifact_name(&name) {
                continue;
            }
            let modified = meta.modified().map_err(io_err(&entry.path()))?;
            entries.push(RemoteEntry {
                name,
                modified: DateTime::<Utc>::from(modified),
            });
        }

        Ok(entries)
    }
}

/// Copy `source` to `target` through a hidden partial file in the target's directory
fn copy_atomically(source: &Path, target: &Path, partial: &Path) -> Result<()> {
    if let Err(e) = fs::copy(source, partial) {
        let _ = fs::remove_file(partial);
        return Err(io_err(partial)(e));
    }
    fs::rename(partial, target).map_err(io_err(target))
}

impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn location(&self, file_name: &str) -> String {
        self.destination.join(file_name).display().to_string()
    }

    fn upload(&self, local_path: &Path) -> Result<()> {
        let name = file_name_of(local_path)?;
        info!("Copying backup file to {}...", self.destination.display());

        fs::create_dir_all(&self.destination).map_err(io_err(&self.destination))?;
        copy_atomically(
            local_path,
            &self.destination.join(&name),
            &self.destination.join(partial_name(&name)),
        )?;

        info!("Copying backup file to {}...done", self.destination.display());
        Ok(())
    }

    fn download(&self, remote_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let source = self.destination.join(remote_name);
        if !source.is_file() {
            return Err(StorageError::NotFound {
                backend: NAME,
                name: remote_name.to_string(),
            });
        }

        debug!("Copying {} into {}", source.display(), local_dir.display());
        fs::create_dir_all(local_dir).map_err(io_err(local_dir))?;
        let target = local_dir.join(remote_name);
        copy_atomically(&source, &target, &local_dir.join(partial_name(remote_name)))?;
        Ok(target)
    }

    fn prune(&self, retention_days: u32) -> Result<PruneOutcome> {
        let expired = select_expired(&self.list()?, Utc::now(), retention_days);

        let mut deleted = Vec::with_capacity(expired.len());
        for entry in expired {
            let path = self.destination.join(&entry.name);
            fs::remove_file(&path).map_err(io_err(&path))?;
            deleted.push(entry.name);
        }

        Ok(PruneOutcome::Pruned { deleted })
    }
}
