//! Restore manager - downloads an artifact and unpacks it into the data root

use crate::config::RestoreJobConfig;
use crate::managers::notification::{JobKind, NotificationOutcome, Notifier};
use crate::storage::{self, StorageBackend, StorageError};
use crate::utils::{archive, crypto, Workspace};
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("{0} is encrypted but no passphrase is set (GPG_PASSPHRASE)")]
    PassphraseRequired(String),

    #[error("Backup file {name} not found on {backend} storage")]
    NotFound { backend: String, name: String },
}

/// What a successful restore produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub file_name: String,
    /// Size of the downloaded artifact in bytes
    pub size: u64,
    pub location: String,
    /// Entries written into the data root
    pub entries: usize,
}

pub struct RestoreManager {
    config: RestoreJobConfig,
    notifier: Arc<dyn Notifier>,
}

impl RestoreManager {
    pub fn new(config: RestoreJobConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    pub fn config(&self) -> &RestoreJobConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RestoreReport> {
        let started_at = Local::now();

        let backend = match storage::open(&self.config.backend) {
            Ok(backend) => backend,
            Err(e) => {
                let err = anyhow::Error::new(e).context("Failed to open storage");
                self.notify_failure(
                    self.config.storage.as_str(),
                    self.config.file.clone(),
                    started_at,
                    &err,
                );
                return Err(err);
            }
        };

        self.run_with_backend(backend.as_ref())
    }

    pub fn run_with_backend(&self, backend: &dyn StorageBackend) -> Result<RestoreReport> {
        let started_at = Local::now();
        let timer = Instant::now();
        info!(
            "Restoring {} from {} storage",
            self.config.file,
            backend.name()
        );

        let result = self.execute(backend);

        match &result {
            Ok(report) => {
                info!(
                    "Restore of {} completed in {:.2}s ({} entries)",
                    report.file_name,
                    timer.elapsed().as_secs_f64(),
                    report.entries
                );
                self.notifier.notify(&NotificationOutcome {
                    job: JobKind::Restore,
                    file: report.file_name.clone(),
                    size: report.size,
                    backend: backend.name().to_string(),
                    location: report.location.clone(),
                    started_at,
                    finished_at: Local::now(),
                    error: None,
                    reference: self.config.reference.clone(),
                });
            }
            Err(e) => {
                error!("Restore failed: {:#}", e);
                self.notify_failure(
                    backend.name(),
                    backend.location(&self.config.file),
                    started_at,
                    e,
                );
            }
        }

        result
    }

    fn execute(&self, backend: &dyn StorageBackend) -> Result<RestoreReport> {
        let file = self.config.file.as_str();

        let passphrase = if crypto::is_encrypted_name(file) {
            Some(
                self.config
                    .passphrase()
                    .ok_or_else(|| RestoreError::PassphraseRequired(file.to_string()))?,
            )
        } else {
            None
        };

        let workspace = Workspace::new(&self.config.paths.workspace);
        workspace.occupy(|ws| {
            let downloaded = backend
                .download(file, &ws.artifacts_dir())
                .map_err(|e| match e {
                    StorageError::NotFound { backend, name } => {
                        anyhow::Error::new(RestoreError::NotFound {
                            backend: backend.to_string(),
                            name,
                        })
                    }
                    other => {
                        anyhow::Error::new(other).context(format!("Failed to download {}", file))
                    }
                })?;

            let size = match fs::metadata(&downloaded) {
                Ok(meta) => meta.len(),
                Err(_) => {
                    return Err(RestoreError::NotFound {
                        backend: backend.name().to_string(),
                        name: file.to_string(),
                    }
                    .into())
                }
            };

            let archive_path = match passphrase {
                Some(passphrase) => crypto::decrypt(&downloaded, passphrase)
                    .with_context(|| format!("Failed to decrypt {}", file))?,
                None => downloaded,
            };

            let entries = archive::extract(&archive_path, &self.config.paths.data)
                .with_context(|| format!("Failed to extract {}", file))?;

            Ok(RestoreReport {
                file_name: file.to_string(),
                size,
                location: backend.location(file),
                entries,
            })
        })
    }

    fn notify_failure(
        &self,
        backend: &str,
        location: String,
        started_at: chrono::DateTime<Local>,
        error: &anyhow::Error,
    ) {
        self.notifier.notify(&NotificationOutcome {
            job: JobKind::Restore,
            file: self.config.file.clone(),
            size: 0,
            backend: backend.to_string(),
            location,
            started_at,
            finished_at: Local::now(),
            error: Some(format!("{:#}", error)),
            reference: self.config.reference.clone(),
        });
    }
}
