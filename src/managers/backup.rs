//! Backup manager - orchestrates backup execution
//!
//! One run: occupy the workspace, archive the source, encrypt when a passphrase is set,
//! upload, apply retention, clean up and notify.

use crate::config::{BackupJobConfig, Source};
use crate::managers::notification::{JobKind, NotificationOutcome, Notifier};
use crate::storage::{self, RetentionPruner, StorageBackend};
use crate::utils::archive::{self, ArchiveArtifact};
use crate::utils::{crypto, Workspace};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// What a successful backup produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub file_name: String,
    pub size: u64,
    pub location: String,
    pub encrypted: bool,
}

pub struct BackupManager {
    config: BackupJobConfig,
    notifier: Arc<dyn Notifier>,
}

impl BackupManager {
    pub fn new(config: BackupJobConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    pub fn config(&self) -> &BackupJobConfig {
        &self.config
    }

    /// Run one backup against the configured backend
    pub fn run(&self) -> Result<BackupReport> {
        let started_at = Local::now();

        let backend = match storage::open(&self.config.backend) {
            Ok(backend) => backend,
            Err(e) => {
                let err = anyhow::Error::new(e).context("Failed to open storage");
                let name = self.expected_name(started_at);
                self.notify(NotificationOutcome {
                    job: JobKind::Backup,
                    file: name.clone(),
                    size: 0,
                    backend: self.config.storage.to_string(),
                    location: name,
                    started_at,
                    finished_at: Local::now(),
                    error: Some(format!("{:#}", err)),
                    reference: self.config.reference.clone(),
                });
                return Err(err);
            }
        };

        self.run_with_backend(backend.as_ref())
    }

    /// Run one backup against an already opened backend
    pub fn run_with_backend(&self, backend: &dyn StorageBackend) -> Result<BackupReport> {
        let started_at = Local::now();
        let timer = Instant::now();
        let file_name = self.config.artifact_file_name(started_at);

        info!(
            "Starting backup of {} to {} storage",
            match &self.config.source {
                Source::File(name) => name.as_str(),
                Source::Folder => "data folder",
            },
            backend.name()
        );

        let workspace = Workspace::new(&self.config.paths.workspace);
        let result = workspace.occupy(|ws| self.execute(ws, backend, &file_name));

        match &result {
            Ok(report) => {
                info!(
                    "Backup {} completed in {:.2}s",
                    report.file_name,
                    timer.elapsed().as_secs_f64()
                );
                self.notify(NotificationOutcome {
                    job: JobKind::Backup,
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
                error!("Backup failed: {:#}", e);
                let name = self.expected_name(started_at);
                self.notify(NotificationOutcome {
                    job: JobKind::Backup,
                    location: backend.location(&name),
                    file: name,
                    size: 0,
                    backend: backend.name().to_string(),
                    started_at,
                    finished_at: Local::now(),
                    error: Some(format!("{:#}", e)),
                    reference: self.config.reference.clone(),
                });
            }
        }

        result
    }

    fn execute(
        &self,
        workspace: &Workspace,
        backend: &dyn StorageBackend,
        file_name: &str,
    ) -> Result<BackupReport> {
        let output = workspace.artifacts_dir().join(file_name);

        let mut artifact = match &self.config.source {
            Source::File(name) => archive::compress_file(&self.config.paths.data, name, &output)
                .with_context(|| format!("Failed to archive {}", name))?,
            Source::Folder => {
                let staging = workspace.staging_dir();
                archive::copy_tree(&self.config.paths.data, &staging)
                    .context("Failed to copy the data folder into the workspace")?;
                archive::compress_folder(&staging, &output)
                    .context("Failed to archive the data folder")?
            }
        };

        if let Some(passphrase) = self.config.passphrase() {
            let encrypted = crypto::encrypt(&artifact.path, passphrase)
                .context("Failed to encrypt backup")?;
            artifact = ArchiveArtifact {
                path: encrypted,
                encrypted: true,
                from_folder: artifact.from_folder,
            };
        }

        let size = artifact
            .size()
            .with_context(|| format!("Failed to read size of {}", artifact.path.display()))?;
        let name = artifact.file_name();

        backend
            .upload(&artifact.path)
            .with_context(|| format!("Failed to upload {}", name))?;
        let location = backend.location(&name);
        info!("Backup saved to {}", location);

        if let Some(days) = self.config.retention_days {
            RetentionPruner::new(days).run(backend);
        }

        Ok(BackupReport {
            file_name: name,
            size,
            location,
            encrypted: artifact.encrypted,
        })
    }

    /// Final artifact name for a run started at `started_at`
    fn expected_name(&self, started_at: DateTime<Local>) -> String {
        let name = self.config.artifact_file_name(started_at);
        if self.config.encryption() {
            format!("{}.{}", name, crypto::ENCRYPTED_EXTENSION)
        } else {
            name
        }
    }

    fn notify(&self, outcome: NotificationOutcome) {
        self.notifier.notify(&outcome);
    }
}
