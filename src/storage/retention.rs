//! Age-based retention

use super::{is_artifact_name, PruneOutcome, StorageBackend};
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

/// An object listed on a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// An artifact aged exactly `days` is still retained
pub fn is_expired(modified: DateTime<Utc>, now: DateTime<Utc>, days: u32) -> bool {
    now.signed_duration_since(modified) > Duration::days(i64::from(days))
}

/// Artifacts in `entries` that the retention window no longer covers
pub fn select_expired(entries: &[RemoteEntry], now: DateTime<Utc>, days: u32) -> Vec<RemoteEntry> {
    entries
        .iter()
        .filter(|entry| is_artifact_name(&entry.name))
        .filter(|entry| is_expired(entry.modified, now, days))
        .cloned()
        .collect()
}

/// Runs one retention pass against a backend. Failures are logged, never propagated.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPruner {
    days: u32,
}

impl RetentionPruner {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// Returns false when the pass failed
    pub fn run(&self, backend: &dyn StorageBackend) -> bool {
        info!(
            "Deleting backups older than {} days from {} storage...",
            self.days,
            backend.name()
        );

        match backend.prune(self.days) {
            Ok(PruneOutcome::Pruned { deleted }) => {
                for name in &deleted {
                    info!("Deleted old backup: {}", name);
                }
                info!("Deleting old backups...done ({} removed)", deleted.len());
                true
            }
            Ok(PruneOutcome::Unsupported) => {
                info!("Pruning is not supported by {} storage, skipping", backend.name());
                true
            }
            Err(e) => {
                error!("Failed to delete old backups: {}", e);
                false
            }
        }
    }
}
