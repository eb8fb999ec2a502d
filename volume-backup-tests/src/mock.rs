//! In-memory storage backend and recording notifier
//!
//! Both record every call so tests can assert on the pipeline's interaction with its
//! collaborators without touching a network.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use volume_backup::managers::notification::{NotificationOutcome, Notifier};
use volume_backup::storage::{
    select_expired, PruneOutcome, RemoteEntry, Result, StorageBackend, StorageError,
};

const NAME: &str = "mock";

/// Recorded backend call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageCall {
    Upload { name: String },
    Download { name: String },
    Prune { days: u32 },
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Storage backend keeping objects in memory
#[derive(Clone, Default)]
pub struct MockStorage {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    calls: Arc<Mutex<Vec<StorageCall>>>,
    fail_upload: Arc<Mutex<bool>>,
    fail_download: Arc<Mutex<bool>>,
    fail_prune: Arc<Mutex<bool>>,
    prune_unsupported: Arc<Mutex<bool>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object modified `age_days` ago
    pub fn with_object(self, name: &str, data: &[u8], age_days: i64) -> Self {
        self.objects.lock().insert(
            name.to_string(),
            StoredObject {
                data: data.to_vec(),
                modified: Utc::now() - Duration::days(age_days),
            },
        );
        self
    }

    /// Store the contents of a local file under its file name
    pub fn with_file(self, path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let data = fs::read(path).unwrap_or_default();
        self.with_object(&name, &data, 0)
    }

    pub fn with_failing_upload(self) -> Self {
        *self.fail_upload.lock() = true;
        self
    }

    pub fn with_failing_download(self) -> Self {
        *self.fail_download.lock() = true;
        self
    }

    pub fn with_failing_prune(self) -> Self {
        *self.fail_prune.lock() = true;
        self
    }

    /// Behave like a backend that cannot list modification times
    pub fn without_prune_support(self) -> Self {
        *self.prune_unsupported.lock() = true;
        self
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.calls.lock().clone()
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StorageCall::Upload { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(name).map(|o| o.data.clone())
    }

    fn record(&self, call: StorageCall) {
        self.calls.lock().push(call);
    }
}

impl StorageBackend for MockStorage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn location(&self, file_name: &str) -> String {
        format!("mock://{}", file_name)
    }

    fn upload(&self, local_path: &Path) -> Result<()> {
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(StorageCall::Upload { name: name.clone() });

        if *self.fail_upload.lock() {
            return Err(StorageError::Transfer {
                backend: NAME,
                message: "simulated upload failure".to_string(),
            });
        }

        let data = fs::read(local_path).map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        self.objects.lock().insert(
            name,
            StoredObject {
                data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn download(&self, remote_name: &str, local_dir: &Path) -> Result<PathBuf> {
        self.record(StorageCall::Download {
            name: remote_name.to_string(),
        });

        if *self.fail_download.lock() {
            return Err(StorageError::Connection {
                backend: NAME,
                message: "simulated download failure".to_string(),
            });
        }

        let data = self
            .object(remote_name)
            .ok_or_else(|| StorageError::NotFound {
                backend: NAME,
                name: remote_name.to_string(),
            })?;

        let target = local_dir.join(remote_name);
        fs::create_dir_all(local_dir)
            .and_then(|_| fs::write(&target, data))
            .map_err(|source| StorageError::Io {
                path: target.clone(),
                source,
            })?;
        Ok(target)
    }

    fn prune(&self, retention_days: u32) -> Result<PruneOutcome> {
        self.record(StorageCall::Prune {
            days: retention_days,
        });

        if *self.prune_unsupported.lock() {
            return Ok(PruneOutcome::Unsupported);
        }
        if *self.fail_prune.lock() {
            return Err(StorageError::Connection {
                backend: NAME,
                message: "simulated prune failure".to_string(),
            });
        }

        let mut objects = self.objects.lock();
        let entries: Vec<RemoteEntry> = objects
            .iter()
            .map(|(name, object)| RemoteEntry {
                name: name.clone(),
                modified: object.modified,
            })
            .collect();

        let deleted: Vec<String> = select_expired(&entries, Utc::now(), retention_days)
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        for name in &deleted {
            objects.remove(name);
        }

        Ok(PruneOutcome::Pruned { deleted })
    }
}

/// Notifier that keeps every outcome it receives
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    outcomes: Arc<Mutex<Vec<NotificationOutcome>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<NotificationOutcome> {
        self.outcomes.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub fn last(&self) -> Option<NotificationOutcome> {
        self.outcomes.lock().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, outcome: &NotificationOutcome) {
        self.outcomes.lock().push(outcome.clone());
    }
}
