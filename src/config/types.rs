use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Data root mounted by the caller
pub const DEFAULT_DATA_PATH: &str = "/data";
/// Scratch area for staged copies and produced artifacts
pub const DEFAULT_WORKSPACE_PATH: &str = "/tmp/backup";
/// Destination root of the local backend
pub const DEFAULT_BACKUP_DESTINATION: &str = "/backup";
pub const DEFAULT_PREFIX: &str = "backup";
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
    Ssh,
    Ftp,
}

impl StorageKind {
    /// Parse a storage tag. Unknown tags return `None`; the resolver maps them to `Local`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "local" => Some(StorageKind::Local),
            "s3" => Some(StorageKind::S3),
            "ssh" | "remote" => Some(StorageKind::Ssh),
            "ftp" => Some(StorageKind::Ftp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::S3 => "s3",
            StorageKind::Ssh => "ssh",
            StorageKind::Ftp => "ftp",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential that never shows up in `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Filesystem layout used by a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root of the volume being backed up or restored into
    pub data: PathBuf,
    /// Workspace root (artifacts and staging live below it)
    pub workspace: PathBuf,
    /// Destination root for the local backend
    pub backup_destination: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            data: PathBuf::from(DEFAULT_DATA_PATH),
            workspace: PathBuf::from(DEFAULT_WORKSPACE_PATH),
            backup_destination: PathBuf::from(DEFAULT_BACKUP_DESTINATION),
        }
    }
}

/// What a backup job archives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A single file, relative to the data root
    File(String),
    /// The whole data root
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: Secret,
    pub secret_key: Secret,
    pub region: String,
    pub disable_ssl: bool,
    pub force_path_style: bool,
    /// Key prefix inside the bucket
    pub remote_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<Secret>,
    pub identify_file: Option<PathBuf>,
    pub remote_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    pub remote_path: String,
}

/// Resolved connection settings for the selected backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Local(LocalConfig),
    S3(S3Config),
    Ssh(SshConfig),
    Ftp(FtpConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> StorageKind {
        match self {
            BackendConfig::Local(_) => StorageKind::Local,
            BackendConfig::S3(_) => StorageKind::S3,
            BackendConfig::Ssh(_) => StorageKind::Ssh,
            BackendConfig::Ftp(_) => StorageKind::Ftp,
        }
    }
}

/// Values supplied on the `backup` command line
#[derive(Debug, Clone, Default)]
pub struct BackupOverrides {
    pub storage: Option<String>,
    pub path: Option<String>,
    pub file: Option<String>,
    pub cron_expression: Option<String>,
    pub prune: bool,
    pub keep_last: Option<u32>,
}

/// Values supplied on the `restore` command line
#[derive(Debug, Clone, Default)]
pub struct RestoreOverrides {
    pub storage: Option<String>,
    pub path: Option<String>,
    pub file: Option<String>,
}

/// Fully resolved backup job. Immutable once built.
#[derive(Debug, Clone)]
pub struct BackupJobConfig {
    pub storage: StorageKind,
    pub backend: BackendConfig,
    pub source: Source,
    pub remote_path: String,
    pub prefix: String,
    /// Empty means one-shot
    pub cron_expression: String,
    /// `Some(days)` enables pruning
    pub retention_days: Option<u32>,
    pub passphrase: Option<Secret>,
    /// Free-form tag carried into notifications (`BACKUP_REFERENCE`)
    pub reference: Option<String>,
    pub paths: Paths,
}

impl BackupJobConfig {
    pub fn encryption(&self) -> bool {
        self.passphrase().is_some()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase
            .as_ref()
            .map(Secret::expose)
            .filter(|p| !p.is_empty())
    }

    pub fn from_folder(&self) -> bool {
        matches!(self.source, Source::Folder)
    }

    /// Base of the artifact name: the file name in single-file mode, the prefix otherwise
    pub fn artifact_base(&self) -> &str {
        match &self.source {
            Source::File(name) => name,
            Source::Folder => &self.prefix,
        }
    }

    /// Artifact name for a run started at `now`
    pub fn artifact_file_name(&self, now: DateTime<Local>) -> String {
        crate::utils::archive::artifact_file_name(self.artifact_base(), now)
    }
}

/// Fully resolved restore job
#[derive(Debug, Clone)]
pub struct RestoreJobConfig {
    pub storage: StorageKind,
    pub backend: BackendConfig,
    pub remote_path: String,
    /// Remote artifact to restore, never empty
    pub file: String,
    pub passphrase: Option<Secret>,
    pub reference: Option<String>,
    pub paths: Paths,
}

impl RestoreJobConfig {
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase
            .as_ref()
            .map(Secret::expose)
            .filter(|p| !p.is_empty())
    }
}
