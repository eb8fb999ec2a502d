//! Fluent API for building test environments
//!
//! Configuration comes from environment variables, so tests describe a job as a map of
//! variables and resolve it through the same code path as the binary.

use std::collections::HashMap;
use std::path::Path;
use volume_backup::config::{
    resolve_backup_config, resolve_restore_config, BackupJobConfig, BackupOverrides,
    ConfigError, RestoreJobConfig, RestoreOverrides,
};

/// Builder for an in-memory environment
#[derive(Debug, Clone, Default)]
pub struct EnvBuilder {
    vars: HashMap<String, String>,
}

impl EnvBuilder {
    /// Empty environment, every setting at its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment whose data, workspace and local destination live below `root`
    pub fn rooted(root: &Path) -> Self {
        Self::new()
            .var("DATA_PATH", &root.join("data").to_string_lossy())
            .var("WORKSPACE_PATH", &root.join("workspace").to_string_lossy())
            .var("BACKUP_DESTINATION", &root.join("backup").to_string_lossy())
    }

    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn unset(mut self, key: &str) -> Self {
        self.vars.remove(key);
        self
    }

    pub fn storage(self, tag: &str) -> Self {
        self.var("STORAGE", tag)
    }

    pub fn file(self, name: &str) -> Self {
        self.var("FILE_NAME", name)
    }

    pub fn passphrase(self, passphrase: &str) -> Self {
        self.var("GPG_PASSPHRASE", passphrase)
    }

    pub fn data_path(self, path: &Path) -> Self {
        self.var("DATA_PATH", &path.to_string_lossy())
    }

    pub fn retention(self, days: u32) -> Self {
        self.var("BACKUP_PRUNE", "true")
            .var("BACKUP_RETENTION_DAYS", &days.to_string())
    }

    /// Complete S3 settings for a local MinIO endpoint
    pub fn s3(self, endpoint: &str, bucket: &str) -> Self {
        self.storage("s3")
            .var("AWS_S3_ENDPOINT", endpoint)
            .var("AWS_S3_BUCKET_NAME", bucket)
            .var("AWS_ACCESS_KEY", "minioadmin")
            .var("AWS_SECRET_KEY", "minioadmin")
            .var("AWS_REGION", "us-east-1")
            .var("AWS_DISABLE_SSL", "true")
    }

    /// Complete password-based SSH settings
    pub fn ssh(self, host: &str, port: u16, remote_path: &str) -> Self {
        self.storage("ssh")
            .var("SSH_HOST", host)
            .var("SSH_PORT", &port.to_string())
            .var("SSH_USER", "foo")
            .var("SSH_PASSWORD", "pass")
            .var("REMOTE_PATH", remote_path)
    }

    /// Complete FTP settings
    pub fn ftp(self, host: &str, port: u16, remote_path: &str) -> Self {
        self.storage("ftp")
            .var("FTP_HOST", host)
            .var("FTP_PORT", &port.to_string())
            .var("FTP_USER", "foo")
            .var("FTP_PASSWORD", "pass")
            .var("REMOTE_PATH", remote_path)
    }

    /// Enable both notification channels with dummy credentials
    pub fn notifications(self) -> Self {
        self.var("MAIL_HOST", "smtp.example.org")
            .var("MAIL_PORT", "587")
            .var("MAIL_USERNAME", "mailer")
            .var("MAIL_PASSWORD", "secret")
            .var("MAIL_FROM", "backup@example.org")
            .var("MAIL_TO", "ops@example.org, dev@example.org")
            .var("TG_TOKEN", "123:abc")
            .var("TG_CHAT_ID", "42")
    }

    pub fn build(self) -> HashMap<String, String> {
        self.vars
    }

    pub fn try_backup_config(&self, overrides: &BackupOverrides) -> Result<BackupJobConfig, ConfigError> {
        resolve_backup_config(overrides, &self.vars)
    }

    pub fn try_restore_config(&self, overrides: &RestoreOverrides) -> Result<RestoreJobConfig, ConfigError> {
        resolve_restore_config(overrides, &self.vars)
    }

    /// Resolve a backup job with no command line overrides
    pub fn backup_config(&self) -> BackupJobConfig {
        self.try_backup_config(&BackupOverrides::default())
            .expect("backup config should resolve")
    }

    /// Resolve a restore job with no command line overrides
    pub fn restore_config(&self) -> RestoreJobConfig {
        self.try_restore_config(&RestoreOverrides::default())
            .expect("restore config should resolve")
    }
}
