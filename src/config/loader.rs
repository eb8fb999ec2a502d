use super::types::*;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables for {backend} storage: {}", missing.join(", "))]
    MissingVariables {
        backend: StorageKind,
        missing: Vec<String>,
    },

    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("A file name is required, set --file or FILE_NAME")]
    MissingFile,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Variables required by the S3 backend
pub const S3_VARS: &[&str] = &[
    "AWS_S3_ENDPOINT",
    "AWS_S3_BUCKET_NAME",
    "AWS_ACCESS_KEY",
    "AWS_SECRET_KEY",
    "AWS_REGION",
];

/// Variables required by the SSH backend (REMOTE_PATH may also come from --path)
pub const SSH_VARS: &[&str] = &["SSH_USER", "SSH_HOST", "SSH_PORT", "REMOTE_PATH"];

/// Variables required by the FTP backend (REMOTE_PATH may also come from --path)
pub const FTP_VARS: &[&str] = &["FTP_HOST", "FTP_USER", "FTP_PASSWORD", "FTP_PORT", "REMOTE_PATH"];

/// Source of environment variables
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Read a variable, treating empty values as unset
pub fn lookup(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|v| !v.trim().is_empty())
}

/// First non-empty value among `keys`
pub fn first_of(env: &dyn EnvSource, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| lookup(env, key))
}

/// Return the subset of `keys` that are unset or empty
pub fn check_env_vars(env: &dyn EnvSource, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter(|key| lookup(env, key).is_none())
        .map(|key| key.to_string())
        .collect()
}

/// Parse a boolean flag value (true/1/yes, false/0/no)
pub fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_port(name: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|port| *port > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a TCP port".to_string(),
        })
}

fn parse_days(name: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|days| *days > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a number of days greater than zero".to_string(),
        })
}

fn optional_bool(env: &dyn EnvSource, name: &str, default: bool) -> Result<bool> {
    match lookup(env, name) {
        Some(value) => parse_bool(name, &value),
        None => Ok(default),
    }
}

/// Resolve the filesystem layout (defaults can be moved through the environment)
pub fn resolve_paths(env: &dyn EnvSource) -> Paths {
    let defaults = Paths::default();
    Paths {
        data: lookup(env, "DATA_PATH").map(PathBuf::from).unwrap_or(defaults.data),
        workspace: lookup(env, "WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace),
        backup_destination: lookup(env, "BACKUP_DESTINATION")
            .map(PathBuf::from)
            .unwrap_or(defaults.backup_destination),
    }
}

/// Resolve the storage kind: flag > STORAGE > local. Unknown tags fall back to local.
pub fn resolve_storage(flag: Option<&str>, env: &dyn EnvSource) -> StorageKind {
    let tag = flag
        .filter(|f| !f.trim().is_empty())
        .map(str::to_string)
        .or_else(|| lookup(env, "STORAGE"));

    match tag {
        None => StorageKind::Local,
        Some(tag) => StorageKind::from_tag(&tag).unwrap_or_else(|| {
            warn!("Unknown storage type '{}', falling back to local storage", tag);
            StorageKind::Local
        }),
    }
}

/// Resolve the remote path: flag > kind-specific variables
fn resolve_remote_path(kind: StorageKind, flag: Option<&str>, env: &dyn EnvSource) -> String {
    if let Some(path) = flag.filter(|p| !p.trim().is_empty()) {
        return path.to_string();
    }

    let keys: &[&str] = match kind {
        StorageKind::S3 => &["AWS_S3_PATH", "REMOTE_PATH"],
        _ => &["REMOTE_PATH", "SSH_REMOTE_PATH"],
    };
    first_of(env, keys).unwrap_or_default()
}

/// Collect missing variables, counting REMOTE_PATH as present when resolved from a flag
fn missing_vars(env: &dyn EnvSource, keys: &[&str], remote_path: &str) -> Vec<String> {
    check_env_vars(env, keys)
        .into_iter()
        .filter(|key| !(key == "REMOTE_PATH" && !remote_path.is_empty()))
        .collect()
}

/// Resolve the credential record of one backend, failing fast on missing variables
pub fn resolve_backend(
    kind: StorageKind,
    env: &dyn EnvSource,
    remote_path: &str,
    paths: &Paths,
    bucket_fallback: bool,
) -> Result<BackendConfig> {
    match kind {
        StorageKind::Local => Ok(BackendConfig::Local(LocalConfig {
            destination: paths.backup_destination.clone(),
        })),

        StorageKind::S3 => {
            let bucket_keys: &[&str] = if bucket_fallback {
                &["AWS_S3_BUCKET_NAME", "BUCKET_NAME"]
            } else {
                &["AWS_S3_BUCKET_NAME"]
            };
            let bucket = first_of(env, bucket_keys);

            let mut missing: Vec<String> = check_env_vars(env, S3_VARS)
                .into_iter()
                .filter(|key| !(key == "AWS_S3_BUCKET_NAME" && bucket.is_some()))
                .collect();
            if !missing.is_empty() {
                missing.sort();
                return Err(ConfigError::MissingVariables {
                    backend: kind,
                    missing,
                });
            }

            Ok(BackendConfig::S3(S3Config {
                endpoint: lookup(env, "AWS_S3_ENDPOINT").unwrap_or_default(),
                bucket: bucket.unwrap_or_default(),
                access_key: Secret::new(lookup(env, "AWS_ACCESS_KEY").unwrap_or_default()),
                secret_key: Secret::new(lookup(env, "AWS_SECRET_KEY").unwrap_or_default()),
                region: lookup(env, "AWS_REGION").unwrap_or_default(),
                disable_ssl: optional_bool(env, "AWS_DISABLE_SSL", false)?,
                force_path_style: optional_bool(env, "AWS_FORCE_PATH_STYLE", true)?,
                remote_path: remote_path.to_string(),
            }))
        }

        StorageKind::Ssh => {
            let mut missing = missing_vars(env, SSH_VARS, remote_path);
            let password = lookup(env, "SSH_PASSWORD");
            let identify_file = lookup(env, "SSH_IDENTIFY_FILE");
            if password.is_none() && identify_file.is_none() {
                missing.push("SSH_PASSWORD or SSH_IDENTIFY_FILE".to_string());
            }
            if !missing.is_empty() {
                return Err(ConfigError::MissingVariables {
                    backend: kind,
                    missing,
                });
            }

            let port = lookup(env, "SSH_PORT").unwrap_or_default();
            Ok(BackendConfig::Ssh(SshConfig {
                host: lookup(env, "SSH_HOST").unwrap_or_default(),
                port: parse_port("SSH_PORT", &port)?,
                user: lookup(env, "SSH_USER").unwrap_or_default(),
                password: password.map(Secret::new),
                identify_file: identify_file.map(PathBuf::from),
                remote_path: remote_path.to_string(),
            }))
        }

        StorageKind::Ftp => {
            let missing = missing_vars(env, FTP_VARS, remote_path);
            if !missing.is_empty() {
                return Err(ConfigError::MissingVariables {
                    backend: kind,
                    missing,
                });
            }

            let port = lookup(env, "FTP_PORT").unwrap_or_default();
            Ok(BackendConfig::Ftp(FtpConfig {
                host: lookup(env, "FTP_HOST").unwrap_or_default(),
                port: parse_port("FTP_PORT", &port)?,
                user: lookup(env, "FTP_USER").unwrap_or_default(),
                password: Secret::new(lookup(env, "FTP_PASSWORD").unwrap_or_default()),
                remote_path: remote_path.to_string(),
            }))
        }
    }
}

fn resolve_retention(overrides: &BackupOverrides, env: &dyn EnvSource) -> Result<Option<u32>> {
    let enabled = overrides.prune
        || overrides.keep_last.is_some()
        || optional_bool(env, "BACKUP_PRUNE", false)?;
    if !enabled {
        return Ok(None);
    }

    let days = match overrides.keep_last {
        Some(days) => parse_days("--keep-last", &days.to_string())?,
        None => match lookup(env, "BACKUP_RETENTION_DAYS") {
            Some(value) => parse_days("BACKUP_RETENTION_DAYS", &value)?,
            None => DEFAULT_RETENTION_DAYS,
        },
    };
    Ok(Some(days))
}

/// Merge `backup` flags with the environment into a validated job config
pub fn resolve_backup_config(
    overrides: &BackupOverrides,
    env: &dyn EnvSource,
) -> Result<BackupJobConfig> {
    let paths = resolve_paths(env);
    let storage = resolve_storage(overrides.storage.as_deref(), env);
    let remote_path = resolve_remote_path(storage, overrides.path.as_deref(), env);
    let backend = resolve_backend(storage, env, &remote_path, &paths, false)?;

    let file = overrides
        .file
        .clone()
        .filter(|f| !f.trim().is_empty())
        .or_else(|| lookup(env, "FILE_NAME"));
    let source = match file {
        Some(name) => Source::File(name),
        None => Source::Folder,
    };

    let cron_expression = overrides
        .cron_expression
        .clone()
        .filter(|c| !c.trim().is_empty())
        .or_else(|| lookup(env, "BACKUP_CRON_EXPRESSION"))
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    let config = BackupJobConfig {
        storage,
        backend,
        source,
        remote_path,
        prefix: lookup(env, "BACKUP_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        cron_expression,
        retention_days: resolve_retention(overrides, env)?,
        passphrase: lookup(env, "GPG_PASSPHRASE").map(Secret::new),
        reference: lookup(env, "BACKUP_REFERENCE"),
        paths,
    };

    debug!(
        "Resolved backup config: storage={}, folder={}, encryption={}, retention={:?}",
        config.storage,
        config.from_folder(),
        config.encryption(),
        config.retention_days
    );
    Ok(config)
}

/// Merge `restore` flags with the environment into a validated job config
pub fn resolve_restore_config(
    overrides: &RestoreOverrides,
    env: &dyn EnvSource,
) -> Result<RestoreJobConfig> {
    let file = overrides
        .file
        .clone()
        .filter(|f| !f.trim().is_empty())
        .or_else(|| lookup(env, "FILE_NAME"))
        .ok_or(ConfigError::MissingFile)?;

    let paths = resolve_paths(env);
    let storage = resolve_storage(overrides.storage.as_deref(), env);
    let remote_path = resolve_remote_path(storage, overrides.path.as_deref(), env);
    let backend = resolve_backend(storage, env, &remote_path, &paths, true)?;

    Ok(RestoreJobConfig {
        storage,
        backend,
        remote_path,
        file,
        passphrase: lookup(env, "GPG_PASSPHRASE").map(Secret::new),
        reference: lookup(env, "BACKUP_REFERENCE"),
        paths,
    })
}

fn export_var(key: &str, value: &str) {
    if !value.is_empty() {
        std::env::set_var(key, value);
    }
}

impl BackupJobConfig {
    /// Publish resolved values back into the process environment
    pub fn export_env(&self) {
        export_var("STORAGE", self.storage.as_str());
        export_var("REMOTE_PATH", &self.remote_path);
        export_var("BACKUP_CRON_EXPRESSION", &self.cron_expression);
        export_var("STORAGE_PATH", &self.paths.backup_destination.to_string_lossy());
        if let Source::File(name) = &self.source {
            export_var("FILE_NAME", name);
        }
    }
}

impl RestoreJobConfig {
    /// Publish resolved values back into the process environment
    pub fn export_env(&self) {
        export_var("STORAGE", self.storage.as_str());
        export_var("REMOTE_PATH", &self.remote_path);
        export_var("FILE_NAME", &self.file);
        export_var("STORAGE_PATH", &self.paths.backup_destination.to_string_lossy());
    }
}
