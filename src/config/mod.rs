//! Configuration module for volume-backup
//!
//! Job configuration is resolved from command line flags and environment variables.
//! There is no configuration file.
//!
//! ## Precedence
//!
//! For every setting the first present value wins:
//! 1. Command line flag
//! 2. Specific environment variable
//! 3. Generic fallback variable
//! 4. Built-in default
//!
//! Empty variables count as unset.
//!
//! ## Example Usage
//!
//! ```no_run
//! use volume_backup::config::{self, BackupOverrides, ProcessEnv};
//!
//! let job = config::resolve_backup_config(&BackupOverrides::default(), &ProcessEnv)?;
//! println!("Storage: {}, encryption: {}", job.storage, job.encryption());
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{
    check_env_vars, first_of, lookup, parse_bool, resolve_backend, resolve_backup_config,
    resolve_paths, resolve_restore_config, resolve_storage, ConfigError, EnvSource, ProcessEnv,
    Result, FTP_VARS, S3_VARS, SSH_VARS,
};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
