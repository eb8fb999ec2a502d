//! Volume Backup Library
//!
//! Backs up a single data volume into a compressed, optionally encrypted archive, ships it
//! to local, S3, SSH or FTP storage, prunes old artifacts and reports the outcome.

pub mod config;
pub mod managers;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::{resolve_backup_config, resolve_restore_config, BackupJobConfig, RestoreJobConfig};
pub use managers::backup::{BackupManager, BackupReport};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::notification::{NotificationManager, NotificationOutcome, Notifier};
pub use managers::restore::{RestoreError, RestoreManager, RestoreReport};
pub use managers::scheduler::{Mode, ScheduleError, Scheduler};
pub use storage::StorageBackend;
