//! Test utilities for volume-backup
//!
//! This crate provides shared test utilities, mock implementations,
//! and helper functions for testing the volume-backup pipelines.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{MockStorage, RecordingNotifier, TestContext};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::new();
//!     ctx.create_data_file("app.db", "rows");
//!     let config = ctx.env().file("app.db").backup_config();
//!     // ... test code
//! }
//! ```

pub mod env_builder;
pub mod fixtures;
pub mod mock;
pub mod test_context;

// Re-export commonly used items
pub use env_builder::EnvBuilder;
pub use fixtures::*;
pub use mock::{MockStorage, RecordingNotifier, StorageCall};
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use volume_backup::config::{BackupJobConfig, RestoreJobConfig, Source, StorageKind};
pub use volume_backup::managers::notification::{JobKind, NotificationOutcome, Notifier};
pub use volume_backup::storage::{PruneOutcome, StorageBackend, StorageError};

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
