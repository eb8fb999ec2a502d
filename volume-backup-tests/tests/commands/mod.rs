//! Command tests for volume-backup
//!
//! These tests drive the backup, restore and scheduling flows with mocked storage.

mod backup;
mod restore;
mod scheduler;
