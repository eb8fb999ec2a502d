//! Integration tests for volume-backup
//!
//! These tests require Docker and exercise the remote backends against real servers.
//! Run with: `cargo test -p volume-backup-tests --test integration -- --ignored`

mod common;
mod ftp;
mod s3;
mod sftp;
