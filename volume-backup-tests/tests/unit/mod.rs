//! Unit tests for volume-backup
//!
//! These tests exercise individual stages through the public library API.

mod config;
mod crypto;
mod retention;
