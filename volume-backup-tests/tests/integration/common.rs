//! Common utilities for integration tests
//!
//! This module provides cleanup guards and helper functions for integration tests.

use anyhow::Result;
use std::net::TcpStream;
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use test_utils::{assert_sample_tree, sample_tree, EnvBuilder, TestContext};
use volume_backup::managers::backup::{BackupManager, BackupReport};
use volume_backup::managers::notification::NotificationManager;
use volume_backup::managers::restore::RestoreManager;

/// Guard that ensures Docker container cleanup on drop (even on panic)
pub struct ContainerGuard {
    name: String,
}

impl ContainerGuard {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        cleanup_container(&self.name);
    }
}

/// Helper to stop and remove a Docker container
/// The -v flag also removes anonymous volumes associated with the container
fn cleanup_container(name: &str) {
    let _ = Command::new("docker").args(["stop", name]).output();
    let _ = Command::new("docker").args(["rm", "-v", name]).output();
}

/// Helper to check if Docker is available
pub fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Start a detached container, removing a leftover one with the same name first
pub fn start_container(name: &str, args: &[&str]) -> Result<ContainerGuard> {
    cleanup_container(name);

    let output = Command::new("docker")
        .args(["run", "-d", "--name", name])
        .args(args)
        .output()?;
    if !output.status.success() {
        anyhow::bail!(
            "Failed to start container {}: {}",
            name,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(ContainerGuard::new(name))
}

/// Wait until something accepts connections on `127.0.0.1:port`
pub fn wait_for_port(port: u16) -> Result<()> {
    for _ in 0..60 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            // Servers accept before they finish booting
            thread::sleep(Duration::from_secs(2));
            return Ok(());
        }
        thread::sleep(Duration::from_millis(500));
    }
    Err(anyhow::anyhow!("Port {} did not open in time", port))
}

/// Run a shell command inside a container
pub fn docker_exec(container: &str, script: &str) -> Result<String> {
    let output = Command::new("docker")
        .args(["exec", container, "sh", "-c", script])
        .output()?;
    if !output.status.success() {
        anyhow::bail!(
            "docker exec failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Back up the sample tree through `backend`
pub fn backup_sample(ctx: &TestContext, backend: EnvBuilder) -> Result<BackupReport> {
    sample_tree(&ctx.data_dir());
    let config = backend.data_path(&ctx.data_dir()).backup_config();
    BackupManager::new(config, Arc::new(NotificationManager::disabled())).run()
}

/// Restore `file_name` through `backend` into a fresh data volume and check it
pub fn restore_and_verify(ctx: &TestContext, backend: EnvBuilder, file_name: &str) -> Result<()> {
    let target = ctx.create_subdir("restored");
    let config = backend.data_path(&target).file(file_name).restore_config();

    let report = RestoreManager::new(config, Arc::new(NotificationManager::disabled())).run()?;
    assert_eq!(report.entries, 4);
    assert_sample_tree(&target);
    Ok(())
}
