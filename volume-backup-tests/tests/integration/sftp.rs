//! SSH/SFTP integration tests against an OpenSSH server

use super::common::*;
use serial_test::serial;
use test_utils::TestContext;

const CONTAINER: &str = "volume-backup-test-sftp";
const PORT: u16 = 12222;
const REMOTE_PATH: &str = "/upload/backups";

fn start_sftp() -> anyhow::Result<ContainerGuard> {
    let guard = start_container(
        CONTAINER,
        &[
            "-p",
            &format!("{}:22", PORT),
            "atmoz/sftp",
            "foo:pass:::upload",
        ],
    )?;
    wait_for_port(PORT)?;
    Ok(guard)
}

#[test]
#[ignore]
#[serial]
fn test_sftp_round_trip() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_sftp().expect("Failed to start SFTP server");

    let ctx = TestContext::new();
    let backend = ctx.env().ssh("127.0.0.1", PORT, REMOTE_PATH);

    let report = backup_sample(&ctx, backend.clone()).expect("Backup failed");
    let listing = docker_exec(CONTAINER, "ls /home/foo/upload/backups").unwrap();
    assert!(listing.contains(&report.file_name));

    restore_and_verify(&ctx, backend, &report.file_name).expect("Restore failed");
}

#[test]
#[ignore]
#[serial]
fn test_sftp_prune_removes_expired_backups() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_sftp().expect("Failed to start SFTP server");

    let ctx = TestContext::new();
    let backend = ctx.env().ssh("127.0.0.1", PORT, REMOTE_PATH);
    backup_sample(&ctx, backend.clone()).expect("Seeding backup failed");

    // Age everything uploaded so far, then add an unrelated file
    docker_exec(
        CONTAINER,
        "cd /home/foo/upload/backups && mv *.tar.gz backup_20200101_000000.tar.gz \
         && touch -d '2020-01-01' backup_20200101_000000.tar.gz \
         && touch -d '2020-01-01' notes.txt",
    )
    .unwrap();

    let report = backup_sample(&ctx, backend.retention(7)).expect("Backup failed");

    let listing = docker_exec(CONTAINER, "ls /home/foo/upload/backups").unwrap();
    assert!(!listing.contains("backup_20200101_000000.tar.gz"));
    assert!(listing.contains("notes.txt"));
    assert!(listing.contains(&report.file_name));
}

#[test]
#[ignore]
#[serial]
fn test_sftp_wrong_password_fails() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_sftp().expect("Failed to start SFTP server");

    let ctx = TestContext::new();
    let backend = ctx
        .env()
        .ssh("127.0.0.1", PORT, REMOTE_PATH)
        .var("SSH_PASSWORD", "wrong");
    assert!(backup_sample(&ctx, backend).is_err());
}
