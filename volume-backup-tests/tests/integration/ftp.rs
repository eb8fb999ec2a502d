//! FTP integration tests

use super::common::*;
use serial_test::serial;
use test_utils::TestContext;

const CONTAINER: &str = "volume-backup-test-ftp";
const PORT: u16 = 12121;

fn start_ftp() -> anyhow::Result<ContainerGuard> {
    let guard = start_container(
        CONTAINER,
        &[
            "-p",
            &format!("{}:21", PORT),
            "-p",
            "21000-21010:21000-21010",
            "-e",
            "USERS=foo|pass",
            "-e",
            "ADDRESS=127.0.0.1",
            "delfer/alpine-ftp-server",
        ],
    )?;
    wait_for_port(PORT)?;
    Ok(guard)
}

#[test]
#[ignore]
#[serial]
fn test_ftp_encrypted_round_trip() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_ftp().expect("Failed to start FTP server");

    let ctx = TestContext::new();
    let backend = ctx
        .env()
        .ftp("127.0.0.1", PORT, "/volumes/nightly")
        .passphrase("integration");

    let report = backup_sample(&ctx, backend.clone()).expect("Backup failed");
    assert_eq!(
        report.location,
        format!("ftp://127.0.0.1:{}/volumes/nightly/{}", PORT, report.file_name)
    );

    restore_and_verify(&ctx, backend, &report.file_name).expect("Restore failed");
}

#[test]
#[ignore]
#[serial]
fn test_ftp_prune_is_skipped() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_ftp().expect("Failed to start FTP server");

    let ctx = TestContext::new();
    let backend = ctx.env().ftp("127.0.0.1", PORT, "/volumes").retention(1);

    // Unsupported prune is logged, the backup itself succeeds
    assert!(backup_sample(&ctx, backend).is_ok());
}
