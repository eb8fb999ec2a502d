//! S3 integration tests against MinIO

use super::common::*;
use serial_test::serial;
use test_utils::TestContext;

const CONTAINER: &str = "volume-backup-test-minio";
const PORT: u16 = 19000;
const BUCKET: &str = "backups";

fn start_minio() -> anyhow::Result<ContainerGuard> {
    let guard = start_container(
        CONTAINER,
        &[
            "-p",
            &format!("{}:9000", PORT),
            "-e",
            "MINIO_ROOT_USER=minioadmin",
            "-e",
            "MINIO_ROOT_PASSWORD=minioadmin",
            "minio/minio",
            "server",
            "/data",
        ],
    )?;
    wait_for_port(PORT)?;
    docker_exec(
        CONTAINER,
        &format!(
            "mc alias set local http://127.0.0.1:9000 minioadmin minioadmin && mc mb local/{}",
            BUCKET
        ),
    )?;
    Ok(guard)
}

fn endpoint() -> String {
    format!("http://127.0.0.1:{}", PORT)
}

#[test]
#[ignore]
#[serial]
fn test_s3_encrypted_round_trip() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_minio().expect("Failed to start MinIO");

    let ctx = TestContext::new();
    let backend = ctx
        .env()
        .s3(&endpoint(), BUCKET)
        .var("AWS_S3_PATH", "volumes")
        .passphrase("integration");

    let report = backup_sample(&ctx, backend.clone()).expect("Backup failed");
    assert!(report.file_name.ends_with(".tar.gz.gpg"));
    assert_eq!(
        report.location,
        format!("s3://{}/volumes/{}", BUCKET, report.file_name)
    );

    let listing = docker_exec(CONTAINER, &format!("mc ls local/{}/volumes/", BUCKET)).unwrap();
    assert!(listing.contains(&report.file_name));

    restore_and_verify(&ctx, backend, &report.file_name).expect("Restore failed");
}

#[test]
#[ignore]
#[serial]
fn test_s3_prune_keeps_fresh_backups() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_minio().expect("Failed to start MinIO");

    let ctx = TestContext::new();
    let backend = ctx.env().s3(&endpoint(), BUCKET).retention(1);

    let first = backup_sample(&ctx, backend.clone()).expect("First backup failed");
    std::thread::sleep(std::time::Duration::from_secs(1));
    let second = backup_sample(&ctx, backend).expect("Second backup failed");

    let listing = docker_exec(CONTAINER, &format!("mc ls local/{}/", BUCKET)).unwrap();
    assert!(listing.contains(&first.file_name));
    assert!(listing.contains(&second.file_name));
}

#[test]
#[ignore]
#[serial]
fn test_s3_restore_missing_object() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping test");
        return;
    }
    let _guard = start_minio().expect("Failed to start MinIO");

    let ctx = TestContext::new();
    let result = restore_and_verify(&ctx, ctx.env().s3(&endpoint(), BUCKET), "missing.tar.gz");
    assert!(result.is_err());
}
