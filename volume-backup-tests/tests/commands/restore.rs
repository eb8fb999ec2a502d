//! Tests for the 'restore' command
//!
//! A restore downloads an artifact, decrypts it when needed and extracts it into the
//! data volume.

use std::sync::Arc;
use test_utils::{
    assert_sample_tree, sample_archive, JobKind, MockStorage, OptionAssertions,
    RecordingNotifier, StorageCall, TestContext, RESTORE_FIXTURE_NAME,
};
use volume_backup::managers::restore::{RestoreError, RestoreManager};
use volume_backup::utils::crypto;

#[test]
fn test_restore_fixture_backup() {
    let ctx = TestContext::new();
    let archive = sample_archive(&ctx.create_subdir("remote"), RESTORE_FIXTURE_NAME);
    let storage = MockStorage::new().with_file(&archive);

    let notifier = RecordingNotifier::new();
    let manager = RestoreManager::new(
        ctx.env().file(RESTORE_FIXTURE_NAME).restore_config(),
        Arc::new(notifier.clone()),
    );

    let report = manager.run_with_backend(&storage).unwrap();
    assert_eq!(report.entries, 4);
    assert_sample_tree(&ctx.data_dir());
    assert!(ctx.workspace_is_clean());

    let outcome = notifier.last().assert_some();
    assert_eq!(outcome.job, JobKind::Restore);
    assert!(outcome.is_success());
    assert_eq!(outcome.size, report.size);
}

#[test]
fn test_restore_encrypted_backup() {
    let ctx = TestContext::new();
    let archive = sample_archive(&ctx.create_subdir("remote"), RESTORE_FIXTURE_NAME);
    let encrypted = crypto::encrypt(&archive, "pw").unwrap();
    let storage = MockStorage::new().with_file(&encrypted);

    let name = format!("{}.gpg", RESTORE_FIXTURE_NAME);
    let manager = RestoreManager::new(
        ctx.env().file(&name).passphrase("pw").restore_config(),
        Arc::new(RecordingNotifier::new()),
    );

    manager.run_with_backend(&storage).unwrap();
    assert_sample_tree(&ctx.data_dir());
}

#[test]
fn test_encrypted_backup_without_passphrase() {
    let ctx = TestContext::new();
    let name = format!("{}.gpg", RESTORE_FIXTURE_NAME);
    let storage = MockStorage::new().with_object(&name, b"ciphertext", 0);

    let notifier = RecordingNotifier::new();
    let manager = RestoreManager::new(
        ctx.env().file(&name).restore_config(),
        Arc::new(notifier.clone()),
    );

    let err = manager.run_with_backend(&storage).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RestoreError>(),
        Some(RestoreError::PassphraseRequired(_))
    ));
    assert!(storage.calls().is_empty());
    assert!(!ctx.data_dir().exists());
    assert!(!notifier.last().assert_some().is_success());
}

#[test]
fn test_restore_missing_backup() {
    let ctx = TestContext::new();
    let storage = MockStorage::new();
    let manager = RestoreManager::new(
        ctx.env().file(RESTORE_FIXTURE_NAME).restore_config(),
        Arc::new(RecordingNotifier::new()),
    );

    let err = manager.run_with_backend(&storage).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RestoreError>(),
        Some(RestoreError::NotFound { .. })
    ));
    assert_eq!(
        storage.calls(),
        vec![StorageCall::Download {
            name: RESTORE_FIXTURE_NAME.to_string()
        }]
    );
}

#[test]
fn test_download_failure_is_fatal() {
    let ctx = TestContext::new();
    let storage = MockStorage::new().with_failing_download();
    let manager = RestoreManager::new(
        ctx.env().file(RESTORE_FIXTURE_NAME).restore_config(),
        Arc::new(RecordingNotifier::new()),
    );

    let err = manager.run_with_backend(&storage).unwrap_err();
    assert!(format!("{:#}", err).contains("simulated download failure"));
    assert!(ctx.workspace_is_clean());
}
