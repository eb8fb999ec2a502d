//! Tests for the 'backup' command
//!
//! A backup archives the data volume, optionally encrypts it, uploads it and prunes.

use std::sync::Arc;
use test_utils::{
    sample_tree, MockStorage, OptionAssertions, RecordingNotifier, StorageCall, TestContext,
};
use volume_backup::managers::backup::BackupManager;
use volume_backup::utils::archive;

#[test]
fn test_backup_single_file() {
    let ctx = TestContext::new();
    ctx.create_data_file("app.db", "rows");
    ctx.create_data_file("ignored.txt", "x");

    let storage = MockStorage::new();
    let notifier = RecordingNotifier::new();
    let manager = BackupManager::new(ctx.env().file("app.db").backup_config(), Arc::new(notifier.clone()));

    let report = manager.run_with_backend(&storage).unwrap();
    assert_eq!(storage.uploaded(), vec![report.file_name.clone()]);
    assert!(report.file_name.starts_with("app.db_"));
    assert_eq!(report.location, format!("mock://{}", report.file_name));

    // Uploaded bytes are a valid archive holding only the selected file
    let local = ctx.temp_dir().join(&report.file_name);
    std::fs::write(&local, storage.object(&report.file_name).assert_some()).unwrap();
    let restored = ctx.temp_dir().join("check");
    assert_eq!(archive::extract(&local, &restored).unwrap(), 1);
    assert!(restored.join("app.db").exists());

    let outcome = notifier.last().assert_some();
    assert!(outcome.is_success());
    assert_eq!(outcome.backend, "mock");
    assert!(ctx.workspace_is_clean());
}

#[test]
fn test_backup_encrypted_folder() {
    let ctx = TestContext::new();
    sample_tree(&ctx.data_dir());

    let storage = MockStorage::new();
    let config = ctx
        .env()
        .passphrase("pw")
        .var("BACKUP_PREFIX", "volume")
        .backup_config();
    let manager = BackupManager::new(config, Arc::new(RecordingNotifier::new()));

    let report = manager.run_with_backend(&storage).unwrap();
    assert!(report.encrypted);
    assert!(report.file_name.starts_with("volume_"));
    assert!(report.file_name.ends_with(".tar.gz.gpg"));
    assert_eq!(storage.object_names(), vec![report.file_name]);
}

#[test]
fn test_backup_with_retention_prunes_after_upload() {
    let ctx = TestContext::new();
    sample_tree(&ctx.data_dir());

    let storage = MockStorage::new()
        .with_object("backup_20240101_000000.tar.gz", b"old", 30)
        .with_object("backup_20240301_000000.tar.gz", b"recent", 2);
    let manager = BackupManager::new(
        ctx.env().retention(7).backup_config(),
        Arc::new(RecordingNotifier::new()),
    );

    let report = manager.run_with_backend(&storage).unwrap();

    let calls = storage.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], StorageCall::Upload { .. }));
    assert_eq!(calls[1], StorageCall::Prune { days: 7 });

    let names = storage.object_names();
    assert!(!names.contains(&"backup_20240101_000000.tar.gz".to_string()));
    assert!(names.contains(&"backup_20240301_000000.tar.gz".to_string()));
    assert!(names.contains(&report.file_name));
}

#[test]
fn test_backup_without_retention_never_prunes() {
    let ctx = TestContext::new();
    sample_tree(&ctx.data_dir());

    let storage = MockStorage::new();
    let manager = BackupManager::new(ctx.env().backup_config(), Arc::new(RecordingNotifier::new()));
    manager.run_with_backend(&storage).unwrap();

    assert!(!storage
        .calls()
        .iter()
        .any(|c| matches!(c, StorageCall::Prune { .. })));
}

#[test]
fn test_failed_prune_keeps_backup_successful() {
    let ctx = TestContext::new();
    sample_tree(&ctx.data_dir());

    let storage = MockStorage::new().with_failing_prune();
    let notifier = RecordingNotifier::new();
    let manager = BackupManager::new(
        ctx.env().retention(3).backup_config(),
        Arc::new(notifier.clone()),
    );

    assert!(manager.run_with_backend(&storage).is_ok());
    assert!(notifier.last().assert_some().is_success());
}

#[test]
fn test_failed_upload_notifies_failure() {
    let ctx = TestContext::new();
    sample_tree(&ctx.data_dir());

    let storage = MockStorage::new().with_failing_upload();
    let notifier = RecordingNotifier::new();
    let manager = BackupManager::new(
        ctx.env().passphrase("pw").backup_config(),
        Arc::new(notifier.clone()),
    );

    let err = manager.run_with_backend(&storage).unwrap_err();
    assert!(format!("{:#}", err).contains("simulated upload failure"));

    assert_eq!(notifier.count(), 1);
    let outcome = notifier.last().assert_some();
    assert!(!outcome.is_success());
    assert!(outcome.file.ends_with(".tar.gz.gpg"));
    assert_eq!(outcome.size, 0);
    assert!(ctx.workspace_is_clean());
}

#[test]
fn test_missing_data_volume_fails_before_upload() {
    let ctx = TestContext::new();
    let storage = MockStorage::new();
    let notifier = RecordingNotifier::new();
    let manager = BackupManager::new(ctx.env().backup_config(), Arc::new(notifier.clone()));

    assert!(manager.run_with_backend(&storage).is_err());
    assert!(storage.calls().is_empty());
    assert!(!notifier.last().assert_some().is_success());
}

#[test]
fn test_reference_reaches_notification() {
    let ctx = TestContext::new();
    ctx.create_data_file("app.db", "rows");

    let notifier = RecordingNotifier::new();
    let manager = BackupManager::new(
        ctx.env()
            .file("app.db")
            .var("BACKUP_REFERENCE", "cluster-a")
            .backup_config(),
        Arc::new(notifier.clone()),
    );
    manager.run_with_backend(&MockStorage::new()).unwrap();

    assert_eq!(
        notifier.last().assert_some().reference.as_deref(),
        Some("cluster-a")
    );
}
