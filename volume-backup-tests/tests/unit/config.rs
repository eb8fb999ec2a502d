//! Unit tests for configuration resolution
//!
//! These tests verify precedence, backend requirements and defaults.

use rstest::rstest;
use test_utils::{EnvBuilder, ResultAssertions, Source, StorageKind};
use volume_backup::config::{BackendConfig, BackupOverrides, ConfigError, RestoreOverrides};

#[rstest]
#[case("local", StorageKind::Local)]
#[case("S3", StorageKind::S3)]
#[case("ssh", StorageKind::Ssh)]
#[case("remote", StorageKind::Ssh)]
#[case("ftp", StorageKind::Ftp)]
#[case("gdrive", StorageKind::Local)]
fn test_storage_tags(#[case] tag: &str, #[case] expected: StorageKind) {
    let env = EnvBuilder::new()
        .s3("minio:9000", "backups")
        .ssh("sftp.local", 22, "/upload")
        .ftp("ftp.local", 21, "/upload")
        .storage(tag);

    let config = env.backup_config();
    assert_eq!(config.storage, expected);
    assert_eq!(config.backend.kind(), expected);
}

#[test]
fn test_folder_mode_defaults() {
    let config = EnvBuilder::new().backup_config();
    assert_eq!(config.source, Source::Folder);
    assert_eq!(config.prefix, "backup");
    assert!(config.cron_expression.is_empty());
    assert!(config.retention_days.is_none());
    assert!(!config.encryption());
}

#[test]
fn test_prefix_names_folder_artifacts() {
    let config = EnvBuilder::new().var("BACKUP_PREFIX", "nextcloud").backup_config();
    assert_eq!(config.artifact_base(), "nextcloud");
}

#[test]
fn test_path_flag_beats_variables() {
    let env = EnvBuilder::new().ftp("ftp.local", 21, "/from-env");
    let overrides = BackupOverrides {
        path: Some("/from-flag".to_string()),
        ..Default::default()
    };

    let config = env.try_backup_config(&overrides).assert_ok();
    match config.backend {
        BackendConfig::Ftp(ftp) => assert_eq!(ftp.remote_path, "/from-flag"),
        other => panic!("expected ftp backend, got {:?}", other),
    }
}

#[test]
fn test_ssh_remote_path_fallback() {
    let env = EnvBuilder::new()
        .ssh("sftp.local", 22, "")
        .unset("REMOTE_PATH")
        .var("SSH_REMOTE_PATH", "/legacy");

    let config = env.backup_config();
    assert_eq!(config.remote_path, "/legacy");
}

#[test]
fn test_invalid_ftp_port() {
    let env = EnvBuilder::new().ftp("ftp.local", 21, "/up").var("FTP_PORT", "abc");
    env.try_backup_config(&BackupOverrides::default())
        .assert_err_contains("FTP_PORT");
}

#[test]
fn test_invalid_disable_ssl() {
    let env = EnvBuilder::new()
        .s3("minio:9000", "backups")
        .var("AWS_DISABLE_SSL", "maybe");
    assert!(matches!(
        env.try_backup_config(&BackupOverrides::default()),
        Err(ConfigError::InvalidValue { .. })
    ));
}

#[test]
fn test_restore_bucket_fallback() {
    let env = EnvBuilder::new()
        .s3("minio:9000", "unused")
        .unset("AWS_S3_BUCKET_NAME")
        .var("BUCKET_NAME", "legacy-bucket")
        .file(test_utils::RESTORE_FIXTURE_NAME);

    let config = env.restore_config();
    match config.backend {
        BackendConfig::S3(s3) => assert_eq!(s3.bucket, "legacy-bucket"),
        other => panic!("expected s3 backend, got {:?}", other),
    }

    // Backups do not accept the legacy name
    assert!(env.try_backup_config(&BackupOverrides::default()).is_err());
}

#[test]
fn test_restore_file_flag() {
    let overrides = RestoreOverrides {
        file: Some("db_20240101_000000.tar.gz.gpg".to_string()),
        ..Default::default()
    };
    let config = EnvBuilder::new()
        .passphrase("pw")
        .try_restore_config(&overrides)
        .assert_ok();
    assert_eq!(config.file, "db_20240101_000000.tar.gz.gpg");
    assert_eq!(config.passphrase(), Some("pw"));
}
