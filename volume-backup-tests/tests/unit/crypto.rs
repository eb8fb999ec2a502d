//! Unit tests for the encryption stage

use std::fs;
use test_utils::{sample_archive, TestContext};
use volume_backup::utils::crypto::{self, CryptoError};

#[test]
fn test_encrypt_produces_gpg_sibling() {
    let ctx = TestContext::new();
    let archive = sample_archive(ctx.temp_dir(), "backup_20240101_000000.tar.gz");

    let encrypted = crypto::encrypt(&archive, "passphrase").unwrap();
    assert_eq!(
        encrypted.file_name().unwrap().to_string_lossy(),
        "backup_20240101_000000.tar.gz.gpg"
    );
    assert!(archive.exists());
    assert_ne!(fs::read(&encrypted).unwrap(), fs::read(&archive).unwrap());
}

#[test]
fn test_decrypt_restores_original_bytes() {
    let ctx = TestContext::new();
    let archive = sample_archive(ctx.temp_dir(), "backup_20240101_000000.tar.gz");
    let original = fs::read(&archive).unwrap();

    let encrypted = crypto::encrypt(&archive, "passphrase").unwrap();
    fs::remove_file(&archive).unwrap();

    let decrypted = crypto::decrypt(&encrypted, "passphrase").unwrap();
    assert_eq!(decrypted, archive);
    assert_eq!(fs::read(decrypted).unwrap(), original);
}

#[test]
fn test_wrong_passphrase() {
    let ctx = TestContext::new();
    let archive = sample_archive(ctx.temp_dir(), "backup_20240101_000000.tar.gz");
    let encrypted = crypto::encrypt(&archive, "right").unwrap();
    fs::remove_file(&archive).unwrap();

    let result = crypto::decrypt(&encrypted, "wrong");
    assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    assert!(!archive.exists());
}

#[test]
fn test_encrypted_names() {
    assert!(crypto::is_encrypted_name("backup_20240101_000000.tar.gz.gpg"));
    assert!(!crypto::is_encrypted_name("backup_20240101_000000.tar.gz"));
}
