//! Passphrase-based artifact encryption
//!
//! Artifacts are encrypted with AES-256-GCM in the STREAM construction so archives of
//! any size are processed in constant memory. The key is derived from the passphrase
//! with Argon2id and a random salt stored in the file header.
//!
//! ## File layout
//!
//! ```text
//! magic "VBAK" | version (1 byte) | salt (16 bytes) | stream nonce (7 bytes) | segments...
//! ```
//!
//! Each segment holds up to 64 KiB of plaintext followed by its 16-byte tag.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::stream::{DecryptorBE32, EncryptorBE32};
use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use argon2::Argon2;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Extension appended to encrypted artifacts
pub const ENCRYPTED_EXTENSION: &str = "gpg";

const MAGIC: &[u8; 4] = b"VBAK";
const FORMAT_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
/// AES-GCM nonce (12 bytes) minus the 5 bytes STREAM reserves for counter and flag
const STREAM_NONCE_LEN: usize = 7;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const SEGMENT_LEN: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// True for names carrying the encrypted extension
pub fn is_encrypted_name(name: &str) -> bool {
    name.ends_with(&format!(".{}", ENCRYPTED_EXTENSION))
}

/// `backup.tar.gz.gpg` -> `backup.tar.gz`
pub fn strip_last_extension(path: &Path) -> PathBuf {
    path.with_extension("")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn derive_key(passphrase: &str, salt: &[u8]) -> std::result::Result<Zeroizing<[u8; KEY_LEN]>, String> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| format!("key derivation failed: {}", e))?;
    Ok(key)
}

fn cipher_for(key: &[u8]) -> std::result::Result<Aes256Gcm, String> {
    Aes256Gcm::new_from_slice(key).map_err(|e| format!("invalid key: {}", e))
}

/// Read up to `size` bytes, stopping early only at end of input
fn read_chunk<R: Read>(reader: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(size);
    reader.by_ref().take(size as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

fn encrypt_stream<R: Read, W: Write>(reader: &mut R, writer: &mut W, passphrase: &str) -> std::result::Result<(), String> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; STREAM_NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let mut encryptor = EncryptorBE32::from_aead(cipher_for(&key[..])?, GenericArray::from_slice(&nonce));

    writer.write_all(MAGIC).map_err(|e| e.to_string())?;
    writer.write_all(&[FORMAT_VERSION]).map_err(|e| e.to_string())?;
    writer.write_all(&salt).map_err(|e| e.to_string())?;
    writer.write_all(&nonce).map_err(|e| e.to_string())?;

    let mut current = read_chunk(reader, SEGMENT_LEN).map_err(|e| e.to_string())?;
    loop {
        let next = read_chunk(reader, SEGMENT_LEN).map_err(|e| e.to_string())?;
        if next.is_empty() {
            let sealed = encryptor
                .encrypt_last(current.as_slice())
                .map_err(|_| "failed to seal final segment".to_string())?;
            writer.write_all(&sealed).map_err(|e| e.to_string())?;
            break;
        }

        let sealed = encryptor
            .encrypt_next(current.as_slice())
            .map_err(|_| "failed to seal segment".to_string())?;
        writer.write_all(&sealed).map_err(|e| e.to_string())?;
        current = next;
    }

    writer.flush().map_err(|e| e.to_string())
}

fn decrypt_stream<R: Read, W: Write>(reader: &mut R, writer: &mut W, passphrase: &str) -> std::result::Result<(), String> {
    let mut magic = [0u8; 4];
    let mut version = [0u8; 1];
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; STREAM_NONCE_LEN];

    reader
        .read_exact(&mut magic)
        .map_err(|_| "file is too short".to_string())?;
    if &magic != MAGIC {
        return Err("not an encrypted backup".to_string());
    }
    reader
        .read_exact(&mut version)
        .map_err(|_| "file is too short".to_string())?;
    if version[0] != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", version[0]));
    }
    reader
        .read_exact(&mut salt)
        .and_then(|_| reader.read_exact(&mut nonce))
        .map_err(|_| "truncated header".to_string())?;

    let key = derive_key(passphrase, &salt)?;
    let mut decryptor = DecryptorBE32::from_aead(cipher_for(&key[..])?, GenericArray::from_slice(&nonce));

    let mut current = read_chunk(reader, SEGMENT_LEN + TAG_LEN).map_err(|e| e.to_string())?;
    loop {
        let next = read_chunk(reader, SEGMENT_LEN + TAG_LEN).map_err(|e| e.to_string())?;
        if next.is_empty() {
            let plain = decryptor
                .decrypt_last(current.as_slice())
                .map_err(|_| "wrong passphrase or corrupted data".to_string())?;
            writer.write_all(&plain).map_err(|e| e.to_string())?;
            break;
        }

        let plain = decryptor
            .decrypt_next(current.as_slice())
            .map_err(|_| "wrong passphrase or corrupted data".to_string())?;
        writer.write_all(&plain).map_err(|e| e.to_string())?;
        current = next;
    }

    writer.flush().map_err(|e| e.to_string())
}

/// Run `work` against a `.part` sibling of `target`, renaming on success and removing it otherwise
fn write_atomically<F>(target: &Path, work: F) -> std::result::Result<(), String>
where
    F: FnOnce(&mut BufWriter<File>) -> std::result::Result<(), String>,
{
    let partial = with_suffix(target, ".part");
    let result = File::create(&partial)
        .map_err(|e| format!("cannot create {}: {}", partial.display(), e))
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            work(&mut writer)?;
            writer
                .into_inner()
                .map_err(|e| e.to_string())?
                .sync_all()
                .map_err(|e| e.to_string())
        })
        .and_then(|_| fs::rename(&partial, target).map_err(|e| e.to_string()));

    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// Encrypt `path` into `<path>.gpg`. The plaintext is left in place.
pub fn encrypt(path: &Path, passphrase: &str) -> Result<PathBuf> {
    let output = with_suffix(path, &format!(".{}", ENCRYPTED_EXTENSION));
    info!("Encrypting backup...");

    let input = File::open(path)
        .map_err(|e| CryptoError::EncryptionFailed(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(input);

    write_atomically(&output, |writer| encrypt_stream(&mut reader, writer, passphrase))
        .map_err(CryptoError::EncryptionFailed)?;

    info!("Encrypting backup...done");
    debug!("Encrypted artifact: {}", output.display());
    Ok(output)
}

/// Decrypt `path` into the same path minus its last extension
pub fn decrypt(path: &Path, passphrase: &str) -> Result<PathBuf> {
    let output = strip_last_extension(path);
    if output == path {
        return Err(CryptoError::DecryptionFailed(format!(
            "{} has no extension to strip",
            path.display()
        )));
    }
    info!("Decrypting backup...");

    let input = File::open(path)
        .map_err(|e| CryptoError::DecryptionFailed(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(input);

    write_atomically(&output, |writer| decrypt_stream(&mut reader, writer, passphrase))
        .map_err(CryptoError::DecryptionFailed)?;

    info!("Decrypting backup...done");
    Ok(output)
}
