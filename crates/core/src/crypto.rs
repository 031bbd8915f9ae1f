//! AEAD primitives and restricted-permission file I/O.
//!
//! AES-256-GCM with a fresh 96-bit nonce per encryption; the
//! authentication tag is stored next to the ciphertext so records are
//! self-contained. Key material comes from
//! `AGENT_BROWSER_ENCRYPTION_KEY` (64 hex chars) or the key file, which
//! is auto-generated on first write.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub type Key = [u8; KEY_LEN];

#[derive(Debug, Error)]
pub enum CryptoError {
	/// Tag mismatch or corrupted payload.
	#[error("decryption failed: authentication tag mismatch")]
	Auth,
	#[error("no encryption key available")]
	KeyMissing,
	#[error("malformed payload: {0}")]
	Malformed(String),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// An encrypted value at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
	pub version: u8,
	pub encrypted: bool,
	pub iv: String,
	pub auth_tag: String,
	pub data: String,
}

/// Encrypts plaintext under `key` with a random nonce.
pub fn encrypt(plaintext: &[u8], key: &Key) -> Result<Payload, CryptoError> {
	let cipher = Aes256Gcm::new(key.into());
	let mut iv = [0u8; NONCE_LEN];
	rand::thread_rng().fill_bytes(&mut iv);

	// The aead API appends the tag; the record format stores it apart.
	let mut sealed = cipher
		.encrypt(Nonce::from_slice(&iv), plaintext)
		.map_err(|_| CryptoError::Malformed("encryption failed".to_string()))?;
	let tag = sealed.split_off(sealed.len() - TAG_LEN);

	Ok(Payload {
		version: 1,
		encrypted: true,
		iv: hex::encode(iv),
		auth_tag: hex::encode(tag),
		data: hex::encode(sealed),
	})
}

/// Decrypts a payload, failing on any tampering or a wrong key.
pub fn decrypt(payload: &Payload, key: &Key) -> Result<Vec<u8>, CryptoError> {
	let iv = hex::decode(&payload.iv).map_err(|err| CryptoError::Malformed(format!("iv: {err}")))?;
	let tag = hex::decode(&payload.auth_tag).map_err(|err| CryptoError::Malformed(format!("authTag: {err}")))?;
	let data = hex::decode(&payload.data).map_err(|err| CryptoError::Malformed(format!("data: {err}")))?;
	if iv.len() != NONCE_LEN || tag.len() != TAG_LEN {
		return Err(CryptoError::Malformed("bad iv or tag length".to_string()));
	}

	let mut sealed = data;
	sealed.extend_from_slice(&tag);

	let cipher = Aes256Gcm::new(key.into());
	cipher.decrypt(Nonce::from_slice(&iv), sealed.as_ref()).map_err(|_| CryptoError::Auth)
}

/// Returns the key from the environment or the key file, if either is
/// present and well-formed.
pub fn acquire_key() -> Result<Option<Key>, CryptoError> {
	if let Ok(raw) = std::env::var("AGENT_BROWSER_ENCRYPTION_KEY") {
		if let Some(key) = parse_hex_key(raw.trim()) {
			return Ok(Some(key));
		}
	}
	let path = paths::key_file().map_err(|err| CryptoError::Malformed(err.to_string()))?;
	match std::fs::read_to_string(&path) {
		Ok(raw) => Ok(parse_hex_key(raw.trim())),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(err) => Err(err.into()),
	}
}

/// Like [`acquire_key`], but generates and persists a key when none
/// exists. The file location is printed to stderr exactly once, at
/// generation time, so the operator can back it up.
pub fn ensure_key() -> Result<Key, CryptoError> {
	if let Some(key) = acquire_key()? {
		return Ok(key);
	}
	let mut key = [0u8; KEY_LEN];
	rand::thread_rng().fill_bytes(&mut key);

	let path = paths::key_file().map_err(|err| CryptoError::Malformed(err.to_string()))?;
	write_restricted(&path, format!("{}\n", hex::encode(key)).as_bytes())?;
	eprintln!("Generated encryption key at {}; back it up to keep saved credentials readable.", path.display());
	Ok(key)
}

fn parse_hex_key(raw: &str) -> Option<Key> {
	let bytes = hex::decode(raw).ok()?;
	bytes.try_into().ok()
}

/// Writes a file atomically with owner-only permissions; parent
/// directories are created `0700`. The Windows ACL equivalent is best
/// effort and silent.
pub fn write_restricted(path: &Path, contents: &[u8]) -> Result<(), CryptoError> {
	let parent = path.parent().ok_or_else(|| CryptoError::Malformed("path has no parent".to_string()))?;
	std::fs::create_dir_all(parent)?;
	restrict_dir(parent);

	let tmp = parent.join(format!(
		".{}.tmp-{}",
		path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
		std::process::id(),
	));
	std::fs::write(&tmp, contents)?;
	restrict_file(&tmp);
	std::fs::rename(&tmp, path)?;
	Ok(())
}

#[cfg(unix)]
fn restrict_dir(path: &Path) {
	use std::os::unix::fs::PermissionsExt;
	let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700));
}

#[cfg(unix)]
pub(crate) fn restrict_file(path: &Path) {
	use std::os::unix::fs::PermissionsExt;
	let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) {}

#[cfg(not(unix))]
pub(crate) fn restrict_file(_path: &Path) {}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_key(fill: u8) -> Key {
		[fill; KEY_LEN]
	}

	#[test]
	fn roundtrip() {
		let key = test_key(7);
		let payload = encrypt(b"hello vault", &key).unwrap();
		assert_eq!(payload.version, 1);
		assert!(payload.encrypted);
		assert_eq!(decrypt(&payload, &key).unwrap(), b"hello vault");
	}

	#[test]
	fn wrong_key_fails_auth() {
		let payload = encrypt(b"secret", &test_key(1)).unwrap();
		assert!(matches!(decrypt(&payload, &test_key(2)), Err(CryptoError::Auth)));
	}

	#[test]
	fn tampered_data_fails_auth() {
		let mut payload = encrypt(b"secret", &test_key(1)).unwrap();
		let mut data = hex::decode(&payload.data).unwrap();
		data[0] ^= 0xff;
		payload.data = hex::encode(data);
		assert!(matches!(decrypt(&payload, &test_key(1)), Err(CryptoError::Auth)));
	}

	#[test]
	fn tampered_tag_fails_auth() {
		let mut payload = encrypt(b"secret", &test_key(1)).unwrap();
		let mut tag = hex::decode(&payload.auth_tag).unwrap();
		tag[0] ^= 0x01;
		payload.auth_tag = hex::encode(tag);
		assert!(matches!(decrypt(&payload, &test_key(1)), Err(CryptoError::Auth)));
	}

	#[test]
	fn nonces_are_unique_per_encryption() {
		let key = test_key(3);
		let a = encrypt(b"x", &key).unwrap();
		let b = encrypt(b"x", &key).unwrap();
		assert_ne!(a.iv, b.iv);
		assert_ne!(a.data, b.data);
	}

	#[test]
	fn restricted_write_is_owner_only() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("secret.json");
		write_restricted(&path, b"{}").unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), b"{}");

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let mode = std::fs::metadata(&path).unwrap().permissions().mode();
			assert_eq!(mode & 0o777, 0o600);
			let dir_mode = std::fs::metadata(path.parent().unwrap()).unwrap().permissions().mode();
			assert_eq!(dir_mode & 0o777, 0o700);
		}
	}
}
