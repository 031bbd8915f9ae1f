//! Encrypted credential vault.
//!
//! One record per profile name under the auth directory, AEAD-sealed
//! with the host key. This module is the only place that knows the
//! record layout; everything else consumes [`Meta`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::crypto::{self, CryptoError, Key, Payload};
use crate::paths;

#[derive(Debug, Error)]
pub enum VaultError {
	#[error("invalid profile name: {0}")]
	InvalidName(String),
	#[error("no encryption key available for {0}")]
	KeyMissing(String),
	#[error("record failed to decrypt: {0}")]
	Auth(String),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl From<CryptoError> for VaultError {
	fn from(err: CryptoError) -> Self {
		match err {
			CryptoError::Auth => VaultError::Auth("authentication tag mismatch".to_string()),
			CryptoError::KeyMissing => VaultError::KeyMissing("vault".to_string()),
			CryptoError::Io(io) => VaultError::Io(io),
			CryptoError::Malformed(msg) => VaultError::Auth(msg),
		}
	}
}

/// Full plaintext record, password included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
	pub name: String,
	pub url: String,
	pub username: String,
	pub password: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username_selector: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub password_selector: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub submit_selector: Option<String>,
	/// Unix milliseconds.
	pub created_at: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_login_at: Option<u64>,
}

/// What non-vault components are allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
	pub name: String,
	pub url: String,
	pub username: String,
	pub created_at: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_login_at: Option<u64>,
}

impl From<Record> for Meta {
	fn from(record: Record) -> Self {
		Self {
			name: record.name,
			url: record.url,
			username: record.username,
			created_at: record.created_at,
			last_login_at: record.last_login_at,
		}
	}
}

/// Selector overrides accepted at save time.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
	pub username: Option<String>,
	pub password: Option<String>,
	pub submit: Option<String>,
}

/// Where the vault finds its key.
#[derive(Clone)]
pub enum KeySource {
	/// Host key: environment variable, else key file, auto-generated on
	/// first write.
	Host,
	/// Fixed key, for tests.
	Fixed(Key),
}

pub struct Vault {
	dir: PathBuf,
	key_source: KeySource,
}

impl Vault {
	/// Vault at the host's default location with the host key.
	pub fn open_default() -> Result<Self, VaultError> {
		let dir = paths::auth_dir().map_err(|err| VaultError::Auth(err.to_string()))?;
		Ok(Self { dir, key_source: KeySource::Host })
	}

	pub fn with_dir(dir: PathBuf, key_source: KeySource) -> Self {
		Self { dir, key_source }
	}

	/// Saves (or overwrites) a profile. Returns whether the name already
	/// existed; `createdAt` survives overwrites.
	pub fn save(&self, name: &str, url: &str, username: &str, password: &str, selectors: Selectors) -> Result<bool, VaultError> {
		validate_name(name)?;
		let existing = self.read_record(name).ok().flatten();
		let updated = existing.is_some();
		let created_at = existing.map(|r| r.created_at).unwrap_or_else(now_ms);

		let record = Record {
			name: name.to_string(),
			url: url.to_string(),
			username: username.to_string(),
			password: password.to_string(),
			username_selector: selectors.username,
			password_selector: selectors.password,
			submit_selector: selectors.submit,
			created_at,
			last_login_at: None,
		};
		self.write_record(&record)?;
		Ok(updated)
	}

	/// Full record, password included, decrypted on read.
	pub fn get(&self, name: &str) -> Result<Option<Record>, VaultError> {
		validate_name(name)?;
		self.read_record(name)
	}

	/// Like [`Vault::get`] without the password.
	pub fn get_meta(&self, name: &str) -> Result<Option<Meta>, VaultError> {
		Ok(self.get(name)?.map(Meta::from))
	}

	/// Every profile in the auth directory, sorted by name. Records
	/// that fail to decrypt surface with placeholder fields so the
	/// operator can see them.
	pub fn list(&self) -> Result<Vec<Meta>, VaultError> {
		let mut out = Vec::new();
		let entries = match std::fs::read_dir(&self.dir) {
			Ok(entries) => entries,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
			Err(err) => return Err(err.into()),
		};
		for entry in entries {
			let path = entry?.path();
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
				continue;
			};
			match self.read_record(&name) {
				Ok(Some(record)) => out.push(record.into()),
				Ok(None) => {}
				Err(err) => {
					warn!(target = "ab", profile = %name, error = %err, "unreadable credential record");
					out.push(Meta {
						name,
						url: "(unreadable)".to_string(),
						username: String::new(),
						created_at: 0,
						last_login_at: None,
					});
				}
			}
		}
		out.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(out)
	}

	pub fn delete(&self, name: &str) -> Result<bool, VaultError> {
		validate_name(name)?;
		match std::fs::remove_file(self.record_path(name)) {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(err) => Err(err.into()),
		}
	}

	/// Stamps `lastLoginAt` with the current time.
	pub fn touch_last_login(&self, name: &str) -> Result<(), VaultError> {
		let Some(mut record) = self.get(name)? else {
			return Ok(());
		};
		record.last_login_at = Some(now_ms());
		self.write_record(&record)
	}

	fn record_path(&self, name: &str) -> PathBuf {
		self.dir.join(format!("{name}.json"))
	}

	fn key_for_write(&self) -> Result<Key, VaultError> {
		match &self.key_source {
			KeySource::Host => Ok(crypto::ensure_key()?),
			KeySource::Fixed(key) => Ok(*key),
		}
	}

	fn key_for_read(&self) -> Result<Option<Key>, VaultError> {
		match &self.key_source {
			KeySource::Host => Ok(crypto::acquire_key()?),
			KeySource::Fixed(key) => Ok(Some(*key)),
		}
	}

	fn write_record(&self, record: &Record) -> Result<(), VaultError> {
		let key = self.key_for_write()?;
		let plaintext = serde_json::to_vec(record)?;
		let payload = crypto::encrypt(&plaintext, &key)?;
		let bytes = serde_json::to_vec_pretty(&payload)?;
		crypto::write_restricted(&self.record_path(&record.name), &bytes)?;
		Ok(())
	}

	fn read_record(&self, name: &str) -> Result<Option<Record>, VaultError> {
		let raw = match std::fs::read(self.record_path(name)) {
			Ok(raw) => raw,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		let payload: Payload = serde_json::from_slice(&raw)?;
		if !payload.encrypted {
			return Err(VaultError::Auth(format!("{name}: record is not encrypted")));
		}
		let key = self.key_for_read()?.ok_or_else(|| VaultError::KeyMissing(name.to_string()))?;
		let plaintext = crypto::decrypt(&payload, &key).map_err(|_| VaultError::Auth(name.to_string()))?;
		Ok(Some(serde_json::from_slice(&plaintext)?))
	}
}

fn validate_name(name: &str) -> Result<(), VaultError> {
	if paths::valid_name(name) {
		Ok(())
	} else {
		Err(VaultError::InvalidName(name.to_string()))
	}
}

fn now_ms() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_vault() -> (tempfile::TempDir, Vault) {
		let dir = tempfile::tempdir().unwrap();
		let vault = Vault::with_dir(dir.path().join("auth"), KeySource::Fixed([9u8; 32]));
		(dir, vault)
	}

	#[test]
	fn save_get_roundtrips_all_fields() {
		let (_dir, vault) = test_vault();
		let updated = vault
			.save(
				"gh",
				"https://github.com/login",
				"octo",
				"hunter2",
				Selectors {
					username: Some("#login_field".to_string()),
					password: Some("#password".to_string()),
					submit: None,
				},
			)
			.unwrap();
		assert!(!updated);

		let record = vault.get("gh").unwrap().unwrap();
		assert_eq!(record.username, "octo");
		assert_eq!(record.password, "hunter2");
		assert_eq!(record.username_selector.as_deref(), Some("#login_field"));
		assert!(record.created_at > 0);
	}

	#[test]
	fn resave_reports_updated_and_keeps_created_at() {
		let (_dir, vault) = test_vault();
		vault.save("gh", "https://g", "u", "p", Selectors::default()).unwrap();
		let created = vault.get("gh").unwrap().unwrap().created_at;

		let updated = vault.save("gh", "https://g2", "u2", "p2", Selectors::default()).unwrap();
		assert!(updated);
		let record = vault.get("gh").unwrap().unwrap();
		assert_eq!(record.created_at, created);
		assert_eq!(record.url, "https://g2");
	}

	#[test]
	fn on_disk_file_is_encrypted_and_never_plaintext() {
		let (dir, vault) = test_vault();
		vault.save("gh", "https://g", "u", "sup3rs3cret", Selectors::default()).unwrap();

		let raw = std::fs::read_to_string(dir.path().join("auth").join("gh.json")).unwrap();
		let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(value["encrypted"], true);
		assert_eq!(value["version"], 1);
		assert!(!raw.contains("sup3rs3cret"));
	}

	#[test]
	fn path_traversal_names_are_rejected() {
		let (_dir, vault) = test_vault();
		for name in ["../x", "a/b", "", "a b", "x\u{0}"] {
			let err = vault.save(name, "https://g", "u", "p", Selectors::default()).unwrap_err();
			assert!(matches!(err, VaultError::InvalidName(_)), "accepted bad name {name:?}");
		}
	}

	#[test]
	fn meta_omits_password() {
		let (_dir, vault) = test_vault();
		vault.save("gh", "https://g", "u", "p", Selectors::default()).unwrap();
		let meta = vault.get_meta("gh").unwrap().unwrap();
		let json = serde_json::to_string(&meta).unwrap();
		assert!(!json.contains("password"));
	}

	#[test]
	fn wrong_key_surfaces_as_placeholder_in_list() {
		let dir = tempfile::tempdir().unwrap();
		let writer = Vault::with_dir(dir.path().join("auth"), KeySource::Fixed([1u8; 32]));
		writer.save("locked", "https://g", "u", "p", Selectors::default()).unwrap();

		let reader = Vault::with_dir(dir.path().join("auth"), KeySource::Fixed([2u8; 32]));
		assert!(matches!(reader.get("locked"), Err(VaultError::Auth(_))));

		let listed = reader.list().unwrap();
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].name, "locked");
		assert_eq!(listed[0].url, "(unreadable)");
	}

	#[test]
	fn delete_is_reported() {
		let (_dir, vault) = test_vault();
		vault.save("gh", "https://g", "u", "p", Selectors::default()).unwrap();
		assert!(vault.delete("gh").unwrap());
		assert!(!vault.delete("gh").unwrap());
		assert!(vault.get("gh").unwrap().is_none());
	}

	#[test]
	fn touch_last_login_sets_timestamp() {
		let (_dir, vault) = test_vault();
		vault.save("gh", "https://g", "u", "p", Selectors::default()).unwrap();
		assert!(vault.get("gh").unwrap().unwrap().last_login_at.is_none());
		vault.touch_last_login("gh").unwrap();
		assert!(vault.get("gh").unwrap().unwrap().last_login_at.is_some());
	}
}
