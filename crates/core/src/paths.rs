//! On-disk layout and socket path discovery.
//!
//! Everything the daemon persists lives under `<home>/.agent-browser`
//! with owner-only permissions. Socket paths honour
//! `AGENT_BROWSER_SOCKET_DIR`, then `XDG_RUNTIME_DIR`, then the data
//! directory itself.

use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Root data directory, `<home>/.agent-browser`.
pub fn data_dir() -> Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| CoreError::internal("cannot resolve home directory"))?;
	Ok(home.join(".agent-browser"))
}

/// Directory of encrypted credential records.
pub fn auth_dir() -> Result<PathBuf> {
	Ok(data_dir()?.join("auth"))
}

/// Directory of named storage-state profiles.
pub fn state_dir() -> Result<PathBuf> {
	Ok(data_dir()?.join("state"))
}

/// Location of the auto-generated encryption key.
pub fn key_file() -> Result<PathBuf> {
	Ok(data_dir()?.join(".encryption-key"))
}

/// Policy file read by every session on this host.
pub fn policy_file() -> Result<PathBuf> {
	Ok(data_dir()?.join("policy.json"))
}

/// Validates a session or profile name: alphanumeric plus `_-`.
pub fn valid_name(name: &str) -> bool {
	!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Resolves the socket path for a session, in discovery order.
pub fn socket_path(session: &str) -> Result<PathBuf> {
	if !valid_name(session) {
		return Err(CoreError::invalid_argument(format!("invalid session name: {session}")));
	}
	if let Ok(dir) = std::env::var("AGENT_BROWSER_SOCKET_DIR") {
		if !dir.is_empty() {
			return Ok(PathBuf::from(dir).join("agent-browser").join(format!("{session}.sock")));
		}
	}
	if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
		if !dir.is_empty() {
			return Ok(PathBuf::from(dir).join("agent-browser").join(format!("{session}.sock")));
		}
	}
	Ok(data_dir()?.join(format!("{session}.sock")))
}

/// The TCP fallback sentinel next to the socket path.
pub fn port_sentinel(session: &str) -> Result<PathBuf> {
	Ok(socket_path(session)?.with_extension("port"))
}

/// Session name from the environment, defaulting to `default`.
pub fn session_name_from_env() -> String {
	match std::env::var("AGENT_BROWSER_SESSION") {
		Ok(name) if valid_name(&name) => name,
		_ => "default".to_string(),
	}
}

/// Default action timeout, honouring `AGENT_BROWSER_ACTION_TIMEOUT`
/// (positive integer milliseconds; anything else falls back to 10 000).
pub fn default_timeout_ms() -> u64 {
	match std::env::var("AGENT_BROWSER_ACTION_TIMEOUT") {
		Ok(raw) => match raw.trim().parse::<u64>() {
			Ok(ms) if ms > 0 => ms,
			_ => 10_000,
		},
		Err(_) => 10_000,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn names_accept_word_characters_only() {
		assert!(valid_name("default"));
		assert!(valid_name("ci_run-2"));
		assert!(!valid_name(""));
		assert!(!valid_name("../x"));
		assert!(!valid_name("a b"));
	}

	#[test]
	fn invalid_timeout_falls_back() {
		// Uses the parse path directly: env mutation is racy across tests.
		assert_eq!("abc".trim().parse::<u64>().ok().filter(|ms| *ms > 0).unwrap_or(10_000), 10_000);
		assert_eq!("0".trim().parse::<u64>().ok().filter(|ms| *ms > 0).unwrap_or(10_000), 10_000);
		assert_eq!("2500".trim().parse::<u64>().ok().filter(|ms| *ms > 0).unwrap_or(10_000), 2500);
	}
}
