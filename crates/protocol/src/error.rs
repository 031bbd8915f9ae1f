use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes surfaced in response `error` strings.
///
/// The wire form is the snake_case code, optionally followed by
/// `": detail"`. Clients match on the code prefix; the detail is for
/// humans and never parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	#[error("parse_error")]
	ParseError,
	#[error("invalid_argument")]
	InvalidArgument,
	#[error("policy_denied")]
	PolicyDenied,
	#[error("stale_ref")]
	StaleRef,
	#[error("not_found")]
	NotFound,
	#[error("timeout")]
	Timeout,
	#[error("driver_error")]
	DriverError,
	#[error("auth_error")]
	AuthError,
	#[error("key_missing")]
	KeyMissing,
	#[error("invalid_name")]
	InvalidName,
	#[error("not_launched")]
	NotLaunched,
	#[error("cannot_close_last")]
	CannotCloseLast,
	#[error("session_draining")]
	SessionDraining,
	#[error("internal_error")]
	InternalError,
}

impl ErrorKind {
	/// The stable snake_case code.
	pub fn code(self) -> &'static str {
		match self {
			ErrorKind::ParseError => "parse_error",
			ErrorKind::InvalidArgument => "invalid_argument",
			ErrorKind::PolicyDenied => "policy_denied",
			ErrorKind::StaleRef => "stale_ref",
			ErrorKind::NotFound => "not_found",
			ErrorKind::Timeout => "timeout",
			ErrorKind::DriverError => "driver_error",
			ErrorKind::AuthError => "auth_error",
			ErrorKind::KeyMissing => "key_missing",
			ErrorKind::InvalidName => "invalid_name",
			ErrorKind::NotLaunched => "not_launched",
			ErrorKind::CannotCloseLast => "cannot_close_last",
			ErrorKind::SessionDraining => "session_draining",
			ErrorKind::InternalError => "internal_error",
		}
	}

	/// Renders the wire error string: the code alone, or `code: detail`.
	pub fn render(self, detail: Option<&str>) -> String {
		match detail {
			Some(detail) if !detail.is_empty() => format!("{}: {detail}", self.code()),
			_ => self.code().to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn code_is_stable() {
		assert_eq!(ErrorKind::PolicyDenied.code(), "policy_denied");
		assert_eq!(ErrorKind::StaleRef.code(), "stale_ref");
		assert_eq!(ErrorKind::CannotCloseLast.code(), "cannot_close_last");
	}

	#[test]
	fn render_with_and_without_detail() {
		assert_eq!(ErrorKind::PolicyDenied.render(None), "policy_denied");
		assert_eq!(ErrorKind::Timeout.render(Some("waiting for selector .x")), "timeout: waiting for selector .x");
	}
}
