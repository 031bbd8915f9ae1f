use ab_protocol::ErrorKind;
use ab_runtime::DriverError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// The daemon's internal error, carrying the wire taxonomy plus an
/// optional human detail.
#[derive(Debug, Error)]
#[error("{}", .kind.render(.detail.as_deref()))]
pub struct CoreError {
	pub kind: ErrorKind,
	pub detail: Option<String>,
}

impl CoreError {
	pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
		Self { kind, detail: Some(detail.into()) }
	}

	pub fn bare(kind: ErrorKind) -> Self {
		Self { kind, detail: None }
	}

	pub fn invalid_argument(detail: impl Into<String>) -> Self {
		Self::new(ErrorKind::InvalidArgument, detail)
	}

	pub fn internal(detail: impl Into<String>) -> Self {
		Self::new(ErrorKind::InternalError, detail)
	}

	/// The wire `error` string.
	pub fn render(&self) -> String {
		self.kind.render(self.detail.as_deref())
	}
}

impl From<DriverError> for CoreError {
	fn from(err: DriverError) -> Self {
		match err {
			DriverError::Timeout(ms) => CoreError::new(ErrorKind::Timeout, format!("after {ms}ms")),
			DriverError::NoMatch => CoreError::bare(ErrorKind::NotFound),
			other => CoreError::new(ErrorKind::DriverError, other.to_string()),
		}
	}
}

impl From<std::io::Error> for CoreError {
	fn from(err: std::io::Error) -> Self {
		CoreError::new(ErrorKind::InternalError, err.to_string())
	}
}

impl From<serde_json::Error> for CoreError {
	fn from(err: serde_json::Error) -> Self {
		CoreError::new(ErrorKind::InternalError, err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn driver_timeout_maps_to_timeout() {
		let err: CoreError = DriverError::Timeout(500).into();
		assert_eq!(err.kind, ErrorKind::Timeout);
		assert_eq!(err.render(), "timeout: after 500ms");
	}

	#[test]
	fn driver_no_match_maps_to_not_found() {
		let err: CoreError = DriverError::NoMatch.into();
		assert_eq!(err.render(), "not_found");
	}

	#[test]
	fn driver_message_is_preserved() {
		let err: CoreError = DriverError::Protocol("Node is detached".to_string()).into();
		assert_eq!(err.kind, ErrorKind::DriverError);
		assert!(err.render().contains("Node is detached"));
	}
}
