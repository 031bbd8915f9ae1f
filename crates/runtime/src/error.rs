use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors from the browser capability layer.
///
/// The daemon maps these into its wire taxonomy at the executor
/// boundary; the driver's own message is preserved verbatim.
#[derive(Debug, Error)]
pub enum DriverError {
	#[error("browser launch failed: {0}")]
	Launch(String),

	#[error("connect failed: {0}")]
	Connect(String),

	#[error("browser connection closed")]
	ConnectionClosed,

	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("timed out after {0}ms")]
	Timeout(u64),

	#[error("no element matched")]
	NoMatch,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl DriverError {
	/// True when the error class is a deadline overrun rather than a
	/// driver fault; the daemon reports these as `timeout`.
	pub fn is_timeout(&self) -> bool {
		matches!(self, DriverError::Timeout(_))
	}
}
