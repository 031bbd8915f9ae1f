//! Screenshots, PDF export, and screencast recording.

use base64::Engine as _;
use serde_json::{Value, json};

use super::{Page, ScreencastFrame, bounded};
use crate::error::{DriverError, Result};

impl Page {
	/// Captures a PNG of the viewport or the full page.
	pub async fn screenshot(&self, full_page: bool, timeout_ms: u64) -> Result<Vec<u8>> {
		let reply = bounded(
			timeout_ms,
			self.call(
				"Page.captureScreenshot",
				json!({ "format": "png", "captureBeyondViewport": full_page }),
			),
		)
		.await?;
		decode_data(&reply)
	}

	/// Renders the page to PDF.
	pub async fn print_pdf(&self, timeout_ms: u64) -> Result<Vec<u8>> {
		let reply = bounded(timeout_ms, self.call("Page.printToPDF", json!({}))).await?;
		decode_data(&reply)
	}

	/// Starts collecting screencast frames into the page state.
	pub async fn screencast_start(&self) -> Result<()> {
		self.state.lock().screencast = Some(Vec::new());
		self.call(
			"Page.startScreencast",
			json!({ "format": "jpeg", "quality": 80, "everyNthFrame": 1 }),
		)
		.await?;
		Ok(())
	}

	/// Stops the screencast and drains the captured frames.
	pub async fn screencast_stop(&self) -> Result<Vec<ScreencastFrame>> {
		self.call("Page.stopScreencast", json!({})).await?;
		Ok(self.state.lock().screencast.take().unwrap_or_default())
	}

	pub fn screencast_active(&self) -> bool {
		self.state.lock().screencast.is_some()
	}
}

fn decode_data(reply: &Value) -> Result<Vec<u8>> {
	let data = reply
		.get("data")
		.and_then(Value::as_str)
		.ok_or_else(|| DriverError::Protocol("capture returned no data".to_string()))?;
	base64::engine::general_purpose::STANDARD
		.decode(data)
		.map_err(|err| DriverError::Protocol(format!("capture payload not base64: {err}")))
}
