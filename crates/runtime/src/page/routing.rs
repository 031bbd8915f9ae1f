//! Request interception and cookie/storage access.

use base64::Engine as _;
use serde_json::{Value, json};

use super::Page;
use crate::error::Result;

impl Page {
	/// Enables the Fetch domain for the given URL patterns. Paused
	/// requests arrive as [`PageEvent::RequestPaused`] and must each be
	/// resolved with one of the three calls below.
	///
	/// [`PageEvent::RequestPaused`]: super::PageEvent::RequestPaused
	pub async fn fetch_enable(&self, patterns: &[String]) -> Result<()> {
		let patterns: Vec<Value> = patterns.iter().map(|p| json!({ "urlPattern": p })).collect();
		self.call("Fetch.enable", json!({ "patterns": patterns })).await?;
		Ok(())
	}

	pub async fn fetch_disable(&self) -> Result<()> {
		self.call("Fetch.disable", json!({})).await?;
		Ok(())
	}

	pub async fn fulfill_request(&self, request_id: &str, status: u16, headers: &[(String, String)], body: &[u8]) -> Result<()> {
		let headers: Vec<Value> = headers.iter().map(|(name, value)| json!({ "name": name, "value": value })).collect();
		self.call(
			"Fetch.fulfillRequest",
			json!({
				"requestId": request_id,
				"responseCode": status,
				"responseHeaders": headers,
				"body": base64::engine::general_purpose::STANDARD.encode(body),
			}),
		)
		.await?;
		Ok(())
	}

	pub async fn abort_request(&self, request_id: &str) -> Result<()> {
		self.call("Fetch.failRequest", json!({ "requestId": request_id, "errorReason": "Aborted" })).await?;
		Ok(())
	}

	/// Lets a paused request through, optionally with added headers.
	pub async fn continue_request(&self, request_id: &str, extra_headers: Option<&[(String, String)]>) -> Result<()> {
		let mut params = json!({ "requestId": request_id });
		if let Some(extra) = extra_headers {
			let headers: Vec<Value> = extra.iter().map(|(name, value)| json!({ "name": name, "value": value })).collect();
			params["headers"] = json!(headers);
		}
		self.call("Fetch.continueRequest", params).await?;
		Ok(())
	}

	pub async fn set_extra_headers(&self, headers: &serde_json::Map<String, Value>) -> Result<()> {
		self.call("Network.setExtraHTTPHeaders", json!({ "headers": headers })).await?;
		Ok(())
	}

	pub async fn cookies(&self, urls: Option<&[String]>) -> Result<Vec<Value>> {
		let params = match urls {
			Some(urls) => json!({ "urls": urls }),
			None => json!({}),
		};
		let reply = self.call("Network.getCookies", params).await?;
		Ok(reply.get("cookies").and_then(Value::as_array).cloned().unwrap_or_default())
	}

	pub async fn set_cookies(&self, cookies: Vec<Value>) -> Result<()> {
		self.call("Network.setCookies", json!({ "cookies": cookies })).await?;
		Ok(())
	}

	pub async fn clear_cookies(&self) -> Result<()> {
		self.call("Network.clearBrowserCookies", json!({})).await?;
		Ok(())
	}
}
