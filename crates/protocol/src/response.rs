use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// One response frame, mirroring the request id.
///
/// Exactly one of the three shapes is emitted per request: success with
/// `data`, failure with `error`, or the confirmation-required form which
/// carries the pending confirmation token instead of executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
	pub id: String,
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub confirmation_required: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub confirmation_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

impl Response {
	pub fn success(id: impl Into<String>, data: Value) -> Self {
		Self {
			id: id.into(),
			success: true,
			data: Some(data),
			error: None,
			confirmation_required: None,
			confirmation_id: None,
			category: None,
			description: None,
		}
	}

	pub fn failure(id: impl Into<String>, kind: ErrorKind, detail: Option<&str>) -> Self {
		Self {
			id: id.into(),
			success: false,
			data: None,
			error: Some(kind.render(detail)),
			confirmation_required: None,
			confirmation_id: None,
			category: None,
			description: None,
		}
	}

	pub fn confirmation(id: impl Into<String>, confirmation_id: impl Into<String>, category: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			success: false,
			data: None,
			error: None,
			confirmation_required: Some(true),
			confirmation_id: Some(confirmation_id.into()),
			category: Some(category.into()),
			description: Some(description.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn success_shape() {
		let response = Response::success("3", json!({"url": "about:blank"}));
		let wire = serde_json::to_value(&response).unwrap();
		assert_eq!(wire, json!({"id": "3", "success": true, "data": {"url": "about:blank"}}));
	}

	#[test]
	fn failure_shape() {
		let response = Response::failure("a", ErrorKind::PolicyDenied, None);
		let wire = serde_json::to_value(&response).unwrap();
		assert_eq!(wire, json!({"id": "a", "success": false, "error": "policy_denied"}));
	}

	#[test]
	fn confirmation_shape() {
		let response = Response::confirmation("b", "c_0123456789abcdef", "download", "Download via link Save");
		let wire = serde_json::to_value(&response).unwrap();
		assert_eq!(wire["success"], false);
		assert_eq!(wire["confirmationRequired"], true);
		assert_eq!(wire["confirmationId"], "c_0123456789abcdef");
		assert_eq!(wire["category"], "download");
		assert!(wire.get("error").is_none());
	}
}
