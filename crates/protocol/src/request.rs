use serde::Serialize;
use serde_json::Value;

use crate::action::Action;
use crate::error::ErrorKind;

/// A fully parsed request frame.
#[derive(Debug, Clone)]
pub struct Request {
	/// Opaque correlation token, echoed on the response.
	pub id: String,
	pub action: Action,
}

impl Request {
	pub fn new(id: impl Into<String>, action: Action) -> Self {
		Self { id: id.into(), action }
	}

	/// Serialises back to the wire shape `{id, action, ...params}`.
	pub fn to_wire(&self) -> Value {
		#[derive(Serialize)]
		struct Wire<'a> {
			id: &'a str,
			#[serde(flatten)]
			action: &'a Action,
		}
		serde_json::to_value(Wire { id: &self.id, action: &self.action }).unwrap_or(Value::Null)
	}
}

/// A frame that could not be decoded into a [`Request`].
///
/// The id is preserved whenever the frame carried one, so the failure can
/// still be answered under the caller's correlation token.
#[derive(Debug, Clone)]
pub struct ParseFailure {
	pub id: Option<String>,
	pub kind: ErrorKind,
	pub detail: String,
}

/// Decodes one wire frame.
///
/// Malformed JSON, a missing or non-string `id`, a missing or unknown
/// `action`, and wrong parameter types all come back as [`ParseFailure`]
/// with [`ErrorKind::ParseError`].
pub fn parse_request(raw: &str) -> Result<Request, ParseFailure> {
	let value: Value = serde_json::from_str(raw).map_err(|err| ParseFailure {
		id: None,
		kind: ErrorKind::ParseError,
		detail: format!("malformed JSON: {err}"),
	})?;

	let id = match value.get("id") {
		Some(Value::String(id)) if !id.is_empty() => id.clone(),
		Some(Value::String(_)) => {
			return Err(ParseFailure {
				id: None,
				kind: ErrorKind::ParseError,
				detail: "empty id".to_string(),
			});
		}
		Some(_) => {
			return Err(ParseFailure {
				id: None,
				kind: ErrorKind::ParseError,
				detail: "id must be a string".to_string(),
			});
		}
		None => {
			return Err(ParseFailure {
				id: None,
				kind: ErrorKind::ParseError,
				detail: "missing id".to_string(),
			});
		}
	};

	if value.get("action").map(Value::is_string) != Some(true) {
		return Err(ParseFailure {
			id: Some(id),
			kind: ErrorKind::ParseError,
			detail: "missing action".to_string(),
		});
	}

	let action: Action = serde_json::from_value(value).map_err(|err| ParseFailure {
		id: Some(id.clone()),
		kind: ErrorKind::ParseError,
		detail: err.to_string(),
	})?;

	Ok(Request { id, action })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrips_a_simple_request() {
		let request = parse_request(r#"{"id":"1","action":"navigate","url":"about:blank"}"#).unwrap();
		assert_eq!(request.id, "1");
		assert_eq!(request.action.name(), "navigate");

		let wire = request.to_wire();
		assert_eq!(wire["id"], "1");
		assert_eq!(wire["action"], "navigate");
		assert_eq!(wire["url"], "about:blank");
	}

	#[test]
	fn missing_id_fails_without_id() {
		let failure = parse_request(r#"{"action":"url"}"#).unwrap_err();
		assert_eq!(failure.id, None);
		assert_eq!(failure.kind, ErrorKind::ParseError);
		assert!(failure.detail.contains("missing id"));
	}

	#[test]
	fn unknown_action_keeps_id() {
		let failure = parse_request(r#"{"id":"7","action":"teleport"}"#).unwrap_err();
		assert_eq!(failure.id.as_deref(), Some("7"));
		assert_eq!(failure.kind, ErrorKind::ParseError);
	}

	#[test]
	fn wrong_param_type_keeps_id() {
		let failure = parse_request(r#"{"id":"8","action":"tab_switch","index":"two"}"#).unwrap_err();
		assert_eq!(failure.id.as_deref(), Some("8"));
		assert_eq!(failure.kind, ErrorKind::ParseError);
	}

	#[test]
	fn malformed_json_has_no_id() {
		let failure = parse_request("{not json").unwrap_err();
		assert_eq!(failure.id, None);
		assert!(failure.detail.contains("malformed JSON"));
	}
}
