//! Typed projection of the CDP events the daemon's sinks consume.

use serde_json::Value;

use super::Page;
use crate::transport::CdpEvent;

/// A console API call observed on the page.
#[derive(Debug, Clone)]
pub struct ConsoleEvent {
	pub level: String,
	pub text: String,
}

/// A tracked network request (issue time; status filled on response).
#[derive(Debug, Clone)]
pub struct NetworkEvent {
	pub request_id: String,
	pub url: String,
	pub method: String,
	pub resource_type: String,
}

/// An intercepted request awaiting a fulfil/abort/continue decision.
#[derive(Debug, Clone)]
pub struct PausedRequest {
	pub request_id: String,
	pub url: String,
	pub method: String,
	pub headers: Value,
}

/// A JavaScript dialog that opened on the page.
#[derive(Debug, Clone)]
pub struct DialogEvent {
	pub kind: String,
	pub message: String,
}

/// Page-scoped events after session filtering.
#[derive(Debug, Clone)]
pub enum PageEvent {
	Console(ConsoleEvent),
	Exception(String),
	Request(NetworkEvent),
	Response { request_id: String, status: u16 },
	RequestPaused(PausedRequest),
	Dialog(DialogEvent),
	Navigated { url: String },
}

impl Page {
	/// Projects a raw transport event onto this page, returning `None`
	/// for other sessions and uninteresting methods.
	pub fn parse_event(&self, event: &CdpEvent) -> Option<PageEvent> {
		if event.session_id.as_deref() != Some(self.session_id.as_str()) {
			return None;
		}
		match event.method.as_str() {
			"Runtime.consoleAPICalled" => {
				let level = event.params.get("type").and_then(Value::as_str).unwrap_or("log").to_string();
				let text = event
					.params
					.get("args")
					.and_then(Value::as_array)
					.map(|args| {
						args.iter()
							.map(|arg| {
								arg.get("value")
									.map(render_value)
									.or_else(|| arg.get("description").and_then(Value::as_str).map(str::to_owned))
									.unwrap_or_default()
							})
							.collect::<Vec<_>>()
							.join(" ")
					})
					.unwrap_or_default();
				Some(PageEvent::Console(ConsoleEvent { level, text }))
			}
			"Runtime.exceptionThrown" => {
				let text = event
					.params
					.pointer("/exceptionDetails/exception/description")
					.and_then(Value::as_str)
					.or_else(|| event.params.pointer("/exceptionDetails/text").and_then(Value::as_str))
					.unwrap_or("uncaught exception")
					.to_string();
				Some(PageEvent::Exception(text))
			}
			"Network.requestWillBeSent" => {
				let request = event.params.get("request")?;
				Some(PageEvent::Request(NetworkEvent {
					request_id: event.params.get("requestId").and_then(Value::as_str).unwrap_or_default().to_string(),
					url: request.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
					method: request.get("method").and_then(Value::as_str).unwrap_or_default().to_string(),
					resource_type: event.params.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
				}))
			}
			"Network.responseReceived" => {
				let status = event.params.pointer("/response/status").and_then(Value::as_u64).unwrap_or(0) as u16;
				Some(PageEvent::Response {
					request_id: event.params.get("requestId").and_then(Value::as_str).unwrap_or_default().to_string(),
					status,
				})
			}
			"Fetch.requestPaused" => {
				let request = event.params.get("request")?;
				Some(PageEvent::RequestPaused(PausedRequest {
					request_id: event.params.get("requestId").and_then(Value::as_str).unwrap_or_default().to_string(),
					url: request.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
					method: request.get("method").and_then(Value::as_str).unwrap_or_default().to_string(),
					headers: request.get("headers").cloned().unwrap_or(Value::Null),
				}))
			}
			"Page.javascriptDialogOpening" => Some(PageEvent::Dialog(DialogEvent {
				kind: event.params.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
				message: event.params.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
			})),
			"Page.frameNavigated" => {
				let frame = event.params.get("frame")?;
				if frame.get("parentId").is_some() {
					return None;
				}
				Some(PageEvent::Navigated {
					url: frame.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
				})
			}
			_ => None,
		}
	}
}

fn render_value(value: &Value) -> String {
	match value {
		Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}
