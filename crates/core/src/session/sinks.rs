//! Event sinks and the route table shared with page pump tasks.

use std::collections::VecDeque;
use std::sync::Arc;

use ab_runtime::{Page, PageEvent, PausedRequest};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const SINK_CAPACITY: usize = 1024;

/// Bounded ring with drop-oldest overflow.
#[derive(Debug)]
pub struct Ring<T> {
	buf: VecDeque<T>,
	cap: usize,
}

impl<T> Default for Ring<T> {
	fn default() -> Self {
		Self { buf: VecDeque::new(), cap: SINK_CAPACITY }
	}
}

impl<T: Clone> Ring<T> {
	pub fn push(&mut self, item: T) {
		if self.buf.len() == self.cap {
			self.buf.pop_front();
		}
		self.buf.push_back(item);
	}

	pub fn drain_or_peek(&mut self, clear: bool) -> Vec<T> {
		if clear {
			self.buf.drain(..).collect()
		} else {
			self.buf.iter().cloned().collect()
		}
	}

	pub fn clear(&mut self) {
		self.buf.clear();
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
	pub level: String,
	pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEntry {
	pub url: String,
	pub method: String,
	pub resource_type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	#[serde(skip)]
	pub request_id: String,
}

/// Per-session ring buffers, shared with every page pump.
#[derive(Clone, Default)]
pub struct Sinks {
	pub console: Arc<Mutex<Ring<ConsoleEntry>>>,
	pub errors: Arc<Mutex<Ring<String>>>,
	pub requests: Arc<Mutex<Ring<RequestEntry>>>,
	/// HAR entries, collected only while recording is on.
	pub har: Arc<Mutex<Option<Vec<RequestEntry>>>>,
}

/// One installed interception rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
	pub pattern: String,
	pub status: u16,
	pub body: Vec<u8>,
	pub content_type: Option<String>,
	pub headers: Vec<(String, String)>,
	pub abort: bool,
}

/// Routes plus origin-scoped extra headers, consulted on every paused
/// request.
#[derive(Debug, Default)]
pub struct RouteTable {
	pub rules: Vec<RouteRule>,
	pub scoped_headers: Vec<(String, Vec<(String, String)>)>,
}

impl RouteTable {
	pub fn is_empty(&self) -> bool {
		self.rules.is_empty() && self.scoped_headers.is_empty()
	}

	fn rule_for(&self, url: &str) -> Option<&RouteRule> {
		self.rules.iter().find(|rule| glob_match(&rule.pattern, url))
	}

	fn headers_for(&self, url: &str) -> Option<&[(String, String)]> {
		let origin = origin_of(url)?;
		self.scoped_headers
			.iter()
			.find(|(scoped, _)| *scoped == origin)
			.map(|(_, headers)| headers.as_slice())
	}
}

/// `*`-wildcard match, anchored at both ends.
pub fn glob_match(pattern: &str, value: &str) -> bool {
	fn inner(pattern: &[u8], value: &[u8]) -> bool {
		match (pattern.first(), value.first()) {
			(None, None) => true,
			(Some(b'*'), _) => inner(&pattern[1..], value) || (!value.is_empty() && inner(pattern, &value[1..])),
			(Some(p), Some(v)) if p == v => inner(&pattern[1..], &value[1..]),
			_ => false,
		}
	}
	inner(pattern.as_bytes(), value.as_bytes())
}

fn origin_of(raw: &str) -> Option<String> {
	let parsed = url::Url::parse(raw).ok()?;
	let host = parsed.host_str()?;
	match parsed.port() {
		Some(port) => Some(format!("{}://{host}:{port}", parsed.scheme())),
		None => Some(format!("{}://{host}", parsed.scheme())),
	}
}

/// Wires a page's event stream into the session sinks and the route
/// table. Returns the pump task handle; aborting it detaches the
/// listeners.
pub fn spawn_page_pump(page: Page, sinks: Sinks, routes: Arc<RwLock<RouteTable>>) -> tokio::task::JoinHandle<()> {
	let mut events = page.subscribe();
	tokio::spawn(async move {
		loop {
			let event = match events.recv().await {
				Ok(event) => event,
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					debug!(target = "ab.daemon", skipped, "sink pump lagged");
					continue;
				}
				Err(broadcast::error::RecvError::Closed) => break,
			};
			let Some(event) = page.parse_event(&event) else { continue };
			match event {
				PageEvent::Console(entry) => {
					sinks.console.lock().push(ConsoleEntry { level: entry.level, text: entry.text });
				}
				PageEvent::Exception(text) => {
					sinks.errors.lock().push(text);
				}
				PageEvent::Request(request) => {
					let entry = RequestEntry {
						url: request.url,
						method: request.method,
						resource_type: request.resource_type,
						status: None,
						request_id: request.request_id,
					};
					if let Some(har) = sinks.har.lock().as_mut() {
						har.push(entry.clone());
					}
					sinks.requests.lock().push(entry);
				}
				PageEvent::Response { request_id, status } => {
					let mut requests = sinks.requests.lock();
					for entry in requests.buf.iter_mut().rev() {
						if entry.request_id == request_id {
							entry.status = Some(status);
							break;
						}
					}
					drop(requests);
					if let Some(har) = sinks.har.lock().as_mut() {
						for entry in har.iter_mut().rev() {
							if entry.request_id == request_id {
								entry.status = Some(status);
								break;
							}
						}
					}
				}
				PageEvent::RequestPaused(paused) => {
					handle_paused(&page, &routes, paused).await;
				}
				PageEvent::Dialog(_) | PageEvent::Navigated { .. } => {}
			}
		}
	})
}

async fn handle_paused(page: &Page, routes: &RwLock<RouteTable>, paused: PausedRequest) {
	enum Plan {
		Fulfill { status: u16, headers: Vec<(String, String)>, body: Vec<u8> },
		Abort,
		Continue(Option<Vec<(String, String)>>),
	}

	let plan = {
		let table = routes.read();
		if let Some(rule) = table.rule_for(&paused.url) {
			if rule.abort {
				Plan::Abort
			} else {
				let mut headers = rule.headers.clone();
				if let Some(content_type) = &rule.content_type {
					headers.push(("Content-Type".to_string(), content_type.clone()));
				}
				Plan::Fulfill { status: rule.status, headers, body: rule.body.clone() }
			}
		} else if let Some(extra) = table.headers_for(&paused.url) {
			let mut merged: Vec<(String, String)> = Vec::new();
			if let Value::Object(existing) = &paused.headers {
				for (name, value) in existing {
					merged.push((name.clone(), value.as_str().unwrap_or_default().to_string()));
				}
			}
			merged.extend(extra.iter().cloned());
			Plan::Continue(Some(merged))
		} else {
			Plan::Continue(None)
		}
	};

	let result = match plan {
		Plan::Fulfill { status, headers, body } => page.fulfill_request(&paused.request_id, status, &headers, &body).await,
		Plan::Abort => page.abort_request(&paused.request_id).await,
		Plan::Continue(headers) => page.continue_request(&paused.request_id, headers.as_deref()).await,
	};
	if let Err(err) = result {
		warn!(target = "ab.daemon", error = %err, url = %paused.url, "failed to resolve paused request");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ring_drops_oldest_when_full() {
		let mut ring = Ring { buf: VecDeque::new(), cap: 3 };
		for n in 0..5 {
			ring.push(n);
		}
		assert_eq!(ring.drain_or_peek(false), vec![2, 3, 4]);
		assert_eq!(ring.len(), 3);
		assert_eq!(ring.drain_or_peek(true), vec![2, 3, 4]);
		assert!(ring.is_empty());
	}

	#[test]
	fn glob_matches_wildcards() {
		assert!(glob_match("*", "https://x/y"));
		assert!(glob_match("https://x/*", "https://x/y/z"));
		assert!(glob_match("*/api/*", "https://x/api/v1"));
		assert!(!glob_match("https://x/*", "https://y/"));
		assert!(glob_match("https://x/y", "https://x/y"));
	}

	#[test]
	fn scoped_headers_match_origin_only() {
		let table = RouteTable {
			rules: Vec::new(),
			scoped_headers: vec![("https://api.example.com".to_string(), vec![("X-Token".to_string(), "t".to_string())])],
		};
		assert!(table.headers_for("https://api.example.com/v1/thing").is_some());
		assert!(table.headers_for("https://example.com/v1/thing").is_none());
		assert!(table.headers_for("https://api.example.com:8443/x").is_none());
	}

	#[test]
	fn first_matching_rule_wins() {
		let rule = |pattern: &str, status: u16| RouteRule {
			pattern: pattern.to_string(),
			status,
			body: Vec::new(),
			content_type: None,
			headers: Vec::new(),
			abort: false,
		};
		let table = RouteTable {
			rules: vec![rule("*/api/*", 500), rule("*", 200)],
			scoped_headers: Vec::new(),
		};
		assert_eq!(table.rule_for("https://x/api/v1").unwrap().status, 500);
		assert_eq!(table.rule_for("https://x/page").unwrap().status, 200);
	}
}
