//! Network family: interception routes, tracked requests, scoped
//! headers, HAR capture.

use ab_protocol::ErrorKind;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::error::{CoreError, Result};
use crate::session::{RouteRule, SessionState};

/// Ensures the Fetch domain is on for the active page whenever the
/// route table is non-empty, and off when it empties.
async fn sync_interception(session: &mut SessionState) -> Result<()> {
	let want = !session.routes.read().is_empty();
	if want == session.fetch_enabled {
		return Ok(());
	}
	let page = session.active_page()?;
	if want {
		page.fetch_enable(&["*".to_string()]).await?;
	} else {
		page.fetch_disable().await?;
	}
	session.fetch_enabled = want;
	Ok(())
}

pub async fn route(
	session: &mut SessionState,
	url: String,
	status: Option<u16>,
	body: Option<String>,
	content_type: Option<String>,
	headers: Option<Map<String, Value>>,
	abort: Option<bool>,
) -> Result<Value> {
	session.ensure_browser().await?;
	let rule = RouteRule {
		pattern: url.clone(),
		status: status.unwrap_or(200),
		body: body.unwrap_or_default().into_bytes(),
		content_type,
		headers: headers
			.unwrap_or_default()
			.into_iter()
			.map(|(name, value)| (name, value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string())))
			.collect(),
		abort: abort.unwrap_or(false),
	};
	session.routes.write().rules.push(rule);
	sync_interception(session).await?;
	info!(target = "ab.daemon", pattern = %url, "route installed");
	Ok(json!({}))
}

pub async fn unroute(session: &mut SessionState, url: Option<&str>) -> Result<Value> {
	let removed = {
		let mut table = session.routes.write();
		let before = table.rules.len();
		match url {
			Some(pattern) => table.rules.retain(|rule| rule.pattern != pattern),
			None => table.rules.clear(),
		}
		before - table.rules.len()
	};
	if session.is_launched() {
		sync_interception(session).await?;
	}
	Ok(json!({ "removed": removed }))
}

pub fn requests(session: &mut SessionState, filter: Option<&str>, clear: bool) -> Result<Value> {
	let entries = session.sinks.requests.lock().drain_or_peek(clear);
	let entries: Vec<_> = entries
		.into_iter()
		.filter(|entry| filter.map(|needle| entry.url.contains(needle)).unwrap_or(true))
		.collect();
	Ok(json!({ "count": entries.len(), "requests": entries }))
}

/// Extra headers: global via the driver, or origin-scoped via
/// interception.
pub async fn headers(session: &mut SessionState, headers: Map<String, Value>, origin: Option<String>) -> Result<Value> {
	session.ensure_browser().await?;
	match origin {
		Some(origin) => {
			let pairs: Vec<(String, String)> = headers
				.into_iter()
				.map(|(name, value)| (name, value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string())))
				.collect();
			{
				let mut table = session.routes.write();
				table.scoped_headers.retain(|(scoped, _)| *scoped != origin);
				table.scoped_headers.push((origin, pairs));
			}
			sync_interception(session).await?;
		}
		None => {
			session.active_page()?.set_extra_headers(&headers).await?;
		}
	}
	Ok(json!({}))
}

pub fn har_start(session: &mut SessionState, path: Option<&str>) -> Result<Value> {
	if session.har_path.is_some() {
		return Err(CoreError::invalid_argument("HAR recording is already active"));
	}
	session.har_path = Some(path.unwrap_or("capture.har").to_string());
	*session.sinks.har.lock() = Some(Vec::new());
	Ok(json!({}))
}

pub fn har_stop(session: &mut SessionState, path: Option<&str>) -> Result<Value> {
	let Some(started_path) = session.har_path.take() else {
		return Err(CoreError::invalid_argument("HAR recording is not active"));
	};
	let entries = session.sinks.har.lock().take().unwrap_or_default();
	let out_path = path.unwrap_or(&started_path).to_string();

	let har_entries: Vec<Value> = entries
		.iter()
		.map(|entry| {
			json!({
				"request": { "method": entry.method, "url": entry.url, "headers": [] },
				"response": { "status": entry.status.unwrap_or(0), "headers": [], "content": {} },
				"_resourceType": entry.resource_type,
			})
		})
		.collect();
	let log = json!({
		"log": {
			"version": "1.2",
			"creator": { "name": "agent-browser", "version": env!("CARGO_PKG_VERSION") },
			"entries": har_entries,
		}
	});
	std::fs::write(&out_path, serde_json::to_vec_pretty(&log).map_err(CoreError::from)?)
		.map_err(|err| CoreError::new(ErrorKind::InternalError, err.to_string()))?;
	Ok(json!({ "path": out_path, "entries": entries.len() }))
}
