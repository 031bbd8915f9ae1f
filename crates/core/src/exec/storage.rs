//! Storage family: named storage-state profiles, cookies, and web
//! storage.

use ab_protocol::{CookieParam, StorageKind};
use ab_runtime::js;
use serde_json::{Value, json};
use tracing::info;

use crate::crypto;
use crate::error::{CoreError, Result};
use crate::paths;
use crate::session::SessionState;

fn profile_path(name: &str) -> Result<std::path::PathBuf> {
	if !paths::valid_name(name) {
		return Err(CoreError::new(ab_protocol::ErrorKind::InvalidName, name.to_string()));
	}
	Ok(paths::state_dir()?.join(format!("{name}.json")))
}

fn target_path(name: Option<&str>, path: Option<&str>) -> Result<std::path::PathBuf> {
	match (name, path) {
		(_, Some(path)) => Ok(std::path::PathBuf::from(path)),
		(Some(name), None) => profile_path(name),
		(None, None) => profile_path("default"),
	}
}

/// Captures cookies plus the current origin's local storage.
pub async fn state_save(session: &mut SessionState, name: Option<&str>, path: Option<&str>) -> Result<Value> {
	let out = target_path(name, path)?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;

	let cookies = page.cookies(None).await?;
	let origin_state = page
		.evaluate(
			"(() => { const entries = []; for (let i = 0; i < localStorage.length; i++) { const k = localStorage.key(i); entries.push({ name: k, value: localStorage.getItem(k) }); } return { origin: location.origin, localStorage: entries }; })()",
			timeout,
		)
		.await
		.unwrap_or(Value::Null);

	let state = json!({ "cookies": cookies, "origins": [origin_state] });
	crypto::write_restricted(&out, &serde_json::to_vec_pretty(&state)?)
		.map_err(|err| CoreError::internal(err.to_string()))?;
	info!(target = "ab.daemon", path = %out.display(), "storage state saved");
	Ok(json!({ "path": out.display().to_string(), "cookies": state["cookies"].as_array().map(Vec::len).unwrap_or(0) }))
}

/// Restores cookies and, when the active page is on a saved origin, its
/// local storage.
pub async fn state_load(session: &mut SessionState, name: Option<&str>, path: Option<&str>) -> Result<Value> {
	let source = target_path(name, path)?;
	let raw = std::fs::read_to_string(&source)
		.map_err(|err| CoreError::invalid_argument(format!("{}: {err}", source.display())))?;
	let state: Value = serde_json::from_str(&raw)?;

	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;

	let cookies = state.get("cookies").and_then(Value::as_array).cloned().unwrap_or_default();
	let cookie_count = cookies.len();
	if !cookies.is_empty() {
		page.set_cookies(cookies).await?;
	}

	let current_origin = page.evaluate("location.origin", timeout).await?.as_str().unwrap_or_default().to_string();
	let mut restored_storage = 0usize;
	for origin in state.get("origins").and_then(Value::as_array).into_iter().flatten() {
		if origin.get("origin").and_then(Value::as_str) != Some(current_origin.as_str()) {
			continue;
		}
		for entry in origin.get("localStorage").and_then(Value::as_array).into_iter().flatten() {
			let (Some(name), Some(value)) = (
				entry.get("name").and_then(Value::as_str),
				entry.get("value").and_then(Value::as_str),
			) else {
				continue;
			};
			let expr = format!("localStorage.setItem({}, {})", js::js_string(name), js::js_string(value));
			page.evaluate(&expr, timeout).await?;
			restored_storage += 1;
		}
	}

	Ok(json!({ "cookies": cookie_count, "localStorage": restored_storage }))
}

pub fn state_list() -> Result<Value> {
	let dir = paths::state_dir()?;
	let mut names = Vec::new();
	if let Ok(entries) = std::fs::read_dir(&dir) {
		for entry in entries.flatten() {
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) == Some("json") {
				if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
					names.push(stem.to_string());
				}
			}
		}
	}
	names.sort();
	Ok(json!({ "profiles": names }))
}

/// Shows a profile's shape without the cookie values.
pub fn state_show(name: &str) -> Result<Value> {
	let path = profile_path(name)?;
	let raw = std::fs::read_to_string(&path).map_err(|err| CoreError::invalid_argument(format!("{name}: {err}")))?;
	let state: Value = serde_json::from_str(&raw)?;

	let cookies: Vec<Value> = state
		.get("cookies")
		.and_then(Value::as_array)
		.into_iter()
		.flatten()
		.map(|cookie| {
			json!({
				"name": cookie.get("name"),
				"domain": cookie.get("domain"),
				"expires": cookie.get("expires"),
			})
		})
		.collect();
	let origins: Vec<Value> = state
		.get("origins")
		.and_then(Value::as_array)
		.into_iter()
		.flatten()
		.filter_map(|origin| origin.get("origin").cloned())
		.collect();
	Ok(json!({ "name": name, "cookieCount": cookies.len(), "cookies": cookies, "origins": origins }))
}

pub fn state_clear(name: &str) -> Result<Value> {
	let path = profile_path(name)?;
	let removed = std::fs::remove_file(&path).is_ok();
	Ok(json!({ "removed": removed }))
}

/// Removes stale daemon endpoints and empty profile files.
pub fn state_clean(session_name: &str) -> Result<Value> {
	let mut removed = Vec::new();

	if let Ok(dir) = paths::state_dir() {
		if let Ok(entries) = std::fs::read_dir(&dir) {
			for entry in entries.flatten() {
				let path = entry.path();
				if std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(false) && std::fs::remove_file(&path).is_ok() {
					removed.push(path.display().to_string());
				}
			}
		}
	}

	// Stale sentinels of other sessions are cleaned at their own
	// startup; only this session's sentinel is safe to judge here.
	if let Ok(sentinel) = paths::port_sentinel(session_name) {
		if sentinel.exists() && std::fs::remove_file(&sentinel).is_ok() {
			removed.push(sentinel.display().to_string());
		}
	}

	Ok(json!({ "removed": removed }))
}

pub fn state_rename(from: &str, to: &str) -> Result<Value> {
	let source = profile_path(from)?;
	let dest = profile_path(to)?;
	if !source.exists() {
		return Err(CoreError::invalid_argument(format!("no profile named {from}")));
	}
	if dest.exists() {
		return Err(CoreError::invalid_argument(format!("profile {to} already exists")));
	}
	std::fs::rename(&source, &dest)?;
	Ok(json!({}))
}

pub async fn cookies_get(session: &mut SessionState, urls: Option<&[String]>) -> Result<Value> {
	session.ensure_browser().await?;
	let cookies = session.active_page()?.cookies(urls).await?;
	Ok(json!({ "cookies": cookies }))
}

pub async fn cookies_set(session: &mut SessionState, cookies: Vec<CookieParam>) -> Result<Value> {
	if cookies.is_empty() {
		return Err(CoreError::invalid_argument("cookies_set needs at least one cookie"));
	}
	for cookie in &cookies {
		if cookie.url.is_none() && cookie.domain.is_none() {
			return Err(CoreError::invalid_argument(format!("cookie {:?} needs a url or domain", cookie.name)));
		}
	}
	let count = cookies.len();
	session.ensure_browser().await?;
	let values: Vec<Value> = cookies.into_iter().map(|cookie| serde_json::to_value(cookie).unwrap_or(Value::Null)).collect();
	session.active_page()?.set_cookies(values).await?;
	Ok(json!({ "set": count }))
}

pub async fn cookies_clear(session: &mut SessionState) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.clear_cookies().await?;
	Ok(json!({}))
}

fn storage_object(kind: StorageKind) -> &'static str {
	match kind {
		StorageKind::Local => "localStorage",
		StorageKind::Session => "sessionStorage",
	}
}

pub async fn storage_get(session: &mut SessionState, kind: StorageKind, key: Option<&str>) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let object = storage_object(kind);
	let expr = match key {
		Some(key) => format!("{object}.getItem({})", js::js_string(key)),
		None => format!(
			"(() => {{ const out = {{}}; for (let i = 0; i < {object}.length; i++) {{ const k = {object}.key(i); out[k] = {object}.getItem(k); }} return out; }})()"
		),
	};
	let value = session.active_page()?.evaluate(&expr, timeout).await?;
	Ok(json!({ "value": value }))
}

pub async fn storage_set(session: &mut SessionState, kind: StorageKind, key: &str, value: &str) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let expr = format!("{}.setItem({}, {})", storage_object(kind), js::js_string(key), js::js_string(value));
	session.active_page()?.evaluate(&expr, timeout).await?;
	Ok(json!({}))
}

pub async fn storage_clear(session: &mut SessionState, kind: StorageKind) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	session.active_page()?.evaluate(&format!("{}.clear()", storage_object(kind)), timeout).await?;
	Ok(json!({}))
}
