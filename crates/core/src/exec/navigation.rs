//! Navigation family: scheme-gated navigate, history, reload.

use ab_protocol::WaitState;
use serde_json::{Value, json};
use tracing::info;

use crate::error::{CoreError, Result};
use crate::session::SessionState;

/// Schemes navigation will accept; anything else is refused before the
/// driver is touched.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "about", "data", "file"];

pub(crate) fn lifecycle_name(state: Option<WaitState>) -> &'static str {
	match state.unwrap_or(WaitState::Load) {
		WaitState::Load => "load",
		WaitState::Domcontentloaded => "DOMContentLoaded",
		WaitState::Networkidle => "networkIdle",
	}
}

/// Validates and normalises a navigation URL. Bare hostnames get an
/// `https://` prefix so agents can say `navigate example.com`.
pub(crate) fn normalize_url(raw: &str) -> Result<String> {
	let candidate = match url::Url::parse(raw) {
		Ok(parsed) => parsed,
		Err(url::ParseError::RelativeUrlWithoutBase) => {
			url::Url::parse(&format!("https://{raw}")).map_err(|err| CoreError::invalid_argument(format!("invalid URL {raw:?}: {err}")))?
		}
		Err(err) => return Err(CoreError::invalid_argument(format!("invalid URL {raw:?}: {err}"))),
	};
	if !ALLOWED_SCHEMES.contains(&candidate.scheme()) {
		return Err(CoreError::invalid_argument(format!("scheme {:?} is not allowed", candidate.scheme())));
	}
	Ok(candidate.into())
}

pub async fn navigate(session: &mut SessionState, url: &str, wait_until: Option<WaitState>, timeout_ms: Option<u64>) -> Result<Value> {
	let url = normalize_url(url)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	info!(target = "ab.daemon", url = %url, "navigate");

	let page = session.active_page()?;
	page.navigate(&url, lifecycle_name(wait_until), timeout).await?;
	let final_url = page.url(timeout).await.unwrap_or_else(|_| url.clone());
	session.invalidate_refs();
	session.prev_url = Some(final_url.clone());
	Ok(json!({ "url": final_url }))
}

pub async fn history(session: &mut SessionState, delta: i64, timeout_ms: Option<u64>) -> Result<Value> {
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	let moved = page.history_step(delta, timeout).await?;
	let url = page.url(timeout).await.unwrap_or_default();
	session.invalidate_refs();
	Ok(json!({ "moved": moved, "url": url }))
}

pub async fn reload(session: &mut SessionState, timeout_ms: Option<u64>) -> Result<Value> {
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	page.reload("load", timeout).await?;
	let url = page.current_url();
	session.invalidate_refs();
	Ok(json!({ "url": url }))
}

pub async fn set_content(session: &mut SessionState, html: &str) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	page.set_content(html, timeout).await?;
	session.invalidate_refs();
	Ok(json!({}))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allowlisted_schemes_pass() {
		for url in ["https://example.com", "http://x", "about:blank", "data:text/html,<p>x</p>", "file:///tmp/a.html"] {
			assert!(normalize_url(url).is_ok(), "rejected {url}");
		}
	}

	#[test]
	fn disallowed_schemes_fail_before_the_driver() {
		for url in ["javascript:alert(1)", "chrome://settings", "ftp://host/file", "ws://x"] {
			let err = normalize_url(url).unwrap_err();
			assert_eq!(err.kind, ab_protocol::ErrorKind::InvalidArgument, "accepted {url}");
		}
	}

	#[test]
	fn bare_hostnames_get_https() {
		assert_eq!(normalize_url("example.com/x").unwrap(), "https://example.com/x");
	}
}
