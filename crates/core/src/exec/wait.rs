//! Wait family. Every wait owns a deadline; overruns report `timeout`,
//! never `driver_error`.

use std::time::Duration;

use ab_protocol::{ErrorKind, WaitState};
use ab_runtime::{Locator, Page};
use serde_json::{Value, json};

use super::navigation::lifecycle_name;
use crate::error::{CoreError, Result};
use crate::session::{SessionState, glob_match};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum Condition {
	Selector(Locator, String),
	Text(String),
	UrlPattern(String),
	Predicate(String),
}

impl Condition {
	fn describe(&self) -> String {
		match self {
			Condition::Selector(_, raw) => format!("selector {raw}"),
			Condition::Text(text) => format!("text {text:?}"),
			Condition::UrlPattern(pattern) => format!("url {pattern}"),
			Condition::Predicate(_) => "predicate".to_string(),
		}
	}

	async fn probe(&self, page: &Page, timeout_ms: u64) -> Result<bool> {
		match self {
			Condition::Selector(locator, _) => Ok(page.count(locator, timeout_ms).await? > 0),
			Condition::Text(text) => {
				let needle = ab_runtime::js::js_string(text);
				let expr = format!("(document.body ? document.body.innerText : '').includes({needle})");
				Ok(page.evaluate(&expr, timeout_ms).await?.as_bool().unwrap_or(false))
			}
			Condition::UrlPattern(pattern) => {
				let current = page.url(timeout_ms).await?;
				Ok(current.contains(pattern.as_str()) || glob_match(pattern, &current))
			}
			Condition::Predicate(function) => {
				let expr = format!("!!(({function})())");
				Ok(page.evaluate(&expr, timeout_ms).await?.as_bool().unwrap_or(false))
			}
		}
	}
}

#[allow(clippy::too_many_arguments)]
pub async fn wait(
	session: &mut SessionState,
	selector: Option<String>,
	text: Option<String>,
	url: Option<String>,
	state: Option<WaitState>,
	function: Option<String>,
	duration_ms: Option<u64>,
	timeout_ms: Option<u64>,
) -> Result<Value> {
	let timeout = session.timeout_ms(timeout_ms);

	// A fixed-duration wait needs no browser at all.
	if let Some(duration) = duration_ms {
		tokio::time::sleep(Duration::from_millis(duration)).await;
		return Ok(json!({ "waited": duration }));
	}

	session.ensure_browser().await?;
	let page = session.active_page()?.clone();

	if let Some(state) = state {
		return match page.wait_for_lifecycle(lifecycle_name(Some(state)), timeout).await {
			Ok(()) => Ok(json!({})),
			Err(err) if err.is_timeout() => Err(timeout_error(timeout, "load state")),
			Err(err) => Err(err.into()),
		};
	}

	let condition = if let Some(selector) = selector {
		Condition::Selector(Locator::css(&selector), selector)
	} else if let Some(text) = text {
		Condition::Text(text)
	} else if let Some(pattern) = url {
		Condition::UrlPattern(pattern)
	} else if let Some(function) = function {
		Condition::Predicate(function)
	} else {
		return Err(CoreError::invalid_argument("wait needs one of: selector, text, url, state, function, durationMs"));
	};

	let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout);
	loop {
		match condition.probe(&page, timeout).await {
			Ok(true) => return Ok(json!({})),
			Ok(false) => {}
			Err(err) if err.kind == ErrorKind::Timeout => return Err(timeout_error(timeout, &condition.describe())),
			// Transient driver failures (a navigation racing the probe)
			// keep polling; the deadline settles it.
			Err(_) => {}
		}
		if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
			return Err(timeout_error(timeout, &condition.describe()));
		}
		tokio::time::sleep(POLL_INTERVAL).await;
	}
}

fn timeout_error(timeout_ms: u64, condition: &str) -> CoreError {
	CoreError::new(ErrorKind::Timeout, format!("waited {timeout_ms}ms for {condition}"))
}
