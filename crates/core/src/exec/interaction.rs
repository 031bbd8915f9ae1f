//! Interaction family: pointer, text entry, form controls, scrolling,
//! uploads, downloads, dialogs.

use std::time::Duration;

use ab_protocol::{DialogChoice, KeyboardAction, ScrollDirection};
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::debug;

use super::target_locator;
use crate::error::{CoreError, Result};
use crate::session::SessionState;

pub async fn click(session: &mut SessionState, target: &str, button: Option<&str>, count: u32, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	let (x, y) = page.element_center(&locator, timeout).await?;
	page.click_at(x, y, button.unwrap_or("left"), count, timeout).await?;
	Ok(json!({}))
}

pub async fn hover(session: &mut SessionState, target: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	let (x, y) = page.element_center(&locator, timeout).await?;
	page.hover_at(x, y, timeout).await?;
	Ok(json!({}))
}

pub async fn tap(session: &mut SessionState, target: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	let (x, y) = page.element_center(&locator, timeout).await?;
	page.tap_at(x, y, timeout).await?;
	Ok(json!({}))
}

pub async fn drag(session: &mut SessionState, source: &str, target: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let from_locator = target_locator(session, source)?;
	let to_locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	let from = page.element_center(&from_locator, timeout).await?;
	let to = page.element_center(&to_locator, timeout).await?;
	page.drag_between(from, to, timeout).await?;
	Ok(json!({}))
}

/// Clears the target then types the value.
pub async fn fill(session: &mut SessionState, target: &str, value: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	page.focus(&locator, timeout).await?;
	page.eval_on_element(&locator, "(el.select ? (el.select(), true) : true)", timeout).await?;
	page.insert_text(value, timeout).await?;
	Ok(json!({}))
}

/// Appends text with per-key events.
pub async fn type_text(session: &mut SessionState, target: &str, text: &str, delay_ms: Option<u64>, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	page.focus(&locator, timeout).await?;
	page.type_text(text, delay_ms, timeout).await?;
	Ok(json!({}))
}

pub async fn press(session: &mut SessionState, key: &str, target: Option<&str>) -> Result<Value> {
	let locator = target.map(|target| target_locator(session, target)).transpose()?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	if let Some(locator) = locator {
		page.focus(&locator, timeout).await?;
	}
	page.press_key(key, timeout).await?;
	Ok(json!({}))
}

pub async fn keyboard(session: &mut SessionState, subaction: KeyboardAction, text: Option<&str>, key: Option<&str>) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	match subaction {
		KeyboardAction::Type => {
			let text = text.ok_or_else(|| CoreError::invalid_argument("keyboard type needs text"))?;
			page.type_text(text, None, timeout).await?;
		}
		KeyboardAction::InsertText => {
			let text = text.ok_or_else(|| CoreError::invalid_argument("keyboard insertText needs text"))?;
			page.insert_text(text, timeout).await?;
		}
		KeyboardAction::Press => {
			let key = key.ok_or_else(|| CoreError::invalid_argument("keyboard press needs key"))?;
			page.press_key(key, timeout).await?;
		}
	}
	Ok(json!({}))
}

pub async fn select(session: &mut SessionState, target: &str, values: &[String], timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let selected = session.active_page()?.select_options(&locator, values, timeout).await?;
	if selected.is_empty() {
		return Err(CoreError::invalid_argument(format!("no option matched {values:?}")));
	}
	Ok(json!({ "selected": selected }))
}

/// Check/uncheck with the hidden-control retry: a visibility pre-check
/// failure retries once with a forced DOM write, and the second failure
/// is reported verbatim.
pub async fn set_checked(session: &mut SessionState, target: &str, checked: bool, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let page = session.active_page()?;

	let visible = page.is_visible(&locator, timeout).await.unwrap_or(false);
	if visible {
		let current = page
			.eval_on_element(&locator, "!!el.checked", timeout)
			.await?
			.as_bool()
			.unwrap_or(false);
		if current != checked {
			let (x, y) = page.element_center(&locator, timeout).await?;
			page.click_at(x, y, "left", 1, timeout).await?;
		}
		return Ok(json!({ "checked": checked }));
	}

	debug!(target = "ab.daemon", target = %target, "control failed visibility pre-check, forcing");
	page.set_checked_forced(&locator, checked, timeout).await?;
	Ok(json!({ "checked": checked, "forced": true }))
}

pub async fn clear(session: &mut SessionState, target: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	session.active_page()?.set_value(&locator, "", timeout).await?;
	Ok(json!({}))
}

pub async fn select_all(session: &mut SessionState, target: Option<&str>) -> Result<Value> {
	let locator = target.map(|target| target_locator(session, target)).transpose()?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;
	if let Some(locator) = locator {
		page.focus(&locator, timeout).await?;
	}
	page.press_key("Control+a", timeout).await?;
	Ok(json!({}))
}

pub async fn set_value(session: &mut SessionState, target: &str, value: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	session.active_page()?.set_value(&locator, value, timeout).await?;
	Ok(json!({}))
}

pub async fn upload(session: &mut SessionState, target: &str, files: &[String], timeout_ms: Option<u64>) -> Result<Value> {
	if files.is_empty() {
		return Err(CoreError::invalid_argument("upload needs at least one file"));
	}
	for file in files {
		if !std::path::Path::new(file).exists() {
			return Err(CoreError::invalid_argument(format!("file not found: {file}")));
		}
	}
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let token = format!("{:08x}", rand::thread_rng().r#gen::<u32>());
	session.active_page()?.set_input_files(&locator, files, &token, timeout).await?;
	Ok(json!({ "files": files.len() }))
}

/// Clicks a download trigger and waits for the browser to finish
/// writing the file.
pub async fn download(session: &mut SessionState, target: &str, path: Option<&str>, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;

	let dir = match path {
		Some(path) => std::path::Path::new(path)
			.parent()
			.filter(|parent| !parent.as_os_str().is_empty())
			.unwrap_or(std::path::Path::new("."))
			.to_path_buf(),
		None => std::env::temp_dir(),
	};
	std::fs::create_dir_all(&dir)?;

	let browser = session.browser.as_ref().ok_or_else(|| CoreError::bare(ab_protocol::ErrorKind::NotLaunched))?;
	browser.set_download_path(&dir.to_string_lossy()).await?;
	let mut events = browser.client().subscribe();

	let page = session.active_page()?;
	let (x, y) = page.element_center(&locator, timeout).await?;
	page.click_at(x, y, "left", 1, timeout).await?;

	let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout);
	let mut suggested_name = None;
	loop {
		let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
		if remaining.is_zero() {
			return Err(CoreError::new(ab_protocol::ErrorKind::Timeout, "waiting for download to complete"));
		}
		let event = match tokio::time::timeout(remaining, events.recv()).await {
			Ok(Ok(event)) => event,
			Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
			Ok(Err(broadcast::error::RecvError::Closed)) => return Err(CoreError::new(ab_protocol::ErrorKind::DriverError, "browser closed")),
			Err(_) => return Err(CoreError::new(ab_protocol::ErrorKind::Timeout, "waiting for download to complete")),
		};
		match event.method.as_str() {
			"Browser.downloadWillBegin" => {
				suggested_name = event
					.params
					.get("suggestedFilename")
					.and_then(Value::as_str)
					.map(str::to_owned);
			}
			"Browser.downloadProgress" => {
				match event.params.get("state").and_then(Value::as_str) {
					Some("completed") => break,
					Some("canceled") => return Err(CoreError::new(ab_protocol::ErrorKind::DriverError, "download canceled")),
					_ => {}
				}
			}
			_ => {}
		}
	}

	let suggested = suggested_name.unwrap_or_else(|| "download".to_string());
	let written = dir.join(&suggested);
	let final_path = match path {
		Some(path) => {
			if written != std::path::Path::new(path) {
				std::fs::rename(&written, path).or_else(|_| std::fs::copy(&written, path).map(|_| ()))?;
			}
			path.to_string()
		}
		None => written.to_string_lossy().into_owned(),
	};
	Ok(json!({ "path": final_path, "suggestedFilename": suggested }))
}

pub async fn scroll(session: &mut SessionState, direction: Option<ScrollDirection>, pixels: Option<i64>, target: Option<&str>) -> Result<Value> {
	let locator = target.map(|target| target_locator(session, target)).transpose()?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;

	let amount = pixels.unwrap_or(600);
	let (dx, dy) = match direction.unwrap_or(ScrollDirection::Down) {
		ScrollDirection::Up => (0, -amount),
		ScrollDirection::Down => (0, amount),
		ScrollDirection::Left => (-amount, 0),
		ScrollDirection::Right => (amount, 0),
	};

	match locator {
		Some(locator) => {
			let body = format!("(el.scrollBy({dx}, {dy}), true)");
			page.eval_on_element(&locator, &body, timeout).await?;
		}
		None => {
			page.evaluate(&format!("(window.scrollBy({dx}, {dy}), true)"), timeout).await?;
		}
	}
	Ok(json!({}))
}

pub async fn scroll_into_view(session: &mut SessionState, target: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	session
		.active_page()?
		.eval_on_element(&locator, "(el.scrollIntoView({ block: 'center' }), true)", timeout)
		.await?;
	Ok(json!({}))
}

/// Installs the automatic dialog response for this and future pages.
pub fn dialog(session: &mut SessionState, choice: DialogChoice, text: Option<String>) -> Result<Value> {
	let accept = matches!(choice, DialogChoice::Accept);
	session.dialog_choice = Some((accept, text));
	for tab in &session.tabs {
		tab.page.set_dialog_choice(session.dialog_choice.clone());
	}
	Ok(json!({}))
}
