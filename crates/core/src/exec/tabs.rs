//! Tab, frame, and sink actions.

use ab_protocol::ErrorKind;
use serde_json::{Value, json};

use super::navigation::normalize_url;
use crate::error::{CoreError, Result};
use crate::session::SessionState;

pub async fn tab_new(session: &mut SessionState, url: Option<&str>) -> Result<Value> {
	let url = url.map(normalize_url).transpose()?;
	session.ensure_browser().await?;
	let browser = session.browser.as_ref().ok_or_else(|| CoreError::bare(ErrorKind::NotLaunched))?;
	let page = browser.new_page(url.as_deref()).await?;
	session.adopt_page(page);
	session.invalidate_refs();
	Ok(json!({ "index": session.active_tab }))
}

pub async fn tab_list(session: &mut SessionState) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	let timeout = session.timeout_ms(None);
	let mut tabs = Vec::new();
	for (index, tab) in session.tabs.iter().enumerate() {
		let url = tab.page.current_url();
		let title = tab.page.title(timeout).await.unwrap_or_default();
		tabs.push(json!({
			"index": index,
			"url": url,
			"title": title,
			"active": index == session.active_tab,
		}));
	}
	Ok(json!({ "tabs": tabs }))
}

pub async fn tab_switch(session: &mut SessionState, index: usize) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	if index >= session.tabs.len() {
		return Err(CoreError::invalid_argument(format!("no tab at index {index} (have {})", session.tabs.len())));
	}
	session.active_tab = index;
	session.invalidate_refs();
	session.tabs[index].page.activate().await?;
	Ok(json!({ "index": index }))
}

pub async fn tab_close(session: &mut SessionState, index: Option<usize>) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	let index = index.unwrap_or(session.active_tab);
	session.close_tab(index).await?;
	Ok(json!({ "activeIndex": session.active_tab }))
}

pub fn frame(session: &mut SessionState, selector: Option<&str>, name: Option<&str>, url: Option<&str>) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	if selector.is_none() && name.is_none() && url.is_none() {
		return Err(CoreError::invalid_argument("frame needs a selector, name, or url"));
	}
	let page = session.active_page()?;
	// Selector-addressed frames are matched by their URL fragment; the
	// frame tree carries no selector information.
	let matched = page.set_active_frame(url.or(selector), name);
	match matched {
		Some(frame_url) => Ok(json!({ "url": frame_url })),
		None => Err(CoreError::bare(ErrorKind::NotFound)),
	}
}

pub fn mainframe(session: &mut SessionState) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	session.active_page()?.clear_active_frame();
	Ok(json!({}))
}

pub fn console(session: &mut SessionState, clear: bool) -> Result<Value> {
	let entries = session.sinks.console.lock().drain_or_peek(clear);
	Ok(json!({ "count": entries.len(), "messages": entries }))
}

pub fn errors(session: &mut SessionState, clear: bool) -> Result<Value> {
	let entries = session.sinks.errors.lock().drain_or_peek(clear);
	Ok(json!({ "count": entries.len(), "errors": entries }))
}
