//! Query family: element and page reads, locator finders, script
//! surfaces.

use ab_runtime::{Locator, js};
use serde_json::{Value, json};

use super::target_locator;
use crate::error::{CoreError, Result};
use crate::session::SessionState;

/// Runs a string-producing expression against a targeted element.
pub async fn element_string(session: &mut SessionState, target: &str, body: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	let value = session.active_page()?.eval_on_element(&locator, body, timeout).await?;
	Ok(json!({ "value": value.as_str().unwrap_or_default() }))
}

pub async fn page_content(session: &mut SessionState) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let html = session.active_page()?.evaluate("document.documentElement.outerHTML", timeout).await?;
	Ok(json!({ "content": html.as_str().unwrap_or_default() }))
}

pub async fn page_url(session: &mut SessionState) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let url = session.active_page()?.url(timeout).await?;
	Ok(json!({ "url": url }))
}

pub async fn page_title(session: &mut SessionState) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let title = session.active_page()?.title(timeout).await?;
	Ok(json!({ "title": title }))
}

pub async fn attribute(session: &mut SessionState, target: &str, name: &str) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let body = format!("el.getAttribute({})", js::js_string(name));
	let value = session.active_page()?.eval_on_element(&locator, &body, timeout).await?;
	Ok(json!({ "value": value }))
}

pub async fn count(session: &mut SessionState, target: &str) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let count = session.active_page()?.count(&locator, timeout).await?;
	Ok(json!({ "count": count }))
}

pub async fn bounding_box(session: &mut SessionState, target: &str) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let body = "(() => { const r = el.getBoundingClientRect(); return { x: r.x, y: r.y, width: r.width, height: r.height }; })()";
	let value = session.active_page()?.eval_on_element(&locator, body, timeout).await?;
	Ok(value)
}

pub async fn styles(session: &mut SessionState, target: &str, props: Option<&[String]>) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let wanted = serde_json::to_string(&props.unwrap_or(&[]))?;
	let body = format!(
		"(() => {{ const style = window.getComputedStyle(el); const wanted = {wanted}; \
		 const names = wanted.length ? wanted : Array.from(style); const out = {{}}; \
		 for (const name of names) out[name] = style.getPropertyValue(name); return out; }})()"
	);
	session.active_page()?.eval_on_element(&locator, &body, timeout).await.map_err(Into::into)
}

/// Visibility-style predicates; a missing element reads as `false`
/// rather than an error.
pub async fn predicate(session: &mut SessionState, target: &str, body: &str) -> Result<Value> {
	let locator = target_locator(session, target)?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	match session.active_page()?.eval_on_element(&locator, body, timeout).await.map_err(CoreError::from) {
		Ok(value) => Ok(json!({ "value": value.as_bool().unwrap_or(false) })),
		Err(err) if err.kind == ab_protocol::ErrorKind::NotFound => Ok(json!({ "value": false })),
		Err(err) => Err(err),
	}
}

/// Lists every match of a locator with a short element summary.
pub async fn find_all(session: &mut SessionState, locator: Locator) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let body = "({ role: ab.roleOf(el), name: ab.nameOf(el), tag: el.tagName.toLowerCase(), visible: ab.visible(el) })";
	let expr = js::map_elements(&locator, body);
	let value = session.active_page()?.evaluate(&expr, timeout).await?;
	let count = value.as_array().map(Vec::len).unwrap_or(0);
	Ok(json!({ "count": count, "elements": value }))
}

/// `evaluate`: a bare expression, or a function applied to `arg`.
pub async fn evaluate(session: &mut SessionState, script: &str, arg: Option<Value>) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let expr = match &arg {
		Some(arg) => format!("(({script}))({arg})"),
		None => script.to_string(),
	};
	let value = session.active_page()?.evaluate_with_gesture(&expr, timeout).await?;
	Ok(json!({ "result": value }))
}

pub async fn evaluate_handle(session: &mut SessionState, script: &str) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let handle = session.active_page()?.evaluate_handle(script, timeout).await?;
	Ok(json!({ "handle": handle }))
}

pub async fn add_style(session: &mut SessionState, content: Option<String>, path: Option<String>) -> Result<Value> {
	let css = source_from(content, path, "addstyle needs content or path")?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let expr = format!(
		"(() => {{ const style = document.createElement('style'); style.textContent = {}; document.head.appendChild(style); return true; }})()",
		js::js_string(&css),
	);
	session.active_page()?.evaluate(&expr, timeout).await?;
	Ok(json!({}))
}

pub async fn add_script(session: &mut SessionState, content: Option<String>, path: Option<String>, url: Option<String>) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let expr = if let Some(url) = url {
		format!(
			"new Promise((resolve, reject) => {{ const s = document.createElement('script'); s.src = {}; \
			 s.onload = () => resolve(true); s.onerror = () => reject(new Error('script load failed')); \
			 document.head.appendChild(s); }})",
			js::js_string(&url),
		)
	} else {
		let source = source_from(content, path, "addscript needs content, path, or url")?;
		format!(
			"(() => {{ const s = document.createElement('script'); s.textContent = {}; document.head.appendChild(s); return true; }})()",
			js::js_string(&source),
		)
	};
	session.active_page()?.evaluate(&expr, timeout).await?;
	Ok(json!({}))
}

pub async fn add_init_script(session: &mut SessionState, script: &str) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.add_init_script(script).await?;
	Ok(json!({}))
}

pub async fn expose(session: &mut SessionState, name: &str) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.expose_binding(name).await?;
	Ok(json!({ "name": name }))
}

fn source_from(content: Option<String>, path: Option<String>, message: &str) -> Result<String> {
	if let Some(content) = content {
		return Ok(content);
	}
	if let Some(path) = path {
		return std::fs::read_to_string(&path).map_err(|err| CoreError::invalid_argument(format!("{path}: {err}")));
	}
	Err(CoreError::invalid_argument(message))
}
