//! Script evaluation, navigation, and element queries.

use serde_json::{Value, json};

use super::{Page, bounded};
use crate::error::{DriverError, Result};
use crate::js;
use crate::locator::Locator;

impl Page {
	/// Evaluates an expression in the active frame's default context and
	/// returns its JSON value.
	pub async fn evaluate(&self, expression: &str, timeout_ms: u64) -> Result<Value> {
		bounded(timeout_ms, self.evaluate_inner(expression, true, false)).await
	}

	/// Evaluates with a user gesture, for expressions that trigger
	/// gesture-gated behaviour.
	pub async fn evaluate_with_gesture(&self, expression: &str, timeout_ms: u64) -> Result<Value> {
		bounded(timeout_ms, self.evaluate_inner(expression, true, true)).await
	}

	/// Evaluates and returns the remote object id instead of a value.
	pub async fn evaluate_handle(&self, expression: &str, timeout_ms: u64) -> Result<String> {
		let result = bounded(timeout_ms, self.evaluate_inner(expression, false, false)).await?;
		result
			.get("objectId")
			.and_then(Value::as_str)
			.map(str::to_owned)
			.ok_or_else(|| DriverError::Protocol("expression produced no object handle".to_string()))
	}

	async fn evaluate_inner(&self, expression: &str, by_value: bool, user_gesture: bool) -> Result<Value> {
		let mut params = json!({
			"expression": expression,
			"returnByValue": by_value,
			"awaitPromise": true,
			"userGesture": user_gesture,
		});
		if let Some(context_id) = self.active_context_id() {
			params["contextId"] = json!(context_id);
		}

		let reply = self.call("Runtime.evaluate", params).await?;
		if let Some(exception) = reply.get("exceptionDetails") {
			let text = exception
				.pointer("/exception/description")
				.and_then(Value::as_str)
				.or_else(|| exception.get("text").and_then(Value::as_str))
				.unwrap_or("evaluation failed");
			return Err(DriverError::Protocol(text.to_string()));
		}
		if by_value {
			Ok(reply.pointer("/result/value").cloned().unwrap_or(Value::Null))
		} else {
			Ok(reply.get("result").cloned().unwrap_or(Value::Null))
		}
	}

	/// Resolves `locator` and evaluates `body` with the element bound as
	/// `el`. Zero matches surface as [`DriverError::NoMatch`].
	pub async fn eval_on_element(&self, locator: &Locator, body: &str, timeout_ms: u64) -> Result<Value> {
		let value = self.evaluate(&js::with_element(locator, body), timeout_ms).await?;
		if value.get("__abNoMatch").and_then(Value::as_bool) == Some(true) {
			return Err(DriverError::NoMatch);
		}
		Ok(value)
	}

	/// Counts matches for a locator.
	pub async fn count(&self, locator: &Locator, timeout_ms: u64) -> Result<usize> {
		let value = self.evaluate(&js::map_elements(locator, "0"), timeout_ms).await?;
		Ok(value.as_array().map(Vec::len).unwrap_or(0))
	}

	/// Captures the accessibility-style tree used for snapshots.
	pub async fn accessibility_tree(&self, selector: Option<&str>, max_depth: Option<usize>, timeout_ms: u64) -> Result<Value> {
		self.evaluate(&js::tree_expr(selector, max_depth), timeout_ms).await
	}

	/// Navigates the main frame, failing on a navigation error and then
	/// waiting for the requested lifecycle state.
	pub async fn navigate(&self, url: &str, wait_for: &str, timeout_ms: u64) -> Result<()> {
		// Drop the previous document's lifecycle marks so the wait below
		// observes this navigation, not the old page.
		self.state.lock().lifecycle.clear();
		let reply = bounded(timeout_ms, self.call("Page.navigate", json!({ "url": url }))).await?;
		if let Some(error) = reply.get("errorText").and_then(Value::as_str) {
			if !error.is_empty() {
				return Err(DriverError::Protocol(format!("navigation failed: {error}")));
			}
		}
		self.wait_for_lifecycle(wait_for, timeout_ms).await
	}

	pub async fn reload(&self, wait_for: &str, timeout_ms: u64) -> Result<()> {
		self.state.lock().lifecycle.clear();
		bounded(timeout_ms, self.call("Page.reload", json!({}))).await?;
		self.wait_for_lifecycle(wait_for, timeout_ms).await
	}

	/// Moves through session history; `delta` of -1 is back, +1 forward.
	/// Returns false when there is no entry in that direction.
	pub async fn history_step(&self, delta: i64, timeout_ms: u64) -> Result<bool> {
		let history = self.call("Page.getNavigationHistory", json!({})).await?;
		let current = history.get("currentIndex").and_then(Value::as_i64).unwrap_or(0);
		let entries = history.get("entries").and_then(Value::as_array).cloned().unwrap_or_default();
		let target = current + delta;
		if target < 0 || target as usize >= entries.len() {
			return Ok(false);
		}
		let Some(entry_id) = entries[target as usize].get("id").and_then(Value::as_i64) else {
			return Ok(false);
		};
		self.state.lock().lifecycle.clear();
		bounded(timeout_ms, self.call("Page.navigateToHistoryEntry", json!({ "entryId": entry_id }))).await?;
		self.wait_for_lifecycle("load", timeout_ms).await?;
		Ok(true)
	}

	/// Replaces the main frame's document.
	pub async fn set_content(&self, html: &str, timeout_ms: u64) -> Result<()> {
		let frame_id = self.state.lock().main_frame_id.clone();
		bounded(timeout_ms, self.call("Page.setDocumentContent", json!({ "frameId": frame_id, "html": html }))).await?;
		Ok(())
	}

	pub async fn title(&self, timeout_ms: u64) -> Result<String> {
		let value = self.evaluate("document.title", timeout_ms).await?;
		Ok(value.as_str().unwrap_or_default().to_string())
	}

	pub async fn url(&self, timeout_ms: u64) -> Result<String> {
		let value = self.evaluate("location.href", timeout_ms).await?;
		Ok(value.as_str().unwrap_or_default().to_string())
	}

	/// Registers a script evaluated before any page script on future
	/// navigations.
	pub async fn add_init_script(&self, source: &str) -> Result<()> {
		self.call("Page.addScriptToEvaluateOnNewDocument", json!({ "source": source })).await?;
		Ok(())
	}

	/// Exposes a named binding callable from page scripts.
	pub async fn expose_binding(&self, name: &str) -> Result<()> {
		self.call("Runtime.addBinding", json!({ "name": name })).await?;
		Ok(())
	}

	/// Marks the first locator match with a one-shot attribute and
	/// returns the DOM nodeId, for commands that need a real node
	/// (file upload, focus).
	pub async fn node_for(&self, locator: &Locator, token: &str, timeout_ms: u64) -> Result<i64> {
		let body = format!("(el.setAttribute('data-ab-node', {token}), true)", token = js::js_string(token));
		self.eval_on_element(locator, &body, timeout_ms).await?;

		let document = self.call("DOM.getDocument", json!({ "depth": 0 })).await?;
		let root = document
			.pointer("/root/nodeId")
			.and_then(Value::as_i64)
			.ok_or_else(|| DriverError::Protocol("DOM.getDocument returned no root".to_string()))?;
		let node = self
			.call("DOM.querySelector", json!({ "nodeId": root, "selector": format!("[data-ab-node=\"{token}\"]") }))
			.await?;
		let node_id = node.get("nodeId").and_then(Value::as_i64).unwrap_or(0);

		let _ = self.eval_on_element(locator, "(el.removeAttribute('data-ab-node'), true)", timeout_ms).await;

		if node_id == 0 {
			return Err(DriverError::NoMatch);
		}
		Ok(node_id)
	}
}
