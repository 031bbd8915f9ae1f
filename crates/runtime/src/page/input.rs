//! Trusted input: mouse, keyboard, and form-control interaction.

use serde_json::{Value, json};

use super::{Page, bounded};
use crate::error::{DriverError, Result};
use crate::js;
use crate::locator::Locator;

/// Modifier bitmask per the Input domain: Alt=1, Ctrl=2, Meta=4, Shift=8.
fn modifier_bit(name: &str) -> Option<u32> {
	match name {
		"Alt" => Some(1),
		"Control" | "Ctrl" => Some(2),
		"Meta" | "Cmd" | "Command" => Some(4),
		"Shift" => Some(8),
		_ => None,
	}
}

struct KeyDef {
	key: &'static str,
	code: &'static str,
	key_code: u32,
	text: Option<&'static str>,
}

fn key_def(name: &str) -> Option<KeyDef> {
	let def = match name {
		"Enter" => KeyDef { key: "Enter", code: "Enter", key_code: 13, text: Some("\r") },
		"Tab" => KeyDef { key: "Tab", code: "Tab", key_code: 9, text: None },
		"Escape" => KeyDef { key: "Escape", code: "Escape", key_code: 27, text: None },
		"Backspace" => KeyDef { key: "Backspace", code: "Backspace", key_code: 8, text: None },
		"Delete" => KeyDef { key: "Delete", code: "Delete", key_code: 46, text: None },
		"ArrowUp" => KeyDef { key: "ArrowUp", code: "ArrowUp", key_code: 38, text: None },
		"ArrowDown" => KeyDef { key: "ArrowDown", code: "ArrowDown", key_code: 40, text: None },
		"ArrowLeft" => KeyDef { key: "ArrowLeft", code: "ArrowLeft", key_code: 37, text: None },
		"ArrowRight" => KeyDef { key: "ArrowRight", code: "ArrowRight", key_code: 39, text: None },
		"Home" => KeyDef { key: "Home", code: "Home", key_code: 36, text: None },
		"End" => KeyDef { key: "End", code: "End", key_code: 35, text: None },
		"PageUp" => KeyDef { key: "PageUp", code: "PageUp", key_code: 33, text: None },
		"PageDown" => KeyDef { key: "PageDown", code: "PageDown", key_code: 34, text: None },
		"Space" | " " => KeyDef { key: " ", code: "Space", key_code: 32, text: Some(" ") },
		_ => return None,
	};
	Some(def)
}

impl Page {
	/// Scrolls the first match into view and returns its viewport-space
	/// centre.
	pub async fn element_center(&self, locator: &Locator, timeout_ms: u64) -> Result<(f64, f64)> {
		let value = self.eval_on_element(locator, "ab.center(el)", timeout_ms).await?;
		let x = value.get("x").and_then(Value::as_f64);
		let y = value.get("y").and_then(Value::as_f64);
		match (x, y) {
			(Some(x), Some(y)) => Ok((x, y)),
			_ => Err(DriverError::Protocol("element centre unavailable".to_string())),
		}
	}

	/// Dispatches a full press/release cycle at coordinates.
	pub async fn click_at(&self, x: f64, y: f64, button: &str, click_count: u32, timeout_ms: u64) -> Result<()> {
		let buttons = match button {
			"right" => 2,
			"middle" => 4,
			_ => 1,
		};
		bounded(timeout_ms, async {
			self.call(
				"Input.dispatchMouseEvent",
				json!({ "type": "mouseMoved", "x": x, "y": y, "button": "none", "buttons": 0 }),
			)
			.await?;
			for _ in 0..click_count {
				self.call(
					"Input.dispatchMouseEvent",
					json!({ "type": "mousePressed", "x": x, "y": y, "button": button, "buttons": buttons, "clickCount": click_count }),
				)
				.await?;
				self.call(
					"Input.dispatchMouseEvent",
					json!({ "type": "mouseReleased", "x": x, "y": y, "button": button, "buttons": 0, "clickCount": click_count }),
				)
				.await?;
			}
			Ok(())
		})
		.await
	}

	/// Moves the pointer without pressing, for hover semantics.
	pub async fn hover_at(&self, x: f64, y: f64, timeout_ms: u64) -> Result<()> {
		bounded(timeout_ms, async {
			self.call(
				"Input.dispatchMouseEvent",
				json!({ "type": "mouseMoved", "x": x, "y": y, "button": "none", "buttons": 0 }),
			)
			.await?;
			Ok(())
		})
		.await
	}

	/// Press, move, release, for drag gestures.
	pub async fn drag_between(&self, from: (f64, f64), to: (f64, f64), timeout_ms: u64) -> Result<()> {
		bounded(timeout_ms, async {
			self.call(
				"Input.dispatchMouseEvent",
				json!({ "type": "mousePressed", "x": from.0, "y": from.1, "button": "left", "buttons": 1, "clickCount": 1 }),
			)
			.await?;
			// A few intermediate moves keep drag-sensitive widgets engaged.
			let steps = 5;
			for step in 1..=steps {
				let t = f64::from(step) / f64::from(steps);
				let x = from.0 + (to.0 - from.0) * t;
				let y = from.1 + (to.1 - from.1) * t;
				self.call(
					"Input.dispatchMouseEvent",
					json!({ "type": "mouseMoved", "x": x, "y": y, "button": "left", "buttons": 1 }),
				)
				.await?;
			}
			self.call(
				"Input.dispatchMouseEvent",
				json!({ "type": "mouseReleased", "x": to.0, "y": to.1, "button": "left", "buttons": 0, "clickCount": 1 }),
			)
			.await?;
			Ok(())
		})
		.await
	}

	/// Dispatches a touch tap at coordinates.
	pub async fn tap_at(&self, x: f64, y: f64, timeout_ms: u64) -> Result<()> {
		bounded(timeout_ms, async {
			self.call(
				"Input.dispatchTouchEvent",
				json!({ "type": "touchStart", "touchPoints": [{ "x": x, "y": y }] }),
			)
			.await?;
			self.call("Input.dispatchTouchEvent", json!({ "type": "touchEnd", "touchPoints": [] })).await?;
			Ok(())
		})
		.await
	}

	/// Inserts text into the focused element without per-key events.
	pub async fn insert_text(&self, text: &str, timeout_ms: u64) -> Result<()> {
		bounded(timeout_ms, async {
			self.call("Input.insertText", json!({ "text": text })).await?;
			Ok(())
		})
		.await
	}

	/// Types text as individual key events with an optional inter-key
	/// delay.
	pub async fn type_text(&self, text: &str, delay_ms: Option<u64>, timeout_ms: u64) -> Result<()> {
		bounded(timeout_ms, async {
			for ch in text.chars() {
				let char_text = ch.to_string();
				self.call(
					"Input.dispatchKeyEvent",
					json!({ "type": "keyDown", "key": char_text, "text": char_text }),
				)
				.await?;
				self.call("Input.dispatchKeyEvent", json!({ "type": "keyUp", "key": char_text })).await?;
				if let Some(delay) = delay_ms {
					tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
				}
			}
			Ok(())
		})
		.await
	}

	/// Presses a key chord such as `Enter` or `Control+A`.
	pub async fn press_key(&self, chord: &str, timeout_ms: u64) -> Result<()> {
		let mut modifiers = 0u32;
		let mut key_name = chord;
		if let Some((prefix, last)) = chord.rsplit_once('+') {
			let mut all_known = true;
			for part in prefix.split('+') {
				match modifier_bit(part) {
					Some(bit) => modifiers |= bit,
					None => all_known = false,
				}
			}
			if all_known {
				key_name = last;
			} else {
				modifiers = 0;
			}
		}

		bounded(timeout_ms, async {
			match key_def(key_name) {
				Some(def) => {
					let mut down = json!({
						"type": "keyDown",
						"key": def.key,
						"code": def.code,
						"windowsVirtualKeyCode": def.key_code,
						"modifiers": modifiers,
					});
					if let Some(text) = def.text {
						down["text"] = json!(text);
					}
					self.call("Input.dispatchKeyEvent", down).await?;
					self.call(
						"Input.dispatchKeyEvent",
						json!({ "type": "keyUp", "key": def.key, "code": def.code, "windowsVirtualKeyCode": def.key_code, "modifiers": modifiers }),
					)
					.await?;
				}
				None => {
					// Single printable character.
					let text = key_name.to_string();
					self.call(
						"Input.dispatchKeyEvent",
						json!({ "type": "keyDown", "key": text, "text": text, "modifiers": modifiers }),
					)
					.await?;
					self.call("Input.dispatchKeyEvent", json!({ "type": "keyUp", "key": text, "modifiers": modifiers })).await?;
				}
			}
			Ok(())
		})
		.await
	}

	/// Focuses the first match.
	pub async fn focus(&self, locator: &Locator, timeout_ms: u64) -> Result<()> {
		self.eval_on_element(locator, "(el.focus(), true)", timeout_ms).await?;
		Ok(())
	}

	/// Sets an input-like element's value directly and fires the events
	/// framework bindings listen for.
	pub async fn set_value(&self, locator: &Locator, value: &str, timeout_ms: u64) -> Result<()> {
		let body = format!(
			"(() => {{ el.focus(); el.value = {value}; \
			 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
			 el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
			value = js::js_string(value),
		);
		self.eval_on_element(locator, &body, timeout_ms).await?;
		Ok(())
	}

	/// Selects options on a `<select>` by value, label, or index.
	pub async fn select_options(&self, locator: &Locator, values: &[String], timeout_ms: u64) -> Result<Vec<String>> {
		let wanted = serde_json::to_string(values)?;
		let body = format!(
			"(() => {{ const wanted = {wanted}; const selected = []; \
			 for (const option of el.options) {{ \
			   const hit = wanted.includes(option.value) || wanted.includes(option.label.trim()); \
			   option.selected = hit; if (hit) selected.push(option.value); \
			 }} \
			 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
			 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
			 return selected; }})()"
		);
		let value = self.eval_on_element(locator, &body, timeout_ms).await?;
		Ok(serde_json::from_value(value).unwrap_or_default())
	}

	/// Reports element visibility for the check/uncheck pre-check.
	pub async fn is_visible(&self, locator: &Locator, timeout_ms: u64) -> Result<bool> {
		let value = self.eval_on_element(locator, "ab.visible(el)", timeout_ms).await?;
		Ok(value.as_bool().unwrap_or(false))
	}

	/// Sets a checkbox/radio state through the DOM, used both as the
	/// forced fallback and for hidden custom-UI controls.
	pub async fn set_checked_forced(&self, locator: &Locator, checked: bool, timeout_ms: u64) -> Result<()> {
		let body = format!(
			"(() => {{ if (el.checked !== {checked}) {{ el.checked = {checked}; \
			 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
			 el.dispatchEvent(new Event('change', {{ bubbles: true }})); }} return true; }})()"
		);
		self.eval_on_element(locator, &body, timeout_ms).await?;
		Ok(())
	}

	/// Attaches local files to a file input.
	pub async fn set_input_files(&self, locator: &Locator, files: &[String], token: &str, timeout_ms: u64) -> Result<()> {
		let node_id = self.node_for(locator, token, timeout_ms).await?;
		self.call("DOM.setFileInputFiles", json!({ "files": files, "nodeId": node_id })).await?;
		Ok(())
	}
}
