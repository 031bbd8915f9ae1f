//! Per-target page driver.
//!
//! One [`Page`] wraps one CDP target attached in flat-session mode. A
//! background pump task tracks frames, lifecycle state, dialogs, and
//! screencast frames; command methods go straight to the transport.

mod capture;
mod emulation;
mod eval;
mod events;
mod input;
mod routing;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub use events::{ConsoleEvent, DialogEvent, NetworkEvent, PageEvent, PausedRequest};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::{DriverError, Result};
use crate::transport::{CdpClient, CdpEvent};

/// A JPEG frame captured while screencast recording is active.
#[derive(Debug, Clone)]
pub struct ScreencastFrame {
	pub data: Vec<u8>,
	pub timestamp: f64,
}

#[derive(Debug, Default)]
struct FrameInfo {
	name: String,
	url: String,
	context_id: Option<u64>,
}

#[derive(Default)]
struct PageState {
	main_frame_id: String,
	frames: HashMap<String, FrameInfo>,
	active_frame: Option<String>,
	lifecycle: HashSet<String>,
	current_url: String,
	dialog_choice: Option<(bool, Option<String>)>,
	screencast: Option<Vec<ScreencastFrame>>,
}

/// Driver handle for one browser tab.
#[derive(Clone)]
pub struct Page {
	client: CdpClient,
	pub target_id: String,
	pub session_id: String,
	state: Arc<Mutex<PageState>>,
}

impl Page {
	/// Attaches to a target and enables the domains the daemon relies on.
	pub async fn attach(client: CdpClient, target_id: &str) -> Result<Self> {
		let attached = client.call("Target.attachToTarget", json!({ "targetId": target_id, "flatten": true })).await?;
		let session_id = attached
			.get("sessionId")
			.and_then(Value::as_str)
			.ok_or_else(|| DriverError::Protocol("attachToTarget returned no sessionId".to_string()))?
			.to_string();

		let page = Self {
			client,
			target_id: target_id.to_string(),
			session_id,
			state: Arc::new(Mutex::new(PageState::default())),
		};

		page.call("Page.enable", json!({})).await?;
		page.call("Runtime.enable", json!({})).await?;
		page.call("Network.enable", json!({})).await?;
		page.call("Page.setLifecycleEventsEnabled", json!({ "enabled": true })).await?;

		let frame_tree = page.call("Page.getFrameTree", json!({})).await?;
		{
			let mut state = page.state.lock();
			if let Some(frame) = frame_tree.pointer("/frameTree/frame") {
				state.main_frame_id = frame.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
				state.current_url = frame.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
			}
		}

		page.spawn_pump();
		Ok(page)
	}

	fn spawn_pump(&self) {
		let client = self.client.clone();
		let session_id = self.session_id.clone();
		let state = Arc::clone(&self.state);
		let mut events = self.client.subscribe();

		tokio::spawn(async move {
			loop {
				let event = match events.recv().await {
					Ok(event) => event,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						debug!(target = "ab.cdp", skipped, "event pump lagged");
						continue;
					}
					Err(broadcast::error::RecvError::Closed) => break,
				};
				if event.session_id.as_deref() != Some(session_id.as_str()) {
					continue;
				}
				Self::pump_event(&client, &session_id, &state, event).await;
			}
		});
	}

	async fn pump_event(client: &CdpClient, session_id: &str, state: &Mutex<PageState>, event: CdpEvent) {
		match event.method.as_str() {
			"Page.lifecycleEvent" => {
				let frame_id = event.params.get("frameId").and_then(Value::as_str).unwrap_or_default();
				let name = event.params.get("name").and_then(Value::as_str).unwrap_or_default();
				let mut state = state.lock();
				if frame_id == state.main_frame_id {
					if name == "init" {
						state.lifecycle.clear();
					} else {
						state.lifecycle.insert(name.to_string());
					}
				}
			}
			"Page.frameNavigated" => {
				let Some(frame) = event.params.get("frame") else { return };
				let frame_id = frame.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
				let url = frame.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
				let name = frame.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
				let mut state = state.lock();
				if frame_id == state.main_frame_id {
					state.current_url = url.clone();
				}
				let info = state.frames.entry(frame_id).or_default();
				info.url = url;
				info.name = name;
			}
			"Page.frameDetached" => {
				if let Some(frame_id) = event.params.get("frameId").and_then(Value::as_str) {
					let mut state = state.lock();
					state.frames.remove(frame_id);
					if state.active_frame.as_deref() == Some(frame_id) {
						state.active_frame = None;
					}
				}
			}
			"Runtime.executionContextCreated" => {
				let Some(context) = event.params.get("context") else { return };
				let is_default = context.pointer("/auxData/isDefault").and_then(Value::as_bool).unwrap_or(false);
				if !is_default {
					return;
				}
				let Some(frame_id) = context.pointer("/auxData/frameId").and_then(Value::as_str) else { return };
				let context_id = context.get("id").and_then(Value::as_u64);
				state.lock().frames.entry(frame_id.to_string()).or_default().context_id = context_id;
			}
			"Runtime.executionContextsCleared" => {
				let mut state = state.lock();
				for frame in state.frames.values_mut() {
					frame.context_id = None;
				}
			}
			"Page.javascriptDialogOpening" => {
				let choice = state.lock().dialog_choice.clone();
				if let Some((accept, text)) = choice {
					let mut params = json!({ "accept": accept });
					if let Some(text) = text {
						params["promptText"] = json!(text);
					}
					let _ = client.call_in(Some(session_id), "Page.handleJavaScriptDialog", params).await;
				}
			}
			"Page.screencastFrame" => {
				let ack = event.params.get("sessionId").cloned().unwrap_or(Value::Null);
				let _ = client.call_in(Some(session_id), "Page.screencastFrameAck", json!({ "sessionId": ack })).await;
				let Some(data) = event.params.get("data").and_then(Value::as_str) else { return };
				use base64::Engine as _;
				let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(data) else { return };
				let timestamp = event.params.pointer("/metadata/timestamp").and_then(Value::as_f64).unwrap_or(0.0);
				let mut state = state.lock();
				if let Some(frames) = state.screencast.as_mut() {
					frames.push(ScreencastFrame { data: bytes, timestamp });
				}
			}
			_ => {
				trace!(target = "ab.cdp", method = %event.method, "unhandled page event");
			}
		}
	}

	/// Sends a command in this page's session.
	pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
		self.client.call_in(Some(&self.session_id), method, params).await
	}

	/// Raw event stream; filter with [`Page::parse_event`].
	pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
		self.client.subscribe()
	}

	/// The page's last observed main-frame URL.
	pub fn current_url(&self) -> String {
		self.state.lock().current_url.clone()
	}

	/// Switches element/eval scope to the frame matching any of the
	/// given attributes. Returns the frame's URL on success.
	pub fn set_active_frame(&self, selector_url: Option<&str>, name: Option<&str>) -> Option<String> {
		let mut state = self.state.lock();
		let found = state
			.frames
			.iter()
			.find(|(id, info)| {
				**id != state.main_frame_id
					&& (name.is_some_and(|wanted| info.name == wanted) || selector_url.is_some_and(|wanted| info.url.contains(wanted)))
			})
			.map(|(id, info)| (id.clone(), info.url.clone()));
		match found {
			Some((id, url)) => {
				state.active_frame = Some(id);
				Some(url)
			}
			None => None,
		}
	}

	/// Returns scope to the main frame.
	pub fn clear_active_frame(&self) {
		self.state.lock().active_frame = None;
	}

	pub fn frames(&self) -> Vec<(String, String)> {
		let state = self.state.lock();
		state.frames.iter().map(|(_, info)| (info.name.clone(), info.url.clone())).collect()
	}

	fn active_context_id(&self) -> Option<u64> {
		let state = self.state.lock();
		let frame_id = state.active_frame.as_ref()?;
		state.frames.get(frame_id)?.context_id
	}

	/// Installs (or clears) the automatic dialog response.
	pub fn set_dialog_choice(&self, choice: Option<(bool, Option<String>)>) {
		self.state.lock().dialog_choice = choice;
	}

	/// Waits until the main frame has reached the given lifecycle state.
	///
	/// Polls the pump-maintained state rather than racing the pump for
	/// events: an event observed here may not have been folded into the
	/// state yet.
	pub async fn wait_for_lifecycle(&self, wanted: &str, timeout_ms: u64) -> Result<()> {
		const LIFECYCLE_POLL: Duration = Duration::from_millis(25);
		let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
		loop {
			if self.state.lock().lifecycle.contains(wanted) {
				return Ok(());
			}
			if self.client.is_closed() {
				return Err(DriverError::ConnectionClosed);
			}
			if tokio::time::Instant::now() + LIFECYCLE_POLL > deadline {
				return Err(DriverError::Timeout(timeout_ms));
			}
			tokio::time::sleep(LIFECYCLE_POLL).await;
		}
	}

	/// Brings the target to front (tab activation).
	pub async fn activate(&self) -> Result<()> {
		self.client.call("Target.activateTarget", json!({ "targetId": self.target_id })).await?;
		Ok(())
	}

	/// Closes the underlying target.
	pub async fn close_target(&self) -> Result<()> {
		self.client.call("Target.closeTarget", json!({ "targetId": self.target_id })).await?;
		Ok(())
	}
}

/// Applies a millisecond deadline to a driver future, mapping overruns
/// to [`DriverError::Timeout`].
pub(crate) async fn bounded<T>(timeout_ms: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
	match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
		Ok(result) => result,
		Err(_) => Err(DriverError::Timeout(timeout_ms)),
	}
}
