//! CDP ↔ extension bridge relay.
//!
//! One HTTP listener hosts two websocket endpoints generated per relay
//! instance: `/cdp/<uuid>` for the driver and `/extension/<uuid>` for
//! the browser extension. Exactly one connection is accepted per side;
//! extras are closed with a policy-violation code. The relay translates
//! the driver's CDP framing to the extension's JSON envelope
//! (`{method, id?, params, result?, error?}`) and back.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};

const RELAY_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// RFC 6455 policy-violation close code, sent to surplus connections.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

struct RelayState {
	extension_tx: Option<mpsc::UnboundedSender<Message>>,
	driver_tx: Option<mpsc::UnboundedSender<Message>>,
	pending: HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>,
	next_relay_id: u64,
	next_tab: u64,
	synthetic_session: Option<String>,
	target_info: Option<Value>,
	ready_tx: watch::Sender<bool>,
}

impl RelayState {
	fn clear_extension(&mut self) {
		self.extension_tx = None;
		self.target_info = None;
		let _ = self.ready_tx.send(false);
		for (_, pending) in self.pending.drain() {
			let _ = pending.send(Err("extension disconnected".to_string()));
		}
	}
}

type Shared = Arc<Mutex<RelayState>>;

#[derive(Clone)]
struct Endpoints {
	cdp_uuid: String,
	extension_uuid: String,
	state: Shared,
}

/// A running relay instance.
pub struct RelayHandle {
	pub port: u16,
	pub cdp_url: String,
	pub extension_url: String,
	ready_rx: watch::Receiver<bool>,
	server: tokio::task::JoinHandle<()>,
}

impl RelayHandle {
	/// The URL that invites the extension to connect.
	pub fn connect_url(&self, extension_id: &str, client: &Value, token: Option<&str>) -> String {
		let relay = urlencode(&self.extension_url);
		let client = urlencode(&client.to_string());
		let mut url = format!("chrome-extension://{extension_id}/connect.html?mcpRelayUrl={relay}&client={client}&protocolVersion=1");
		if let Some(token) = token {
			url.push_str(&format!("&token={}", urlencode(token)));
		}
		url
	}

	/// Waits until the extension side is connected.
	pub async fn wait_for_extension(&self, timeout: Duration) -> Result<()> {
		let mut ready = self.ready_rx.clone();
		let wait = async {
			loop {
				if *ready.borrow() {
					return;
				}
				if ready.changed().await.is_err() {
					return;
				}
			}
		};
		tokio::time::timeout(timeout, wait)
			.await
			.map_err(|_| CoreError::new(ab_protocol::ErrorKind::Timeout, "waiting for extension connection"))
	}

	pub fn shutdown(&self) {
		self.server.abort();
	}
}

/// Starts a relay on `port` (0 picks an ephemeral port).
pub async fn start(port: u16) -> Result<RelayHandle> {
	let (ready_tx, ready_rx) = watch::channel(false);
	let state: Shared = Arc::new(Mutex::new(RelayState {
		extension_tx: None,
		driver_tx: None,
		pending: HashMap::new(),
		next_relay_id: 0,
		next_tab: 0,
		synthetic_session: None,
		target_info: None,
		ready_tx,
	}));

	let endpoints = Endpoints {
		cdp_uuid: random_uuid(),
		extension_uuid: random_uuid(),
		state: Arc::clone(&state),
	};

	let app = Router::new()
		.route("/", get(|| async { "OK" }))
		.route(
			"/cdp/{uuid}",
			get(|Path(uuid): Path<String>, ws: WebSocketUpgrade, State(endpoints): State<Endpoints>| async move {
				if uuid != endpoints.cdp_uuid {
					return Err(StatusCode::NOT_FOUND);
				}
				Ok(ws.on_upgrade(move |socket| handle_driver_socket(socket, endpoints.state)))
			}),
		)
		.route(
			"/extension/{uuid}",
			get(|Path(uuid): Path<String>, ws: WebSocketUpgrade, State(endpoints): State<Endpoints>| async move {
				if uuid != endpoints.extension_uuid {
					return Err(StatusCode::NOT_FOUND);
				}
				Ok(ws.on_upgrade(move |socket| handle_extension_socket(socket, endpoints.state)))
			}),
		)
		.with_state(endpoints.clone());

	let addr: SocketAddr = format!("127.0.0.1:{port}").parse().map_err(|err| CoreError::internal(format!("relay addr: {err}")))?;
	let listener = TcpListener::bind(addr).await.map_err(|err| CoreError::internal(format!("relay bind: {err}")))?;
	let port = listener.local_addr()?.port();

	info!(target = "ab.relay", port, "bridge relay listening");
	let server = tokio::spawn(async move {
		if let Err(err) = axum::serve(listener, app.into_make_service()).await {
			warn!(target = "ab.relay", error = %err, "relay server exited");
		}
	});

	Ok(RelayHandle {
		port,
		cdp_url: format!("ws://127.0.0.1:{port}/cdp/{}", endpoints.cdp_uuid),
		extension_url: format!("ws://127.0.0.1:{port}/extension/{}", endpoints.extension_uuid),
		ready_rx,
		server,
	})
}

async fn handle_extension_socket(socket: WebSocket, state: Shared) {
	let (tx, rx) = mpsc::unbounded_channel();
	{
		let mut st = state.lock().await;
		if st.extension_tx.is_some() {
			warn!(target = "ab.relay", "rejecting second extension connection");
			drop(st);
			close_policy_violation(socket).await;
			return;
		}
		st.extension_tx = Some(tx);
		let _ = st.ready_tx.send(true);
	}
	info!(target = "ab.relay", "extension connected");

	let mut rx_stream = UnboundedReceiverStream::new(rx);
	let (mut ws_tx, mut ws_rx) = socket.split();
	let send_task = tokio::spawn(async move {
		while let Some(message) = rx_stream.next().await {
			if ws_tx.send(message).await.is_err() {
				break;
			}
		}
	});

	while let Some(message) = ws_rx.next().await {
		match message {
			Ok(Message::Text(text)) => {
				if let Err(err) = handle_extension_message(&state, &text).await {
					warn!(target = "ab.relay", error = %err, "bad extension frame");
				}
			}
			Ok(Message::Close(_)) => break,
			Ok(_) => {}
			Err(err) => {
				warn!(target = "ab.relay", error = %err, "extension socket error");
				break;
			}
		}
	}

	state.lock().await.clear_extension();
	send_task.abort();
	info!(target = "ab.relay", "extension disconnected");
}

async fn handle_extension_message(state: &Shared, raw: &str) -> Result<()> {
	let value: Value = serde_json::from_str(raw).map_err(|err| CoreError::internal(format!("extension frame: {err}")))?;

	// Numeric id → reply to a relay command we issued.
	if let Some(id) = value.get("id").and_then(Value::as_u64) {
		let (sender, result) = {
			let mut st = state.lock().await;
			let sender = st.pending.remove(&id);
			let result = match value.get("error") {
				Some(error) => Err(error
					.as_str()
					.map(str::to_owned)
					.unwrap_or_else(|| error.to_string())),
				None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
			};
			(sender, result)
		};
		match sender {
			Some(sender) => {
				let _ = sender.send(result);
			}
			None => debug!(target = "ab.relay", id, "reply with no pending relay command"),
		}
		return Ok(());
	}

	let method = value.get("method").and_then(Value::as_str).unwrap_or_default();
	if method != "forwardCDPEvent" {
		debug!(target = "ab.relay", method, "ignoring extension event");
		return Ok(());
	}

	let params = value.get("params").cloned().unwrap_or(Value::Null);
	let event_method = params
		.get("method")
		.and_then(Value::as_str)
		.ok_or_else(|| CoreError::internal("forwardCDPEvent missing method"))?;
	let event_params = params.get("params").cloned().unwrap_or(Value::Null);
	let extension_session = params.get("sessionId").and_then(Value::as_str).map(str::to_owned);

	let (driver_tx, session_id) = {
		let st = state.lock().await;
		let session = extension_session.or_else(|| st.synthetic_session.clone());
		(st.driver_tx.clone(), session)
	};

	let mut frame = json!({ "method": event_method, "params": event_params });
	if let Some(session) = session_id {
		frame["sessionId"] = json!(session);
	}
	if let Some(driver_tx) = driver_tx {
		let _ = driver_tx.send(Message::Text(frame.to_string().into()));
	}
	Ok(())
}

async fn handle_driver_socket(socket: WebSocket, state: Shared) {
	let (tx, rx) = mpsc::unbounded_channel();
	{
		let mut st = state.lock().await;
		if st.driver_tx.is_some() {
			warn!(target = "ab.relay", "rejecting second driver connection");
			drop(st);
			close_policy_violation(socket).await;
			return;
		}
		st.driver_tx = Some(tx);
	}
	info!(target = "ab.relay", "driver connected");

	let mut rx_stream = UnboundedReceiverStream::new(rx);
	let (mut ws_tx, mut ws_rx) = socket.split();
	let send_task = tokio::spawn(async move {
		while let Some(message) = rx_stream.next().await {
			if ws_tx.send(message).await.is_err() {
				break;
			}
		}
	});

	while let Some(message) = ws_rx.next().await {
		match message {
			Ok(Message::Text(text)) => {
				if let Err(err) = handle_driver_message(&state, &text).await {
					warn!(target = "ab.relay", error = %err, "bad driver frame");
				}
			}
			Ok(Message::Close(_)) => break,
			Ok(_) => {}
			Err(err) => {
				warn!(target = "ab.relay", error = %err, "driver socket error");
				break;
			}
		}
	}

	state.lock().await.driver_tx = None;
	send_task.abort();
	info!(target = "ab.relay", "driver disconnected");
}

async fn handle_driver_message(state: &Shared, raw: &str) -> Result<()> {
	let command: Value = serde_json::from_str(raw).map_err(|err| CoreError::internal(format!("driver frame: {err}")))?;
	let id = command
		.get("id")
		.and_then(Value::as_u64)
		.ok_or_else(|| CoreError::internal("driver command missing id"))?;
	let method = command
		.get("method")
		.and_then(Value::as_str)
		.ok_or_else(|| CoreError::internal("driver command missing method"))?
		.to_string();
	let params = command.get("params").cloned().unwrap_or(Value::Null);
	let session_id = command.get("sessionId").and_then(Value::as_str).map(str::to_owned);

	let reply = translate_command(state, &method, params, session_id.as_deref()).await;

	let frame = match reply {
		Ok(result) => {
			let mut frame = json!({ "id": id, "result": result });
			if let Some(session) = &session_id {
				frame["sessionId"] = json!(session);
			}
			frame
		}
		Err(message) => {
			let mut frame = json!({ "id": id, "error": { "message": message } });
			if let Some(session) = &session_id {
				frame["sessionId"] = json!(session);
			}
			frame
		}
	};

	let driver_tx = state.lock().await.driver_tx.clone();
	if let Some(driver_tx) = driver_tx {
		let _ = driver_tx.send(Message::Text(frame.to_string().into()));
	}
	Ok(())
}

/// The CDP → envelope translation table (§ bridge rules).
async fn translate_command(
	state: &Shared,
	method: &str,
	params: Value,
	session_id: Option<&str>,
) -> std::result::Result<Value, String> {
	match method {
		"Browser.getVersion" => Ok(json!({
			"protocolVersion": "1.3",
			"product": "Chrome/Extension-Bridge",
			"userAgent": "agent-browser-bridge/1.0",
			"jsVersion": "V8",
		})),
		"Browser.setDownloadBehavior" => Ok(json!({})),
		"Target.setAutoAttach" if session_id.is_none() => {
			let reply = send_relay_command(state, "attachToTab", Value::Null).await?;
			let target_info = reply.get("targetInfo").cloned().unwrap_or(Value::Null);

			let (driver_tx, session) = {
				let mut st = state.lock().await;
				st.next_tab += 1;
				let session = format!("pw-tab-{}", st.next_tab);
				st.synthetic_session = Some(session.clone());
				let mut cached = target_info.clone();
				if let Some(object) = cached.as_object_mut() {
					object.insert("attached".to_string(), json!(true));
				}
				st.target_info = Some(cached);
				(st.driver_tx.clone(), session)
			};

			// The attachment event precedes the command's own reply.
			let mut attached_info = target_info;
			if let Some(object) = attached_info.as_object_mut() {
				object.insert("attached".to_string(), json!(true));
			}
			let event = json!({
				"method": "Target.attachedToTarget",
				"params": {
					"sessionId": session,
					"targetInfo": attached_info,
					"waitingForDebugger": false,
				},
			});
			if let Some(driver_tx) = driver_tx {
				let _ = driver_tx.send(Message::Text(event.to_string().into()));
			}
			Ok(json!({}))
		}
		"Target.getTargetInfo" => {
			let cached = state.lock().await.target_info.clone();
			Ok(json!({ "targetInfo": cached }))
		}
		_ => {
			// Strip the synthetic session id before forwarding; the
			// extension only knows its own sessions.
			let forward_session = {
				let st = state.lock().await;
				match session_id {
					Some(session) if st.synthetic_session.as_deref() == Some(session) => None,
					other => other.map(str::to_owned),
				}
			};
			let relay_params = json!({
				"method": method,
				"params": params,
				"sessionId": forward_session,
			});
			send_relay_command(state, "forwardCDPCommand", relay_params).await
		}
	}
}

async fn send_relay_command(state: &Shared, method: &str, params: Value) -> std::result::Result<Value, String> {
	let (tx, id) = {
		let mut st = state.lock().await;
		let Some(tx) = st.extension_tx.clone() else {
			return Err("extension not connected".to_string());
		};
		st.next_relay_id += 1;
		(tx, st.next_relay_id)
	};

	let (reply_tx, reply_rx) = oneshot::channel();
	state.lock().await.pending.insert(id, reply_tx);

	let frame = json!({ "id": id, "method": method, "params": params });
	if tx.send(Message::Text(frame.to_string().into())).is_err() {
		state.lock().await.pending.remove(&id);
		return Err("extension not connected".to_string());
	}

	match tokio::time::timeout(RELAY_COMMAND_TIMEOUT, reply_rx).await {
		Ok(Ok(result)) => result,
		Ok(Err(_)) => Err("extension disconnected".to_string()),
		Err(_) => {
			state.lock().await.pending.remove(&id);
			Err("timed out waiting for extension".to_string())
		}
	}
}

async fn close_policy_violation(mut socket: WebSocket) {
	let _ = socket
		.send(Message::Close(Some(CloseFrame {
			code: CLOSE_POLICY_VIOLATION,
			reason: "already connected".into(),
		})))
		.await;
}

fn random_uuid() -> String {
	let mut bytes = [0u8; 16];
	rand::thread_rng().fill(&mut bytes);
	// RFC 4122 v4 shape.
	bytes[6] = (bytes[6] & 0x0f) | 0x40;
	bytes[8] = (bytes[8] & 0x3f) | 0x80;
	let h = hex::encode(bytes);
	format!("{}-{}-{}-{}-{}", &h[0..8], &h[8..12], &h[12..16], &h[16..20], &h[20..32])
}

fn urlencode(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	for byte in raw.bytes() {
		match byte {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
			other => out.push_str(&format!("%{other:02X}")),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn uuids_are_v4_shaped() {
		let uuid = random_uuid();
		assert_eq!(uuid.len(), 36);
		let parts: Vec<&str> = uuid.split('-').collect();
		assert_eq!(parts.len(), 5);
		assert!(parts[2].starts_with('4'));
	}

	#[test]
	fn urlencode_escapes_reserved() {
		assert_eq!(urlencode("ws://h/p?x=1"), "ws%3A%2F%2Fh%2Fp%3Fx%3D1");
		assert_eq!(urlencode("plain-safe_.~"), "plain-safe_.~");
	}
}
