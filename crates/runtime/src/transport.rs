use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{DriverError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// A CDP event as seen on the wire, before any session filtering.
#[derive(Debug, Clone)]
pub struct CdpEvent {
	pub session_id: Option<String>,
	pub method: String,
	pub params: Value,
}

struct Shared {
	outbound: mpsc::UnboundedSender<Message>,
	pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
	next_id: AtomicU64,
	events: broadcast::Sender<CdpEvent>,
	closed: AtomicBool,
}

/// Shared handle to one CDP websocket connection.
///
/// Commands are correlated by a monotonically increasing numeric id;
/// events fan out on a broadcast channel. Cloning is cheap and all
/// clones observe the same connection.
#[derive(Clone)]
pub struct CdpClient {
	shared: Arc<Shared>,
}

impl CdpClient {
	/// Connects to a DevTools websocket endpoint and starts the reader
	/// and writer tasks.
	pub async fn connect(ws_url: &str) -> Result<Self> {
		let (socket, _) = connect_async(ws_url).await.map_err(|err| DriverError::Connect(format!("{ws_url}: {err}")))?;
		let (mut ws_tx, mut ws_rx) = socket.split();
		let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

		let shared = Arc::new(Shared {
			outbound,
			pending: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(0),
			events,
			closed: AtomicBool::new(false),
		});

		tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if ws_tx.send(message).await.is_err() {
					break;
				}
			}
		});

		let reader_shared = Arc::clone(&shared);
		tokio::spawn(async move {
			while let Some(message) = ws_rx.next().await {
				match message {
					Ok(Message::Text(text)) => reader_shared.dispatch_frame(&text),
					Ok(Message::Close(_)) => break,
					Ok(_) => {}
					Err(err) => {
						warn!(target = "ab.cdp", error = %err, "websocket error");
						break;
					}
				}
			}
			reader_shared.mark_closed();
		});

		Ok(Self { shared })
	}

	/// Sends a browser-scope command.
	pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
		self.call_in(None, method, params).await
	}

	/// Sends a command, optionally scoped to a target session.
	pub async fn call_in(&self, session_id: Option<&str>, method: &str, params: Value) -> Result<Value> {
		if self.shared.closed.load(Ordering::Acquire) {
			return Err(DriverError::ConnectionClosed);
		}

		let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
		let (tx, rx) = oneshot::channel();
		self.shared.pending.lock().insert(id, tx);

		let mut frame = json!({ "id": id, "method": method, "params": params });
		if let Some(session_id) = session_id {
			frame["sessionId"] = json!(session_id);
		}

		trace!(target = "ab.cdp", id, method, "send");
		if self.shared.outbound.send(Message::Text(frame.to_string().into())).is_err() {
			self.shared.pending.lock().remove(&id);
			return Err(DriverError::ConnectionClosed);
		}

		match rx.await {
			Ok(result) => result,
			Err(_) => Err(DriverError::ConnectionClosed),
		}
	}

	/// Subscribes to the raw event stream.
	pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
		self.shared.events.subscribe()
	}

	pub fn is_closed(&self) -> bool {
		self.shared.closed.load(Ordering::Acquire)
	}
}

impl Shared {
	fn dispatch_frame(&self, raw: &str) {
		let value: Value = match serde_json::from_str(raw) {
			Ok(value) => value,
			Err(err) => {
				warn!(target = "ab.cdp", error = %err, "unparseable frame");
				return;
			}
		};

		if let Some(id) = value.get("id").and_then(Value::as_u64) {
			let sender = self.pending.lock().remove(&id);
			let Some(sender) = sender else {
				debug!(target = "ab.cdp", id, "response with no pending call");
				return;
			};
			let result = match value.get("error") {
				Some(error) => {
					let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown CDP error");
					Err(DriverError::Protocol(message.to_string()))
				}
				None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
			};
			let _ = sender.send(result);
			return;
		}

		let Some(method) = value.get("method").and_then(Value::as_str) else {
			return;
		};
		let event = CdpEvent {
			session_id: value.get("sessionId").and_then(Value::as_str).map(str::to_owned),
			method: method.to_string(),
			params: value.get("params").cloned().unwrap_or(Value::Null),
		};
		// A lagging subscriber drops oldest events; that is acceptable for
		// sink-style consumers and callers that need a response wait on ids.
		let _ = self.events.send(event);
	}

	fn mark_closed(&self) {
		self.closed.store(true, Ordering::Release);
		let pending: Vec<_> = self.pending.lock().drain().collect();
		for (_, sender) in pending {
			let _ = sender.send(Err(DriverError::ConnectionClosed));
		}
	}
}
