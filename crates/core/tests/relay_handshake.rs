//! Bridge relay integration: drives both websocket sides of a live
//! relay and checks the CDP ↔ envelope translation rules.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn recv_json(socket: &mut Socket) -> Value {
	loop {
		let message = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
			.await
			.expect("timed out waiting for frame")
			.expect("socket closed")
			.expect("socket error");
		if let Message::Text(text) = message {
			return serde_json::from_str(&text).expect("frame is not JSON");
		}
	}
}

async fn send_json(socket: &mut Socket, value: Value) {
	socket.send(Message::Text(value.to_string().into())).await.expect("send failed");
}

#[tokio::test]
async fn browser_get_version_is_synthetic() {
	let relay = ab_core::relay::start(0).await.unwrap();
	let (mut driver, _) = connect_async(&relay.cdp_url).await.unwrap();

	send_json(&mut driver, json!({ "id": 1, "method": "Browser.getVersion" })).await;
	let reply = recv_json(&mut driver).await;
	assert_eq!(reply["id"], 1);
	assert!(reply["result"]["product"].as_str().unwrap().contains("Extension-Bridge"));

	relay.shutdown();
}

#[tokio::test]
async fn set_auto_attach_mints_synthetic_session() {
	let relay = ab_core::relay::start(0).await.unwrap();
	let (mut extension, _) = connect_async(&relay.extension_url).await.unwrap();
	relay.wait_for_extension(std::time::Duration::from_secs(2)).await.unwrap();
	let (mut driver, _) = connect_async(&relay.cdp_url).await.unwrap();

	send_json(&mut driver, json!({ "id": 1, "method": "Target.setAutoAttach", "params": { "autoAttach": true } })).await;

	// The relay asks the extension to attach.
	let attach = recv_json(&mut extension).await;
	assert_eq!(attach["method"], "attachToTab");
	let relay_id = attach["id"].as_u64().unwrap();
	send_json(
		&mut extension,
		json!({
			"id": relay_id,
			"result": { "targetInfo": { "targetId": "t", "type": "page", "title": "T", "url": "https://x" } },
		}),
	)
	.await;

	// Driver sees the attachment event, then the command reply.
	let event = recv_json(&mut driver).await;
	assert_eq!(event["method"], "Target.attachedToTarget");
	assert_eq!(event["params"]["sessionId"], "pw-tab-1");
	assert_eq!(event["params"]["targetInfo"]["attached"], true);
	assert_eq!(event["params"]["waitingForDebugger"], false);

	let reply = recv_json(&mut driver).await;
	assert_eq!(reply["id"], 1);
	assert_eq!(reply["result"], json!({}));

	relay.shutdown();
}

#[tokio::test]
async fn commands_forward_and_events_return() {
	let relay = ab_core::relay::start(0).await.unwrap();
	let (mut extension, _) = connect_async(&relay.extension_url).await.unwrap();
	relay.wait_for_extension(std::time::Duration::from_secs(2)).await.unwrap();
	let (mut driver, _) = connect_async(&relay.cdp_url).await.unwrap();

	// Mint the synthetic session first.
	send_json(&mut driver, json!({ "id": 1, "method": "Target.setAutoAttach", "params": { "autoAttach": true } })).await;
	let attach = recv_json(&mut extension).await;
	send_json(
		&mut extension,
		json!({ "id": attach["id"], "result": { "targetInfo": { "targetId": "t", "type": "page", "title": "T", "url": "https://x" } } }),
	)
	.await;
	let _event = recv_json(&mut driver).await;
	let _reply = recv_json(&mut driver).await;

	// A command under the synthetic session forwards without it.
	send_json(
		&mut driver,
		json!({ "id": 2, "sessionId": "pw-tab-1", "method": "Runtime.evaluate", "params": { "expression": "1+1" } }),
	)
	.await;
	let forwarded = recv_json(&mut extension).await;
	assert_eq!(forwarded["method"], "forwardCDPCommand");
	assert_eq!(forwarded["params"]["method"], "Runtime.evaluate");
	assert!(forwarded["params"]["sessionId"].is_null(), "synthetic session must be stripped");

	send_json(&mut extension, json!({ "id": forwarded["id"], "result": { "result": { "value": 2 } } })).await;
	let reply = recv_json(&mut driver).await;
	assert_eq!(reply["id"], 2);
	assert_eq!(reply["sessionId"], "pw-tab-1");
	assert_eq!(reply["result"]["result"]["value"], 2);

	// Relay-initiated events unwrap onto the driver with the synthetic
	// session id.
	send_json(
		&mut extension,
		json!({ "method": "forwardCDPEvent", "params": { "method": "Page.loadEventFired", "params": { "timestamp": 1 } } }),
	)
	.await;
	let event = recv_json(&mut driver).await;
	assert_eq!(event["method"], "Page.loadEventFired");
	assert_eq!(event["sessionId"], "pw-tab-1");

	relay.shutdown();
}

#[tokio::test]
async fn extension_disconnect_rejects_pending_commands() {
	let relay = ab_core::relay::start(0).await.unwrap();
	let (extension, _) = connect_async(&relay.extension_url).await.unwrap();
	relay.wait_for_extension(std::time::Duration::from_secs(2)).await.unwrap();
	let (mut driver, _) = connect_async(&relay.cdp_url).await.unwrap();

	send_json(&mut driver, json!({ "id": 7, "method": "Page.enable", "params": {} })).await;
	// Close the extension before it answers.
	drop(extension);

	let reply = recv_json(&mut driver).await;
	assert_eq!(reply["id"], 7);
	let message = reply["error"]["message"].as_str().unwrap();
	assert!(message.contains("disconnected"), "got: {message}");

	relay.shutdown();
}

#[tokio::test]
async fn second_driver_connection_is_closed() {
	let relay = ab_core::relay::start(0).await.unwrap();
	let (_first, _) = connect_async(&relay.cdp_url).await.unwrap();
	// Give the first upgrade time to register.
	tokio::time::sleep(std::time::Duration::from_millis(100)).await;

	let (mut second, _) = connect_async(&relay.cdp_url).await.unwrap();
	let frame = tokio::time::timeout(std::time::Duration::from_secs(5), second.next()).await.unwrap();
	match frame {
		Some(Ok(Message::Close(Some(close)))) => assert_eq!(u16::from(close.code), 1008),
		other => panic!("expected policy-violation close, got {other:?}"),
	}

	relay.shutdown();
}
