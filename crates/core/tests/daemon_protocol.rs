//! Daemon protocol integration over a real session socket, covering
//! the request paths that need no browser: parse failures, the policy
//! gate, confirmations, vault actions, and close.

#![cfg(unix)]

use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

static ENV_LOCK: Mutex<()> = Mutex::new(());
static SESSION_SEQ: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

struct TestDaemon {
	// Serialises the whole test: the daemon reads $HOME lazily.
	_env: std::sync::MutexGuard<'static, ()>,
	_home: tempfile::TempDir,
	session: String,
	handle: tokio::task::JoinHandle<()>,
}

async fn start_daemon(policy: Option<&str>) -> TestDaemon {
	let env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
	let home = tempfile::tempdir().unwrap();
	// The daemon derives every on-disk path from the home dir.
	unsafe {
		std::env::set_var("HOME", home.path());
		std::env::remove_var("AGENT_BROWSER_SOCKET_DIR");
		std::env::remove_var("XDG_RUNTIME_DIR");
		std::env::remove_var("AGENT_BROWSER_ENCRYPTION_KEY");
	}

	let seq = SESSION_SEQ.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
	let session = format!("t{}-{seq}", std::process::id());
	let policy_path = home.path().join(".agent-browser").join("policy.json");
	if let Some(policy) = policy {
		std::fs::create_dir_all(policy_path.parent().unwrap()).unwrap();
		std::fs::write(&policy_path, policy).unwrap();
	}

	let config = ab_core::session::DaemonConfig {
		session: session.clone(),
		idle_timeout: Duration::from_secs(30),
		policy_path: Some(policy_path),
	};
	let handle = tokio::spawn(async move {
		let _ = ab_core::session::Daemon::new(config).run().await;
	});

	// Wait for the socket to appear.
	let socket = ab_core::paths::socket_path(&session).unwrap();
	for _ in 0..100 {
		if socket.exists() {
			break;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	assert!(socket.exists(), "daemon socket never appeared");

	TestDaemon { _env: env, _home: home, session, handle }
}

impl TestDaemon {
	async fn connect(&self) -> UnixStream {
		let socket = ab_core::paths::socket_path(&self.session).unwrap();
		UnixStream::connect(&socket).await.expect("connect to daemon")
	}

	async fn roundtrip(&self, frame: Value) -> Value {
		let stream = self.connect().await;
		let (read_half, mut write_half) = tokio::io::split(stream);
		write_half.write_all(frame.to_string().as_bytes()).await.unwrap();
		write_half.write_all(b"\n").await.unwrap();

		let mut line = String::new();
		let mut reader = BufReader::new(read_half);
		tokio::time::timeout(Duration::from_secs(10), reader.read_line(&mut line))
			.await
			.expect("daemon response timed out")
			.unwrap();
		serde_json::from_str(&line).expect("response is not JSON")
	}

	async fn shutdown(self) {
		let response = self.roundtrip(json!({ "id": "shutdown", "action": "close" })).await;
		assert_eq!(response["success"], true);
		let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
	}
}

#[tokio::test]
async fn responds_under_request_id_and_rejects_unknown_actions() {
	let daemon = start_daemon(None).await;

	let response = daemon.roundtrip(json!({ "id": "42", "action": "teleport" })).await;
	assert_eq!(response["id"], "42");
	assert_eq!(response["success"], false);
	assert!(response["error"].as_str().unwrap().starts_with("parse_error"));

	let response = daemon.roundtrip(json!({ "action": "url" })).await;
	assert_eq!(response["success"], false);
	assert!(response["error"].as_str().unwrap().contains("missing id"));

	daemon.shutdown().await;
}

#[tokio::test]
async fn policy_denies_and_confirmation_flow_round_trips() {
	let daemon = start_daemon(Some(r#"{"default":"allow","deny":["eval"],"confirm":["navigate"]}"#)).await;

	// Denied category fails closed without execution.
	let response = daemon.roundtrip(json!({ "id": "a", "action": "evaluate", "script": "1+1" })).await;
	assert_eq!(response["success"], false);
	assert_eq!(response["error"], "policy_denied");

	// Confirm-listed category parks the command and returns the token.
	let response = daemon.roundtrip(json!({ "id": "b", "action": "navigate", "url": "https://example.com" })).await;
	assert_eq!(response["success"], false);
	assert_eq!(response["confirmationRequired"], true);
	assert_eq!(response["category"], "navigate");
	let confirmation_id = response["confirmationId"].as_str().unwrap().to_string();
	assert!(confirmation_id.starts_with("c_"));
	assert!(response["description"].as_str().unwrap().contains("https://example.com"));

	// Deny consumes the entry; a second deny finds nothing.
	let response = daemon.roundtrip(json!({ "id": "c", "action": "deny", "confirmationId": confirmation_id })).await;
	assert_eq!(response["success"], true);
	let response = daemon.roundtrip(json!({ "id": "d", "action": "deny", "confirmationId": confirmation_id })).await;
	assert_eq!(response["success"], false);
	assert!(response["error"].as_str().unwrap().starts_with("invalid_argument"));

	daemon.shutdown().await;
}

#[tokio::test]
async fn vault_actions_work_without_a_browser() {
	let daemon = start_daemon(None).await;

	let response = daemon
		.roundtrip(json!({
			"id": "1", "action": "auth_save",
			"name": "gh", "url": "https://github.com/login", "username": "octo", "password": "hunter2",
		}))
		.await;
	assert_eq!(response["success"], true, "save failed: {response}");
	assert_eq!(response["data"]["updated"], false);

	let response = daemon.roundtrip(json!({ "id": "2", "action": "auth_show", "name": "gh" })).await;
	assert_eq!(response["success"], true);
	assert_eq!(response["data"]["username"], "octo");
	assert!(response["data"].get("password").is_none(), "show must omit the password");

	let response = daemon
		.roundtrip(json!({
			"id": "3", "action": "auth_save",
			"name": "gh", "url": "https://github.com/login", "username": "octo", "password": "new",
		}))
		.await;
	assert_eq!(response["data"]["updated"], true);

	let response = daemon.roundtrip(json!({ "id": "4", "action": "auth_save", "name": "../x", "url": "u", "username": "u", "password": "p" })).await;
	assert_eq!(response["success"], false);
	assert_eq!(response["error"], "invalid_name");

	let response = daemon.roundtrip(json!({ "id": "5", "action": "auth_list" })).await;
	assert_eq!(response["data"]["profiles"][0]["name"], "gh");

	let response = daemon.roundtrip(json!({ "id": "6", "action": "auth_delete", "name": "gh" })).await;
	assert_eq!(response["data"]["deleted"], true);

	daemon.shutdown().await;
}

#[tokio::test]
async fn browser_requiring_introspection_fails_not_launched() {
	let daemon = start_daemon(None).await;

	let response = daemon.roundtrip(json!({ "id": "1", "action": "tab_list" })).await;
	assert_eq!(response["success"], false);
	assert_eq!(response["error"], "not_launched");

	let response = daemon.roundtrip(json!({ "id": "2", "action": "video_stop" })).await;
	assert_eq!(response["error"], "not_launched");

	daemon.shutdown().await;
}

#[tokio::test]
async fn navigation_scheme_gate_rejects_before_launch() {
	let daemon = start_daemon(None).await;

	// The allowlist check happens before any browser is launched, so
	// this fails fast even in an environment with no browser at all.
	let response = daemon.roundtrip(json!({ "id": "1", "action": "navigate", "url": "javascript:alert(1)" })).await;
	assert_eq!(response["success"], false);
	assert!(response["error"].as_str().unwrap().starts_with("invalid_argument"));

	daemon.shutdown().await;
}
