//! Thin request client: forwards one frame to the session daemon,
//! spawning it on demand.

use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

const SPAWN_WAIT: Duration = Duration::from_secs(10);
const SPAWN_POLL: Duration = Duration::from_millis(100);

pub async fn request(frame: String, session: Option<String>, spawn_allowed: bool) -> anyhow::Result<()> {
	let session = session.unwrap_or_else(ab_core::paths::session_name_from_env);

	// Validate locally so a bad frame fails without a daemon spawn.
	if let Err(failure) = ab_protocol::parse_request(&frame) {
		let response = ab_protocol::Response::failure(failure.id.unwrap_or_default(), failure.kind, Some(&failure.detail));
		println!("{}", serde_json::to_string(&response)?);
		bail!("invalid request frame");
	}

	let response = match send_frame(&session, &frame).await {
		Ok(response) => response,
		Err(err) if spawn_allowed => {
			debug!(target = "ab", error = %err, session = %session, "no daemon, spawning");
			spawn_daemon(&session)?;
			wait_for_daemon(&session).await?;
			send_frame(&session, &frame).await?
		}
		Err(err) => {
			// A close with no daemon is already closed.
			if frame_is_close(&frame) {
				let id = frame_id(&frame);
				println!("{}", serde_json::json!({ "id": id, "success": true, "data": { "closed": true } }));
				return Ok(());
			}
			return Err(err).with_context(|| format!("session {session:?} is not running"));
		}
	};

	println!("{response}");
	Ok(())
}

async fn send_frame(session: &str, frame: &str) -> anyhow::Result<String> {
	let stream = connect(session).await?;
	let (read_half, mut write_half) = tokio::io::split(stream);

	write_half.write_all(frame.as_bytes()).await?;
	write_half.write_all(b"\n").await?;
	write_half.flush().await?;

	let mut line = String::new();
	BufReader::new(read_half).read_line(&mut line).await?;
	if line.is_empty() {
		bail!("daemon closed the connection without a response");
	}
	Ok(line.trim_end().to_string())
}

#[cfg(unix)]
async fn connect(session: &str) -> anyhow::Result<tokio::net::UnixStream> {
	let path = ab_core::paths::socket_path(session).map_err(|err| anyhow!("{err}"))?;
	Ok(tokio::net::UnixStream::connect(&path)
		.await
		.with_context(|| format!("connect {}", path.display()))?)
}

#[cfg(not(unix))]
async fn connect(session: &str) -> anyhow::Result<tokio::net::TcpStream> {
	let sentinel = ab_core::paths::port_sentinel(session).map_err(|err| anyhow!("{err}"))?;
	let port: u16 = std::fs::read_to_string(&sentinel)
		.with_context(|| format!("read {}", sentinel.display()))?
		.trim()
		.parse()
		.context("port sentinel is not a number")?;
	Ok(tokio::net::TcpStream::connect(("127.0.0.1", port)).await?)
}

fn spawn_daemon(session: &str) -> anyhow::Result<()> {
	let exe = std::env::current_exe().context("resolving current executable")?;
	let mut command = std::process::Command::new(exe);
	command
		.arg("serve")
		.arg("--session")
		.arg(session)
		.stdin(std::process::Stdio::null())
		.stdout(std::process::Stdio::null())
		.stderr(std::process::Stdio::null());

	#[cfg(unix)]
	{
		use std::os::unix::process::CommandExt;
		// A fresh session keeps the daemon alive past this client.
		command.process_group(0);
	}

	command.spawn().context("spawning daemon")?;
	Ok(())
}

async fn wait_for_daemon(session: &str) -> anyhow::Result<()> {
	let deadline = tokio::time::Instant::now() + SPAWN_WAIT;
	loop {
		if connect(session).await.is_ok() {
			return Ok(());
		}
		if tokio::time::Instant::now() >= deadline {
			bail!("daemon did not come up within {SPAWN_WAIT:?}");
		}
		tokio::time::sleep(SPAWN_POLL).await;
	}
}

fn frame_is_close(frame: &str) -> bool {
	serde_json::from_str::<serde_json::Value>(frame)
		.ok()
		.and_then(|value| value.get("action").and_then(|action| action.as_str().map(|a| a == "close")))
		.unwrap_or(false)
}

fn frame_id(frame: &str) -> String {
	serde_json::from_str::<serde_json::Value>(frame)
		.ok()
		.and_then(|value| value.get("id").and_then(|id| id.as_str().map(str::to_owned)))
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn close_frames_are_recognised() {
		assert!(frame_is_close(r#"{"id":"9","action":"close"}"#));
		assert!(!frame_is_close(r#"{"id":"9","action":"url"}"#));
		assert_eq!(frame_id(r#"{"id":"9","action":"close"}"#), "9");
	}
}
