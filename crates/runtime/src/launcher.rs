use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{DriverError, Result};

const DEVTOOLS_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEVTOOLS_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// A locally launched browser process plus its DevTools endpoint.
pub struct LaunchedBrowser {
	pub ws_url: String,
	child: Child,
	user_data_dir: PathBuf,
	temp_profile: bool,
}

/// Locates a Chromium-family executable.
///
/// Order: explicit override, then well-known binary names on PATH, then
/// platform install locations.
pub fn find_executable(explicit: Option<&str>) -> Result<PathBuf> {
	if let Some(path) = explicit {
		let path = PathBuf::from(path);
		if path.exists() {
			return Ok(path);
		}
		return Err(DriverError::Launch(format!("executable not found: {}", path.display())));
	}

	const CANDIDATES: &[&str] = &[
		"chromium",
		"chromium-browser",
		"google-chrome",
		"google-chrome-stable",
		"chrome",
		"msedge",
	];
	for name in CANDIDATES {
		if let Ok(path) = which::which(name) {
			return Ok(path);
		}
	}

	#[cfg(target_os = "macos")]
	{
		const MAC_PATHS: &[&str] = &[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
		];
		for path in MAC_PATHS {
			if Path::new(path).exists() {
				return Ok(PathBuf::from(path));
			}
		}
	}

	Err(DriverError::Launch("no chromium executable found; set AGENT_BROWSER_EXECUTABLE_PATH".to_string()))
}

/// Spawns a browser with a private profile and resolves its DevTools
/// websocket endpoint from the profile's `DevToolsActivePort` file.
pub async fn launch(
	executable: &Path,
	headless: bool,
	extensions: &[String],
	extra_args: &[String],
	user_data_dir: Option<PathBuf>,
) -> Result<LaunchedBrowser> {
	let (user_data_dir, temp_profile) = match user_data_dir {
		Some(dir) => (dir, false),
		None => {
			let dir = std::env::temp_dir().join(format!("agent-browser-profile-{}", std::process::id()));
			(dir, true)
		}
	};
	std::fs::create_dir_all(&user_data_dir)?;

	let mut command = Command::new(executable);
	command
		.arg(format!("--user-data-dir={}", user_data_dir.display()))
		.arg("--remote-debugging-port=0")
		.arg("--no-first-run")
		.arg("--no-default-browser-check")
		.arg("--disable-background-networking")
		.arg("--disable-sync")
		.arg("about:blank");

	if headless {
		command.arg("--headless=new");
	}
	if !extensions.is_empty() {
		command.arg(format!("--load-extension={}", extensions.join(",")));
		command.arg(format!("--disable-extensions-except={}", extensions.join(",")));
	}
	for arg in extra_args {
		command.arg(arg);
	}

	command.stdout(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);

	info!(target = "ab.cdp", executable = %executable.display(), headless, "launching browser");
	let child = command.spawn().map_err(|err| DriverError::Launch(format!("{}: {err}", executable.display())))?;

	let ws_url = wait_for_devtools(&user_data_dir).await?;
	debug!(target = "ab.cdp", ws_url = %ws_url, "devtools endpoint ready");

	Ok(LaunchedBrowser { ws_url, child, user_data_dir, temp_profile })
}

/// Resolves the browser-level websocket URL of an already-running
/// browser from its HTTP endpoint.
pub async fn discover_ws_url(port: u16) -> Result<String> {
	let url = format!("http://127.0.0.1:{port}/json/version");
	let response: serde_json::Value = reqwest::get(&url)
		.await
		.map_err(|err| DriverError::Connect(format!("{url}: {err}")))?
		.json()
		.await
		.map_err(|err| DriverError::Connect(format!("{url}: {err}")))?;

	response
		.get("webSocketDebuggerUrl")
		.and_then(serde_json::Value::as_str)
		.map(str::to_owned)
		.ok_or_else(|| DriverError::Connect(format!("{url}: no webSocketDebuggerUrl in response")))
}

async fn wait_for_devtools(user_data_dir: &Path) -> Result<String> {
	let port_file = user_data_dir.join("DevToolsActivePort");
	let deadline = tokio::time::Instant::now() + DEVTOOLS_STARTUP_TIMEOUT;

	loop {
		if let Ok(contents) = std::fs::read_to_string(&port_file) {
			let mut lines = contents.lines();
			if let (Some(port), Some(path)) = (lines.next(), lines.next()) {
				if let Ok(port) = port.trim().parse::<u16>() {
					return Ok(format!("ws://127.0.0.1:{port}{path}"));
				}
			}
		}
		if tokio::time::Instant::now() >= deadline {
			return Err(DriverError::Launch("browser did not expose a DevTools endpoint in time".to_string()));
		}
		tokio::time::sleep(DEVTOOLS_POLL_INTERVAL).await;
	}
}

impl LaunchedBrowser {
	/// Terminates the child process and removes a temporary profile.
	pub async fn shutdown(mut self) {
		let _ = self.child.kill().await;
		if self.temp_profile {
			let _ = std::fs::remove_dir_all(&self.user_data_dir);
		}
	}

	pub fn pid(&self) -> Option<u32> {
		self.child.id()
	}
}
