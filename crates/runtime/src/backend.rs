//! Backend variants producing a connected [`Browser`].

use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::info;

use crate::error::{DriverError, Result};
use crate::launcher::{self, LaunchedBrowser};
use crate::page::Page;
use crate::transport::CdpClient;

/// How a session reaches its browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMode {
	/// Spawn a private browser process and attach to it.
	LocalLaunch,
	/// Attach to an already-running browser's DevTools port.
	CdpAttach { port: u16 },
	/// Attach to a bridge-relay endpoint fronting a browser extension.
	BridgeRelay { ws_url: String },
}

/// Connection-time configuration, hydrated by the daemon from request
/// parameters and `AGENT_BROWSER_*` environment variables.
#[derive(Debug, Clone)]
pub struct BackendConfig {
	pub mode: BackendMode,
	pub headless: bool,
	pub executable_path: Option<String>,
	pub extensions: Vec<String>,
	pub args: Vec<String>,
}

impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			mode: BackendMode::LocalLaunch,
			headless: true,
			executable_path: None,
			extensions: Vec::new(),
			args: Vec::new(),
		}
	}
}

/// A page target reported by the browser.
#[derive(Debug, Clone)]
pub struct TargetEntry {
	pub target_id: String,
	pub url: String,
	pub title: String,
}

/// One connected browser, however it was reached.
pub struct Browser {
	client: CdpClient,
	launched: Option<LaunchedBrowser>,
	config: BackendConfig,
}

impl Browser {
	pub async fn connect(config: BackendConfig) -> Result<Self> {
		let (client, launched) = match &config.mode {
			BackendMode::LocalLaunch => {
				let executable = launcher::find_executable(config.executable_path.as_deref())?;
				let launched = launcher::launch(&executable, config.headless, &config.extensions, &config.args, None).await?;
				let client = CdpClient::connect(&launched.ws_url).await?;
				(client, Some(launched))
			}
			BackendMode::CdpAttach { port } => {
				let ws_url = launcher::discover_ws_url(*port).await?;
				info!(target = "ab.cdp", port, "attaching to running browser");
				(CdpClient::connect(&ws_url).await?, None)
			}
			BackendMode::BridgeRelay { ws_url } => {
				info!(target = "ab.cdp", ws_url = %ws_url, "attaching via bridge relay");
				(CdpClient::connect(ws_url).await?, None)
			}
		};

		Ok(Self { client, launched, config })
	}

	pub fn client(&self) -> CdpClient {
		self.client.clone()
	}

	pub fn config(&self) -> &BackendConfig {
		&self.config
	}

	pub fn is_connected(&self) -> bool {
		!self.client.is_closed()
	}

	/// Creates a new tab and attaches a page driver to it.
	pub async fn new_page(&self, url: Option<&str>) -> Result<Page> {
		let reply = self
			.client
			.call("Target.createTarget", json!({ "url": url.unwrap_or("about:blank") }))
			.await?;
		let target_id = reply
			.get("targetId")
			.and_then(Value::as_str)
			.ok_or_else(|| DriverError::Protocol("createTarget returned no targetId".to_string()))?;
		Page::attach(self.client.clone(), target_id).await
	}

	/// Lists page-type targets already open in the browser.
	pub async fn targets(&self) -> Result<Vec<TargetEntry>> {
		let reply = self.client.call("Target.getTargets", json!({})).await?;
		let infos = reply.get("targetInfos").and_then(Value::as_array).cloned().unwrap_or_default();
		Ok(infos
			.iter()
			.filter(|info| info.get("type").and_then(Value::as_str) == Some("page"))
			.map(|info| TargetEntry {
				target_id: info.get("targetId").and_then(Value::as_str).unwrap_or_default().to_string(),
				url: info.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
				title: info.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
			})
			.collect())
	}

	/// Attaches a page driver to an existing target.
	pub async fn attach_page(&self, target_id: &str) -> Result<Page> {
		Page::attach(self.client.clone(), target_id).await
	}

	pub async fn grant_permissions(&self, permissions: &[String], origin: Option<&str>) -> Result<()> {
		let mut params = json!({ "permissions": permissions });
		if let Some(origin) = origin {
			params["origin"] = json!(origin);
		}
		self.client.call("Browser.grantPermissions", params).await?;
		Ok(())
	}

	/// Routes downloads into a directory, with progress events enabled.
	pub async fn set_download_path(&self, path: &str) -> Result<()> {
		self.client
			.call(
				"Browser.setDownloadBehavior",
				json!({ "behavior": "allow", "downloadPath": path, "eventsEnabled": true }),
			)
			.await?;
		Ok(())
	}

	/// Starts a browser-wide trace.
	pub async fn tracing_start(&self, categories: Option<&str>) -> Result<()> {
		let mut params = json!({ "transferMode": "ReportEvents" });
		if let Some(categories) = categories {
			params["categories"] = json!(categories);
		}
		self.client.call("Tracing.start", params).await?;
		Ok(())
	}

	/// Ends the trace and collects every reported event chunk.
	pub async fn tracing_stop(&self) -> Result<Vec<Value>> {
		let mut events = self.client.subscribe();
		self.client.call("Tracing.end", json!({})).await?;

		let mut collected = Vec::new();
		loop {
			match events.recv().await {
				Ok(event) if event.method == "Tracing.dataCollected" => {
					if let Some(chunk) = event.params.get("value").and_then(Value::as_array) {
						collected.extend(chunk.iter().cloned());
					}
				}
				Ok(event) if event.method == "Tracing.tracingComplete" => break,
				Ok(_) => {}
				Err(broadcast::error::RecvError::Lagged(_)) => {}
				Err(broadcast::error::RecvError::Closed) => return Err(DriverError::ConnectionClosed),
			}
		}
		Ok(collected)
	}

	/// Closes the browser and reaps a locally launched process.
	pub async fn close(mut self) {
		let _ = self.client.call("Browser.close", json!({})).await;
		if let Some(launched) = self.launched.take() {
			launched.shutdown().await;
		}
	}
}
