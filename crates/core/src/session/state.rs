//! Per-session mutable state: the browser handle, the ordered tab set,
//! the current ref map, sinks, and recorder state.
//!
//! Everything here is owned by the scheduler task; pages hold no
//! back-pointers into the session.

use std::sync::Arc;

use ab_protocol::ErrorKind;
use ab_runtime::{BackendConfig, BackendMode, Browser, Page};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

use super::sinks::{RouteTable, Sinks, spawn_page_pump};
use crate::error::{CoreError, Result};
use crate::paths;
use crate::relay::RelayHandle;
use crate::snapshot::RefMap;
use crate::vault::Vault;

/// The launch parameters a session was (or would be) opened with;
/// compared to decide whether a repeat `launch` is a no-op or a
/// browser swap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchSpec {
	pub headless: bool,
	pub cdp_port: Option<u16>,
	pub bridge: bool,
	pub executable_path: Option<String>,
	pub extensions: Vec<String>,
	pub args: Vec<String>,
}

impl LaunchSpec {
	/// Hydrates defaults from `AGENT_BROWSER_*`.
	pub fn from_env() -> Self {
		let headed = std::env::var("AGENT_BROWSER_HEADED").map(|v| v == "1" || v == "true").unwrap_or(false);
		let extensions = std::env::var("AGENT_BROWSER_EXTENSIONS")
			.map(|raw| raw.split(',').filter(|s| !s.is_empty()).map(str::to_owned).collect())
			.unwrap_or_default();
		Self {
			headless: !headed,
			cdp_port: None,
			bridge: std::env::var("AGENT_BROWSER_BRIDGE").map(|v| v == "1" || v == "true").unwrap_or(false),
			executable_path: std::env::var("AGENT_BROWSER_EXECUTABLE_PATH").ok().filter(|s| !s.is_empty()),
			extensions,
			args: Vec::new(),
		}
	}
}

/// One open tab: the page driver plus its sink pump.
pub struct Tab {
	pub page: Page,
	pump: JoinHandle<()>,
}

impl Drop for Tab {
	fn drop(&mut self) {
		self.pump.abort();
	}
}

pub struct SessionState {
	pub name: String,
	pub browser: Option<Browser>,
	pub launch_spec: Option<LaunchSpec>,
	pub tabs: Vec<Tab>,
	pub active_tab: usize,
	pub ref_map: Option<RefMap>,
	pub sinks: Sinks,
	pub routes: Arc<RwLock<RouteTable>>,
	pub vault: Vault,
	pub default_timeout_ms: u64,
	/// Dialog choice applied to the active page and inherited by new
	/// tabs.
	pub dialog_choice: Option<(bool, Option<String>)>,
	pub video_path: Option<String>,
	pub trace_path: Option<String>,
	pub har_path: Option<String>,
	pub prev_snapshot: Option<String>,
	pub prev_screenshot: Option<Vec<u8>>,
	pub prev_url: Option<String>,
	pub bridge: Option<RelayHandle>,
	/// True while interception is enabled on pages.
	pub fetch_enabled: bool,
}

impl SessionState {
	pub fn new(name: String, vault: Vault) -> Self {
		Self {
			name,
			browser: None,
			launch_spec: None,
			tabs: Vec::new(),
			active_tab: 0,
			ref_map: None,
			sinks: Sinks::default(),
			routes: Arc::new(RwLock::new(RouteTable::default())),
			vault,
			default_timeout_ms: paths::default_timeout_ms(),
			dialog_choice: None,
			video_path: None,
			trace_path: None,
			har_path: None,
			prev_snapshot: None,
			prev_screenshot: None,
			prev_url: None,
			bridge: None,
			fetch_enabled: false,
		}
	}

	pub fn timeout_ms(&self, requested: Option<u64>) -> u64 {
		requested.unwrap_or(self.default_timeout_ms)
	}

	pub fn is_launched(&self) -> bool {
		self.browser.is_some()
	}

	/// The active page; most callers go through
	/// [`SessionState::ensure_browser`] first.
	pub fn active_page(&self) -> Result<&Page> {
		self.tabs
			.get(self.active_tab)
			.map(|tab| &tab.page)
			.ok_or_else(|| CoreError::bare(ErrorKind::NotLaunched))
	}

	/// Launches the browser on first use with environment defaults.
	pub async fn ensure_browser(&mut self) -> Result<&Page> {
		if self.browser.is_none() {
			let spec = LaunchSpec::from_env();
			self.launch(spec).await?;
		}
		self.active_page()
	}

	/// Opens (or re-opens) the browser for `spec`.
	///
	/// A repeat launch with an identical spec is a no-op; a changed CDP
	/// port or attach mode closes the current browser first.
	pub async fn launch(&mut self, spec: LaunchSpec) -> Result<bool> {
		if self.browser.is_some() {
			if self.launch_spec.as_ref() == Some(&spec) {
				return Ok(false);
			}
			self.close_browser().await;
		}

		let mode = if spec.bridge {
			let relay = crate::relay::start(0).await?;
			let ws_url = relay.cdp_url.clone();
			self.bridge = Some(relay);
			BackendMode::BridgeRelay { ws_url }
		} else if let Some(port) = spec.cdp_port {
			BackendMode::CdpAttach { port }
		} else {
			BackendMode::LocalLaunch
		};

		let config = BackendConfig {
			mode,
			headless: spec.headless,
			executable_path: spec.executable_path.clone(),
			extensions: spec.extensions.clone(),
			args: spec.args.clone(),
		};

		info!(target = "ab.daemon", session = %self.name, headless = spec.headless, "launching browser");
		let browser = Browser::connect(config).await?;

		// Adopt an existing tab when attaching, otherwise open one.
		let page = match browser.targets().await {
			Ok(targets) if !targets.is_empty() => browser.attach_page(&targets[0].target_id).await?,
			_ => browser.new_page(None).await?,
		};

		self.browser = Some(browser);
		self.launch_spec = Some(spec);
		self.adopt_page(page);
		Ok(true)
	}

	/// Registers a page as a tab, wiring sinks and inherited dialog
	/// handling; makes it the active tab.
	pub fn adopt_page(&mut self, page: Page) {
		page.set_dialog_choice(self.dialog_choice.clone());
		let pump = spawn_page_pump(page.clone(), self.sinks.clone(), Arc::clone(&self.routes));
		self.tabs.push(Tab { page, pump });
		self.active_tab = self.tabs.len() - 1;
	}

	/// Closes one tab by index, compacting the order and shifting the
	/// active index left when it pointed at or past the closed tab.
	/// The last tab cannot be closed this way.
	pub async fn close_tab(&mut self, index: usize) -> Result<()> {
		if self.tabs.len() <= 1 {
			return Err(CoreError::bare(ErrorKind::CannotCloseLast));
		}
		if index >= self.tabs.len() {
			return Err(CoreError::invalid_argument(format!("no tab at index {index}")));
		}
		let tab = self.tabs.remove(index);
		let _ = tab.page.close_target().await;
		if self.active_tab >= index && self.active_tab > 0 {
			self.active_tab -= 1;
		}
		self.invalidate_refs();
		Ok(())
	}

	/// Any new snapshot, navigation, or tab change invalidates every
	/// previously issued ref.
	pub fn invalidate_refs(&mut self) {
		self.ref_map = None;
	}

	/// Tears down the browser and all per-browser state, keeping the
	/// session itself alive.
	pub async fn close_browser(&mut self) {
		self.tabs.clear();
		self.invalidate_refs();
		self.fetch_enabled = false;
		self.video_path = None;
		self.trace_path = None;
		*self.sinks.har.lock() = None;
		if let Some(browser) = self.browser.take() {
			browser.close().await;
		}
		if let Some(bridge) = self.bridge.take() {
			bridge.shutdown();
		}
		self.launch_spec = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn launch_spec_equality_drives_relaunch_decision() {
		let a = LaunchSpec { headless: true, ..Default::default() };
		let b = LaunchSpec { headless: true, ..Default::default() };
		assert_eq!(a, b);
		let c = LaunchSpec { cdp_port: Some(9222), ..a.clone() };
		assert_ne!(a, c);
	}
}
