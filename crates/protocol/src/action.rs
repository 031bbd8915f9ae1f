use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of daemon actions.
///
/// The wire tag is the snake_case action name (`tab_new`, `auth_save`);
/// parameter keys are camelCase. Unknown actions fail at the parse
/// boundary, before any dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Action {
	// Navigation
	Navigate {
		url: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		wait_until: Option<WaitState>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Back {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Forward {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Reload {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},

	// Pointer interaction
	Click {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		button: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Dblclick {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Hover {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Tap {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Drag {
		source: String,
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},

	// Text entry and form controls
	Fill {
		target: String,
		value: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Type {
		target: String,
		text: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		delay_ms: Option<u64>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Press {
		key: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		target: Option<String>,
	},
	Keyboard {
		subaction: KeyboardAction,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		text: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		key: Option<String>,
	},
	Select {
		target: String,
		value: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Multiselect {
		target: String,
		values: Vec<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Check {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Uncheck {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Clear {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Selectall {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		target: Option<String>,
	},
	Setvalue {
		target: String,
		value: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Upload {
		target: String,
		files: Vec<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Download {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},

	// Page capture
	Snapshot {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		interactive: Option<bool>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		compact: Option<bool>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		max_depth: Option<usize>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		selector: Option<String>,
	},
	Screenshot {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		full_page: Option<bool>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		target: Option<String>,
	},
	Pdf {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	DiffSnapshot {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		interactive: Option<bool>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		compact: Option<bool>,
	},
	DiffScreenshot {},
	DiffUrl {},

	// Scrolling
	Scroll {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		direction: Option<ScrollDirection>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pixels: Option<i64>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		target: Option<String>,
	},
	Scrollintoview {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},

	// Waits; exactly one condition is expected per request
	Wait {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		selector: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		text: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		url: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		state: Option<WaitState>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		function: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		duration_ms: Option<u64>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},

	// Element and page queries
	Gettext {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	Content {},
	Innerhtml {
		target: String,
	},
	Innertext {
		target: String,
	},
	Inputvalue {
		target: String,
	},
	Url {},
	Title {},
	Getattribute {
		target: String,
		name: String,
	},
	Count {
		target: String,
	},
	Boundingbox {
		target: String,
	},
	Styles {
		target: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		props: Option<Vec<String>>,
	},
	Isvisible {
		target: String,
	},
	Isenabled {
		target: String,
	},
	Ischecked {
		target: String,
	},

	// Role/text locator queries
	Getbyrole {
		role: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		name: Option<String>,
	},
	Getbytext {
		text: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		exact: Option<bool>,
	},
	Getbylabel {
		text: String,
	},
	Getbyplaceholder {
		text: String,
	},
	Getbyalttext {
		text: String,
	},
	Getbytitle {
		text: String,
	},
	Getbytestid {
		id: String,
	},
	Nth {
		target: String,
		index: usize,
	},

	// Network
	Route {
		url: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		status: Option<u16>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		body: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content_type: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		headers: Option<serde_json::Map<String, Value>>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		abort: Option<bool>,
	},
	Unroute {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		url: Option<String>,
	},
	Requests {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		filter: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		clear: Option<bool>,
	},
	Headers {
		headers: serde_json::Map<String, Value>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		origin: Option<String>,
	},
	HarStart {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	HarStop {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	Offline {
		enabled: bool,
	},

	// Storage state profiles
	StateSave {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		name: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	StateLoad {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		name: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	StateList {},
	StateShow {
		name: String,
	},
	StateClear {
		name: String,
	},
	StateClean {},
	StateRename {
		from: String,
		to: String,
	},

	// Cookies and web storage
	CookiesGet {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		urls: Option<Vec<String>>,
	},
	CookiesSet {
		cookies: Vec<CookieParam>,
	},
	CookiesClear {},
	StorageGet {
		#[serde(default)]
		kind: StorageKind,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		key: Option<String>,
	},
	StorageSet {
		#[serde(default)]
		kind: StorageKind,
		key: String,
		value: String,
	},
	StorageClear {
		#[serde(default)]
		kind: StorageKind,
	},

	// Tabs, windows, frames
	TabNew {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		url: Option<String>,
	},
	TabList {},
	TabSwitch {
		index: usize,
	},
	TabClose {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		index: Option<usize>,
	},
	WindowNew {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		url: Option<String>,
	},
	Frame {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		selector: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		name: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		url: Option<String>,
	},
	Mainframe {},

	// Dialogs
	Dialog {
		choice: DialogChoice,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		text: Option<String>,
	},

	// Tracing and recording
	TraceStart {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	TraceStop {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	VideoStart {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	VideoStop {},

	// Event sinks
	Console {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		clear: Option<bool>,
	},
	Errors {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		clear: Option<bool>,
	},

	// Emulation and page environment
	Viewport {
		width: u32,
		height: u32,
	},
	Useragent {
		value: String,
	},
	Device {
		name: String,
	},
	Geolocation {
		latitude: f64,
		longitude: f64,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		accuracy: Option<f64>,
	},
	Permissions {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		grant: Option<Vec<String>>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		origin: Option<String>,
	},
	Emulatemedia {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		media: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		color_scheme: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		reduced_motion: Option<String>,
	},
	Timezone {
		id: String,
	},
	Locale {
		id: String,
	},

	// Script surfaces
	Setcontent {
		html: String,
	},
	Evaluate {
		script: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		arg: Option<Value>,
	},
	Evalhandle {
		script: String,
	},
	Addstyle {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
	},
	Addscript {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		content: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		path: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		url: Option<String>,
	},
	Addinitscript {
		script: String,
	},
	Expose {
		name: String,
	},
	Pause {},

	// Credential vault
	AuthSave {
		name: String,
		url: String,
		username: String,
		password: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		username_selector: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		password_selector: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		submit_selector: Option<String>,
	},
	AuthLogin {
		name: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_ms: Option<u64>,
	},
	AuthList {},
	AuthDelete {
		name: String,
	},
	AuthShow {
		name: String,
	},

	// Confirmation flow
	Confirm {
		confirmation_id: String,
	},
	Deny {
		confirmation_id: String,
	},

	// Session lifecycle
	Launch {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		headless: Option<bool>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		cdp_port: Option<u16>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		executable_path: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		extensions: Option<Vec<String>>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		args: Option<Vec<String>>,
	},
	Close {},
}

impl Action {
	/// Wire name of the action, matching its serde tag.
	pub fn name(&self) -> &'static str {
		match self {
			Action::Navigate { .. } => "navigate",
			Action::Back { .. } => "back",
			Action::Forward { .. } => "forward",
			Action::Reload { .. } => "reload",
			Action::Click { .. } => "click",
			Action::Dblclick { .. } => "dblclick",
			Action::Hover { .. } => "hover",
			Action::Tap { .. } => "tap",
			Action::Drag { .. } => "drag",
			Action::Fill { .. } => "fill",
			Action::Type { .. } => "type",
			Action::Press { .. } => "press",
			Action::Keyboard { .. } => "keyboard",
			Action::Select { .. } => "select",
			Action::Multiselect { .. } => "multiselect",
			Action::Check { .. } => "check",
			Action::Uncheck { .. } => "uncheck",
			Action::Clear { .. } => "clear",
			Action::Selectall { .. } => "selectall",
			Action::Setvalue { .. } => "setvalue",
			Action::Upload { .. } => "upload",
			Action::Download { .. } => "download",
			Action::Snapshot { .. } => "snapshot",
			Action::Screenshot { .. } => "screenshot",
			Action::Pdf { .. } => "pdf",
			Action::DiffSnapshot { .. } => "diff_snapshot",
			Action::DiffScreenshot { .. } => "diff_screenshot",
			Action::DiffUrl { .. } => "diff_url",
			Action::Scroll { .. } => "scroll",
			Action::Scrollintoview { .. } => "scrollintoview",
			Action::Wait { .. } => "wait",
			Action::Gettext { .. } => "gettext",
			Action::Content { .. } => "content",
			Action::Innerhtml { .. } => "innerhtml",
			Action::Innertext { .. } => "innertext",
			Action::Inputvalue { .. } => "inputvalue",
			Action::Url { .. } => "url",
			Action::Title { .. } => "title",
			Action::Getattribute { .. } => "getattribute",
			Action::Count { .. } => "count",
			Action::Boundingbox { .. } => "boundingbox",
			Action::Styles { .. } => "styles",
			Action::Isvisible { .. } => "isvisible",
			Action::Isenabled { .. } => "isenabled",
			Action::Ischecked { .. } => "ischecked",
			Action::Getbyrole { .. } => "getbyrole",
			Action::Getbytext { .. } => "getbytext",
			Action::Getbylabel { .. } => "getbylabel",
			Action::Getbyplaceholder { .. } => "getbyplaceholder",
			Action::Getbyalttext { .. } => "getbyalttext",
			Action::Getbytitle { .. } => "getbytitle",
			Action::Getbytestid { .. } => "getbytestid",
			Action::Nth { .. } => "nth",
			Action::Route { .. } => "route",
			Action::Unroute { .. } => "unroute",
			Action::Requests { .. } => "requests",
			Action::Headers { .. } => "headers",
			Action::HarStart { .. } => "har_start",
			Action::HarStop { .. } => "har_stop",
			Action::Offline { .. } => "offline",
			Action::StateSave { .. } => "state_save",
			Action::StateLoad { .. } => "state_load",
			Action::StateList { .. } => "state_list",
			Action::StateShow { .. } => "state_show",
			Action::StateClear { .. } => "state_clear",
			Action::StateClean { .. } => "state_clean",
			Action::StateRename { .. } => "state_rename",
			Action::CookiesGet { .. } => "cookies_get",
			Action::CookiesSet { .. } => "cookies_set",
			Action::CookiesClear { .. } => "cookies_clear",
			Action::StorageGet { .. } => "storage_get",
			Action::StorageSet { .. } => "storage_set",
			Action::StorageClear { .. } => "storage_clear",
			Action::TabNew { .. } => "tab_new",
			Action::TabList { .. } => "tab_list",
			Action::TabSwitch { .. } => "tab_switch",
			Action::TabClose { .. } => "tab_close",
			Action::WindowNew { .. } => "window_new",
			Action::Frame { .. } => "frame",
			Action::Mainframe { .. } => "mainframe",
			Action::Dialog { .. } => "dialog",
			Action::TraceStart { .. } => "trace_start",
			Action::TraceStop { .. } => "trace_stop",
			Action::VideoStart { .. } => "video_start",
			Action::VideoStop { .. } => "video_stop",
			Action::Console { .. } => "console",
			Action::Errors { .. } => "errors",
			Action::Viewport { .. } => "viewport",
			Action::Useragent { .. } => "useragent",
			Action::Device { .. } => "device",
			Action::Geolocation { .. } => "geolocation",
			Action::Permissions { .. } => "permissions",
			Action::Emulatemedia { .. } => "emulatemedia",
			Action::Timezone { .. } => "timezone",
			Action::Locale { .. } => "locale",
			Action::Setcontent { .. } => "setcontent",
			Action::Evaluate { .. } => "evaluate",
			Action::Evalhandle { .. } => "evalhandle",
			Action::Addstyle { .. } => "addstyle",
			Action::Addscript { .. } => "addscript",
			Action::Addinitscript { .. } => "addinitscript",
			Action::Expose { .. } => "expose",
			Action::Pause { .. } => "pause",
			Action::AuthSave { .. } => "auth_save",
			Action::AuthLogin { .. } => "auth_login",
			Action::AuthList { .. } => "auth_list",
			Action::AuthDelete { .. } => "auth_delete",
			Action::AuthShow { .. } => "auth_show",
			Action::Confirm { .. } => "confirm",
			Action::Deny { .. } => "deny",
			Action::Launch { .. } => "launch",
			Action::Close { .. } => "close",
		}
	}
}

/// Keyboard subactions for the `keyboard` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyboardAction {
	Type,
	InsertText,
	Press,
}

/// Document readiness targets for navigation and `wait` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
	Load,
	Domcontentloaded,
	Networkidle,
}

/// Scroll directions for the `scroll` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
	Up,
	Down,
	Left,
	Right,
}

/// Which web storage a `storage_*` action addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
	#[default]
	Local,
	Session,
}

/// Dialog resolution installed by the `dialog` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogChoice {
	Accept,
	Dismiss,
}

/// A cookie as supplied to `cookies_set`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieParam {
	pub name: String,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub same_site: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn action_tag_matches_name() {
		let cases = [
			(r#"{"action":"navigate","url":"about:blank"}"#, "navigate"),
			(r#"{"action":"tab_new"}"#, "tab_new"),
			(r#"{"action":"auth_save","name":"gh","url":"https://g","username":"u","password":"p"}"#, "auth_save"),
			(r#"{"action":"diff_snapshot"}"#, "diff_snapshot"),
			(r##"{"action":"scrollintoview","target":"#main"}"##, "scrollintoview"),
		];
		for (json, name) in cases {
			let action: Action = serde_json::from_str(json).unwrap();
			assert_eq!(action.name(), name);
		}
	}

	#[test]
	fn params_are_camel_case() {
		let action: Action = serde_json::from_str(r#"{"action":"snapshot","interactive":true,"maxDepth":3}"#).unwrap();
		match action {
			Action::Snapshot { interactive, max_depth, .. } => {
				assert_eq!(interactive, Some(true));
				assert_eq!(max_depth, Some(3));
			}
			other => panic!("unexpected action: {other:?}"),
		}
	}

	#[test]
	fn unknown_action_is_rejected() {
		let err = serde_json::from_str::<Action>(r#"{"action":"teleport"}"#).unwrap_err();
		assert!(err.to_string().contains("teleport") || err.to_string().contains("unknown variant"));
	}

	#[test]
	fn dialog_choice_parses() {
		let action: Action = serde_json::from_str(r#"{"action":"dialog","choice":"accept","text":"yes"}"#).unwrap();
		match action {
			Action::Dialog { choice, text } => {
				assert_eq!(choice, DialogChoice::Accept);
				assert_eq!(text.as_deref(), Some("yes"));
			}
			other => panic!("unexpected action: {other:?}"),
		}
	}
}
