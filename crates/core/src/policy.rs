//! Action categories and allow/deny/confirm evaluation.
//!
//! Evaluation is a pure function of (category, policy, confirm set);
//! the loader keeps a cached policy keyed by file mtime and re-reads at
//! most every five seconds.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use ab_protocol::Action;
use serde::Deserialize;
use tracing::{info, warn};

/// The fixed buckets actions fall into for authorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
	Navigate,
	Click,
	Fill,
	Download,
	Upload,
	Eval,
	Snapshot,
	Scroll,
	Wait,
	Get,
	Network,
	State,
	Interact,
	/// Never user-configurable; always allowed.
	Internal,
	/// Actions outside the static table; subject to default/allow only.
	Unknown,
}

impl Category {
	pub fn as_str(self) -> &'static str {
		match self {
			Category::Navigate => "navigate",
			Category::Click => "click",
			Category::Fill => "fill",
			Category::Download => "download",
			Category::Upload => "upload",
			Category::Eval => "eval",
			Category::Snapshot => "snapshot",
			Category::Scroll => "scroll",
			Category::Wait => "wait",
			Category::Get => "get",
			Category::Network => "network",
			Category::State => "state",
			Category::Interact => "interact",
			Category::Internal => "_internal",
			Category::Unknown => "unknown",
		}
	}

	/// Parses a user-supplied category string. `_internal` is
	/// deliberately not accepted from configuration.
	pub fn parse(raw: &str) -> Option<Self> {
		Some(match raw {
			"navigate" => Category::Navigate,
			"click" => Category::Click,
			"fill" => Category::Fill,
			"download" => Category::Download,
			"upload" => Category::Upload,
			"eval" => Category::Eval,
			"snapshot" => Category::Snapshot,
			"scroll" => Category::Scroll,
			"wait" => Category::Wait,
			"get" => Category::Get,
			"network" => Category::Network,
			"state" => Category::State,
			"interact" => Category::Interact,
			_ => return None,
		})
	}
}

impl std::fmt::Display for Category {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The static action → category table.
pub fn category_of(action: &Action) -> Category {
	use Action::*;
	match action {
		Navigate { .. } | Back { .. } | Forward { .. } | Reload { .. } => Category::Navigate,
		Click { .. } | Dblclick { .. } | Tap { .. } => Category::Click,
		Fill { .. } | Type { .. } | Press { .. } | Keyboard { .. } | Setvalue { .. } | Clear { .. } | AuthLogin { .. } => Category::Fill,
		Download { .. } | Pdf { .. } => Category::Download,
		Upload { .. } => Category::Upload,
		Evaluate { .. } | Evalhandle { .. } | Setcontent { .. } | Addscript { .. } | Addinitscript { .. } | Addstyle { .. } | Expose { .. } => {
			Category::Eval
		}
		Snapshot { .. } | Screenshot { .. } | DiffSnapshot { .. } | DiffScreenshot { .. } | DiffUrl { .. } | TraceStart { .. }
		| TraceStop { .. } | VideoStart { .. } | VideoStop { .. } => Category::Snapshot,
		Scroll { .. } | Scrollintoview { .. } => Category::Scroll,
		Wait { .. } | Pause { .. } => Category::Wait,
		Gettext { .. } | Content { .. } | Innerhtml { .. } | Innertext { .. } | Inputvalue { .. } | Url { .. } | Title { .. }
		| Getattribute { .. } | Count { .. } | Boundingbox { .. } | Styles { .. } | Isvisible { .. } | Isenabled { .. }
		| Ischecked { .. } | Getbyrole { .. } | Getbytext { .. } | Getbylabel { .. } | Getbyplaceholder { .. }
		| Getbyalttext { .. } | Getbytitle { .. } | Getbytestid { .. } | Nth { .. } => Category::Get,
		Route { .. } | Unroute { .. } | Requests { .. } | Headers { .. } | HarStart { .. } | HarStop { .. } | Offline { .. } => {
			Category::Network
		}
		StateSave { .. } | StateLoad { .. } | StateList { .. } | StateShow { .. } | StateClear { .. } | StateClean { .. }
		| StateRename { .. } | CookiesGet { .. } | CookiesSet { .. } | CookiesClear { .. } | StorageGet { .. }
		| StorageSet { .. } | StorageClear { .. } | Viewport { .. } | Useragent { .. } | Device { .. } | Geolocation { .. }
		| Permissions { .. } | Emulatemedia { .. } | Timezone { .. } | Locale { .. } => Category::State,
		Hover { .. } | Drag { .. } | Select { .. } | Multiselect { .. } | Check { .. } | Uncheck { .. } | Selectall { .. } => {
			Category::Interact
		}
		TabNew { .. } | TabList { .. } | TabSwitch { .. } | TabClose { .. } | WindowNew { .. } | Frame { .. } | Mainframe { .. }
		| Dialog { .. } | Console { .. } | Errors { .. } | AuthSave { .. } | AuthList { .. } | AuthDelete { .. }
		| AuthShow { .. } | Confirm { .. } | Deny { .. } | Launch { .. } | Close { .. } => Category::Internal,
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	Allow,
	Deny,
	Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRule {
	Allow,
	Deny,
}

/// An allow/deny policy as loaded from disk.
#[derive(Debug, Clone)]
pub struct Policy {
	pub default: DefaultRule,
	pub allow: HashSet<Category>,
	pub deny: HashSet<Category>,
}

/// Evaluates one action category. Order is load-bearing:
/// internal short-circuit, deny, confirm, no-policy allow, allow list,
/// default.
pub fn evaluate(category: Category, policy: Option<&Policy>, confirm: &HashSet<Category>) -> Verdict {
	if category == Category::Internal {
		return Verdict::Allow;
	}
	if let Some(policy) = policy {
		if policy.deny.contains(&category) {
			return Verdict::Deny;
		}
	}
	if confirm.contains(&category) {
		return Verdict::Confirm;
	}
	let Some(policy) = policy else {
		return Verdict::Allow;
	};
	if policy.allow.contains(&category) {
		return Verdict::Allow;
	}
	match policy.default {
		DefaultRule::Allow => Verdict::Allow,
		DefaultRule::Deny => Verdict::Deny,
	}
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
	default: String,
	#[serde(default)]
	allow: Vec<String>,
	#[serde(default)]
	deny: Vec<String>,
	#[serde(default)]
	confirm: Vec<String>,
}

/// Parses policy JSON. A `default` outside allow|deny rejects the
/// file; unrecognized categories in lists warn and are skipped.
pub fn parse_policy(raw: &str) -> Result<(Policy, HashSet<Category>), String> {
	let file: PolicyFile = serde_json::from_str(raw).map_err(|err| format!("policy parse error: {err}"))?;
	let default = match file.default.as_str() {
		"allow" => DefaultRule::Allow,
		"deny" => DefaultRule::Deny,
		other => return Err(format!("policy default must be \"allow\" or \"deny\", got {other:?}")),
	};

	let collect = |names: &[String], list: &str| -> HashSet<Category> {
		let mut out = HashSet::new();
		for name in names {
			match Category::parse(name) {
				Some(category) => {
					out.insert(category);
				}
				None => warn!(target = "ab", list, category = %name, "unrecognized policy category"),
			}
		}
		out
	};

	let policy = Policy {
		default,
		allow: collect(&file.allow, "allow"),
		deny: collect(&file.deny, "deny"),
	};
	let confirm = collect(&file.confirm, "confirm");
	Ok((policy, confirm))
}

const RELOAD_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Cached policy bound to a file, re-read on mtime change but probed at
/// most every [`RELOAD_CHECK_INTERVAL`].
pub struct PolicyLoader {
	path: PathBuf,
	cached: Option<(Policy, HashSet<Category>)>,
	mtime: Option<SystemTime>,
	last_check: Option<Instant>,
}

impl PolicyLoader {
	pub fn new(path: PathBuf) -> Self {
		let mut loader = Self { path, cached: None, mtime: None, last_check: None };
		loader.reload(true);
		loader
	}

	/// The current policy and confirm set; `None` when no policy file
	/// exists (everything allowed).
	pub fn current(&mut self) -> Option<&(Policy, HashSet<Category>)> {
		self.reload(false);
		self.cached.as_ref()
	}

	fn reload(&mut self, force: bool) {
		if !force {
			if let Some(last) = self.last_check {
				if last.elapsed() < RELOAD_CHECK_INTERVAL {
					return;
				}
			}
		}
		self.last_check = Some(Instant::now());

		let mtime = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
		if !force && mtime == self.mtime {
			return;
		}

		match std::fs::read_to_string(&self.path) {
			Ok(raw) => match parse_policy(&raw) {
				Ok(parsed) => {
					info!(target = "ab", path = %self.path.display(), "policy loaded");
					self.cached = Some(parsed);
					self.mtime = mtime;
				}
				// A broken edit keeps the previous policy in force.
				Err(err) => warn!(target = "ab", path = %self.path.display(), error = %err, "policy rejected, keeping previous"),
			},
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				self.cached = None;
				self.mtime = None;
			}
			Err(err) => warn!(target = "ab", path = %self.path.display(), error = %err, "policy unreadable, keeping previous"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn no_confirm() -> HashSet<Category> {
		HashSet::new()
	}

	#[test]
	fn internal_short_circuits_even_under_default_deny() {
		let (policy, _) = parse_policy(r#"{"default":"deny"}"#).unwrap();
		assert_eq!(evaluate(Category::Internal, Some(&policy), &no_confirm()), Verdict::Allow);
	}

	#[test]
	fn deny_wins_over_allow_and_confirm() {
		let (policy, _) = parse_policy(r#"{"default":"allow","allow":["eval"],"deny":["eval"]}"#).unwrap();
		let confirm: HashSet<_> = [Category::Eval].into_iter().collect();
		assert_eq!(evaluate(Category::Eval, Some(&policy), &confirm), Verdict::Deny);
	}

	#[test]
	fn confirm_applies_before_allow() {
		let (policy, _) = parse_policy(r#"{"default":"allow","allow":["download"]}"#).unwrap();
		let confirm: HashSet<_> = [Category::Download].into_iter().collect();
		assert_eq!(evaluate(Category::Download, Some(&policy), &confirm), Verdict::Confirm);
	}

	#[test]
	fn null_policy_allows_everything_but_confirm_still_fires() {
		assert_eq!(evaluate(Category::Eval, None, &no_confirm()), Verdict::Allow);
		let confirm: HashSet<_> = [Category::Eval].into_iter().collect();
		assert_eq!(evaluate(Category::Eval, None, &confirm), Verdict::Confirm);
	}

	#[test]
	fn default_deny_with_allow_list() {
		let (policy, _) = parse_policy(r#"{"default":"deny","allow":["navigate","get"]}"#).unwrap();
		assert_eq!(evaluate(Category::Navigate, Some(&policy), &no_confirm()), Verdict::Allow);
		assert_eq!(evaluate(Category::Eval, Some(&policy), &no_confirm()), Verdict::Deny);
		assert_eq!(evaluate(Category::Unknown, Some(&policy), &no_confirm()), Verdict::Deny);
	}

	#[test]
	fn bad_default_rejects_file() {
		assert!(parse_policy(r#"{"default":"maybe"}"#).is_err());
	}

	#[test]
	fn unknown_category_warns_but_loads() {
		let (policy, _) = parse_policy(r#"{"default":"allow","deny":["eval","frobnicate"]}"#).unwrap();
		assert!(policy.deny.contains(&Category::Eval));
		assert_eq!(policy.deny.len(), 1);
	}

	#[test]
	fn evaluation_is_pure_and_list_order_insensitive() {
		let (a, _) = parse_policy(r#"{"default":"deny","allow":["click","fill","scroll"]}"#).unwrap();
		let (b, _) = parse_policy(r#"{"default":"deny","allow":["scroll","click","fill"]}"#).unwrap();
		for category in [Category::Click, Category::Fill, Category::Scroll, Category::Eval] {
			assert_eq!(
				evaluate(category, Some(&a), &no_confirm()),
				evaluate(category, Some(&b), &no_confirm()),
			);
		}
	}

	#[test]
	fn spec_scenario_deny_eval_confirm_download() {
		let (policy, _) = parse_policy(r#"{"default":"allow","deny":["eval"]}"#).unwrap();
		let confirm: HashSet<_> = [Category::Download].into_iter().collect();
		assert_eq!(evaluate(Category::Eval, Some(&policy), &confirm), Verdict::Deny);
		assert_eq!(evaluate(Category::Download, Some(&policy), &confirm), Verdict::Confirm);
		assert_eq!(evaluate(Category::Navigate, Some(&policy), &confirm), Verdict::Allow);
	}

	#[test]
	fn action_table_spot_checks() {
		use ab_protocol::Action;
		let nav: Action = serde_json::from_str(r#"{"action":"navigate","url":"https://x"}"#).unwrap();
		assert_eq!(category_of(&nav), Category::Navigate);
		let eval: Action = serde_json::from_str(r#"{"action":"evaluate","script":"1+1"}"#).unwrap();
		assert_eq!(category_of(&eval), Category::Eval);
		let close: Action = serde_json::from_str(r#"{"action":"tab_close"}"#).unwrap();
		assert_eq!(category_of(&close), Category::Internal);
		let dl: Action = serde_json::from_str(r#"{"action":"download","target":"@e1"}"#).unwrap();
		assert_eq!(category_of(&dl), Category::Download);
	}
}
