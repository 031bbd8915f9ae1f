//! Accessibility snapshot, ref assignment, and ref resolution.
//!
//! A snapshot renders the driver-reported accessibility walk into a
//! compact indented text tree and binds `e<N>` refs to the nodes an
//! agent can act on. Refs are dense over the displayed tree in
//! depth-first pre-order, starting at `e1`, and are invalidated by the
//! next snapshot or navigation.

use std::collections::HashMap;

use ab_runtime::Locator;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Roles an agent can operate directly.
const INTERACTIVE_ROLES: &[&str] = &[
	"button",
	"link",
	"textbox",
	"searchbox",
	"combobox",
	"listbox",
	"option",
	"checkbox",
	"radio",
	"slider",
	"spinbutton",
	"switch",
	"menuitem",
	"tab",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotOptions {
	#[serde(default)]
	pub interactive: bool,
	#[serde(default)]
	pub compact: bool,
	pub max_depth: Option<usize>,
	pub selector: Option<String>,
}

/// One ref-map entry: enough to rebuild an exact locator later without
/// re-walking the tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefEntry {
	pub role: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nth: Option<usize>,
}

/// The ref → entry map produced by one snapshot.
#[derive(Debug, Clone, Default)]
pub struct RefMap {
	entries: HashMap<String, RefEntry>,
	scope: Option<String>,
}

impl RefMap {
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn get(&self, ref_id: &str) -> Option<&RefEntry> {
		self.entries.get(ref_id)
	}

	/// Rebuilds the role locator for a ref, or `None` when the ref is
	/// not in this map (the caller reports a stale ref).
	pub fn resolve(&self, ref_id: &str) -> Option<Locator> {
		let entry = self.entries.get(ref_id)?;
		Some(Locator::Role {
			role: entry.role.clone(),
			name: entry.name.clone(),
			nth: entry.nth,
			scope: self.scope.clone(),
		})
	}

	/// Wire shape for the `refs` field of a snapshot response.
	pub fn to_wire(&self) -> Value {
		let mut map = serde_json::Map::new();
		for (ref_id, entry) in &self.entries {
			map.insert(ref_id.clone(), serde_json::to_value(entry).unwrap_or(Value::Null));
		}
		Value::Object(map)
	}
}

/// The rendered snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
	pub tree: String,
	pub refs: RefMap,
}

/// Normalises any accepted ref syntax (`e1`, `@e1`, `ref=e1`) to the
/// bare form, or `None` when the string is not ref-shaped.
pub fn parse_ref(raw: &str) -> Option<&str> {
	let bare = raw.strip_prefix("ref=").or_else(|| raw.strip_prefix('@')).unwrap_or(raw);
	let digits = bare.strip_prefix('e')?;
	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0') {
		return None;
	}
	Some(bare)
}

pub fn is_ref(raw: &str) -> bool {
	parse_ref(raw).is_some()
}

/// True for the `@e1` / `ref=e1` forms that are unambiguously refs; a
/// bare `e1` is only treated as a ref when the map lookup succeeds.
pub fn is_explicit_ref(raw: &str) -> bool {
	(raw.starts_with('@') || raw.starts_with("ref=")) && is_ref(raw)
}

#[derive(Debug, Clone, Deserialize)]
struct RawNode {
	role: String,
	#[serde(default)]
	name: String,
	level: Option<u8>,
	checked: Option<bool>,
	#[serde(default)]
	disabled: bool,
	value: Option<String>,
	#[serde(default)]
	children: Vec<RawNode>,
}

struct WalkNode {
	role: String,
	name: String,
	level: Option<u8>,
	checked: Option<bool>,
	disabled: bool,
	value: Option<String>,
	/// Index of this node among full-tree nodes sharing its resolver
	/// match key, captured before any display filtering.
	occurrence: usize,
	/// How many full-tree nodes share that key.
	occurrence_total: usize,
	children: Vec<WalkNode>,
}

impl WalkNode {
	fn ref_worthy(&self) -> bool {
		INTERACTIVE_ROLES.contains(&self.role.as_str()) || (!self.name.is_empty() && self.role != "generic")
	}

	fn interactive(&self) -> bool {
		INTERACTIVE_ROLES.contains(&self.role.as_str())
	}
}

/// Builds the rendered tree and ref map from a driver accessibility
/// walk. Returns an empty snapshot for an empty walk (`null` tree).
pub fn build(tree: &Value, options: &SnapshotOptions) -> Snapshot {
	let Ok(root) = serde_json::from_value::<RawNode>(tree.clone()) else {
		return Snapshot { tree: String::new(), refs: RefMap::default() };
	};

	// Resolver match keys are counted over the full walk so nth survives
	// display filtering: the page-side match list is not filtered.
	let mut key_counts: HashMap<String, usize> = HashMap::new();
	count_keys(&root, &mut key_counts);

	let mut seen: HashMap<String, usize> = HashMap::new();
	let mut walk = Some(annotate(&root, &key_counts, &mut seen));

	if options.interactive {
		walk = walk.and_then(filter_interactive);
	}
	if options.compact {
		walk = walk.and_then(filter_compact);
	}

	let mut text = String::new();
	let mut entries = HashMap::new();
	let mut counter = 0usize;
	if let Some(walk) = walk {
		render(&walk, 0, &mut text, &mut entries, &mut counter);
	}

	Snapshot {
		tree: text,
		refs: RefMap { entries, scope: options.selector.clone() },
	}
}

/// Resolver match key: unnamed entries match every element of the role,
/// so they are counted role-wide; named entries only collide with the
/// same (role, name).
fn match_key(role: &str, name: &str) -> String {
	// The empty suffix is the role-wide key; no real name is empty.
	format!("{role}\u{0}{name}")
}

fn count_keys(node: &RawNode, counts: &mut HashMap<String, usize>) {
	*counts.entry(match_key(&node.role, &node.name)).or_default() += 1;
	// Unnamed lookups match named elements of the same role too.
	if !node.name.is_empty() {
		*counts.entry(match_key(&node.role, "")).or_default() += 1;
	}
	for child in &node.children {
		count_keys(child, counts);
	}
}

fn annotate(node: &RawNode, counts: &HashMap<String, usize>, seen: &mut HashMap<String, usize>) -> WalkNode {
	let key = match_key(&node.role, &node.name);
	let occurrence = {
		let slot = seen.entry(key.clone()).or_default();
		let index = *slot;
		*slot += 1;
		index
	};
	// Keep the role-wide counter in step for unnamed lookups.
	let role_wide_occurrence = if node.name.is_empty() {
		occurrence
	} else {
		let slot = seen.entry(match_key(&node.role, "")).or_default();
		let index = *slot;
		*slot += 1;
		index
	};

	let (occurrence, occurrence_total) = if node.name.is_empty() {
		(role_wide_occurrence, counts.get(&match_key(&node.role, "")).copied().unwrap_or(1))
	} else {
		(occurrence, counts.get(&key).copied().unwrap_or(1))
	};

	WalkNode {
		role: node.role.clone(),
		name: node.name.clone(),
		level: node.level,
		checked: node.checked,
		disabled: node.disabled,
		value: node.value.clone(),
		occurrence,
		occurrence_total,
		children: node.children.iter().map(|child| annotate(child, counts, seen)).collect(),
	}
}

/// Keeps interactive nodes and the ancestors needed to show their
/// position.
fn filter_interactive(mut node: WalkNode) -> Option<WalkNode> {
	let children: Vec<WalkNode> = std::mem::take(&mut node.children).into_iter().filter_map(filter_interactive).collect();
	if node.interactive() || !children.is_empty() {
		node.children = children;
		Some(node)
	} else {
		None
	}
}

fn filter_compact(mut node: WalkNode) -> Option<WalkNode> {
	let children: Vec<WalkNode> = std::mem::take(&mut node.children).into_iter().filter_map(filter_compact).collect();
	if !node.name.is_empty() || node.ref_worthy() || !children.is_empty() {
		node.children = children;
		Some(node)
	} else {
		None
	}
}

fn render(node: &WalkNode, depth: usize, text: &mut String, entries: &mut HashMap<String, RefEntry>, counter: &mut usize) {
	for _ in 0..depth {
		text.push_str("  ");
	}
	text.push_str("- ");
	text.push_str(&node.role);
	if !node.name.is_empty() {
		text.push_str(&format!(" \"{}\"", node.name));
	}
	if let Some(level) = node.level {
		text.push_str(&format!(" [level={level}]"));
	}
	if node.checked == Some(true) {
		text.push_str(" [checked]");
	}
	if node.disabled {
		text.push_str(" [disabled]");
	}
	if let Some(value) = &node.value {
		text.push_str(&format!(" [value=\"{value}\"]"));
	}

	if node.ref_worthy() {
		*counter += 1;
		let ref_id = format!("e{counter}");
		text.push_str(&format!(" @{ref_id}"));
		entries.insert(
			ref_id,
			RefEntry {
				role: node.role.clone(),
				name: if node.name.is_empty() { None } else { Some(node.name.clone()) },
				nth: (node.occurrence_total > 1).then_some(node.occurrence),
			},
		);
	}
	text.push('\n');

	for child in &node.children {
		render(child, depth + 1, text, entries, counter);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn sample_tree() -> Value {
		json!({
			"role": "generic",
			"name": "",
			"children": [
				{ "role": "heading", "name": "Sign in", "level": 1 },
				{ "role": "textbox", "name": "Email" },
				{ "role": "textbox", "name": "Password" },
				{ "role": "button", "name": "Submit" },
				{ "role": "generic", "name": "", "children": [
					{ "role": "button", "name": "Submit" }
				]}
			]
		})
	}

	#[test]
	fn refs_are_dense_and_start_at_e1() {
		let snapshot = build(&sample_tree(), &SnapshotOptions::default());
		for n in 1..=snapshot.refs.len() {
			assert!(snapshot.refs.get(&format!("e{n}")).is_some(), "missing e{n}");
		}
		assert!(snapshot.refs.get("e1").is_some());
		assert!(snapshot.tree.contains("@e1"));
	}

	#[test]
	fn duplicate_role_name_pairs_get_nth() {
		let snapshot = build(&sample_tree(), &SnapshotOptions::default());
		let submits: Vec<&RefEntry> = (1..=snapshot.refs.len())
			.filter_map(|n| snapshot.refs.get(&format!("e{n}")))
			.filter(|entry| entry.role == "button")
			.collect();
		assert_eq!(submits.len(), 2);
		assert_eq!(submits[0].nth, Some(0));
		assert_eq!(submits[1].nth, Some(1));

		let email = (1..=snapshot.refs.len())
			.filter_map(|n| snapshot.refs.get(&format!("e{n}")))
			.find(|entry| entry.name.as_deref() == Some("Email"))
			.unwrap();
		assert_eq!(email.nth, None);
	}

	#[test]
	fn interactive_filter_drops_heading_keeps_controls() {
		let snapshot = build(&sample_tree(), &SnapshotOptions { interactive: true, ..Default::default() });
		assert!(!snapshot.tree.contains("heading"));
		assert!(snapshot.tree.contains("textbox \"Email\""));
		assert!(snapshot.tree.contains("button \"Submit\""));
	}

	#[test]
	fn compact_drops_empty_structural_branches() {
		let tree = json!({
			"role": "generic",
			"name": "",
			"children": [
				{ "role": "generic", "name": "", "children": [ { "role": "generic", "name": "" } ] },
				{ "role": "button", "name": "OK" }
			]
		});
		let snapshot = build(&tree, &SnapshotOptions { compact: true, ..Default::default() });
		let lines: Vec<&str> = snapshot.tree.lines().collect();
		// Root survives as the button's ancestor; the empty branch is gone.
		assert_eq!(lines.len(), 2);
		assert!(lines[1].contains("button \"OK\" @e1"));
	}

	#[test]
	fn spec_scenario_single_button() {
		let tree = json!({
			"role": "generic",
			"name": "",
			"children": [ { "role": "button", "name": "OK" } ]
		});
		let snapshot = build(&tree, &SnapshotOptions { interactive: true, ..Default::default() });
		assert!(snapshot.tree.contains("@e1"));
		let entry = snapshot.refs.get("e1").unwrap();
		assert_eq!(entry.role, "button");
		assert_eq!(entry.name.as_deref(), Some("OK"));
		assert_eq!(entry.nth, None);
	}

	#[test]
	fn resolve_rebuilds_role_locator() {
		let snapshot = build(&sample_tree(), &SnapshotOptions::default());
		let email_ref = (1..=snapshot.refs.len())
			.map(|n| format!("e{n}"))
			.find(|r| snapshot.refs.get(r).map(|e| e.name.as_deref() == Some("Email")).unwrap_or(false))
			.unwrap();
		match snapshot.refs.resolve(&email_ref).unwrap() {
			Locator::Role { role, name, nth, scope } => {
				assert_eq!(role, "textbox");
				assert_eq!(name.as_deref(), Some("Email"));
				assert_eq!(nth, None);
				assert_eq!(scope, None);
			}
			other => panic!("unexpected locator {other:?}"),
		}
		assert!(snapshot.refs.resolve("e99").is_none());
	}

	#[test]
	fn ref_syntax_forms() {
		assert_eq!(parse_ref("e1"), Some("e1"));
		assert_eq!(parse_ref("@e12"), Some("e12"));
		assert_eq!(parse_ref("ref=e3"), Some("e3"));
		assert_eq!(parse_ref("e0"), None);
		assert_eq!(parse_ref("e01"), None);
		assert_eq!(parse_ref("east"), None);
		assert_eq!(parse_ref("#e1"), None);
		assert_eq!(parse_ref(""), None);

		assert!(is_explicit_ref("@e1"));
		assert!(is_explicit_ref("ref=e1"));
		assert!(!is_explicit_ref("e1"));
	}

	#[test]
	fn empty_walk_renders_empty_snapshot() {
		let snapshot = build(&Value::Null, &SnapshotOptions::default());
		assert!(snapshot.tree.is_empty());
		assert!(snapshot.refs.is_empty());
	}
}
