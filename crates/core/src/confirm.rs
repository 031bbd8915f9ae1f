//! Pending confirmations with auto-expiry.
//!
//! A Confirm verdict parks the action here and answers the client with
//! the minted id; a later `confirm` consumes the entry and re-dispatches
//! the stored command past the gate, once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ab_protocol::Action;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::policy::Category;

pub const CONFIRMATION_TTL: Duration = Duration::from_secs(60);

/// A deferred action awaiting explicit approval.
#[derive(Debug, Clone)]
pub struct Pending {
	pub id: String,
	pub action_name: &'static str,
	pub category: Category,
	pub description: String,
	pub command: Action,
}

#[derive(Default)]
struct Entries {
	map: HashMap<String, (Pending, Option<JoinHandle<()>>)>,
}

/// Registry of pending confirmations. Clone handles share state; each
/// session owns one so tests get fresh instances.
#[derive(Clone, Default)]
pub struct ConfirmationRegistry {
	entries: Arc<Mutex<Entries>>,
}

impl ConfirmationRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parks an action and returns the minted `c_<16hex>` id. Entries
	/// expire on their own after [`CONFIRMATION_TTL`].
	pub fn request(&self, category: Category, command: Action) -> Pending {
		let id = mint_id();
		let pending = Pending {
			id: id.clone(),
			action_name: command.name(),
			category,
			description: describe(&command),
			command,
		};

		let expiry = {
			let entries = Arc::clone(&self.entries);
			let id = id.clone();
			tokio::spawn(async move {
				tokio::time::sleep(CONFIRMATION_TTL).await;
				if entries.lock().map.remove(&id).is_some() {
					debug!(target = "ab.daemon", confirmation = %id, "confirmation expired");
				}
			})
		};

		self.entries.lock().map.insert(id, (pending.clone(), Some(expiry)));
		pending
	}

	/// Removes and returns the entry, cancelling its expiry. A second
	/// consume of the same id returns `None`.
	pub fn consume(&self, id: &str) -> Option<Pending> {
		let (pending, expiry) = self.entries.lock().map.remove(id)?;
		if let Some(expiry) = expiry {
			expiry.abort();
		}
		Some(pending)
	}

	pub fn len(&self) -> usize {
		self.entries.lock().map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().map.is_empty()
	}
}

fn mint_id() -> String {
	let mut bytes = [0u8; 8];
	rand::thread_rng().fill(&mut bytes);
	format!("c_{}", hex::encode(bytes))
}

/// Human description shown with the confirmation prompt; shape varies
/// by action family.
fn describe(action: &Action) -> String {
	match action {
		Action::Navigate { url, .. } => format!("Navigate to {url}"),
		Action::Evaluate { script, .. } | Action::Evalhandle { script } => {
			let preview: String = script.chars().take(80).collect();
			if script.chars().count() > 80 {
				format!("Evaluate script: {preview}…")
			} else {
				format!("Evaluate script: {preview}")
			}
		}
		Action::Click { target, .. } => format!("Click {target}"),
		Action::Dblclick { target, .. } => format!("Double-click {target}"),
		Action::Fill { target, .. } => format!("Fill {target}"),
		Action::Type { target, .. } => format!("Type into {target}"),
		Action::Download { target, .. } => format!("Download via {target}"),
		Action::Upload { target, files, .. } => format!("Upload {} file(s) via {target}", files.len()),
		other => format!("Run {}", other.name()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn click(target: &str) -> Action {
		serde_json::from_str(&format!(r#"{{"action":"click","target":"{target}"}}"#)).unwrap()
	}

	#[tokio::test]
	async fn mints_well_formed_ids() {
		let registry = ConfirmationRegistry::new();
		let pending = registry.request(Category::Click, click("#go"));
		assert!(pending.id.starts_with("c_"));
		assert_eq!(pending.id.len(), 18);
		assert!(pending.id[2..].chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[tokio::test]
	async fn consume_is_single_shot() {
		let registry = ConfirmationRegistry::new();
		let pending = registry.request(Category::Click, click("#go"));
		assert!(registry.consume(&pending.id).is_some());
		assert!(registry.consume(&pending.id).is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn entries_expire_after_ttl() {
		let registry = ConfirmationRegistry::new();
		let pending = registry.request(Category::Download, click("#save"));
		assert_eq!(registry.len(), 1);

		tokio::time::sleep(CONFIRMATION_TTL + Duration::from_secs(1)).await;
		// Let the expiry task run.
		tokio::task::yield_now().await;
		assert!(registry.consume(&pending.id).is_none());
	}

	#[tokio::test]
	async fn descriptions_follow_action_shape() {
		let registry = ConfirmationRegistry::new();
		let nav: Action = serde_json::from_str(r#"{"action":"navigate","url":"https://example.com"}"#).unwrap();
		assert_eq!(registry.request(Category::Navigate, nav).description, "Navigate to https://example.com");

		let long_script = "x".repeat(120);
		let eval: Action = serde_json::from_str(&format!(r#"{{"action":"evaluate","script":"{long_script}"}}"#)).unwrap();
		let description = registry.request(Category::Eval, eval).description;
		assert!(description.contains(&"x".repeat(80)));
		assert!(!description.contains(&"x".repeat(81)));
	}
}
