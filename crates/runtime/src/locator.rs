use serde::{Deserialize, Serialize};

/// How an element is addressed inside the page.
///
/// Locators are resolved by the injected support library in document
/// order; `nth` (zero-based) disambiguates multiple matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "camelCase")]
pub enum Locator {
	Css {
		selector: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		nth: Option<usize>,
	},
	Role {
		role: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		name: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		nth: Option<usize>,
		/// CSS scope the match list is computed within, when the ref
		/// came from a scoped snapshot.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		scope: Option<String>,
	},
	Text {
		text: String,
		#[serde(default)]
		exact: bool,
	},
	Label {
		text: String,
	},
	Placeholder {
		text: String,
	},
	AltText {
		text: String,
	},
	Title {
		text: String,
	},
	TestId {
		id: String,
	},
}

impl Locator {
	pub fn css(selector: impl Into<String>) -> Self {
		Locator::Css { selector: selector.into(), nth: None }
	}

	pub fn role(role: impl Into<String>, name: Option<String>, nth: Option<usize>) -> Self {
		Locator::Role { role: role.into(), name, nth, scope: None }
	}

	/// Applies or replaces the zero-based match index where the variant
	/// supports one.
	pub fn with_nth(self, index: usize) -> Self {
		match self {
			Locator::Css { selector, .. } => Locator::Css { selector, nth: Some(index) },
			Locator::Role { role, name, scope, .. } => Locator::Role { role, name, nth: Some(index), scope },
			other => other,
		}
	}

	/// Human-oriented description used in logs and confirmation prompts.
	pub fn describe(&self) -> String {
		match self {
			Locator::Css { selector, nth: None } => selector.clone(),
			Locator::Css { selector, nth: Some(nth) } => format!("{selector} [{nth}]"),
			Locator::Role { role, name: Some(name), .. } => format!("{role} \"{name}\""),
			Locator::Role { role, name: None, .. } => role.clone(),
			Locator::Text { text, .. } => format!("text \"{text}\""),
			Locator::Label { text } => format!("label \"{text}\""),
			Locator::Placeholder { text } => format!("placeholder \"{text}\""),
			Locator::AltText { text } => format!("alt \"{text}\""),
			Locator::Title { text } => format!("title \"{text}\""),
			Locator::TestId { id } => format!("test id \"{id}\""),
		}
	}
}
