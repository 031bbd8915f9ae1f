//! Injected JavaScript support library.
//!
//! Everything that needs page-side context (role/name computation,
//! locator resolution, the accessibility walk, visibility checks) runs
//! as one evaluated expression built from these snippets. The role and
//! accessible-name rules here are the single source of truth: snapshot
//! capture and locator resolution both go through `resolve`/`tree`, so
//! a ref recorded from a snapshot always resolves against the same
//! element list.

use serde_json::Value;

use crate::locator::Locator;

/// The support library, evaluated as an IIFE returning its API object.
pub const SUPPORT_LIB: &str = r#"(() => {
	function roleOf(el) {
		const explicit = el.getAttribute && el.getAttribute('role');
		if (explicit) return explicit.trim().split(/\s+/)[0];
		const tag = el.tagName;
		switch (tag) {
			case 'A': case 'AREA': return el.hasAttribute('href') ? 'link' : 'generic';
			case 'BUTTON': return 'button';
			case 'SELECT': return (el.multiple || el.size > 1) ? 'listbox' : 'combobox';
			case 'TEXTAREA': return 'textbox';
			case 'H1': case 'H2': case 'H3': case 'H4': case 'H5': case 'H6': return 'heading';
			case 'IMG': return 'img';
			case 'NAV': return 'navigation';
			case 'MAIN': return 'main';
			case 'HEADER': return 'banner';
			case 'FOOTER': return 'contentinfo';
			case 'ASIDE': return 'complementary';
			case 'FORM': return 'form';
			case 'TABLE': return 'table';
			case 'TR': return 'row';
			case 'TD': return 'cell';
			case 'TH': return 'columnheader';
			case 'UL': case 'OL': return 'list';
			case 'LI': return 'listitem';
			case 'OPTION': return 'option';
			case 'DIALOG': return 'dialog';
			case 'HR': return 'separator';
			case 'P': return 'paragraph';
			case 'INPUT': {
				switch ((el.type || 'text').toLowerCase()) {
					case 'checkbox': return 'checkbox';
					case 'radio': return 'radio';
					case 'range': return 'slider';
					case 'number': return 'spinbutton';
					case 'search': return 'searchbox';
					case 'button': case 'submit': case 'reset': case 'image': return 'button';
					case 'hidden': return '';
					default: return 'textbox';
				}
			}
			default: return 'generic';
		}
	}

	function textOf(ids) {
		const parts = [];
		for (const id of ids.split(/\s+/)) {
			const ref = document.getElementById(id);
			if (ref) parts.push(ref.textContent.trim());
		}
		return parts.join(' ').trim();
	}

	function nameOf(el) {
		const labelledby = el.getAttribute && el.getAttribute('aria-labelledby');
		if (labelledby) {
			const name = textOf(labelledby);
			if (name) return name;
		}
		const aria = el.getAttribute && el.getAttribute('aria-label');
		if (aria && aria.trim()) return aria.trim();
		if (el.labels && el.labels.length) {
			const name = el.labels[0].textContent.replace(/\s+/g, ' ').trim();
			if (name) return name;
		}
		if (el.tagName === 'IMG' || el.tagName === 'AREA' || (el.tagName === 'INPUT' && el.type === 'image')) {
			const alt = el.getAttribute('alt');
			if (alt && alt.trim()) return alt.trim();
		}
		if (el.tagName === 'INPUT' && ['button', 'submit', 'reset'].includes(el.type) && el.value) {
			return el.value.trim();
		}
		const role = roleOf(el);
		if (['button', 'link', 'heading', 'option', 'cell', 'columnheader', 'listitem', 'checkbox', 'radio', 'menuitem', 'tab'].includes(role)) {
			const text = el.textContent.replace(/\s+/g, ' ').trim();
			if (text) return text.substring(0, 120);
		}
		const title = el.getAttribute && el.getAttribute('title');
		if (title && title.trim()) return title.trim();
		if (el.placeholder && el.placeholder.trim()) return el.placeholder.trim();
		return '';
	}

	function visible(el) {
		if (!el.isConnected) return false;
		const style = window.getComputedStyle(el);
		if (style.display === 'none' || style.visibility === 'hidden') return false;
		if (el.getAttribute && el.getAttribute('aria-hidden') === 'true') return false;
		const rect = el.getBoundingClientRect();
		return rect.width > 0 || rect.height > 0 || el.tagName === 'OPTION';
	}

	function allElements(root) {
		const out = [];
		const walker = document.createTreeWalker(root || document.documentElement, NodeFilter.SHOW_ELEMENT);
		let node = walker.currentNode;
		while (node) {
			if (node.nodeType === Node.ELEMENT_NODE) out.push(node);
			node = walker.nextNode();
		}
		return out;
	}

	function resolve(loc) {
		let matches = [];
		const scopeRoot = loc.scope ? document.querySelector(loc.scope) : null;
		if (loc.by === 'css') {
			matches = Array.from(document.querySelectorAll(loc.selector));
		} else if (loc.by === 'role') {
			matches = allElements(scopeRoot || undefined).filter((el) => visible(el) && roleOf(el) === loc.role && (loc.name == null || nameOf(el) === loc.name));
		} else if (loc.by === 'text') {
			const wanted = loc.text;
			const candidates = allElements().filter((el) => {
				if (!visible(el)) return false;
				const text = el.textContent.replace(/\s+/g, ' ').trim();
				return loc.exact ? text === wanted : text.includes(wanted);
			});
			// Prefer the deepest elements: drop any candidate that contains
			// another candidate.
			matches = candidates.filter((el) => !candidates.some((other) => other !== el && el.contains(other)));
		} else if (loc.by === 'label') {
			matches = allElements().filter((el) => {
				if (!el.labels || !el.labels.length) {
					const aria = el.getAttribute && el.getAttribute('aria-label');
					return aria && aria.trim() === loc.text;
				}
				return Array.from(el.labels).some((label) => label.textContent.replace(/\s+/g, ' ').trim() === loc.text);
			});
		} else if (loc.by === 'placeholder') {
			matches = Array.from(document.querySelectorAll('[placeholder]')).filter((el) => el.placeholder === loc.text);
		} else if (loc.by === 'altText') {
			matches = Array.from(document.querySelectorAll('[alt]')).filter((el) => el.getAttribute('alt') === loc.text);
		} else if (loc.by === 'title') {
			matches = Array.from(document.querySelectorAll('[title]')).filter((el) => el.getAttribute('title') === loc.text);
		} else if (loc.by === 'testId') {
			matches = Array.from(document.querySelectorAll('[data-testid]')).filter((el) => el.getAttribute('data-testid') === loc.id);
		}
		if (loc.nth != null) {
			matches = loc.nth < matches.length ? [matches[loc.nth]] : [];
		}
		return matches;
	}

	function tree(opts) {
		const rootEl = opts.selector ? document.querySelector(opts.selector) : (document.body || document.documentElement);
		if (!rootEl) return null;
		function build(el, depth) {
			if (opts.maxDepth != null && depth > opts.maxDepth) return null;
			if (!visible(el)) return null;
			const role = roleOf(el);
			if (role === '') return null;
			const node = { role: role, name: nameOf(el) };
			if (role === 'heading') {
				const level = parseInt(el.tagName.substring(1), 10);
				if (!isNaN(level)) node.level = level;
			}
			if (role === 'checkbox' || role === 'radio') node.checked = !!el.checked;
			if (el.disabled) node.disabled = true;
			if ((role === 'textbox' || role === 'searchbox' || role === 'combobox' || role === 'spinbutton') && el.value) {
				node.value = String(el.value).substring(0, 120);
			}
			const children = [];
			for (const child of el.children) {
				const built = build(child, depth + 1);
				if (built) children.push(built);
			}
			if (children.length) node.children = children;
			return node;
		}
		return build(rootEl, 0);
	}

	function center(el) {
		el.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' });
		const rect = el.getBoundingClientRect();
		return { x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 };
	}

	return { roleOf, nameOf, visible, resolve, tree, center };
})()"#;

/// Builds an expression that resolves `locator` and applies `body` to
/// the first match bound as `el` (with the library bound as `ab`).
///
/// `body` must produce the expression's result value. When nothing
/// matches, the expression evaluates to `{"__abNoMatch": true}`.
pub fn with_element(locator: &Locator, body: &str) -> String {
	let locator_json = serde_json::to_string(locator).unwrap_or_else(|_| "{}".to_string());
	format!(
		"(() => {{ const ab = {SUPPORT_LIB}; const matches = ab.resolve({locator_json}); \
		 if (matches.length === 0) return {{ __abNoMatch: true }}; const el = matches[0]; return ({body}); }})()"
	)
}

/// Builds an expression returning every match mapped through `body`
/// (bound as `el`, index as `i`).
pub fn map_elements(locator: &Locator, body: &str) -> String {
	let locator_json = serde_json::to_string(locator).unwrap_or_else(|_| "{}".to_string());
	format!("(() => {{ const ab = {SUPPORT_LIB}; return ab.resolve({locator_json}).map((el, i) => ({body})); }})()")
}

/// Builds the accessibility-walk expression.
pub fn tree_expr(selector: Option<&str>, max_depth: Option<usize>) -> String {
	let opts = serde_json::json!({ "selector": selector, "maxDepth": max_depth });
	format!("(() => {{ const ab = {SUPPORT_LIB}; return ab.tree({opts}); }})()")
}

/// Escapes a string for embedding inside a generated JS expression.
pub fn js_string(value: &str) -> String {
	Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn with_element_embeds_locator() {
		let expr = with_element(&Locator::css("#save"), "ab.center(el)");
		assert!(expr.contains(r##""selector":"#save""##));
		assert!(expr.contains("__abNoMatch"));
	}

	#[test]
	fn js_string_escapes_quotes() {
		assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
	}
}
