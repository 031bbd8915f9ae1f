//! Credential actions. Save/list/show/delete never touch the browser;
//! login drives a stored profile through the page.

use ab_protocol::ErrorKind;
use ab_runtime::Locator;
use serde_json::{Value, json};
use tracing::info;

use crate::error::{CoreError, Result};
use crate::session::SessionState;
use crate::vault::{Selectors, VaultError};

const DEFAULT_USERNAME_SELECTOR: &str =
	"input[type=\"email\"], input[name=\"username\"], input[name=\"email\"], input[name=\"login\"], input[type=\"text\"]";
const DEFAULT_PASSWORD_SELECTOR: &str = "input[type=\"password\"]";
const DEFAULT_SUBMIT_SELECTOR: &str = "button[type=\"submit\"], input[type=\"submit\"]";

fn map_vault_error(err: VaultError) -> CoreError {
	match err {
		VaultError::InvalidName(_) => CoreError::bare(ErrorKind::InvalidName),
		VaultError::KeyMissing(name) => CoreError::new(ErrorKind::KeyMissing, name),
		VaultError::Auth(detail) => CoreError::new(ErrorKind::AuthError, detail),
		VaultError::Io(err) => CoreError::internal(err.to_string()),
		VaultError::Json(err) => CoreError::internal(err.to_string()),
	}
}

#[allow(clippy::too_many_arguments)]
pub fn save(
	session: &mut SessionState,
	name: &str,
	url: &str,
	username: &str,
	password: &str,
	username_selector: Option<String>,
	password_selector: Option<String>,
	submit_selector: Option<String>,
) -> Result<Value> {
	let selectors = Selectors {
		username: username_selector,
		password: password_selector,
		submit: submit_selector,
	};
	let updated = session.vault.save(name, url, username, password, selectors).map_err(map_vault_error)?;
	info!(target = "ab.daemon", profile = %name, updated, "credential saved");
	Ok(json!({ "updated": updated }))
}

pub fn list(session: &mut SessionState) -> Result<Value> {
	let profiles = session.vault.list().map_err(map_vault_error)?;
	Ok(json!({ "profiles": profiles }))
}

pub fn show(session: &mut SessionState, name: &str) -> Result<Value> {
	let meta = session.vault.get_meta(name).map_err(map_vault_error)?;
	match meta {
		Some(meta) => Ok(serde_json::to_value(meta)?),
		None => Err(CoreError::new(ErrorKind::NotFound, format!("no credential named {name}"))),
	}
}

pub fn delete(session: &mut SessionState, name: &str) -> Result<Value> {
	let deleted = session.vault.delete(name).map_err(map_vault_error)?;
	Ok(json!({ "deleted": deleted }))
}

/// Navigates to the stored URL, fills the stored credentials, submits,
/// and stamps the last-login time.
pub async fn login(session: &mut SessionState, name: &str, timeout_ms: Option<u64>) -> Result<Value> {
	let record = session
		.vault
		.get(name)
		.map_err(map_vault_error)?
		.ok_or_else(|| CoreError::new(ErrorKind::NotFound, format!("no credential named {name}")))?;

	let timeout = session.timeout_ms(timeout_ms);
	session.ensure_browser().await?;
	info!(target = "ab.daemon", profile = %name, url = %record.url, "auth login");

	let page = session.active_page()?.clone();
	page.navigate(&record.url, "load", timeout).await?;

	let username_locator = Locator::css(record.username_selector.as_deref().unwrap_or(DEFAULT_USERNAME_SELECTOR));
	page.focus(&username_locator, timeout).await?;
	page.eval_on_element(&username_locator, "(el.select ? (el.select(), true) : true)", timeout).await?;
	page.insert_text(&record.username, timeout).await?;

	let password_locator = Locator::css(record.password_selector.as_deref().unwrap_or(DEFAULT_PASSWORD_SELECTOR));
	page.focus(&password_locator, timeout).await?;
	page.eval_on_element(&password_locator, "(el.select ? (el.select(), true) : true)", timeout).await?;
	page.insert_text(&record.password, timeout).await?;

	let submit_locator = Locator::css(record.submit_selector.as_deref().unwrap_or(DEFAULT_SUBMIT_SELECTOR));
	match page.element_center(&submit_locator, timeout).await {
		Ok((x, y)) => page.click_at(x, y, "left", 1, timeout).await?,
		// No submit control found: submit the form from the password
		// field instead.
		Err(_) => page.press_key("Enter", timeout).await?,
	}
	let _ = page.wait_for_lifecycle("load", timeout).await;

	session.vault.touch_last_login(name).map_err(map_vault_error)?;
	session.invalidate_refs();
	Ok(json!({ "loggedIn": true, "url": page.current_url() }))
}
