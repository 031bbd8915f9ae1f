//! Per-action semantics.
//!
//! The daemon's gate has already passed by the time an action lands
//! here; this module resolves targets (ref or selector) and drives the
//! browser capability, mapping driver failures into the wire taxonomy.

mod auth;
mod emulation;
mod interaction;
mod media;
mod navigation;
mod network;
mod query;
mod storage;
mod tabs;
mod wait;

use ab_protocol::{Action, ErrorKind};
use ab_runtime::Locator;
use serde_json::{Value, json};

use crate::error::{CoreError, Result};
use crate::session::SessionState;
use crate::snapshot;

/// Executes one gated action against the session.
pub async fn execute(session: &mut SessionState, action: Action) -> Result<Value> {
	use Action::*;
	match action {
		// Navigation
		Navigate { url, wait_until, timeout_ms } => navigation::navigate(session, &url, wait_until, timeout_ms).await,
		Back { timeout_ms } => navigation::history(session, -1, timeout_ms).await,
		Forward { timeout_ms } => navigation::history(session, 1, timeout_ms).await,
		Reload { timeout_ms } => navigation::reload(session, timeout_ms).await,

		// Pointer
		Click { target, button, timeout_ms } => interaction::click(session, &target, button.as_deref(), 1, timeout_ms).await,
		Dblclick { target, timeout_ms } => interaction::click(session, &target, None, 2, timeout_ms).await,
		Hover { target, timeout_ms } => interaction::hover(session, &target, timeout_ms).await,
		Tap { target, timeout_ms } => interaction::tap(session, &target, timeout_ms).await,
		Drag { source, target, timeout_ms } => interaction::drag(session, &source, &target, timeout_ms).await,

		// Text entry and controls
		Fill { target, value, timeout_ms } => interaction::fill(session, &target, &value, timeout_ms).await,
		Type { target, text, delay_ms, timeout_ms } => interaction::type_text(session, &target, &text, delay_ms, timeout_ms).await,
		Press { key, target } => interaction::press(session, &key, target.as_deref()).await,
		Keyboard { subaction, text, key } => interaction::keyboard(session, subaction, text.as_deref(), key.as_deref()).await,
		Select { target, value, timeout_ms } => interaction::select(session, &target, std::slice::from_ref(&value), timeout_ms).await,
		Multiselect { target, values, timeout_ms } => interaction::select(session, &target, &values, timeout_ms).await,
		Check { target, timeout_ms } => interaction::set_checked(session, &target, true, timeout_ms).await,
		Uncheck { target, timeout_ms } => interaction::set_checked(session, &target, false, timeout_ms).await,
		Clear { target, timeout_ms } => interaction::clear(session, &target, timeout_ms).await,
		Selectall { target } => interaction::select_all(session, target.as_deref()).await,
		Setvalue { target, value, timeout_ms } => interaction::set_value(session, &target, &value, timeout_ms).await,
		Upload { target, files, timeout_ms } => interaction::upload(session, &target, &files, timeout_ms).await,
		Download { target, path, timeout_ms } => interaction::download(session, &target, path.as_deref(), timeout_ms).await,

		// Capture
		Snapshot { interactive, compact, max_depth, selector } => {
			media::take_snapshot(session, interactive, compact, max_depth, selector.as_deref()).await
		}
		Screenshot { path, full_page, target } => media::screenshot(session, path.as_deref(), full_page, target.as_deref()).await,
		Pdf { path } => media::pdf(session, path.as_deref()).await,
		DiffSnapshot { interactive, compact } => media::diff_snapshot(session, interactive, compact).await,
		DiffScreenshot {} => media::diff_screenshot(session).await,
		DiffUrl {} => media::diff_url(session).await,

		// Scrolling
		Scroll { direction, pixels, target } => interaction::scroll(session, direction, pixels, target.as_deref()).await,
		Scrollintoview { target, timeout_ms } => interaction::scroll_into_view(session, &target, timeout_ms).await,

		// Waits
		Wait { selector, text, url, state, function, duration_ms, timeout_ms } => {
			wait::wait(session, selector, text, url, state, function, duration_ms, timeout_ms).await
		}

		// Queries
		Gettext { target, timeout_ms } => query::element_string(session, &target, "el.textContent ?? ''", timeout_ms).await,
		Content {} => query::page_content(session).await,
		Innerhtml { target } => query::element_string(session, &target, "el.innerHTML", None).await,
		Innertext { target } => query::element_string(session, &target, "el.innerText", None).await,
		Inputvalue { target } => query::element_string(session, &target, "el.value ?? ''", None).await,
		Url {} => query::page_url(session).await,
		Title {} => query::page_title(session).await,
		Getattribute { target, name } => query::attribute(session, &target, &name).await,
		Count { target } => query::count(session, &target).await,
		Boundingbox { target } => query::bounding_box(session, &target).await,
		Styles { target, props } => query::styles(session, &target, props.as_deref()).await,
		Isvisible { target } => query::predicate(session, &target, "ab.visible(el)").await,
		Isenabled { target } => query::predicate(session, &target, "!el.disabled").await,
		Ischecked { target } => query::predicate(session, &target, "!!el.checked").await,

		// Locator queries
		Getbyrole { role, name } => query::find_all(session, Locator::role(role, name, None)).await,
		Getbytext { text, exact } => query::find_all(session, Locator::Text { text, exact: exact.unwrap_or(false) }).await,
		Getbylabel { text } => query::find_all(session, Locator::Label { text }).await,
		Getbyplaceholder { text } => query::find_all(session, Locator::Placeholder { text }).await,
		Getbyalttext { text } => query::find_all(session, Locator::AltText { text }).await,
		Getbytitle { text } => query::find_all(session, Locator::Title { text }).await,
		Getbytestid { id } => query::find_all(session, Locator::TestId { id }).await,
		Nth { target, index } => {
			let locator = target_locator(session, &target)?.with_nth(index);
			query::find_all(session, locator).await
		}

		// Network
		Route { url, status, body, content_type, headers, abort } => {
			network::route(session, url, status, body, content_type, headers, abort).await
		}
		Unroute { url } => network::unroute(session, url.as_deref()).await,
		Requests { filter, clear } => network::requests(session, filter.as_deref(), clear.unwrap_or(false)),
		Headers { headers, origin } => network::headers(session, headers, origin).await,
		HarStart { path } => network::har_start(session, path.as_deref()),
		HarStop { path } => network::har_stop(session, path.as_deref()),
		Offline { enabled } => emulation::offline(session, enabled).await,

		// Storage state, cookies, web storage
		StateSave { name, path } => storage::state_save(session, name.as_deref(), path.as_deref()).await,
		StateLoad { name, path } => storage::state_load(session, name.as_deref(), path.as_deref()).await,
		StateList {} => storage::state_list(),
		StateShow { name } => storage::state_show(&name),
		StateClear { name } => storage::state_clear(&name),
		StateClean {} => storage::state_clean(&session.name),
		StateRename { from, to } => storage::state_rename(&from, &to),
		CookiesGet { urls } => storage::cookies_get(session, urls.as_deref()).await,
		CookiesSet { cookies } => storage::cookies_set(session, cookies).await,
		CookiesClear {} => storage::cookies_clear(session).await,
		StorageGet { kind, key } => storage::storage_get(session, kind, key.as_deref()).await,
		StorageSet { kind, key, value } => storage::storage_set(session, kind, &key, &value).await,
		StorageClear { kind } => storage::storage_clear(session, kind).await,

		// Tabs, frames, sinks
		TabNew { url } => tabs::tab_new(session, url.as_deref()).await,
		TabList {} => tabs::tab_list(session).await,
		TabSwitch { index } => tabs::tab_switch(session, index).await,
		TabClose { index } => tabs::tab_close(session, index).await,
		WindowNew { url } => tabs::tab_new(session, url.as_deref()).await,
		Frame { selector, name, url } => tabs::frame(session, selector.as_deref(), name.as_deref(), url.as_deref()),
		Mainframe {} => tabs::mainframe(session),
		Console { clear } => tabs::console(session, clear.unwrap_or(false)),
		Errors { clear } => tabs::errors(session, clear.unwrap_or(false)),
		Dialog { choice, text } => interaction::dialog(session, choice, text),

		// Tracing and recording
		TraceStart { path } => media::trace_start(session, path.as_deref()).await,
		TraceStop { path } => media::trace_stop(session, path.as_deref()).await,
		VideoStart { path } => media::video_start(session, path.as_deref()).await,
		VideoStop {} => media::video_stop(session).await,

		// Emulation
		Viewport { width, height } => emulation::viewport(session, width, height).await,
		Useragent { value } => emulation::user_agent(session, &value).await,
		Device { name } => emulation::device(session, &name).await,
		Geolocation { latitude, longitude, accuracy } => emulation::geolocation(session, latitude, longitude, accuracy).await,
		Permissions { grant, origin } => emulation::permissions(session, grant.unwrap_or_default(), origin.as_deref()).await,
		Emulatemedia { media, color_scheme, reduced_motion } => {
			emulation::media(session, media.as_deref(), color_scheme.as_deref(), reduced_motion.as_deref()).await
		}
		Timezone { id } => emulation::timezone(session, &id).await,
		Locale { id } => emulation::locale(session, &id).await,

		// Script surfaces
		Setcontent { html } => navigation::set_content(session, &html).await,
		Evaluate { script, arg } => query::evaluate(session, &script, arg).await,
		Evalhandle { script } => query::evaluate_handle(session, &script).await,
		Addstyle { content, path } => query::add_style(session, content, path).await,
		Addscript { content, path, url } => query::add_script(session, content, path, url).await,
		Addinitscript { script } => query::add_init_script(session, &script).await,
		Expose { name } => query::expose(session, &name).await,
		Pause {} => Ok(json!({ "paused": false })),

		// Vault
		AuthSave { name, url, username, password, username_selector, password_selector, submit_selector } => {
			auth::save(session, &name, &url, &username, &password, username_selector, password_selector, submit_selector)
		}
		AuthLogin { name, timeout_ms } => auth::login(session, &name, timeout_ms).await,
		AuthList {} => auth::list(session),
		AuthDelete { name } => auth::delete(session, &name),
		AuthShow { name } => auth::show(session, &name),

		// Lifecycle actions handled by the dispatch loop before exec.
		Confirm { .. } | Deny { .. } | Close {} => Err(CoreError::internal("handled by the dispatch loop")),
		Launch { headless, cdp_port, executable_path, extensions, args } => {
			let mut spec = crate::session::LaunchSpec::from_env();
			if let Some(headless) = headless {
				spec.headless = headless;
			}
			spec.cdp_port = cdp_port;
			if let Some(path) = executable_path {
				spec.executable_path = Some(path);
			}
			if let Some(extensions) = extensions {
				spec.extensions = extensions;
			}
			if let Some(args) = args {
				spec.args = args;
			}
			let launched = session.launch(spec).await?;
			Ok(json!({ "launched": launched }))
		}
	}
}

/// Turns a wire target into a locator.
///
/// Explicit ref forms (`@e1`, `ref=e1`) must resolve against the
/// current map or the call fails stale; a bare `e1` is only a ref when
/// the lookup succeeds, otherwise it is an ordinary selector.
pub(crate) fn target_locator(session: &SessionState, target: &str) -> Result<Locator> {
	if snapshot::is_explicit_ref(target) {
		let ref_id = snapshot::parse_ref(target).unwrap_or_default();
		return session
			.ref_map
			.as_ref()
			.and_then(|map| map.resolve(ref_id))
			.ok_or_else(|| CoreError::bare(ErrorKind::StaleRef));
	}
	if let Some(ref_id) = snapshot::parse_ref(target) {
		if let Some(locator) = session.ref_map.as_ref().and_then(|map| map.resolve(ref_id)) {
			return Ok(locator);
		}
	}
	if target.is_empty() {
		return Err(CoreError::invalid_argument("empty target"));
	}
	Ok(Locator::css(target))
}
