//! Emulation family: viewport, UA, devices, geolocation, media,
//! timezone, locale, offline.

use serde_json::{Value, json};

use crate::error::{CoreError, Result};
use crate::session::SessionState;

struct DeviceProfile {
	name: &'static str,
	width: u32,
	height: u32,
	user_agent: &'static str,
	mobile: bool,
}

const DEVICES: &[DeviceProfile] = &[
	DeviceProfile {
		name: "iPhone 13",
		width: 390,
		height: 844,
		user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1",
		mobile: true,
	},
	DeviceProfile {
		name: "Pixel 5",
		width: 393,
		height: 851,
		user_agent: "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
		mobile: true,
	},
	DeviceProfile {
		name: "iPad Pro 11",
		width: 834,
		height: 1194,
		user_agent: "Mozilla/5.0 (iPad; CPU OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1",
		mobile: true,
	},
	DeviceProfile {
		name: "Desktop 1080p",
		width: 1920,
		height: 1080,
		user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
		mobile: false,
	},
];

pub async fn viewport(session: &mut SessionState, width: u32, height: u32) -> Result<Value> {
	if width == 0 || height == 0 || width > 10_000 || height > 10_000 {
		return Err(CoreError::invalid_argument(format!("bad viewport {width}x{height}")));
	}
	session.ensure_browser().await?;
	session.active_page()?.set_viewport(width, height, false).await?;
	Ok(json!({ "width": width, "height": height }))
}

pub async fn user_agent(session: &mut SessionState, value: &str) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.set_user_agent(value).await?;
	Ok(json!({}))
}

pub async fn device(session: &mut SessionState, name: &str) -> Result<Value> {
	let Some(profile) = DEVICES.iter().find(|device| device.name.eq_ignore_ascii_case(name)) else {
		let known: Vec<&str> = DEVICES.iter().map(|device| device.name).collect();
		return Err(CoreError::invalid_argument(format!("unknown device {name:?}; known: {}", known.join(", "))));
	};
	session.ensure_browser().await?;
	let page = session.active_page()?;
	page.set_viewport(profile.width, profile.height, profile.mobile).await?;
	page.set_user_agent(profile.user_agent).await?;
	Ok(json!({ "device": profile.name, "width": profile.width, "height": profile.height }))
}

pub async fn geolocation(session: &mut SessionState, latitude: f64, longitude: f64, accuracy: Option<f64>) -> Result<Value> {
	if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
		return Err(CoreError::invalid_argument(format!("bad coordinates {latitude},{longitude}")));
	}
	session.ensure_browser().await?;
	session.active_page()?.set_geolocation(latitude, longitude, accuracy).await?;
	Ok(json!({}))
}

pub async fn permissions(session: &mut SessionState, grant: Vec<String>, origin: Option<&str>) -> Result<Value> {
	session.ensure_browser().await?;
	let browser = session
		.browser
		.as_ref()
		.ok_or_else(|| CoreError::bare(ab_protocol::ErrorKind::NotLaunched))?;
	browser.grant_permissions(&grant, origin).await?;
	Ok(json!({ "granted": grant }))
}

pub async fn media(session: &mut SessionState, media: Option<&str>, color_scheme: Option<&str>, reduced_motion: Option<&str>) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.emulate_media(media, color_scheme, reduced_motion).await?;
	Ok(json!({}))
}

pub async fn timezone(session: &mut SessionState, id: &str) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.set_timezone(id).await?;
	Ok(json!({}))
}

pub async fn locale(session: &mut SessionState, id: &str) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.set_locale(id).await?;
	Ok(json!({}))
}

pub async fn offline(session: &mut SessionState, enabled: bool) -> Result<Value> {
	session.ensure_browser().await?;
	session.active_page()?.set_offline(enabled).await?;
	Ok(json!({ "offline": enabled }))
}
