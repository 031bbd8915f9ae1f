//! Emulation overrides: viewport, UA, geolocation, media, locale.

use serde_json::json;

use super::Page;
use crate::error::Result;

impl Page {
	pub async fn set_viewport(&self, width: u32, height: u32, mobile: bool) -> Result<()> {
		self.call(
			"Emulation.setDeviceMetricsOverride",
			json!({ "width": width, "height": height, "deviceScaleFactor": 1, "mobile": mobile }),
		)
		.await?;
		Ok(())
	}

	pub async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
		self.call("Emulation.setUserAgentOverride", json!({ "userAgent": user_agent })).await?;
		Ok(())
	}

	pub async fn set_geolocation(&self, latitude: f64, longitude: f64, accuracy: Option<f64>) -> Result<()> {
		self.call(
			"Emulation.setGeolocationOverride",
			json!({ "latitude": latitude, "longitude": longitude, "accuracy": accuracy.unwrap_or(1.0) }),
		)
		.await?;
		Ok(())
	}

	pub async fn emulate_media(&self, media: Option<&str>, color_scheme: Option<&str>, reduced_motion: Option<&str>) -> Result<()> {
		let mut features = Vec::new();
		if let Some(scheme) = color_scheme {
			features.push(json!({ "name": "prefers-color-scheme", "value": scheme }));
		}
		if let Some(motion) = reduced_motion {
			features.push(json!({ "name": "prefers-reduced-motion", "value": motion }));
		}
		self.call(
			"Emulation.setEmulatedMedia",
			json!({ "media": media.unwrap_or(""), "features": features }),
		)
		.await?;
		Ok(())
	}

	pub async fn set_timezone(&self, timezone_id: &str) -> Result<()> {
		self.call("Emulation.setTimezoneOverride", json!({ "timezoneId": timezone_id })).await?;
		Ok(())
	}

	pub async fn set_locale(&self, locale: &str) -> Result<()> {
		self.call("Emulation.setLocaleOverride", json!({ "locale": locale })).await?;
		Ok(())
	}

	pub async fn set_offline(&self, offline: bool) -> Result<()> {
		self.call(
			"Network.emulateNetworkConditions",
			json!({ "offline": offline, "latency": 0, "downloadThroughput": -1, "uploadThroughput": -1 }),
		)
		.await?;
		Ok(())
	}
}
