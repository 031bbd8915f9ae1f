//! Capture family: snapshots, screenshots, PDF, diffs, tracing, and
//! screencast recording.

use std::io::Write;

use ab_protocol::ErrorKind;
use ab_runtime::ScreencastFrame;
use base64::Engine as _;
use serde_json::{Value, json};
use tracing::info;

use super::target_locator;
use crate::error::{CoreError, Result};
use crate::session::SessionState;
use crate::snapshot::{self, SnapshotOptions};

pub async fn take_snapshot(
	session: &mut SessionState,
	interactive: Option<bool>,
	compact: Option<bool>,
	max_depth: Option<usize>,
	selector: Option<&str>,
) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;

	let options = SnapshotOptions {
		interactive: interactive.unwrap_or(false),
		compact: compact.unwrap_or(false),
		max_depth,
		selector: selector.map(str::to_owned),
	};

	let walk = session.active_page()?.accessibility_tree(selector, max_depth, timeout).await?;
	let built = snapshot::build(&walk, &options);

	session.prev_snapshot = Some(built.tree.clone());
	session.ref_map = Some(built.refs.clone());
	Ok(json!({ "tree": built.tree, "refs": built.refs.to_wire() }))
}

pub async fn screenshot(session: &mut SessionState, path: Option<&str>, full_page: Option<bool>, target: Option<&str>) -> Result<Value> {
	let locator = target.map(|target| target_locator(session, target)).transpose()?;
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let page = session.active_page()?;

	// Element capture scrolls the target into view first so the
	// viewport shot contains it.
	if let Some(locator) = &locator {
		page.element_center(locator, timeout).await?;
	}
	let bytes = page.screenshot(full_page.unwrap_or(false), timeout).await?;
	session.prev_screenshot = Some(bytes.clone());

	match path {
		Some(path) => {
			std::fs::write(path, &bytes)?;
			Ok(json!({ "path": path, "bytes": bytes.len() }))
		}
		None => Ok(json!({ "base64": base64::engine::general_purpose::STANDARD.encode(&bytes) })),
	}
}

pub async fn pdf(session: &mut SessionState, path: Option<&str>) -> Result<Value> {
	let timeout = session.timeout_ms(None);
	session.ensure_browser().await?;
	let bytes = session.active_page()?.print_pdf(timeout).await?;
	match path {
		Some(path) => {
			std::fs::write(path, &bytes)?;
			Ok(json!({ "path": path, "bytes": bytes.len() }))
		}
		None => Ok(json!({ "base64": base64::engine::general_purpose::STANDARD.encode(&bytes) })),
	}
}

pub async fn diff_snapshot(session: &mut SessionState, interactive: Option<bool>, compact: Option<bool>) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	let previous = session.prev_snapshot.clone();
	let current = take_snapshot(session, interactive, compact, None, None).await?;
	let current_tree = current.get("tree").and_then(Value::as_str).unwrap_or_default();

	let Some(previous) = previous else {
		return Ok(json!({ "changed": true, "added": current_tree.lines().collect::<Vec<_>>(), "removed": [] }));
	};
	let (added, removed) = line_diff(&previous, current_tree);
	Ok(json!({ "changed": !(added.is_empty() && removed.is_empty()), "added": added, "removed": removed }))
}

pub async fn diff_screenshot(session: &mut SessionState) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	let previous = session.prev_screenshot.clone();
	let timeout = session.timeout_ms(None);
	let bytes = session.active_page()?.screenshot(false, timeout).await?;
	session.prev_screenshot = Some(bytes.clone());

	match previous {
		Some(previous) => Ok(json!({
			"changed": previous != bytes,
			"previousBytes": previous.len(),
			"currentBytes": bytes.len(),
		})),
		None => Ok(json!({ "changed": true, "currentBytes": bytes.len() })),
	}
}

pub async fn diff_url(session: &mut SessionState) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	let timeout = session.timeout_ms(None);
	let current = session.active_page()?.url(timeout).await?;
	let previous = session.prev_url.replace(current.clone());
	Ok(json!({
		"changed": previous.as_deref() != Some(current.as_str()),
		"previous": previous,
		"current": current,
	}))
}

pub async fn trace_start(session: &mut SessionState, path: Option<&str>) -> Result<Value> {
	session.ensure_browser().await?;
	let browser = session.browser.as_ref().ok_or_else(|| CoreError::bare(ErrorKind::NotLaunched))?;
	browser.tracing_start(None).await?;
	session.trace_path = Some(path.unwrap_or("trace.zip").to_string());
	Ok(json!({}))
}

pub async fn trace_stop(session: &mut SessionState, path: Option<&str>) -> Result<Value> {
	let Some(started_path) = session.trace_path.take() else {
		return Err(CoreError::invalid_argument("tracing is not active"));
	};
	let browser = session.browser.as_ref().ok_or_else(|| CoreError::bare(ErrorKind::NotLaunched))?;
	let events = browser.tracing_stop().await?;

	let out_path = path.unwrap_or(&started_path).to_string();
	let file = std::fs::File::create(&out_path)?;
	let mut archive = zip::ZipWriter::new(file);
	archive
		.start_file("trace.json", zip::write::SimpleFileOptions::default())
		.map_err(|err| CoreError::internal(format!("trace archive: {err}")))?;
	let body = serde_json::to_vec(&json!({ "traceEvents": events }))?;
	archive.write_all(&body)?;
	archive.finish().map_err(|err| CoreError::internal(format!("trace archive: {err}")))?;

	info!(target = "ab.daemon", path = %out_path, events = events.len(), "trace written");
	Ok(json!({ "path": out_path, "events": events.len() }))
}

pub async fn video_start(session: &mut SessionState, path: Option<&str>) -> Result<Value> {
	session.ensure_browser().await?;
	if session.video_path.is_some() {
		return Err(CoreError::invalid_argument("video recording is already active"));
	}
	session.active_page()?.screencast_start().await?;
	session.video_path = Some(path.unwrap_or("video.avi").to_string());
	Ok(json!({}))
}

pub async fn video_stop(session: &mut SessionState) -> Result<Value> {
	if !session.is_launched() {
		return Err(CoreError::bare(ErrorKind::NotLaunched));
	}
	let Some(path) = session.video_path.take() else {
		return Err(CoreError::invalid_argument("video recording is not active"));
	};
	let frames = session.active_page()?.screencast_stop().await?;
	if frames.is_empty() {
		return Err(CoreError::new(ErrorKind::DriverError, "no frames captured"));
	}
	let count = frames.len();
	let bytes = mux_mjpeg_avi(&frames)?;
	std::fs::write(&path, bytes)?;
	info!(target = "ab.daemon", path = %path, frames = count, "video written");
	Ok(json!({ "path": path, "frames": count }))
}

/// Set-based line diff: order-preserving lists of lines present on only
/// one side. Token-economical rather than a full edit script.
fn line_diff(previous: &str, current: &str) -> (Vec<String>, Vec<String>) {
	use std::collections::HashSet;
	let old_lines: HashSet<&str> = previous.lines().collect();
	let new_lines: HashSet<&str> = current.lines().collect();
	let added = current.lines().filter(|line| !old_lines.contains(line)).map(str::to_owned).collect();
	let removed = previous.lines().filter(|line| !new_lines.contains(line)).map(str::to_owned).collect();
	(added, removed)
}

/// Packs screencast JPEG frames into a motion-JPEG AVI. The frame rate
/// is derived from the capture timestamps.
fn mux_mjpeg_avi(frames: &[ScreencastFrame]) -> Result<Vec<u8>> {
	let span = frames.last().map(|f| f.timestamp).unwrap_or(0.0) - frames.first().map(|f| f.timestamp).unwrap_or(0.0);
	let fps = if span > 0.0 { ((frames.len() as f64 - 1.0) / span).clamp(1.0, 60.0) } else { 10.0 };
	let (width, height) = jpeg_dimensions(&frames[0].data).unwrap_or((1280, 720));

	let mut movi: Vec<u8> = Vec::new();
	let mut index: Vec<u8> = Vec::new();
	for frame in frames {
		let offset = movi.len() as u32 + 4;
		movi.extend_from_slice(b"00dc");
		movi.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
		movi.extend_from_slice(&frame.data);
		if frame.data.len() % 2 == 1 {
			movi.push(0);
		}
		index.extend_from_slice(b"00dc");
		index.extend_from_slice(&16u32.to_le_bytes()); // AVIIF_KEYFRAME
		index.extend_from_slice(&offset.to_le_bytes());
		index.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
	}

	let frame_count = frames.len() as u32;
	let micros_per_frame = (1_000_000.0 / fps) as u32;

	let mut avih = Vec::new();
	avih.extend_from_slice(&micros_per_frame.to_le_bytes());
	avih.extend_from_slice(&0u32.to_le_bytes()); // max bytes/sec
	avih.extend_from_slice(&0u32.to_le_bytes()); // padding
	avih.extend_from_slice(&0x10u32.to_le_bytes()); // AVIF_HASINDEX
	avih.extend_from_slice(&frame_count.to_le_bytes());
	avih.extend_from_slice(&0u32.to_le_bytes()); // initial frames
	avih.extend_from_slice(&1u32.to_le_bytes()); // streams
	avih.extend_from_slice(&0u32.to_le_bytes()); // suggested buffer
	avih.extend_from_slice(&width.to_le_bytes());
	avih.extend_from_slice(&height.to_le_bytes());
	avih.extend_from_slice(&[0u8; 16]); // reserved

	let mut strh = Vec::new();
	strh.extend_from_slice(b"vids");
	strh.extend_from_slice(b"MJPG");
	strh.extend_from_slice(&[0u8; 12]); // flags, priority, language, initial frames
	strh.extend_from_slice(&1u32.to_le_bytes()); // scale
	strh.extend_from_slice(&(fps.round() as u32).to_le_bytes()); // rate
	strh.extend_from_slice(&0u32.to_le_bytes()); // start
	strh.extend_from_slice(&frame_count.to_le_bytes());
	strh.extend_from_slice(&0u32.to_le_bytes()); // suggested buffer
	strh.extend_from_slice(&u32::MAX.to_le_bytes()); // quality
	strh.extend_from_slice(&0u32.to_le_bytes()); // sample size
	strh.extend_from_slice(&[0u8; 8]); // frame rect

	let mut strf = Vec::new();
	strf.extend_from_slice(&40u32.to_le_bytes()); // BITMAPINFOHEADER size
	strf.extend_from_slice(&(width as i32).to_le_bytes());
	strf.extend_from_slice(&(height as i32).to_le_bytes());
	strf.extend_from_slice(&1u16.to_le_bytes()); // planes
	strf.extend_from_slice(&24u16.to_le_bytes()); // bit count
	strf.extend_from_slice(b"MJPG");
	strf.extend_from_slice(&(width * height * 3).to_le_bytes());
	strf.extend_from_slice(&[0u8; 16]); // resolution, clr fields

	let strl = list_chunk(b"strl", &[chunk(b"strh", &strh), chunk(b"strf", &strf)].concat());
	let hdrl = list_chunk(b"hdrl", &[chunk(b"avih", &avih), strl].concat());
	let movi_list = list_chunk(b"movi", &movi);
	let idx1 = chunk(b"idx1", &index);

	let mut riff_body = Vec::new();
	riff_body.extend_from_slice(b"AVI ");
	riff_body.extend_from_slice(&hdrl);
	riff_body.extend_from_slice(&movi_list);
	riff_body.extend_from_slice(&idx1);

	let mut out = Vec::with_capacity(riff_body.len() + 8);
	out.extend_from_slice(b"RIFF");
	out.extend_from_slice(&(riff_body.len() as u32).to_le_bytes());
	out.extend_from_slice(&riff_body);
	Ok(out)
}

fn chunk(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(body.len() + 8);
	out.extend_from_slice(fourcc);
	out.extend_from_slice(&(body.len() as u32).to_le_bytes());
	out.extend_from_slice(body);
	if body.len() % 2 == 1 {
		out.push(0);
	}
	out
}

fn list_chunk(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
	let mut inner = Vec::with_capacity(body.len() + 4);
	inner.extend_from_slice(kind);
	inner.extend_from_slice(body);
	chunk(b"LIST", &inner)
}

/// Reads width/height from a JPEG's SOF marker.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
	let mut pos = 2;
	while pos + 9 < data.len() {
		if data[pos] != 0xff {
			return None;
		}
		let marker = data[pos + 1];
		let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
		if (0xc0..=0xcf).contains(&marker) && marker != 0xc4 && marker != 0xc8 && marker != 0xcc {
			let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
			let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
			return Some((width, height));
		}
		pos += 2 + length;
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn line_diff_reports_both_sides() {
		let (added, removed) = line_diff("a\nb\nc", "a\nc\nd");
		assert_eq!(added, vec!["d"]);
		assert_eq!(removed, vec!["b"]);
	}

	#[test]
	fn avi_mux_produces_riff() {
		let frames = vec![
			ScreencastFrame { data: tiny_jpeg(), timestamp: 0.0 },
			ScreencastFrame { data: tiny_jpeg(), timestamp: 0.1 },
		];
		let avi = mux_mjpeg_avi(&frames).unwrap();
		assert_eq!(&avi[0..4], b"RIFF");
		assert_eq!(&avi[8..12], b"AVI ");
		assert!(avi.windows(4).any(|w| w == b"movi"));
		assert!(avi.windows(4).any(|w| w == b"MJPG"));
	}

	// Minimal JPEG with an SOF0 marker reporting 2x2.
	fn tiny_jpeg() -> Vec<u8> {
		let mut data = vec![0xff, 0xd8];
		data.extend_from_slice(&[0xff, 0xc0, 0x00, 0x0b, 0x08, 0x00, 0x02, 0x00, 0x02, 0x01, 0x00]);
		data.extend_from_slice(&[0xff, 0xd9]);
		data
	}

	#[test]
	fn jpeg_dimensions_from_sof() {
		assert_eq!(jpeg_dimensions(&tiny_jpeg()), Some((2, 2)));
	}
}
