//! Screen capture behind a rate cap.
//!
//! `FrameSource` is the port the driving loop consumes; `ScreenGrabber` is
//! the xcap-backed implementation that targets a window by title substring
//! and falls back to the primary monitor.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{info, warn};
use tokio::time::Instant;
use xcap::{Monitor, Window};

use crate::frame::Frame;

const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 60;

/// Produces a rate-limited sequence of frames. `None` means a failed
/// capture; callers back off briefly and keep going.
#[async_trait]
pub trait FrameSource {
    async fn capture(&mut self) -> Option<Frame>;
    fn set_fps_cap(&mut self, fps: u32);
}

pub struct ScreenGrabber {
    window_title: Option<String>,
    fps_cap: u32,
    last_capture: Option<Instant>,
}

impl ScreenGrabber {
    /// Grabber targeting the first window whose title contains
    /// `window_title` (case-insensitive); without a title, the primary
    /// monitor is captured.
    pub fn new(window_title: Option<String>) -> Self {
        Self {
            window_title,
            fps_cap: 30,
            last_capture: None,
        }
    }

    fn grab(&self) -> Result<Frame> {
        if let Some(title) = &self.window_title {
            let needle = title.to_lowercase();
            let windows = Window::all().map_err(|err| anyhow!("window enumeration failed: {err}"))?;
            for window in windows {
                let matches = window
                    .title()
                    .map(|t| t.to_lowercase().contains(&needle))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
                let image = window
                    .capture_image()
                    .map_err(|err| anyhow!("window capture failed: {err}"))?;
                return Ok(image::DynamicImage::ImageRgba8(image).to_rgb8());
            }
            info!("no window matching '{title}', falling back to primary monitor");
        }

        let monitors = Monitor::all().map_err(|err| anyhow!("monitor enumeration failed: {err}"))?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .ok_or_else(|| anyhow!("no primary monitor found"))?;
        let image = monitor
            .capture_image()
            .map_err(|err| anyhow!("monitor capture failed: {err}"))?;
        Ok(image::DynamicImage::ImageRgba8(image).to_rgb8())
    }
}

#[async_trait]
impl FrameSource for ScreenGrabber {
    async fn capture(&mut self) -> Option<Frame> {
        // Honor the fps cap: sleep out the remainder of the minimum
        // inter-frame interval before grabbing.
        let min_interval = Duration::from_secs_f64(1.0 / self.fps_cap as f64);
        if let Some(last) = self.last_capture {
            let since = last.elapsed();
            if since < min_interval {
                tokio::time::sleep(min_interval - since).await;
            }
        }

        match self.grab() {
            Ok(frame) => {
                self.last_capture = Some(Instant::now());
                Some(frame)
            }
            Err(err) => {
                warn!("frame capture failed: {err}");
                None
            }
        }
    }

    fn set_fps_cap(&mut self, fps: u32) {
        self.fps_cap = fps.clamp(MIN_FPS, MAX_FPS);
    }
}
