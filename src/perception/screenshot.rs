use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::ScreenInfo;

/// One capture of the display plus the geometry it was taken with.
pub struct Snapshot {
    pub image: DynamicImage,
    pub screen: ScreenInfo,
}

/// Source of screen snapshots. Every observation takes a fresh one.
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    async fn capture(&self) -> DeskPilotResult<Snapshot>;
}

/// Captures the primary monitor through `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapCapturer;

#[async_trait]
impl ScreenCapturer for XcapCapturer {
    async fn capture(&self) -> DeskPilotResult<Snapshot> {
        tokio::task::spawn_blocking(capture_primary_blocking)
            .await
            .map_err(|e| DeskPilotError::Capture(format!("join: {e}")))?
    }
}

fn capture_primary_blocking() -> DeskPilotResult<Snapshot> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| DeskPilotError::Capture(format!("enumerate monitors: {e}")))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary())
        .or_else(|| monitors.first())
        .ok_or_else(|| DeskPilotError::Capture("no monitor available".into()))?;

    let scale_factor = monitor.scale_factor() as f64;
    let captured = monitor
        .capture_image()
        .map_err(|e| DeskPilotError::Capture(format!("capture: {e}")))?;
    let (width, height) = (captured.width(), captured.height());
    let rgba = RgbaImage::from_raw(width, height, captured.into_raw())
        .ok_or_else(|| DeskPilotError::Capture("captured buffer has unexpected size".into()))?;

    let screen = ScreenInfo::from_pixels(width, height, scale_factor);
    tracing::debug!(
        pixel = %format!("{width}×{height}"),
        logical = %format!("{}×{}", screen.logical_width, screen.logical_height),
        scale = scale_factor,
        "primary monitor captured"
    );
    Ok(Snapshot {
        image: DynamicImage::ImageRgba8(rgba),
        screen,
    })
}
