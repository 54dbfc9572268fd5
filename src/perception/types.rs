use serde::{Deserialize, Serialize};

/// Geometry of the display a snapshot was taken from.
///
/// Logical coordinates are what the input layer clicks in; pixel coordinates
/// index the captured image. They differ by `scale_factor` on HiDPI screens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub logical_width: u32,
    pub logical_height: u32,
    pub scale_factor: f64,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl ScreenInfo {
    /// Derive the logical size from a captured image size and display scale.
    /// A non-positive or non-finite scale is treated as 1.0.
    pub fn from_pixels(pixel_width: u32, pixel_height: u32, scale_factor: f64) -> Self {
        let scale_factor = if scale_factor.is_finite() && scale_factor > 0.0 {
            scale_factor
        } else {
            1.0
        };
        Self {
            logical_width: (pixel_width as f64 / scale_factor).floor() as u32,
            logical_height: (pixel_height as f64 / scale_factor).floor() as u32,
            scale_factor,
            pixel_width,
            pixel_height,
        }
    }
}

/// Box in normalized grounding space (0–1000 per axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// One point expressed in all three coordinate spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateSet {
    pub normalized_x: u32,
    pub normalized_y: u32,
    pub pixel_x: i64,
    pub pixel_y: i64,
    pub logical_x: i64,
    pub logical_y: i64,
}

/// A snapshot ready to be shown to the oracle.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub stage: EncodeStage,
}

/// Which rung of the compression ladder produced an [`EncodedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum EncodeStage {
    Quality { quality: u8 },
    Downscaled { scale: f32, quality: u8 },
    LosslessFallback,
}
