// Normalized (0–1000) → pixel → logical coordinate mapping.
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::{BoundingBox, CoordinateSet, ScreenInfo};

/// Size of the oracle's grounding grid on each axis.
pub const NORMALIZED_SCALE: u32 = 1000;

/// `floor(normalized * pixel_dimension / 1000)`.
pub fn normalized_to_pixel(normalized: u32, pixel_dimension: u32) -> i64 {
    (normalized as u64 * pixel_dimension as u64 / NORMALIZED_SCALE as u64) as i64
}

/// `floor(pixel / scale_factor)`.
pub fn pixel_to_logical(pixel: i64, scale_factor: f64) -> i64 {
    (pixel as f64 / scale_factor).floor() as i64
}

/// Always the two-stage composition, so both paths round identically.
pub fn normalized_to_logical(normalized: u32, pixel_dimension: u32, scale_factor: f64) -> i64 {
    pixel_to_logical(normalized_to_pixel(normalized, pixel_dimension), scale_factor)
}

/// Inverse mapping, for diagnostics. Not used on the click path.
pub fn logical_to_normalized(logical: i64, pixel_dimension: u32, scale_factor: f64) -> i64 {
    if pixel_dimension == 0 {
        return 0;
    }
    let pixel = logical as f64 * scale_factor;
    (pixel * NORMALIZED_SCALE as f64 / pixel_dimension as f64).floor() as i64
}

pub fn bounding_box_center(bbox: &BoundingBox) -> (u32, u32) {
    ((bbox.x1 + bbox.x2) / 2, (bbox.y1 + bbox.y2) / 2)
}

/// Express a normalized point in all three spaces.
pub fn coordinate_set(normalized_x: u32, normalized_y: u32, screen: &ScreenInfo) -> CoordinateSet {
    let pixel_x = normalized_to_pixel(normalized_x, screen.pixel_width);
    let pixel_y = normalized_to_pixel(normalized_y, screen.pixel_height);
    CoordinateSet {
        normalized_x,
        normalized_y,
        pixel_x,
        pixel_y,
        logical_x: pixel_to_logical(pixel_x, screen.scale_factor),
        logical_y: pixel_to_logical(pixel_y, screen.scale_factor),
    }
}

/// Bounds check in logical space. The upper bound is inclusive.
pub fn validate_logical(x: i64, y: i64, screen: &ScreenInfo) -> DeskPilotResult<()> {
    if x < 0 {
        return Err(DeskPilotError::Grounding(format!(
            "X coordinate {x} is below the lower bound 0"
        )));
    }
    if x > screen.logical_width as i64 {
        return Err(DeskPilotError::Grounding(format!(
            "X coordinate {x} exceeds the upper bound {} (logical width)",
            screen.logical_width
        )));
    }
    if y < 0 {
        return Err(DeskPilotError::Grounding(format!(
            "Y coordinate {y} is below the lower bound 0"
        )));
    }
    if y > screen.logical_height as i64 {
        return Err(DeskPilotError::Grounding(format!(
            "Y coordinate {y} exceeds the upper bound {} (logical height)",
            screen.logical_height
        )));
    }
    Ok(())
}

/// Center of `bbox` as a validated logical click point.
pub fn click_point(bbox: &BoundingBox, screen: &ScreenInfo) -> DeskPilotResult<CoordinateSet> {
    let (cx, cy) = bounding_box_center(bbox);
    let coords = coordinate_set(cx, cy, screen);
    validate_logical(coords.logical_x, coords.logical_y, screen)?;
    tracing::debug!(
        normalized = %format!("{cx},{cy}"),
        pixel = %format!("{},{}", coords.pixel_x, coords.pixel_y),
        logical = %format!("{},{}", coords.logical_x, coords.logical_y),
        "bounding box → click point"
    );
    Ok(coords)
}
