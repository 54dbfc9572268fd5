/// Byte-budgeted encoding of screenshots for the vision oracle.
///
/// Ladder, first fit wins:
///   1. JPEG at each configured quality, full resolution.
///   2. JPEG at `downscale_quality`, at each configured scale factor.
///   3. PNG at native resolution, whatever its size.
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::config::CaptureSettings;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::types::{EncodeStage, EncodedImage};

pub fn compress_for_oracle(
    image: &DynamicImage,
    settings: &CaptureSettings,
) -> DeskPilotResult<EncodedImage> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let budget = settings.max_encoded_bytes;

    for &quality in &settings.quality_levels {
        let bytes = encode_jpeg(&rgb, quality)?;
        tracing::debug!(quality, size = bytes.len(), budget, "jpeg attempt");
        if bytes.len() <= budget {
            return Ok(EncodedImage {
                bytes,
                media_type: "image/jpeg",
                width,
                height,
                stage: EncodeStage::Quality { quality },
            });
        }
    }

    let quality = settings.downscale_quality;
    for &scale in &settings.scale_factors {
        let w = ((width as f32 * scale).round() as u32).max(1);
        let h = ((height as f32 * scale).round() as u32).max(1);
        let resized = image::imageops::resize(&rgb, w, h, FilterType::Triangle);
        let bytes = encode_jpeg(&resized, quality)?;
        tracing::debug!(scale, size = bytes.len(), budget, "downscaled jpeg attempt");
        if bytes.len() <= budget {
            return Ok(EncodedImage {
                bytes,
                media_type: "image/jpeg",
                width: w,
                height: h,
                stage: EncodeStage::Downscaled { scale, quality },
            });
        }
    }

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| DeskPilotError::Encoding(format!("PNG encode: {e}")))?;
    tracing::warn!(
        size = bytes.len(),
        budget,
        "no lossy encoding fit the budget; sending lossless PNG"
    );
    Ok(EncodedImage {
        bytes,
        media_type: "image/png",
        width,
        height,
        stage: EncodeStage::LosslessFallback,
    })
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> DeskPilotResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(rgb)
        .map_err(|e| DeskPilotError::Encoding(format!("JPEG encode (q={quality}): {e}")))?;
    Ok(out)
}
