use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage};
use pilah_types::{vision::StillFrame, Result};

use crate::{still_surface, vision_error};

pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Compress a still into RGB JPEG bytes. `quality` is 1..=100.
pub fn encode_jpeg(still: &StillFrame, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(still_surface(still)?).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|err| vision_error(format!("jpeg encoding failed: {err}")))?;
    Ok(bytes)
}

pub fn to_data_url(jpeg: &[u8]) -> String {
    format!("{}{}", JPEG_DATA_URL_PREFIX, BASE64_STANDARD.encode(jpeg))
}

/// Decode a data URL or bare base64 payload back into bytes.
pub fn decode_data_url(value: &str) -> Result<Vec<u8>> {
    let payload = match value.split_once("base64,") {
        Some((_, rest)) => rest,
        None => value,
    };
    BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|err| vision_error(format!("invalid base64 image payload: {err}")))
}

/// Decode compressed image bytes into an unmirrored still.
#[cfg(test)]
pub(crate) fn decode_image(bytes: &[u8]) -> Result<StillFrame> {
    let img = image::io::Reader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| vision_error(format!("unable to sniff image format: {err}")))?
        .decode()
        .map_err(|err| vision_error(format!("image decoding failed: {err}")))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    StillFrame::from_rgba(width, height, rgba.into_raw(), false)
}
