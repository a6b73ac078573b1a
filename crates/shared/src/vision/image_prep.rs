use std::io::Cursor;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use thiserror::Error;

pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 512;

#[derive(Debug, Error)]
pub enum ImagePrepError {
    #[error("image data is empty")]
    Empty,
    #[error("image data is not valid base64")]
    InvalidBase64,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// JPEG-encoded, size-bounded copy of an uploaded image.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub jpeg_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg_bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.to_base64())
    }
}

/// Decodes `bytes`, shrinks the longest side to `max_dimension` keeping aspect ratio, and
/// re-encodes as JPEG. Images already within bounds are not upscaled.
pub fn prepare_image(bytes: &[u8], max_dimension: u32) -> Result<PreparedImage, ImagePrepError> {
    if bytes.is_empty() {
        return Err(ImagePrepError::Empty);
    }

    let decoded =
        image::load_from_memory(bytes).map_err(|err| ImagePrepError::Decode(err.to_string()))?;
    let (width, height) = decoded.dimensions();
    let bounded = if width > max_dimension || height > max_dimension {
        decoded.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        decoded
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(bounded.to_rgb8());
    let mut jpeg_bytes = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut jpeg_bytes), ImageFormat::Jpeg)
        .map_err(|err| ImagePrepError::Encode(err.to_string()))?;

    Ok(PreparedImage {
        jpeg_bytes,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Accepts `data:<mime>;base64,<payload>` or a bare base64 payload.
pub fn decode_data_url(raw: &str) -> Result<Vec<u8>, ImagePrepError> {
    let trimmed = raw.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, payload)| payload)
            .ok_or(ImagePrepError::InvalidBase64)?,
        None => trimmed,
    };

    if payload.trim().is_empty() {
        return Err(ImagePrepError::Empty);
    }

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| ImagePrepError::InvalidBase64)
}
