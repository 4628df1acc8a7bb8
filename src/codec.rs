//! Conversion between uploaded image bytes, RGB pixel buffers and the
//! base64 PNG text carried to inference backends.

use crate::error::InferenceError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::{fmt, io::Cursor};

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Base64 text of a PNG-encoded image.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn data_url(&self) -> String {
        format!("{}{}", DATA_URL_PREFIX, self.0)
    }

    /// Inverse of [`encode`].
    pub fn decode(&self) -> Result<RgbImage, InferenceError> {
        let png = STANDARD.decode(&self.0)?;
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
        Ok(image.to_rgb8())
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedImage {{ <{} base64 chars> }}", self.0.len())
    }
}

/// PNG-encodes the pixel buffer and wraps the bytes in base64. Deterministic
/// for a given buffer.
pub fn encode(image: &RgbImage) -> Result<EncodedImage, InferenceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(InferenceError::image("image has no pixels"));
    }

    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(EncodedImage(STANDARD.encode(&png)))
}

/// Decodes an uploaded JPEG/PNG and normalizes it to 3-channel RGB.
pub fn decode_upload(bytes: &[u8]) -> Result<RgbImage, InferenceError> {
    if bytes.is_empty() {
        return Err(InferenceError::image("upload is empty"));
    }

    let format = image::guess_format(bytes)?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(InferenceError::image(format!(
            "unsupported image format {:?}, expected PNG or JPEG",
            format
        )));
    }

    let image = image::load_from_memory_with_format(bytes, format)?;
    Ok(image.to_rgb8())
}

/// Decodes a base64 upload as sent by HTTP clients.
pub fn decode_base64_upload(text: &str) -> Result<RgbImage, InferenceError> {
    let bytes = STANDARD.decode(text.trim())?;
    decode_upload(&bytes)
}

/// Inverse of [`EncodedImage::data_url`].
pub fn decode_data_url(url: &str) -> Result<RgbImage, InferenceError> {
    let payload = url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| InferenceError::image("expected a base64 PNG data URL"))?;
    EncodedImage(payload.to_string()).decode()
}
