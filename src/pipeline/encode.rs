//! Image encoding: rendered surface → PNG bytes, tried through an ordered
//! list of strategies.
//!
//! PNG is chosen over JPEG because it is lossless; text crispness matters
//! far more than file size when the raster is later read by a vision model.
//!
//! The rasteriser walks [`default_encoders`] in order and keeps the first
//! strategy that yields non-empty bytes:
//!
//! 1. [`PngEncoder`]: encode the surface straight to PNG bytes.
//! 2. [`DataUrlEncoder`]: encode to a `data:image/png;base64,` URL and decode
//!    it back. Slower, but goes through a different output path, so it still
//!    produces an artifact when the direct write fails.
//!
//! Both share [`png_bytes`], so the fallback's output is byte-identical to
//! the primary's for the same surface.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// MIME type of every artifact produced here.
pub const PNG_MIME: &str = "image/png";
/// File extension of every artifact produced here.
pub const PNG_EXTENSION: &str = "png";

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{encoder}: produced no bytes")]
    Empty { encoder: &'static str },

    #[error("{encoder}: {detail}")]
    Failed {
        encoder: &'static str,
        detail: String,
    },
}

/// One way of turning a rendered surface into image bytes.
pub trait ImageEncoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, surface: &RgbaImage) -> Result<Vec<u8>, EncodeError>;
}

/// Primary, then data-URL fallback.
pub fn default_encoders() -> Vec<Arc<dyn ImageEncoder>> {
    vec![Arc::new(PngEncoder), Arc::new(DataUrlEncoder)]
}

/// Lossless PNG encoding of an RGBA surface.
pub fn png_bytes(surface: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(surface.clone())
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Direct PNG write.
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn name(&self) -> &'static str {
        "png"
    }

    fn encode(&self, surface: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
        let bytes = png_bytes(surface).map_err(|e| EncodeError::Failed {
            encoder: self.name(),
            detail: e.to_string(),
        })?;
        non_empty(self.name(), bytes)
    }
}

/// PNG via a base64 data URL.
pub struct DataUrlEncoder;

impl DataUrlEncoder {
    pub fn to_data_url(surface: &RgbaImage) -> Result<String, image::ImageError> {
        Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(png_bytes(surface)?)))
    }

    pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
        let payload = url.strip_prefix(DATA_URL_PREFIX)?;
        STANDARD.decode(payload).ok()
    }
}

impl ImageEncoder for DataUrlEncoder {
    fn name(&self) -> &'static str {
        "data-url"
    }

    fn encode(&self, surface: &RgbaImage) -> Result<Vec<u8>, EncodeError> {
        let url = Self::to_data_url(surface).map_err(|e| EncodeError::Failed {
            encoder: self.name(),
            detail: e.to_string(),
        })?;
        let bytes = Self::decode_data_url(&url).ok_or_else(|| EncodeError::Failed {
            encoder: self.name(),
            detail: "data URL did not decode".to_string(),
        })?;
        non_empty(self.name(), bytes)
    }
}

fn non_empty(encoder: &'static str, bytes: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
    if bytes.is_empty() {
        Err(EncodeError::Empty { encoder })
    } else {
        Ok(bytes)
    }
}

/// Wrap PNG bytes for a multimodal request body.
///
/// `detail: "high"` makes GPT-4-class models tile the full image instead of
/// a single 512 px overview; small résumé fonts are unreadable otherwise.
pub fn to_image_data(png: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(png);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, PNG_MIME).with_detail("high")
}
