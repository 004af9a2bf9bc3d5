//! Client-side JPEG re-encoding.
//!
//! Compression is an optimisation only. Any decode or encode failure falls
//! back to the original bytes, so a caller always gets something to upload.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Lowest and highest accepted quality factor
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Reasons a re-encode did not happen. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),
}

/// An image as read from disk
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Payload ready for transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    /// Whether `bytes` is a fresh JPEG rather than the original payload
    pub recompressed: bool,
    /// Quality used, present only when recompressed
    pub quality: Option<u8>,
}

impl CompressedImage {
    /// The source payload, untouched
    fn original(source: &SourceImage) -> Self {
        Self {
            bytes: source.bytes.clone(),
            file_name: source.file_name.clone(),
            content_type: mime_guess::from_path(&source.file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            recompressed: false,
            quality: None,
        }
    }
}

/// Re-encodes images as baseline JPEG at a fixed quality
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    quality: u8,
}

impl Compressor {
    /// Create a compressor; `quality` is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(MIN_QUALITY, MAX_QUALITY),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Re-encode `source`, or hand back its original bytes if that fails.
    ///
    /// Pixel dimensions are kept. Alpha is dropped.
    pub fn compress(&self, source: &SourceImage) -> CompressedImage {
        match self.reencode(&source.bytes) {
            Ok(bytes) => {
                debug!(
                    file = %source.file_name,
                    original_bytes = source.bytes.len(),
                    compressed_bytes = bytes.len(),
                    quality = self.quality,
                    "Image recompressed"
                );
                CompressedImage {
                    bytes,
                    file_name: jpeg_file_name(&source.file_name),
                    content_type: JPEG_CONTENT_TYPE.to_string(),
                    recompressed: true,
                    quality: Some(self.quality),
                }
            }
            Err(e) => {
                warn!(file = %source.file_name, error = %e, "Compression failed, sending original");
                CompressedImage::original(source)
            }
        }
    }

    /// [`compress`](Self::compress) on the blocking thread pool
    pub async fn compress_async(&self, source: SourceImage) -> CompressedImage {
        let compressor = *self;
        let source = Arc::new(source);
        let task_source = Arc::clone(&source);

        match tokio::task::spawn_blocking(move || compressor.compress(&task_source)).await {
            Ok(compressed) => compressed,
            Err(e) => {
                warn!(file = %source.file_name, error = %e, "Compression task failed, sending original");
                CompressedImage::original(&source)
            }
        }
    }

    fn reencode(&self, bytes: &[u8]) -> Result<Vec<u8>, CompressError> {
        let decoded = image::load_from_memory(bytes).map_err(CompressError::Decode)?;
        let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
        drop(decoded);

        let mut buf = Cursor::new(Vec::with_capacity(bytes.len() / 2));
        let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        rgb.write_with_encoder(encoder).map_err(CompressError::Encode)?;

        Ok(buf.into_inner())
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(80)
    }
}

/// `photo.png` -> `photo.jpg`
fn jpeg_file_name(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("photo");

    format!("{stem}.jpg")
}
