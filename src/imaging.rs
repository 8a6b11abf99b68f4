use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, ImageError};

use crate::config::HEIC_CONVERSION_QUALITY;

/// MIME types that browsers generally cannot display and we attempt to
/// transcode (stills only).
pub fn is_heif_like(mime_type: &str) -> bool {
    let lower = mime_type.to_ascii_lowercase();
    lower.contains("heic") || lower.contains("heif")
}

pub fn is_video(mime_type: &str) -> bool {
    mime_type.to_ascii_lowercase().starts_with("video/")
}

/// Whether `fetch_image` output should be transcoded for this MIME type.
pub fn needs_conversion(mime_type: &str) -> bool {
    is_heif_like(mime_type) && !is_video(mime_type)
}

/// Re-encode an image payload as JPEG for browser display.
///
/// Decoding is whatever the image stack supports; callers keep the original
/// bytes on failure rather than failing the request.
pub fn transcode_to_jpeg(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(data)?;
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), HEIC_CONVERSION_QUALITY);
    encoder.encode_image(&decoded)?;
    Ok(out)
}
