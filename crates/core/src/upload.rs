//! Upload limits and validation for poem source images.
//!
//! The backend accepts a single image plus an optional short "enhance"
//! hint that steers generation.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 1_000_000;

/// Longest accepted enhance hint, in characters.
pub const MAX_ENHANCE_CHARS: usize = 100;

pub const MIME_GIF: &str = "image/gif";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_WEBP: &str = "image/webp";

/// All MIME types the backend accepts.
pub const ALLOWED_MIME_TYPES: &[&str] = &[MIME_GIF, MIME_JPEG, MIME_PNG, MIME_WEBP];

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Sniff the MIME type of an image from its magic bytes.
///
/// Returns `None` when the bytes are not a recognised image format.
pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Normalise an enhance hint: trimmed, and `None` when blank.
pub fn normalize_enhance(enhance: Option<&str>) -> Option<String> {
    enhance
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an upload against the backend limits.
pub fn validate_upload(
    mime_type: &str,
    size_bytes: usize,
    enhance: Option<&str>,
) -> Result<(), CoreError> {
    if size_bytes == 0 {
        return Err(CoreError::Validation("Image file is empty".to_string()));
    }
    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(CoreError::Validation(format!(
            "Image is {size_bytes} bytes; the limit is {MAX_UPLOAD_BYTES} bytes"
        )));
    }
    if !ALLOWED_MIME_TYPES.contains(&mime_type) {
        return Err(CoreError::Validation(format!(
            "Unsupported image type '{mime_type}'. Allowed types: {}",
            ALLOWED_MIME_TYPES.join(", ")
        )));
    }
    if let Some(hint) = enhance {
        let chars = hint.chars().count();
        if chars > MAX_ENHANCE_CHARS {
            return Err(CoreError::Validation(format!(
                "Enhance hint is {chars} characters; the limit is {MAX_ENHANCE_CHARS}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
