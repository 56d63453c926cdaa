use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Photo payload with any data-URL prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub base64: String,
}

impl InlineImage {
    pub fn decode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(BASE64.decode(self.base64.as_bytes())?)
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

/// Splits a base64 photo into its MIME type and raw payload. A declared
/// `data:<mime>;base64,` prefix wins; otherwise the leading payload
/// characters are matched against known signatures, defaulting to JPEG.
pub fn sniff_image(raw: &str) -> InlineImage {
    let trimmed = raw.trim();
    let (declared, payload) = match split_data_url(trimmed) {
        Some((mime, payload)) => (Some(mime), payload),
        None => (None, trimmed),
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let mime_type = declared
        .filter(|mime| mime.starts_with("image/"))
        .map(str::to_string)
        .unwrap_or_else(|| mime_from_signature(&payload).to_string());
    InlineImage {
        mime_type,
        base64: payload,
    }
}

fn split_data_url(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.split(';').next().unwrap_or_default().trim();
    Some((mime, payload))
}

fn mime_from_signature(payload: &str) -> &'static str {
    if payload.starts_with("/9j/") {
        "image/jpeg"
    } else if payload.starts_with("iVBOR") {
        "image/png"
    } else if payload.starts_with("R0lGOD") {
        "image/gif"
    } else if payload.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Output size for the edited photo, matched to the source orientation so the
/// result keeps the same framing.
pub fn edit_output_size(bytes: &[u8]) -> &'static str {
    let dims = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok());
    let Some((width, height)) = dims else {
        return "auto";
    };
    if width == 0 || height == 0 {
        return "auto";
    }
    let ratio = width as f64 / height as f64;
    if ratio < 0.9 {
        "1024x1536"
    } else if ratio > 1.1 {
        "1536x1024"
    } else {
        "1024x1024"
    }
}

/// First four bytes of the payload's SHA-256, hex encoded.
pub fn content_tag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..4])
}
