//! Upload type detection.
//!
//! Picks the file extension a stored scan is saved under.

use std::path::Path;

/// Extension used when neither the content type nor the file name is recognised.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Map an image MIME type to a file extension.
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    let ext = match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png"                                => "png",
        "image/gif"                                => "gif",
        "image/webp"                               => "webp",
        "image/bmp" | "image/x-ms-bmp"             => "bmp",
        "image/tiff"                               => "tiff",
        _ => return None,
    };
    Some(ext)
}

/// Normalise a file name's extension to one we store under.
fn extension_for_name(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();

    let ext = match ext.as_str() {
        "jpg" | "jpeg" => "jpg",
        "png"          => "png",
        "gif"          => "gif",
        "webp"         => "webp",
        "bmp"          => "bmp",
        "tif" | "tiff" => "tiff",
        _ => return None,
    };
    Some(ext)
}

/// Choose the extension for an upload. The declared content type wins over the file name.
pub fn extension_for(content_type: Option<&str>, file_name: Option<&str>) -> &'static str {
    content_type
        .and_then(extension_for_mime)
        .or_else(|| file_name.and_then(extension_for_name))
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Whether a MIME type is for an image.
pub fn is_image(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}
