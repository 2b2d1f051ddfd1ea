use std::path::{Path, PathBuf};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Media type for a file name, judged by its extension.
pub fn media_type_for_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "zip" => "application/zip",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(media_type)
}

/// Media type from the leading magic bytes of a buffer.
pub fn sniff_media_type(data: &[u8]) -> Option<&'static str> {
    let media_type = if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else if is_bmp_header(data) {
        "image/bmp"
    } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        "image/tiff"
    } else if data.starts_with(b"%PDF") {
        "application/pdf"
    } else if data.starts_with(b"PK\x03\x04") {
        "application/zip"
    } else {
        return None;
    };
    Some(media_type)
}

/// `BM`, a file size that covers both headers, and a known DIB header size.
fn is_bmp_header(data: &[u8]) -> bool {
    if data.len() < 18 || !data.starts_with(b"BM") {
        return false;
    }
    let file_size = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
    let dib_size = u32::from_le_bytes([data[14], data[15], data[16], data[17]]);
    matches!(dib_size, 12 | 40 | 52 | 56 | 64 | 108 | 124) && file_size >= 14 + dib_size
}

/// File extension to use for a media type, without the dot.
pub fn extension_for_media_type(media_type: &str) -> Option<&str> {
    let essence = media_type.split(';').next()?.trim();
    let (_, subtype) = essence.split_once('/')?;
    if subtype.is_empty() {
        return None;
    }
    Some(subtype.split('+').next().unwrap_or(subtype))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

pub fn get_unique_filepath(dir: &Path, filename: &str) -> PathBuf {
    let mut path = dir.join(filename);
    let original = Path::new(filename);
    let file_stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let extension = original
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut counter = 1;

    while path.exists() {
        let new_filename = if extension.is_empty() {
            format!("{}_{}", file_stem, counter)
        } else {
            format!("{}_{}.{}", file_stem, counter, extension)
        };

        path = dir.join(new_filename);
        counter += 1;
    }
    path
}
