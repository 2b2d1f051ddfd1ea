//! Input normalization for the three staging sources.
//!
//! The picker, drag-and-drop and clipboard paste all end up as the same
//! [`FileLike`] shape before they reach the pending list.

use bytes::Bytes;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::ConvertError;
use crate::utils::{display_name, extension_for_media_type, media_type_for_name, sniff_media_type, OCTET_STREAM};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLike {
    pub name: String,
    pub media_type: String,
    pub data: Bytes,
}

impl FileLike {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// True when the media type belongs to `family` (e.g. `image/`).
    pub fn is_in_family(&self, family: &str) -> bool {
        self.media_type.starts_with(family)
    }

    /// Reads a file from disk. The media type comes from the extension and
    /// falls back to the content.
    pub async fn from_path(path: &Path) -> Result<Self, ConvertError> {
        let data = fs::read(path).await?;
        let name = display_name(path);
        let media_type = media_type_for_name(&name)
            .or_else(|| sniff_media_type(&data))
            .unwrap_or(OCTET_STREAM);
        Ok(Self::new(name, media_type, data))
    }
}

#[derive(Debug, Clone)]
pub enum ClipboardItem {
    File(FileLike),
    Text(String),
}

impl ClipboardItem {
    /// Builds a clipboard item from raw pasted bytes.
    ///
    /// Recognised binary content becomes a file named after the paste time;
    /// valid UTF-8 that is not recognised becomes text.
    pub fn from_bytes(data: Bytes) -> Self {
        if let Some(media_type) = sniff_media_type(&data) {
            let ext = extension_for_media_type(media_type).unwrap_or("bin");
            let name = format!("pasted_{}.{}", Local::now().format("%Y%m%d_%H%M%S"), ext);
            return ClipboardItem::File(FileLike::new(name, media_type, data));
        }
        match std::str::from_utf8(&data) {
            Ok(text) => ClipboardItem::Text(text.to_string()),
            Err(_) => ClipboardItem::File(FileLike::new("pasted.bin", OCTET_STREAM, data)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum InputEvent {
    PickerSelected(Vec<FileLike>),
    DragEnter,
    DragOver,
    DragLeave,
    Drop(Vec<FileLike>),
    Paste(Vec<ClipboardItem>),
    SurfaceClick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Files(Vec<FileLike>),
    /// Clicking the drop surface delegates to the native picker.
    OpenPicker,
    Nothing,
}

#[derive(Debug, Default)]
pub struct InputNormalizer {
    drop_active: bool,
}

impl InputNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the drop surface is currently highlighted.
    pub fn drop_active(&self) -> bool {
        self.drop_active
    }

    pub fn handle(&mut self, event: InputEvent) -> Normalized {
        match event {
            InputEvent::DragEnter | InputEvent::DragOver => {
                self.drop_active = true;
                Normalized::Nothing
            }
            InputEvent::DragLeave => {
                self.drop_active = false;
                Normalized::Nothing
            }
            InputEvent::Drop(files) => {
                self.drop_active = false;
                Normalized::Files(files)
            }
            InputEvent::PickerSelected(files) => Normalized::Files(files),
            InputEvent::Paste(items) => {
                let files: Vec<FileLike> = items
                    .into_iter()
                    .filter_map(|item| match item {
                        ClipboardItem::File(file) if file.is_in_family("image/") => Some(file),
                        _ => None,
                    })
                    .collect();
                Normalized::Files(files)
            }
            InputEvent::SurfaceClick => Normalized::OpenPicker,
        }
    }
}

/// Expands picker patterns (plain paths or globs) and reads every match.
pub async fn load_picker(patterns: &[String]) -> Result<Vec<FileLike>, ConvertError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let paths = glob::glob(pattern).map_err(|e| {
            ConvertError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
        })?;
        let mut matched = false;
        for entry in paths {
            let path = entry.map_err(|e| e.into_error())?;
            if path.is_file() {
                files.push(FileLike::from_path(&path).await?);
                matched = true;
            }
        }
        if !matched {
            return Err(ConvertError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No files match '{}'", pattern),
            )));
        }
    }
    Ok(files)
}

/// Reads dropped paths. A dropped directory contributes its direct files.
pub async fn load_dropped(paths: &[PathBuf]) -> Result<Vec<FileLike>, ConvertError> {
    let mut files = Vec::new();
    for path in paths {
        if fs::metadata(path).await?.is_dir() {
            let mut children = Vec::new();
            let mut entries = fs::read_dir(path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    children.push(entry.path());
                }
            }
            children.sort();
            for child in children {
                files.push(FileLike::from_path(&child).await?);
            }
        } else {
            files.push(FileLike::from_path(path).await?);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n....";

    #[test]
    fn test_drag_state_transitions() {
        let mut normalizer = InputNormalizer::new();
        assert!(!normalizer.drop_active());
        assert_eq!(normalizer.handle(InputEvent::DragEnter), Normalized::Nothing);
        assert!(normalizer.drop_active());
        normalizer.handle(InputEvent::DragLeave);
        assert!(!normalizer.drop_active());

        normalizer.handle(InputEvent::DragOver);
        let file = FileLike::new("a.png", "image/png", PNG);
        let out = normalizer.handle(InputEvent::Drop(vec![file.clone()]));
        assert!(!normalizer.drop_active());
        assert_eq!(out, Normalized::Files(vec![file]));
    }

    #[test]
    fn test_surface_click_opens_picker() {
        let mut normalizer = InputNormalizer::new();
        assert_eq!(normalizer.handle(InputEvent::SurfaceClick), Normalized::OpenPicker);
    }

    #[test]
    fn test_paste_keeps_only_images() {
        let mut normalizer = InputNormalizer::new();
        let image = FileLike::new("shot.png", "image/png", PNG);
        let items = vec![
            ClipboardItem::File(FileLike::new("notes.txt", "text/plain", "hello")),
            ClipboardItem::File(image.clone()),
            ClipboardItem::Text("just text".to_string()),
        ];
        assert_eq!(normalizer.handle(InputEvent::Paste(items)), Normalized::Files(vec![image]));
    }

    #[test]
    fn test_text_paste_starting_with_bm_is_not_an_image() {
        let item = ClipboardItem::from_bytes(Bytes::from_static(b"BMW service at 9am"));
        assert!(matches!(&item, ClipboardItem::Text(t) if t == "BMW service at 9am"));

        let mut normalizer = InputNormalizer::new();
        assert_eq!(normalizer.handle(InputEvent::Paste(vec![item])), Normalized::Files(vec![]));
    }

    #[test]
    fn test_clipboard_from_bytes() {
        match ClipboardItem::from_bytes(Bytes::from_static(PNG)) {
            ClipboardItem::File(file) => {
                assert_eq!(file.media_type, "image/png");
                assert!(file.name.starts_with("pasted_"));
                assert!(file.name.ends_with(".png"));
            }
            other => panic!("expected file, got {:?}", other),
        }
        assert!(matches!(
            ClipboardItem::from_bytes(Bytes::from_static(b"some text")),
            ClipboardItem::Text(t) if t == "some text"
        ));
    }

    #[tokio::test]
    async fn test_load_dropped_expands_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), PNG).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"text").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = load_dropped(&[dir.path().to_path_buf()]).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.png"]);
        assert_eq!(files[0].media_type, "text/plain");
        assert_eq!(files[1].media_type, "image/png");
    }

    #[tokio::test]
    async fn test_load_picker_glob_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.png"), PNG).unwrap();
        std::fs::write(dir.path().join("two.png"), PNG).unwrap();

        let pattern = format!("{}/*.png", dir.path().display());
        let files = load_picker(&[pattern]).await.unwrap();
        assert_eq!(files.len(), 2);

        let missing = format!("{}/*.jpg", dir.path().display());
        assert!(matches!(load_picker(&[missing]).await, Err(ConvertError::Io(_))));
    }

    #[tokio::test]
    async fn test_from_path_sniffs_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenshot");
        std::fs::write(&path, PNG).unwrap();
        let file = FileLike::from_path(&path).await.unwrap();
        assert_eq!(file.media_type, "image/png");
        assert_eq!(file.size(), PNG.len() as u64);
    }
}
