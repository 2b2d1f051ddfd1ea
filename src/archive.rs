use bytes::Bytes;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::ConvertError;

/// One file inside a result archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Bytes,
}

impl ArchiveEntry {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Reads every non-directory entry of a ZIP archive, in archive order.
pub fn unpack(data: &[u8]) -> Result<Vec<ArchiveEntry>, ConvertError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());

    tracing::debug!("Archive contains {} entries", archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            tracing::trace!("Skipping directory: {}", file.name());
            continue;
        }

        let name = file.name().to_string();
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        entries.push(ArchiveEntry {
            name,
            data: Bytes::from(buf),
        });
    }

    Ok(entries)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Builds a ZIP from `(name, content)` pairs; names ending in `/` become directories.
    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_unpack_skips_directories() {
        let zip = build_zip(&[
            ("out/", b""),
            ("out/a.webp", b"aaaa"),
            ("b.webp", b"bb"),
        ]);
        let entries = unpack(&zip).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "out/a.webp");
        assert_eq!(entries[0].size(), 4);
        assert_eq!(entries[1].name, "b.webp");
        assert_eq!(entries[1].data.as_ref(), b"bb");
    }

    #[test]
    fn test_unpack_empty_archive() {
        let zip = build_zip(&[]);
        assert!(unpack(&zip).unwrap().is_empty());
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        assert!(matches!(unpack(b"definitely not a zip"), Err(ConvertError::Archive(_))));
    }
}
