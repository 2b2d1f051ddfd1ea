use bytes::Bytes;
use indicatif::HumanBytes;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::archive::ArchiveEntry;
use crate::error::ConvertError;
use crate::resources::{ObjectUrl, ObjectUrlRegistry};
use crate::utils::{get_unique_filepath, media_type_for_name, sanitize_filename, OCTET_STREAM};

/// A downloadable handle with the file name it should be saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub url: ObjectUrl,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub name: String,
    pub size: u64,
    pub media_type: String,
    /// Preview and download share the same handle.
    pub url: ObjectUrl,
}

impl ResultRow {
    pub fn download(&self) -> DownloadLink {
        DownloadLink {
            url: self.url.clone(),
            filename: self.name.clone(),
        }
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} — {} [{}]", self.name, HumanBytes(self.size), self.url)
    }
}

/// Results of the latest round.
#[derive(Debug, Default)]
pub struct ResultsView {
    rows: Vec<ResultRow>,
    download_all: Option<DownloadLink>,
}

impl ResultsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current results with one row per archive entry plus the
    /// aggregate archive download.
    pub fn populate(
        &mut self,
        archive: Bytes,
        archive_name: &str,
        entries: Vec<ArchiveEntry>,
        urls: &mut ObjectUrlRegistry,
    ) {
        self.clear(urls);
        for entry in entries {
            let media_type = media_type_for_name(&entry.name).unwrap_or(OCTET_STREAM).to_string();
            let size = entry.size();
            let url = urls.create(entry.data, &media_type);
            self.rows.push(ResultRow {
                name: entry.name,
                size,
                media_type,
                url,
            });
        }
        self.download_all = Some(DownloadLink {
            url: urls.create(archive, "application/zip"),
            filename: archive_name.to_string(),
        });
    }

    pub fn clear(&mut self, urls: &mut ObjectUrlRegistry) {
        for row in self.rows.drain(..) {
            urls.revoke(&row.url);
        }
        if let Some(link) = self.download_all.take() {
            urls.revoke(&link.url);
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn download_all(&self) -> Option<&DownloadLink> {
        self.download_all.as_ref()
    }

    /// Writes every result into `dir`, plus the raw archive when asked.
    pub async fn save_to(
        &self,
        dir: &Path,
        include_archive: bool,
        urls: &ObjectUrlRegistry,
    ) -> Result<Vec<PathBuf>, ConvertError> {
        fs::create_dir_all(dir).await?;
        let mut links: Vec<DownloadLink> = self.rows.iter().map(ResultRow::download).collect();
        if include_archive {
            links.extend(self.download_all.clone());
        }

        let mut saved = Vec::with_capacity(links.len());
        for link in links {
            saved.push(save_link(&link, dir, urls).await?);
        }
        Ok(saved)
    }
}

/// Writes the blob behind `link` into `dir` without overwriting anything.
pub async fn save_link(link: &DownloadLink, dir: &Path, urls: &ObjectUrlRegistry) -> Result<PathBuf, ConvertError> {
    let blob = urls.resolve(&link.url).ok_or_else(|| {
        ConvertError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} was revoked", link.url),
        ))
    })?;
    let path = get_unique_filepath(dir, &sanitize_filename(&link.filename));
    fs::write(&path, &blob.data).await?;
    tracing::debug!("Saved {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<ArchiveEntry> {
        vec![
            ArchiveEntry {
                name: "a.webp".to_string(),
                data: Bytes::from_static(b"aaa"),
            },
            ArchiveEntry {
                name: "b.webp".to_string(),
                data: Bytes::from_static(b"bbbbb"),
            },
        ]
    }

    #[test]
    fn test_populate_one_row_per_entry() {
        let mut urls = ObjectUrlRegistry::new();
        let mut view = ResultsView::new();
        view.populate(Bytes::from_static(b"zip"), "converted_images.zip", entries(), &mut urls);

        assert_eq!(view.rows().len(), 2);
        assert_eq!(view.rows()[0].name, "a.webp");
        assert_eq!(view.rows()[0].size, 3);
        assert_eq!(view.rows()[0].media_type, "image/webp");
        assert_eq!(urls.resolve(&view.rows()[1].url).unwrap().data.as_ref(), b"bbbbb");
        assert_ne!(view.rows()[0].url, view.rows()[1].url);

        let all = view.download_all().unwrap();
        assert_eq!(all.filename, "converted_images.zip");
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn test_repopulate_revokes_previous_round() {
        let mut urls = ObjectUrlRegistry::new();
        let mut view = ResultsView::new();
        view.populate(Bytes::from_static(b"zip"), "all.zip", entries(), &mut urls);
        view.populate(Bytes::from_static(b"zip"), "all.zip", entries(), &mut urls);
        assert_eq!(urls.len(), 3);

        view.clear(&mut urls);
        assert!(urls.is_empty());
        assert!(view.download_all().is_none());
    }

    #[tokio::test]
    async fn test_save_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut urls = ObjectUrlRegistry::new();
        let mut view = ResultsView::new();
        view.populate(Bytes::from_static(b"zip"), "converted_images.zip", entries(), &mut urls);

        let saved = view.save_to(dir.path(), true, &urls).await.unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(std::fs::read(dir.path().join("a.webp")).unwrap(), b"aaa");
        assert_eq!(std::fs::read(dir.path().join("converted_images.zip")).unwrap(), b"zip");

        let again = view.save_to(dir.path(), false, &urls).await.unwrap();
        assert_eq!(again[0], dir.path().join("a_1.webp"));
    }
}
