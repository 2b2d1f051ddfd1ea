use indicatif::HumanBytes;
use std::fmt;
use std::io::Cursor;

use crate::input::FileLike;
use crate::resources::{ObjectUrl, ObjectUrlRegistry};

#[derive(Debug, Clone)]
pub struct PendingFile {
    pub id: u64,
    pub file: FileLike,
    pub thumbnail: ObjectUrl,
    pub dimensions: Option<(u32, u32)>,
}

impl PendingFile {
    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }
}

/// One rendered line of the pending list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRow {
    pub index: usize,
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub thumbnail: ObjectUrl,
    pub dimensions: Option<(u32, u32)>,
}

impl fmt::Display for PendingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>3}. {} (#{}) — {}",
            self.index + 1,
            self.name,
            self.id,
            HumanBytes(self.size)
        )?;
        if let Some((w, h)) = self.dimensions {
            write!(f, " — {}×{}px", w, h)?;
        }
        Ok(())
    }
}

/// Ordered list of staged files.
///
/// Each entry owns one thumbnail handle in the registry; the handle is revoked
/// as soon as the entry leaves the list.
#[derive(Debug, Default)]
pub struct PendingList {
    items: Vec<PendingFile>,
    next_id: u64,
}

impl PendingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, files: Vec<FileLike>, urls: &mut ObjectUrlRegistry) -> usize {
        let added = files.len();
        for file in files {
            let thumbnail = urls.create(file.data.clone(), &file.media_type);
            let dimensions = probe_dimensions(&file);
            self.next_id += 1;
            tracing::debug!(name = %file.name, size = file.size(), "staged file");
            self.items.push(PendingFile {
                id: self.next_id,
                file,
                thumbnail,
                dimensions,
            });
        }
        added
    }

    /// Removes whatever sits at `index` right now.
    pub fn remove(&mut self, index: usize, urls: &mut ObjectUrlRegistry) -> Option<PendingFile> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        urls.revoke(&removed.thumbnail);
        Some(removed)
    }

    pub fn remove_id(&mut self, id: u64, urls: &mut ObjectUrlRegistry) -> Option<PendingFile> {
        let index = self.items.iter().position(|item| item.id == id)?;
        self.remove(index, urls)
    }

    pub fn clear(&mut self, urls: &mut ObjectUrlRegistry) {
        for item in self.items.drain(..) {
            urls.revoke(&item.thumbnail);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.items.iter().map(PendingFile::size).sum()
    }

    pub fn items(&self) -> &[PendingFile] {
        &self.items
    }

    pub fn rows(&self) -> Vec<PendingRow> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| PendingRow {
                index,
                id: item.id,
                name: item.file.name.clone(),
                size: item.size(),
                thumbnail: item.thumbnail.clone(),
                dimensions: item.dimensions,
            })
            .collect()
    }
}

fn probe_dimensions(file: &FileLike) -> Option<(u32, u32)> {
    if !file.is_in_family("image/") {
        return None;
    }
    image::ImageReader::new(Cursor::new(file.data.as_ref()))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> FileLike {
        FileLike::new(name, "image/png", format!("data-{}", name))
    }

    #[test]
    fn test_rows_track_list_through_operations() {
        let mut urls = ObjectUrlRegistry::new();
        let mut list = PendingList::new();

        list.add(vec![file("a"), file("b"), file("c"), file("d")], &mut urls);
        assert_eq!(list.rows().len(), list.len());
        list.remove(1, &mut urls);
        assert_eq!(list.rows().len(), list.len());
        list.add(vec![file("e")], &mut urls);
        assert_eq!(list.rows().len(), 4);
        assert!(list.remove(10, &mut urls).is_none());
        assert_eq!(list.rows().len(), list.len());
        list.clear(&mut urls);
        assert_eq!(list.rows().len(), 0);
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_targets_current_position() {
        let mut urls = ObjectUrlRegistry::new();
        let mut list = PendingList::new();
        list.add(vec![file("a"), file("b"), file("c")], &mut urls);

        let removed = list.remove(1, &mut urls).unwrap();
        assert_eq!(removed.name(), "b");
        // Index 1 now holds "c"; a second removal must not reuse the stale slot.
        let removed = list.remove(1, &mut urls).unwrap();
        assert_eq!(removed.name(), "c");

        let names: Vec<String> = list.rows().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_remove_by_stable_id() {
        let mut urls = ObjectUrlRegistry::new();
        let mut list = PendingList::new();
        list.add(vec![file("a"), file("b"), file("c")], &mut urls);
        let id_c = list.rows()[2].id;

        list.remove(0, &mut urls);
        let removed = list.remove_id(id_c, &mut urls).unwrap();
        assert_eq!(removed.name(), "c");
        assert!(list.remove_id(id_c, &mut urls).is_none());
        assert_eq!(list.len(), 1);
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn test_thumbnails_are_revoked() {
        let mut urls = ObjectUrlRegistry::new();
        let mut list = PendingList::new();
        list.add(vec![file("a"), file("b"), file("c")], &mut urls);
        assert_eq!(urls.len(), 3);

        let thumb = list.rows()[0].thumbnail.clone();
        list.remove(0, &mut urls);
        assert_eq!(urls.len(), 2);
        assert!(urls.resolve(&thumb).is_none());

        list.clear(&mut urls);
        assert!(urls.is_empty());
    }

    #[test]
    fn test_total_size_and_display() {
        let mut urls = ObjectUrlRegistry::new();
        let mut list = PendingList::new();
        list.add(vec![file("a"), file("bb")], &mut urls);
        assert_eq!(list.total_size(), 6 + 7);

        let row = &list.rows()[0];
        assert_eq!(row.dimensions, None);
        assert!(row.to_string().starts_with("  1. a"));
    }
}
