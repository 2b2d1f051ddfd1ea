//! Revocable handles to in-memory binary content.
//!
//! An [`ObjectUrl`] addresses a blob held by an [`ObjectUrlRegistry`] until it
//! is revoked. Previews and downloads are served through these handles, so
//! every owner must revoke what it drops or the registry grows without bound.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    pub media_type: String,
}

impl Blob {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    blobs: HashMap<ObjectUrl, Blob>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, data: Bytes, media_type: &str) -> ObjectUrl {
        let url = ObjectUrl(format!("blob:rconv/{}", Uuid::new_v4()));
        self.blobs.insert(
            url.clone(),
            Blob {
                data,
                media_type: media_type.to_string(),
            },
        );
        tracing::trace!(url = %url, "object url created");
        url
    }

    pub fn resolve(&self, url: &ObjectUrl) -> Option<&Blob> {
        self.blobs.get(url)
    }

    /// Returns false when the handle was already revoked.
    pub fn revoke(&mut self, url: &ObjectUrl) -> bool {
        let removed = self.blobs.remove(url).is_some();
        if removed {
            tracing::trace!(url = %url, "object url revoked");
        }
        removed
    }

    pub fn revoke_all(&mut self) -> usize {
        let count = self.blobs.len();
        self.blobs.clear();
        count
    }

    /// Number of handles still alive.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}
