//! Blobs and object URLs
//!
//! A sealed recording is a [`Blob`]: immutable bytes plus a content type.
//! [`ObjectUrlRegistry`] hands out `blob:` URLs for preview and resolves
//! them until they are revoked.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const URL_PREFIX: &str = "blob:bubblecast/";

#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    data: Bytes,
    content_type: String,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Concatenate parts in order
    pub fn from_parts(parts: &[Bytes], content_type: impl Into<String>) -> Self {
        let total: usize = parts.iter().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(total);
        for part in parts {
            data.extend_from_slice(part);
        }
        Self::new(data.freeze(), content_type)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

/// Registry of live object URLs; clones share the same registry
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<HashMap<String, Blob>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob and return its URL
    pub fn create_object_url(&self, blob: &Blob) -> String {
        let url = format!("{}{}", URL_PREFIX, Uuid::new_v4());
        self.entries.lock().insert(url.clone(), blob.clone());
        debug!("Created object URL {} ({} bytes)", url, blob.size());
        url
    }

    pub fn resolve(&self, url: &str) -> Option<Blob> {
        self.entries.lock().get(url).cloned()
    }

    /// Revoke a URL. Returns whether it was registered.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.entries.lock().remove(url).is_some();
        if removed {
            debug!("Revoked object URL {}", url);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a string looks like a URL issued by [`ObjectUrlRegistry`]
pub fn is_blob_url(url: &str) -> bool {
    url.strip_prefix(URL_PREFIX)
        .map(|id| Uuid::parse_str(id).is_ok())
        .unwrap_or(false)
}

/// Build the URL for a given id
pub fn blob_url_for(id: Uuid) -> String {
    format!("{}{}", URL_PREFIX, id)
}
