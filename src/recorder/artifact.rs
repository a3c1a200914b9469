use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::media::Blob;

/// Encoded chunks in arrival order
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Bytes>,
    total_bytes: usize,
    sealed: bool,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks and chunks after sealing are ignored.
    pub fn push(&mut self, chunk: Bytes) -> bool {
        if chunk.is_empty() || self.sealed {
            return false;
        }
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
        debug!(
            "Chunk {} buffered ({} bytes total)",
            self.chunks.len(),
            self.total_bytes
        );
        true
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Concatenate everything into a blob. Only the first call returns data;
    /// an empty buffer seals to `None`.
    pub fn seal(&mut self, content_type: &str) -> Option<Blob> {
        if self.sealed {
            return None;
        }
        self.sealed = true;

        if self.chunks.is_empty() {
            return None;
        }
        Some(Blob::from_parts(&self.chunks, content_type))
    }
}

/// A finished recording
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: Uuid,
    #[serde(skip)]
    pub blob: Blob,
    /// `blob:` URL registered for preview
    pub preview_url: String,
    pub content_type: String,
    /// Size in bytes
    pub size: usize,
    pub created_at: DateTime<Utc>,
    /// Recorded duration in whole seconds
    pub duration_secs: u64,
}

impl Artifact {
    pub fn new(blob: Blob, preview_url: String, duration_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type: blob.content_type().to_string(),
            size: blob.size(),
            blob,
            preview_url,
            created_at: Utc::now(),
            duration_secs,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        self.blob.bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunks_ignored() {
        let mut buffer = ChunkBuffer::new();
        assert!(!buffer.push(Bytes::new()));
        assert!(buffer.push(Bytes::from(vec![0u8; 1000])));
        assert!(buffer.push(Bytes::from(vec![1u8; 2000])));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_bytes(), 3000);
    }

    #[test]
    fn test_seal_once() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(Bytes::from_static(b"head"));
        buffer.push(Bytes::from_static(b"tail"));

        let blob = buffer.seal("video/webm").unwrap();
        assert_eq!(blob.bytes().as_ref(), b"headtail");
        assert!(buffer.seal("video/webm").is_none());
        assert!(!buffer.push(Bytes::from_static(b"late")));
    }

    #[test]
    fn test_empty_seals_to_none() {
        let mut buffer = ChunkBuffer::new();
        assert!(buffer.seal("video/webm").is_none());
        assert!(buffer.is_sealed());
    }

    #[test]
    fn test_artifact_metadata() {
        let blob = Blob::new(vec![7u8; 42], "video/mp4");
        let artifact = Artifact::new(blob, "blob:bubblecast/x".to_string(), 3);
        assert_eq!(artifact.size, 42);
        assert_eq!(artifact.content_type, "video/mp4");

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["size"], 42);
        assert!(json.get("blob").is_none());
    }
}
