use anyhow::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::{ArtifactSink, ProcessingStatusService, StatusReport};

struct Stored {
    data: Bytes,
    content_type: String,
    /// Reports still to be handed out, oldest first; the last one sticks
    reports: Vec<StatusReport>,
}

/// Keeps uploads in memory and reports a scripted status sequence for each
pub struct MemorySink {
    uploads: Mutex<HashMap<Uuid, Stored>>,
    script: Vec<StatusReport>,
}

impl MemorySink {
    /// Every upload reports Processing once, then Ready
    pub fn new() -> Self {
        Self::with_script(vec![StatusReport::Processing, StatusReport::Ready])
    }

    /// Every upload reports `script` in order, repeating the last entry
    pub fn with_script(script: Vec<StatusReport>) -> Self {
        Self {
            uploads: Mutex::new(HashMap::new()),
            script,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<(Bytes, String)> {
        self.uploads
            .lock()
            .get(&id)
            .map(|stored| (stored.data.clone(), stored.content_type.clone()))
    }

    pub fn len(&self) -> usize {
        self.uploads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ArtifactSink for MemorySink {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        info!("Stored upload {} ({} bytes, {})", id, data.len(), content_type);
        self.uploads.lock().insert(
            id,
            Stored {
                data,
                content_type: content_type.to_string(),
                reports: self.script.clone(),
            },
        );
        Ok(id)
    }
}

#[async_trait::async_trait]
impl ProcessingStatusService for MemorySink {
    async fn status(&self, id: Uuid) -> Result<StatusReport> {
        let mut uploads = self.uploads.lock();
        let stored = uploads
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Unknown upload: {}", id))?;

        let report = match stored.reports.len() {
            0 => StatusReport::Ready,
            1 => stored.reports[0].clone(),
            _ => stored.reports.remove(0),
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_status_script() {
        let sink = MemorySink::new();
        let id = sink
            .upload(Bytes::from_static(b"webm"), "video/webm")
            .await
            .unwrap();

        assert_eq!(sink.get(id), Some((Bytes::from_static(b"webm"), "video/webm".to_string())));
        assert_eq!(sink.status(id).await.unwrap(), StatusReport::Processing);
        assert_eq!(sink.status(id).await.unwrap(), StatusReport::Ready);
        assert_eq!(sink.status(id).await.unwrap(), StatusReport::Ready);
    }

    #[tokio::test]
    async fn test_unknown_upload() {
        let sink = MemorySink::new();
        assert!(sink.status(Uuid::new_v4()).await.is_err());
    }
}
