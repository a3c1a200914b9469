//! Artifact sink and processing-status collaborators
//!
//! Uploading a finished recording hands its bytes to an [`ArtifactSink`],
//! which answers with an opaque id. The [`ProcessingStatusService`] reports
//! what happened to that upload; [`StatusPoller`] asks it on a fixed
//! interval until the answer is final.

mod memory;
mod poller;

pub use memory::MemorySink;
pub use poller::{StatusPoller, DEFAULT_POLL_INTERVAL};

use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of an uploaded artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum StatusReport {
    Processing,
    Ready,
    Failed,
    /// The service (or the way to it) reported a problem
    Error(String),
}

impl StatusReport {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusReport::Processing)
    }
}

/// Accepts finished recordings
#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<Uuid>;
}

/// Reports on uploaded recordings
#[async_trait::async_trait]
pub trait ProcessingStatusService: Send + Sync {
    async fn status(&self, id: Uuid) -> Result<StatusReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_reports() {
        assert!(!StatusReport::Processing.is_terminal());
        assert!(StatusReport::Ready.is_terminal());
        assert!(StatusReport::Failed.is_terminal());
        assert!(StatusReport::Error("boom".to_string()).is_terminal());
    }

    #[test]
    fn test_report_json() {
        let json = serde_json::to_value(StatusReport::Error("timeout".to_string())).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["detail"], "timeout");

        let ready: StatusReport = serde_json::from_str(r#"{"status":"ready"}"#).unwrap();
        assert_eq!(ready, StatusReport::Ready);
    }
}
