use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::SessionState;

/// Statistics about a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub id: Uuid,

    pub state: SessionState,

    /// When the recorder confirmed start
    pub started_at: Option<DateTime<Utc>>,

    /// Elapsed recording time in whole seconds
    pub elapsed_secs: u64,

    /// Non-empty chunks received so far
    pub chunk_count: usize,

    /// Total bytes received so far
    pub bytes: usize,

    /// Container/codec in use
    pub mime_type: Option<String>,

    /// Whether the webcam bubble is composited into the video
    pub overlay_active: bool,

    /// Number of audio tracks feeding the mix
    pub audio_sources: usize,

    /// How many times cleanup ran (never more than one)
    pub cleanup_runs: usize,

    /// Human-readable failure, if any
    pub error: Option<String>,
}
