//! Platform recorder boundary
//!
//! The recorder consumes the final mixed stream and emits encoded chunks
//! over an event channel. Everything after `start()` is event driven: data
//! arrives as [`RecorderEvent::DataAvailable`], and a stop request is only
//! complete once [`RecorderEvent::Stopped`] has been delivered.

pub mod artifact;

pub use artifact::{Artifact, ChunkBuffer};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::MediaStream;

/// Container/codec preference, best first
pub const MIME_CANDIDATES: [&str; 4] = [
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
    "video/mp4",
];

/// First candidate the recorder can produce
pub fn select_mime_type(factory: &dyn RecorderFactory) -> Option<&'static str> {
    MIME_CANDIDATES
        .iter()
        .copied()
        .find(|mime| factory.is_type_supported(mime))
}

/// File extension for a recorded container
pub fn file_extension(mime_type: &str) -> &'static str {
    if mime_type.starts_with("video/mp4") {
        "mp4"
    } else {
        "webm"
    }
}

/// Events emitted by a running recorder
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Started,
    /// An encoded chunk; may be empty
    DataAvailable(Bytes),
    Error(String),
    /// Final event: no data follows
    Stopped,
}

pub type RecorderEvents = mpsc::UnboundedSender<RecorderEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Inactive,
    Recording,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecorderError {
    #[error("Unsupported MIME type: {0}")]
    Unsupported(String),

    #[error("Invalid recorder state: {0}")]
    InvalidState(String),

    #[error("Recorder platform error: {0}")]
    Platform(String),
}

/// A platform recorder bound to one stream
pub trait MediaRecorder: Send {
    /// Begin encoding, delivering a chunk every `timeslice`
    fn start(&mut self, timeslice: Duration) -> Result<(), RecorderError>;

    /// Request a stop; completion is signalled by [`RecorderEvent::Stopped`]
    fn stop(&mut self) -> Result<(), RecorderError>;

    /// Flush whatever is buffered as a `DataAvailable` event
    fn request_data(&mut self) -> Result<(), RecorderError>;

    fn state(&self) -> RecorderState;

    fn mime_type(&self) -> &str;
}

/// Creates recorders for a stream
///
/// Implementations:
/// - [`SyntheticRecorderFactory`](crate::media::synthetic::SyntheticRecorderFactory): in-process encoder for the demo and tests
pub trait RecorderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(
        &self,
        stream: MediaStream,
        mime_type: &str,
        events: RecorderEvents,
    ) -> Result<Box<dyn MediaRecorder>, RecorderError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Supports(&'static [&'static str]);

    impl RecorderFactory for Supports {
        fn is_type_supported(&self, mime_type: &str) -> bool {
            self.0.contains(&mime_type)
        }

        fn create(
            &self,
            _stream: MediaStream,
            mime_type: &str,
            _events: RecorderEvents,
        ) -> Result<Box<dyn MediaRecorder>, RecorderError> {
            Err(RecorderError::Unsupported(mime_type.to_string()))
        }

        fn name(&self) -> &str {
            "supports"
        }
    }

    #[test]
    fn test_prefers_vp9() {
        let factory = Supports(&["video/mp4", "video/webm;codecs=vp9,opus", "video/webm"]);
        assert_eq!(select_mime_type(&factory), Some("video/webm;codecs=vp9,opus"));
    }

    #[test]
    fn test_falls_back_to_mp4() {
        let factory = Supports(&["video/mp4"]);
        assert_eq!(select_mime_type(&factory), Some("video/mp4"));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("video/webm;codecs=vp8,opus"), "webm");
        assert_eq!(file_extension("video/mp4"), "mp4");
    }

    #[test]
    fn test_nothing_supported() {
        let factory = Supports(&["video/x-matroska"]);
        assert_eq!(select_mime_type(&factory), None);
    }
}
