use thiserror::Error;

use crate::media::AcquireError;
use crate::recorder::RecorderError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Display capture failed: {0}")]
    DisplayCapture(AcquireError),

    #[error("No supported recording format")]
    NoSupportedFormat,

    #[error("Failed to create recorder: {0}")]
    RecorderCreate(RecorderError),

    #[error("Failed to start recorder: {0}")]
    RecorderStart(RecorderError),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Recorder went away before the recording was finalized")]
    RecorderClosed,

    #[error("Recorder stopped before the recording began")]
    StoppedBeforeRecording,

    #[error("No data recorded")]
    NoDataRecorded,

    #[error("No active recording")]
    NotRecording,

    #[error("Recording already stopped")]
    AlreadyStopped,

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Webcam cannot be toggled while a recording is active")]
    WebcamLocked,

    #[error("Session torn down")]
    TornDown,

    #[error("Stop was interrupted before the recorder settled")]
    StopInterrupted,
}
