use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::track::MediaStream;

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Towards the user (front camera)
    User,
    /// Away from the user
    Environment,
}

/// Display capture request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConstraints {
    /// Ask the share picker to include system/tab audio
    pub audio: bool,
    /// Preferred capture frame rate
    pub frame_rate: Option<u32>,
}

impl Default for DisplayConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            frame_rate: Some(30),
        }
    }
}

/// Microphone capture request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrophoneConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for MicrophoneConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Camera capture request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing_mode: FacingMode::User,
        }
    }
}

/// Why an acquisition failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquireError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture cancelled by the user")]
    Cancelled,

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Platform media acquisition
///
/// Each call is an independent, fallible request that suspends until the
/// platform grants or denies access. Implementations:
/// - [`SyntheticDevices`](super::synthetic::SyntheticDevices): generated sources for the demo and tests
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Capture a display: one video track plus an optional audio track
    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStream, AcquireError>;

    /// Capture the microphone: one audio track
    async fn get_microphone(
        &self,
        constraints: &MicrophoneConstraints,
    ) -> Result<MediaStream, AcquireError>;

    /// Capture a camera: one video track
    async fn get_camera(&self, constraints: &CameraConstraints)
        -> Result<MediaStream, AcquireError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
