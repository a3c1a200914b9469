use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::MixerConfig;
use crate::compositor::CompositorConfig;
use crate::media::{DisplayConstraints, MicrophoneConstraints};

/// Configuration for a capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Display capture request (system audio on by default)
    pub display: DisplayConstraints,

    /// Whether to ask for the microphone at all
    pub capture_microphone: bool,

    pub microphone: MicrophoneConstraints,

    /// Recorder chunk interval in milliseconds
    /// Default: 1000ms
    pub timeslice_ms: u64,

    /// How long to wait for the recorder to confirm a stop
    /// Default: 3000ms
    pub stop_timeout_ms: u64,

    /// Grace period for flushed data after the stop timeout
    /// Default: 500ms
    pub flush_grace_ms: u64,

    pub compositor: CompositorConfig,

    pub mixer: MixerConfig,
}

impl SessionConfig {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn flush_grace(&self) -> Duration {
        Duration::from_millis(self.flush_grace_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display: DisplayConstraints::default(),
            capture_microphone: true,
            microphone: MicrophoneConstraints::default(),
            timeslice_ms: 1000,
            stop_timeout_ms: 3000,
            flush_grace_ms: 500,
            compositor: CompositorConfig::default(),
            mixer: MixerConfig::default(),
        }
    }
}
