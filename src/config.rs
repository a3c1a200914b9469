use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

use crate::audio::MixerConfig;
use crate::compositor::{CompositorConfig, LayoutPreset};
use crate::media::synthetic::SyntheticConfig;
use crate::media::{CameraConstraints, DisplayConstraints, MicrophoneConstraints};
use crate::session::SessionConfig;

/// Environment overrides use this prefix, e.g. `BUBBLECAST__SERVICE__HTTP__PORT=8080`
pub const ENV_PREFIX: &str = "BUBBLECAST";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recording: RecordingConfig,
    pub compositor: CompositorConfig,
    pub webcam: WebcamConfig,
    pub layout: LayoutConfig,
    pub mixer: MixerConfig,
    pub status: StatusConfig,
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "bubblecast".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Ask the share picker for system audio
    pub system_audio: bool,
    pub microphone: bool,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub timeslice_ms: u64,
    pub stop_timeout_ms: u64,
    pub flush_grace_ms: u64,
    /// Where `record` writes finished recordings
    pub output_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            system_audio: session.display.audio,
            microphone: session.capture_microphone,
            echo_cancellation: session.microphone.echo_cancellation,
            noise_suppression: session.microphone.noise_suppression,
            timeslice_ms: session.timeslice_ms,
            stop_timeout_ms: session.stop_timeout_ms,
            flush_grace_ms: session.flush_grace_ms,
            output_dir: PathBuf::from("recordings"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebcamConfig {
    /// Turn the bubble on at startup
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        let camera = CameraConstraints::default();
        Self {
            enabled: false,
            width: camera.width,
            height: camera.height,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub preset: LayoutPreset,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub poll_interval_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
        }
    }
}

impl Config {
    /// Load an optional config file (any format the `config` crate knows,
    /// extension optional) plus `BUBBLECAST__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session settings assembled from the recording, compositor and mixer sections
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            display: DisplayConstraints {
                audio: self.recording.system_audio,
                frame_rate: Some(self.compositor.frame_rate),
            },
            capture_microphone: self.recording.microphone,
            microphone: MicrophoneConstraints {
                echo_cancellation: self.recording.echo_cancellation,
                noise_suppression: self.recording.noise_suppression,
            },
            timeslice_ms: self.recording.timeslice_ms,
            stop_timeout_ms: self.recording.stop_timeout_ms,
            flush_grace_ms: self.recording.flush_grace_ms,
            compositor: self.compositor.clone(),
            mixer: self.mixer.clone(),
        }
    }

    pub fn camera(&self) -> CameraConstraints {
        CameraConstraints {
            width: self.webcam.width,
            height: self.webcam.height,
            ..CameraConstraints::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load("config/does-not-exist").unwrap();
        assert_eq!(cfg.service.http.port, 3030);
        assert_eq!(cfg.compositor.frame_rate, 30);
        assert_eq!(cfg.session().stop_timeout_ms, 3000);
        assert_eq!(cfg.layout.preset, LayoutPreset::BottomLeft);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[service.http]
port = 9000

[recording]
microphone = false
timeslice_ms = 250

[layout]
preset = "top-right"

[mixer]
sample_rate = 44100
"#
        )
        .unwrap();

        let cfg = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.service.http.port, 9000);
        assert_eq!(cfg.service.http.bind, "127.0.0.1");
        assert_eq!(cfg.layout.preset, LayoutPreset::TopRight);

        let session = cfg.session();
        assert!(!session.capture_microphone);
        assert_eq!(session.timeslice_ms, 250);
        assert_eq!(session.mixer.sample_rate, 44100);
        assert_eq!(session.mixer.channels, 2);
    }
}
