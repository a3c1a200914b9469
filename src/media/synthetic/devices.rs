use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::audio::{AudioFile, AudioFrame, AudioStreamSource};
use crate::media::devices::{
    AcquireError, CameraConstraints, DisplayConstraints, MediaDevices, MicrophoneConstraints,
};
use crate::media::track::{MediaStream, MediaTrack, TrackSettings, VideoFrame};

/// Audio frames are produced in 20ms packets
const AUDIO_PACKET_MS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Display,
    Microphone,
    Camera,
}

/// Shape of the generated sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub display_width: u32,
    pub display_height: u32,
    pub frame_rate: u32,
    /// Offer a system audio track with display captures that ask for audio
    pub system_audio: bool,
    pub sample_rate: u32,
    pub channels: u16,
    /// Tone frequency of generated audio
    pub tone_hz: f64,
    /// Play this WAV file as the microphone instead of a tone
    pub microphone_file: Option<PathBuf>,
    /// Time the permission prompt takes to resolve
    pub prompt_delay_ms: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            display_width: 1280,
            display_height: 720,
            frame_rate: 30,
            system_audio: true,
            sample_rate: 48000,
            channels: 2,
            tone_hz: 440.0,
            microphone_file: None,
            prompt_delay_ms: 0,
        }
    }
}

/// Generated media sources
///
/// Every acquisition yields fresh live tracks fed by background generators
/// that exit once their track stops or ends. Individual devices can be made
/// to fail, and issued tracks can be inspected (for example to end the
/// display track as if the user revoked the share).
pub struct SyntheticDevices {
    config: SyntheticConfig,
    denied: Mutex<HashMap<DeviceKind, AcquireError>>,
    issued: Mutex<HashMap<DeviceKind, Vec<MediaTrack>>>,
}

impl SyntheticDevices {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            denied: Mutex::new(HashMap::new()),
            issued: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Make every following request for `kind` fail with `error`
    pub fn deny(&self, kind: DeviceKind, error: AcquireError) {
        self.denied.lock().insert(kind, error);
    }

    pub fn allow(&self, kind: DeviceKind) {
        self.denied.lock().remove(&kind);
    }

    /// How many acquisitions of `kind` succeeded
    pub fn acquisitions(&self, kind: DeviceKind) -> usize {
        self.issued.lock().get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Tracks handed out by the most recent successful acquisition of `kind`
    pub fn last_issued(&self, kind: DeviceKind) -> Option<MediaTrack> {
        self.issued.lock().get(&kind).and_then(|t| t.last().cloned())
    }

    async fn prompt(&self, kind: DeviceKind) -> Result<(), AcquireError> {
        if self.config.prompt_delay_ms > 0 {
            time::sleep(Duration::from_millis(self.config.prompt_delay_ms)).await;
        }

        if let Some(error) = self.denied.lock().get(&kind).cloned() {
            debug!("Synthetic {:?} request denied: {}", kind, error);
            return Err(error);
        }
        Ok(())
    }

    fn record(&self, kind: DeviceKind, track: &MediaTrack) {
        self.issued.lock().entry(kind).or_default().push(track.clone());
    }

    fn tone_track(&self, label: &str, source: AudioStreamSource) -> MediaTrack {
        let track = MediaTrack::audio(
            label,
            TrackSettings::audio(self.config.sample_rate, self.config.channels),
        );
        spawn_tone(
            track.clone(),
            self.config.sample_rate,
            self.config.channels,
            self.config.tone_hz,
            source,
        );
        track
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait::async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStream, AcquireError> {
        self.prompt(DeviceKind::Display).await?;

        let frame_rate = constraints.frame_rate.unwrap_or(self.config.frame_rate).max(1);
        let (width, height) = (self.config.display_width, self.config.display_height);
        let video = MediaTrack::video("screen", TrackSettings::video(width, height, frame_rate as f64));
        spawn_video(video.clone(), frame_rate, move |n, ts| test_pattern(width, height, n, ts));
        self.record(DeviceKind::Display, &video);

        let mut stream = MediaStream::new(vec![video]);
        if constraints.audio && self.config.system_audio {
            stream.add_track(self.tone_track("system-audio", AudioStreamSource::System));
        }

        info!(
            "Synthetic display granted: {}x{} @ {}fps ({} tracks)",
            width,
            height,
            frame_rate,
            stream.tracks().len()
        );
        Ok(stream)
    }

    async fn get_microphone(
        &self,
        _constraints: &MicrophoneConstraints,
    ) -> Result<MediaStream, AcquireError> {
        self.prompt(DeviceKind::Microphone).await?;

        let track = match &self.config.microphone_file {
            Some(path) => {
                let file = AudioFile::open(path)
                    .map_err(|e| AcquireError::NotFound(format!("{}: {:#}", path.display(), e)))?;
                let track = MediaTrack::audio(
                    "microphone",
                    TrackSettings::audio(file.sample_rate, file.channels),
                );
                spawn_file_playback(track.clone(), file);
                track
            }
            None => self.tone_track("microphone", AudioStreamSource::Microphone),
        };

        self.record(DeviceKind::Microphone, &track);
        info!("Synthetic microphone granted");
        Ok(MediaStream::new(vec![track]))
    }

    async fn get_camera(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<MediaStream, AcquireError> {
        self.prompt(DeviceKind::Camera).await?;

        let (width, height) = (constraints.width.max(1), constraints.height.max(1));
        let settings = TrackSettings {
            facing_mode: Some(constraints.facing_mode),
            ..TrackSettings::video(width, height, self.config.frame_rate as f64)
        };
        let track = MediaTrack::video("camera", settings);
        spawn_video(track.clone(), self.config.frame_rate, move |n, ts| {
            gradient(width, height, n, ts)
        });

        self.record(DeviceKind::Camera, &track);
        info!("Synthetic camera granted: {}x{}", width, height);
        Ok(MediaStream::new(vec![track]))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

fn spawn_video<F>(track: MediaTrack, frame_rate: u32, render: F)
where
    F: Fn(u64, u64) -> VideoFrame + Send + 'static,
{
    tokio::spawn(async move {
        let period = Duration::from_micros(1_000_000 / frame_rate.max(1) as u64);
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut n = 0u64;
        loop {
            ticker.tick().await;
            let timestamp_ms = n * period.as_micros() as u64 / 1000;
            if !track.push_video(render(n, timestamp_ms)) {
                break;
            }
            n += 1;
        }
        debug!("Video generator for {} exited", track.label());
    });
}

fn spawn_tone(
    track: MediaTrack,
    sample_rate: u32,
    channels: u16,
    tone_hz: f64,
    source: AudioStreamSource,
) {
    tokio::spawn(async move {
        let mut ticker = time::interval(Duration::from_millis(AUDIO_PACKET_MS));
        let per_packet = (sample_rate as u64 * AUDIO_PACKET_MS / 1000) as usize;
        let mut position = 0u64;

        loop {
            ticker.tick().await;
            let samples = (0..per_packet)
                .flat_map(|i| {
                    let t = (position + i as u64) as f64 / sample_rate as f64;
                    let value = ((2.0 * PI * tone_hz * t).sin() * 8000.0) as i16;
                    std::iter::repeat(value).take(channels as usize)
                })
                .collect();

            let frame = AudioFrame {
                samples,
                sample_rate,
                channels,
                timestamp_ms: position * 1000 / sample_rate.max(1) as u64,
                source,
            };
            if !track.push_audio(frame) {
                break;
            }
            position += per_packet as u64;
        }
        debug!("Tone generator for {} exited", track.label());
    });
}

/// Loop the file as 20ms packets
fn spawn_file_playback(track: MediaTrack, file: AudioFile) {
    tokio::spawn(async move {
        let packets = file.frames(AUDIO_PACKET_MS, AudioStreamSource::Microphone);
        if packets.is_empty() {
            return;
        }

        let loop_ms = packets.len() as u64 * AUDIO_PACKET_MS;
        let mut ticker = time::interval(Duration::from_millis(AUDIO_PACKET_MS));
        let mut pass = 0u64;

        'playback: loop {
            for packet in &packets {
                ticker.tick().await;
                let frame = AudioFrame {
                    timestamp_ms: packet.timestamp_ms + pass * loop_ms,
                    ..packet.clone()
                };
                if !track.push_audio(frame) {
                    break 'playback;
                }
            }
            pass += 1;
        }
        debug!("File playback of {} exited", file.path);
    });
}

/// Vertical colour bars scrolling one bar per second
pub fn test_pattern(width: u32, height: u32, n: u64, timestamp_ms: u64) -> VideoFrame {
    const BARS: [[u8; 4]; 7] = [
        [192, 192, 192, 255],
        [192, 192, 0, 255],
        [0, 192, 192, 255],
        [0, 192, 0, 255],
        [192, 0, 192, 255],
        [192, 0, 0, 255],
        [0, 0, 192, 255],
    ];

    let bar_width = (width / BARS.len() as u32).max(1);
    let shift = (n / 30) as usize;
    let image = RgbaImage::from_fn(width, height, |x, _| {
        Rgba(BARS[((x / bar_width) as usize + shift) % BARS.len()])
    });
    VideoFrame::new(image, timestamp_ms)
}

/// Diagonal gradient that drifts over time
pub fn gradient(width: u32, height: u32, n: u64, timestamp_ms: u64) -> VideoFrame {
    let phase = (n % 256) as u32;
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let r = ((x * 255 / width.max(1)) + phase) % 256;
        let g = ((y * 255 / height.max(1)) + phase) % 256;
        Rgba([r as u8, g as u8, 160, 255])
    });
    VideoFrame::new(image, timestamp_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackKind;

    fn small() -> SyntheticDevices {
        SyntheticDevices::new(SyntheticConfig {
            display_width: 32,
            display_height: 18,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_with_system_audio() {
        let devices = small();
        let stream = devices
            .get_display_media(&DisplayConstraints::default())
            .await
            .unwrap();

        assert_eq!(stream.tracks().len(), 2);
        let video = stream.first_video().unwrap();
        assert_eq!(video.settings().width, Some(32));

        time::sleep(Duration::from_millis(50)).await;
        assert!(video.latest_video().is_some());

        stream.stop_all();
        assert_eq!(devices.acquisitions(DeviceKind::Display), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_without_audio() {
        let devices = small();
        let constraints = DisplayConstraints {
            audio: false,
            ..Default::default()
        };
        let stream = devices.get_display_media(&constraints).await.unwrap();
        assert!(stream.first_audio().is_none());
        stream.stop_all();
    }

    #[tokio::test]
    async fn test_denied_device() {
        let devices = small();
        devices.deny(
            DeviceKind::Camera,
            AcquireError::PermissionDenied("camera".to_string()),
        );

        let result = devices.get_camera(&CameraConstraints::default()).await;
        assert!(matches!(result, Err(AcquireError::PermissionDenied(_))));
        assert_eq!(devices.acquisitions(DeviceKind::Camera), 0);

        devices.allow(DeviceKind::Camera);
        let stream = devices.get_camera(&CameraConstraints::default()).await.unwrap();
        let camera = stream.first_video().unwrap();
        assert_eq!(camera.kind(), TrackKind::Video);
        assert_eq!(camera.settings().width, Some(640));
        stream.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_microphone_tone_packets() {
        let devices = small();
        let stream = devices
            .get_microphone(&MicrophoneConstraints::default())
            .await
            .unwrap();
        let mic = stream.first_audio().unwrap();
        let mut rx = mic.subscribe_audio().unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.sample_rate, 48000);
        assert_eq!(frame.frame_count(), 960);
        assert_eq!(frame.source, AudioStreamSource::Microphone);
        stream.stop_all();
    }

    #[test]
    fn test_pattern_dimensions() {
        let frame = test_pattern(14, 2, 0, 0);
        assert_eq!((frame.width(), frame.height()), (14, 2));
        assert_ne!(frame.pixel(0, 0), frame.pixel(13, 0));
    }
}
