//! Live media tracks and streams
//!
//! A [`MediaTrack`] is a single audio or video feed handed out by the
//! platform. Video tracks hold their most recent frame (late subscribers see
//! the current picture immediately); audio tracks broadcast every frame.
//!
//! Tracks have an independent lifecycle. [`MediaTrack::stop`] is a local
//! stop and does not wake ended observers; [`MediaTrack::end`] is the
//! platform ending the feed (for example the user revoking a screen share)
//! and does.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use super::devices::FacingMode;
use crate::audio::AudioFrame;

const AUDIO_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Producing media
    Live,
    /// Stopped by its owner
    Stopped,
    /// Ended by the platform
    Ended,
}

/// Capture settings reported by the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub facing_mode: Option<FacingMode>,
}

impl TrackSettings {
    pub fn video(width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            frame_rate: Some(frame_rate),
            ..Default::default()
        }
    }

    pub fn audio(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            channels: Some(channels),
            ..Default::default()
        }
    }
}

/// A decoded video frame
///
/// The raster is shared, so cloning a frame through a watch channel is cheap.
#[derive(Clone, PartialEq)]
pub struct VideoFrame {
    image: Arc<RgbaImage>,
    pub timestamp_ms: u64,
}

impl VideoFrame {
    pub fn new(image: RgbaImage, timestamp_ms: u64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp_ms,
        }
    }

    /// A frame filled with one RGBA colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], timestamp_ms: u64) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba(rgba)), timestamp_ms)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// RGBA pixel at (x, y); transparent black when out of bounds
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image
            .get_pixel_checked(x, y)
            .map(|p| p.0)
            .unwrap_or([0, 0, 0, 0])
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

enum TrackMedia {
    Video(watch::Sender<Option<VideoFrame>>),
    Audio(broadcast::Sender<AudioFrame>),
}

struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    label: String,
    settings: TrackSettings,
    state: watch::Sender<TrackState>,
    media: TrackMedia,
}

/// Handle to a live audio or video feed; clones share the same feed
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn video(label: impl Into<String>, settings: TrackSettings) -> Self {
        let (frames, _) = watch::channel(None);
        Self::with_media(TrackKind::Video, label.into(), settings, TrackMedia::Video(frames))
    }

    pub fn audio(label: impl Into<String>, settings: TrackSettings) -> Self {
        let (frames, _) = broadcast::channel(AUDIO_BROADCAST_CAPACITY);
        Self::with_media(TrackKind::Audio, label.into(), settings, TrackMedia::Audio(frames))
    }

    fn with_media(kind: TrackKind, label: String, settings: TrackSettings, media: TrackMedia) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                label,
                settings,
                state,
                media,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn settings(&self) -> &TrackSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Stop the track locally. Ended observers are not woken with `Ended`.
    pub fn stop(&self) {
        self.transition(TrackState::Stopped);
    }

    /// The platform ended the track
    pub fn end(&self) {
        self.transition(TrackState::Ended);
    }

    fn transition(&self, next: TrackState) {
        self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Wait until the track is no longer live and return how it finished
    pub async fn ended(&self) -> TrackState {
        let mut rx = self.inner.state.subscribe();
        let finished = rx
            .wait_for(|state| *state != TrackState::Live)
            .await
            .map(|state| *state);
        finished.unwrap_or(TrackState::Ended)
    }

    /// Publish a video frame. Returns false if the track is not a live video track.
    pub fn push_video(&self, frame: VideoFrame) -> bool {
        match &self.inner.media {
            TrackMedia::Video(frames) if self.is_live() => {
                frames.send_replace(Some(frame));
                true
            }
            _ => false,
        }
    }

    /// Most recent video frame, if any has been produced
    pub fn latest_video(&self) -> Option<VideoFrame> {
        match &self.inner.media {
            TrackMedia::Video(frames) => frames.borrow().clone(),
            TrackMedia::Audio(_) => None,
        }
    }

    pub fn subscribe_video(&self) -> Option<watch::Receiver<Option<VideoFrame>>> {
        match &self.inner.media {
            TrackMedia::Video(frames) => Some(frames.subscribe()),
            TrackMedia::Audio(_) => None,
        }
    }

    /// Publish an audio frame. Returns false if the track is not a live audio track.
    pub fn push_audio(&self, frame: AudioFrame) -> bool {
        match &self.inner.media {
            TrackMedia::Audio(frames) if self.is_live() => {
                // No subscribers is fine: nobody is listening yet
                let _ = frames.send(frame);
                true
            }
            _ => false,
        }
    }

    pub fn subscribe_audio(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        match &self.inner.media {
            TrackMedia::Audio(frames) => Some(frames.subscribe()),
            TrackMedia::Video(_) => None,
        }
    }

    /// Whether two handles refer to the same underlying feed
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

/// An ordered set of tracks
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn add_track(&mut self, track: MediaTrack) {
        if !self.tracks.iter().any(|t| t.same_track(&track)) {
            self.tracks.push(track);
        }
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn first_video(&self) -> Option<MediaTrack> {
        self.video_tracks().next().cloned()
    }

    pub fn first_audio(&self) -> Option<MediaTrack> {
        self.audio_tracks().next().cloned()
    }

    /// Stop every track in the stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioStreamSource;

    #[test]
    fn test_video_frame_pixels() {
        let frame = VideoFrame::solid(4, 3, [10, 20, 30, 255], 7);
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.pixel(3, 2), [10, 20, 30, 255]);
        assert_eq!(frame.pixel(4, 0), [0, 0, 0, 0]);
        assert_eq!(frame.clone(), frame);
    }

    #[test]
    fn test_stop_is_not_ended() {
        let track = MediaTrack::video("display", TrackSettings::video(64, 36, 30.0));
        track.stop();
        assert_eq!(track.state(), TrackState::Stopped);

        // A stopped track cannot end afterwards
        track.end();
        assert_eq!(track.state(), TrackState::Stopped);
    }

    #[test]
    fn test_video_frames_rejected_after_stop() {
        let track = MediaTrack::video("display", TrackSettings::video(2, 2, 30.0));
        assert!(track.push_video(VideoFrame::solid(2, 2, [1, 2, 3, 255], 0)));
        track.stop();
        assert!(!track.push_video(VideoFrame::solid(2, 2, [9, 9, 9, 255], 33)));
        assert_eq!(track.latest_video().map(|f| f.pixel(0, 0)), Some([1, 2, 3, 255]));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let audio = MediaTrack::audio("mic", TrackSettings::audio(48000, 1));
        assert!(!audio.push_video(VideoFrame::solid(1, 1, [0, 0, 0, 255], 0)));
        assert!(audio.subscribe_video().is_none());

        let video = MediaTrack::video("cam", TrackSettings::default());
        let frame = AudioFrame {
            samples: vec![0; 4],
            sample_rate: 48000,
            channels: 1,
            timestamp_ms: 0,
            source: AudioStreamSource::Microphone,
        };
        assert!(!video.push_audio(frame));
    }

    #[tokio::test]
    async fn test_ended_wakes_observer() {
        let track = MediaTrack::video("display", TrackSettings::default());
        let observer = {
            let track = track.clone();
            tokio::spawn(async move { track.ended().await })
        };

        track.end();
        assert_eq!(observer.await.unwrap(), TrackState::Ended);
    }

    #[test]
    fn test_stream_partitions_tracks() {
        let video = MediaTrack::video("display", TrackSettings::default());
        let audio = MediaTrack::audio("system", TrackSettings::audio(48000, 2));
        let mut stream = MediaStream::new(vec![video.clone()]);
        stream.add_track(audio.clone());
        stream.add_track(audio.clone());

        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(stream.first_video(), Some(video.clone()));
        assert_eq!(stream.first_audio(), Some(audio.clone()));

        stream.stop_all();
        assert!(!video.is_live());
        assert!(!audio.is_live());
    }
}
