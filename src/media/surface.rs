// Hidden video surfaces
//
// A surface is where a live track gets "played" so its frames can be read
// back by the compositor: the equivalent of an off-screen, muted,
// autoplaying video element. Surfaces can also be bound to a watch channel
// of tracks so they follow whatever source is current.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::track::{MediaTrack, TrackKind, VideoFrame};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("No source attached to surface {0}")]
    NoSource(String),

    #[error("Track {0} is not a video track")]
    NotVideo(String),

    #[error("Autoplay blocked for unmuted surface {0}")]
    AutoplayBlocked(String),
}

#[derive(Default)]
struct SurfaceInner {
    source: Option<MediaTrack>,
    playing: bool,
}

pub struct VideoSurface {
    label: String,
    muted: bool,
    autoplay: bool,
    inner: Mutex<SurfaceInner>,
}

impl VideoSurface {
    /// A muted, autoplaying surface that is never shown
    pub fn hidden(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            muted: true,
            autoplay: true,
            inner: Mutex::new(SurfaceInner::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Attach a source (or detach with `None`). Autoplay surfaces start playing.
    pub fn set_source(&self, track: Option<MediaTrack>) -> Result<(), SurfaceError> {
        if let Some(track) = &track {
            if track.kind() != TrackKind::Video {
                return Err(SurfaceError::NotVideo(track.label().to_string()));
            }
        }

        let mut inner = self.inner.lock();
        inner.playing = track.is_some() && self.autoplay && self.muted;
        inner.source = track;
        debug!(
            "Surface {} source set (playing={})",
            self.label, inner.playing
        );
        Ok(())
    }

    /// Start playback of the attached source
    pub fn play(&self) -> Result<(), SurfaceError> {
        // Unmuted media may not start without a user gesture
        if !self.muted {
            return Err(SurfaceError::AutoplayBlocked(self.label.clone()));
        }

        let mut inner = self.inner.lock();
        if inner.source.is_none() {
            return Err(SurfaceError::NoSource(self.label.clone()));
        }
        inner.playing = true;
        Ok(())
    }

    pub fn pause(&self) {
        self.inner.lock().playing = false;
    }

    /// Pause and drop the source
    pub fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.playing = false;
        inner.source = None;
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    /// Whether the attached source is still producing
    pub fn is_live(&self) -> bool {
        self.inner
            .lock()
            .source
            .as_ref()
            .map(|t| t.is_live())
            .unwrap_or(false)
    }

    /// Playing and at least one frame decoded
    pub fn is_ready(&self) -> bool {
        self.current_frame().is_some()
    }

    /// The frame currently shown, if playing
    pub fn current_frame(&self) -> Option<VideoFrame> {
        let inner = self.inner.lock();
        if !inner.playing {
            return None;
        }
        inner.source.as_ref().and_then(|t| t.latest_video())
    }

    /// Intrinsic size of the current frame
    pub fn video_size(&self) -> Option<(u32, u32)> {
        self.current_frame().map(|f| (f.width(), f.height()))
    }
}

/// Keep a surface attached to whichever track the channel currently holds
pub fn bind_on_change(
    surface: std::sync::Arc<VideoSurface>,
    mut tracks: watch::Receiver<Option<MediaTrack>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let current = tracks.borrow_and_update().clone();
            if let Err(e) = surface.set_source(current) {
                debug!("Surface {} rejected source: {}", surface.label(), e);
            }

            if tracks.changed().await.is_err() {
                break;
            }
        }

        surface.detach();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackSettings;
    use std::sync::Arc;

    #[test]
    fn test_hidden_surface_autoplays() {
        let surface = VideoSurface::hidden("display");
        let track = MediaTrack::video("display", TrackSettings::video(4, 4, 30.0));

        surface.set_source(Some(track.clone())).unwrap();
        assert!(surface.is_playing());
        assert!(!surface.is_ready(), "no frame decoded yet");

        track.push_video(VideoFrame::solid(4, 4, [10, 20, 30, 255], 0));
        assert!(surface.is_ready());
        assert_eq!(surface.video_size(), Some((4, 4)));

        surface.detach();
        assert!(!surface.is_playing());
        assert!(surface.current_frame().is_none());
    }

    #[test]
    fn test_play_without_source_fails() {
        let surface = VideoSurface::hidden("webcam");
        assert_eq!(
            surface.play(),
            Err(SurfaceError::NoSource("webcam".to_string()))
        );
    }

    #[test]
    fn test_audio_track_rejected() {
        let surface = VideoSurface::hidden("webcam");
        let mic = MediaTrack::audio("mic", TrackSettings::audio(48000, 1));
        assert!(surface.set_source(Some(mic)).is_err());
    }

    #[tokio::test]
    async fn test_bind_follows_channel() {
        let surface = Arc::new(VideoSurface::hidden("bubble"));
        let (tx, rx) = watch::channel(None);
        let binding = bind_on_change(Arc::clone(&surface), rx);

        let track = MediaTrack::video("cam", TrackSettings::video(2, 2, 30.0));
        track.push_video(VideoFrame::solid(2, 2, [0, 0, 255, 255], 0));
        tx.send_replace(Some(track));

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !surface.is_ready() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("surface never picked up the track");

        drop(tx);
        binding.await.unwrap();
        assert!(!surface.is_playing());
    }
}
