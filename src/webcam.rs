//! Webcam bubble source
//!
//! The camera is acquired independently of any recording session and can
//! be toggled while idle. The controller publishes the live camera track on
//! a watch channel so surfaces can follow it with
//! [`bind_on_change`](crate::media::bind_on_change).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::media::{CameraConstraints, MediaDevices, MediaStream, MediaTrack};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebcamStatus {
    Off,
    On,
    /// Last acquisition was denied or no camera was found
    Unavailable,
}

pub struct WebcamController {
    devices: Arc<dyn MediaDevices>,
    constraints: CameraConstraints,
    enabled: AtomicBool,
    source: Mutex<Option<MediaStream>>,
    track: watch::Sender<Option<MediaTrack>>,
    status: watch::Sender<WebcamStatus>,
    acquiring: tokio::sync::Mutex<()>,
}

impl WebcamController {
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: CameraConstraints) -> Self {
        let (track, _) = watch::channel(None);
        let (status, _) = watch::channel(WebcamStatus::Off);
        Self {
            devices,
            constraints,
            enabled: AtomicBool::new(false),
            source: Mutex::new(None),
            track,
            status,
            acquiring: tokio::sync::Mutex::new(()),
        }
    }

    /// Turn the camera on. Returns false, without an error, when it is unavailable.
    pub async fn enable(&self) -> bool {
        if self.acquire().await {
            self.enabled.store(true, Ordering::SeqCst);
            true
        } else {
            self.enabled.store(false, Ordering::SeqCst);
            false
        }
    }

    /// Turn the camera off and forget the intent. Idempotent.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.drop_source();
        self.status.send_replace(WebcamStatus::Off);
    }

    /// Flip between on and off; returns whether the camera is now on
    pub async fn toggle(&self) -> bool {
        if self.is_enabled() {
            self.disable();
            false
        } else {
            self.enable().await
        }
    }

    /// Acquire a camera if one is wanted but none is live
    pub async fn ensure_source(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.acquire().await
    }

    /// Stop the camera but remember that it was wanted
    pub fn release(&self) {
        if self.drop_source() {
            self.status.send_replace(WebcamStatus::Off);
            info!("Webcam released");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> WebcamStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<WebcamStatus> {
        self.status.subscribe()
    }

    /// The camera track, while it is live
    pub fn live_track(&self) -> Option<MediaTrack> {
        self.track.borrow().clone().filter(MediaTrack::is_live)
    }

    /// Follow the camera track as it is acquired and released
    pub fn subscribe(&self) -> watch::Receiver<Option<MediaTrack>> {
        self.track.subscribe()
    }

    async fn acquire(&self) -> bool {
        let _guard = self.acquiring.lock().await;
        if self.live_track().is_some() {
            return true;
        }

        match self.devices.get_camera(&self.constraints).await {
            Ok(stream) => {
                let Some(track) = stream.first_video() else {
                    warn!("Camera stream has no video track");
                    stream.stop_all();
                    self.status.send_replace(WebcamStatus::Unavailable);
                    return false;
                };

                // Replaces an ended source, if any
                if let Some(previous) = self.source.lock().replace(stream) {
                    previous.stop_all();
                }
                info!("Webcam on: {}", track.label());
                self.track.send_replace(Some(track));
                self.status.send_replace(WebcamStatus::On);
                true
            }
            Err(e) => {
                warn!("Webcam unavailable: {}", e);
                self.status.send_replace(WebcamStatus::Unavailable);
                false
            }
        }
    }

    fn drop_source(&self) -> bool {
        let source = self.source.lock().take();
        self.track.send_replace(None);
        match source {
            Some(stream) => {
                stream.stop_all();
                true
            }
            None => false,
        }
    }
}
