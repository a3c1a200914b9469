//! The recording studio
//!
//! Owns everything that outlives a single recording: the webcam, the bubble
//! layout, the object-URL registry and the current session. Sessions are
//! single-use, so every recording gets a fresh [`CaptureSession`].

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::compositor::{shared_layout, Layout, LayoutPreset};
use crate::media::{Blob, CameraConstraints, MediaDevices, ObjectUrlRegistry};
use crate::recorder::{Artifact, RecorderFactory};
use crate::session::{
    CaptureSession, SessionConfig, SessionContext, SessionError, SessionState, SessionStats,
};
use crate::sink::ArtifactSink;
use crate::webcam::{WebcamController, WebcamStatus};

/// Snapshot of the studio for display
#[derive(Debug, Clone, Serialize)]
pub struct StudioStatus {
    /// State of the current (or last) session
    pub state: Option<SessionState>,
    pub session: Option<SessionStats>,
    /// Elapsed recording time as `MM:SS`
    pub elapsed: String,
    pub webcam: WebcamStatus,
    pub webcam_enabled: bool,
    /// Bubble layout as drawn
    pub layout: Layout,
    /// Bubble layout being eased towards
    pub layout_target: Layout,
    /// Preview of the last finished recording
    pub preview_url: Option<String>,
}

pub struct Studio {
    context: SessionContext,
    config: SessionConfig,
    current: Mutex<Option<CaptureSession>>,
}

impl Studio {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        recorders: Arc<dyn RecorderFactory>,
        config: SessionConfig,
        camera: CameraConstraints,
        layout: Layout,
    ) -> Self {
        info!(
            "Studio ready (devices: {}, recorder: {})",
            devices.name(),
            recorders.name()
        );

        let webcam = Arc::new(WebcamController::new(Arc::clone(&devices), camera));
        Self {
            context: SessionContext {
                devices,
                recorders,
                webcam,
                layout: shared_layout(layout),
                urls: ObjectUrlRegistry::new(),
            },
            config,
            current: Mutex::new(None),
        }
    }

    /// Start a new session; only one may be live at a time
    pub async fn start_recording(&self) -> Result<CaptureSession, SessionError> {
        let session = {
            let mut current = self.current.lock();
            if let Some(previous) = current.as_ref() {
                if !previous.state().is_terminal() {
                    return Err(SessionError::AlreadyStarted);
                }
                if let Some(artifact) = previous.artifact() {
                    self.context.urls.revoke(&artifact.preview_url);
                }
            }

            let session = CaptureSession::new(self.context.clone(), self.config.clone());
            *current = Some(session.clone());
            session
        };

        session.start().await?;
        Ok(session)
    }

    /// Stop the current session and return its artifact
    pub async fn stop_recording(&self) -> Result<Artifact, SessionError> {
        let session = self
            .current_session()
            .ok_or(SessionError::NotRecording)?;
        let artifact = session.stop().await?;
        info!("Preview available at {}", artifact.preview_url);
        Ok(artifact)
    }

    /// Toggle the webcam bubble; rejected while a session is live
    pub async fn toggle_webcam(&self) -> Result<bool, SessionError> {
        if let Some(session) = self.current_session() {
            if session.state().is_active() {
                return Err(SessionError::WebcamLocked);
            }
        }
        Ok(self.context.webcam.toggle().await)
    }

    /// Move the bubble; takes effect on the next drawn frame
    pub fn set_layout(&self, layout: Layout) {
        self.context.layout.lock().set_target(layout);
    }

    pub fn set_layout_preset(&self, preset: LayoutPreset) {
        self.set_layout(preset.layout());
    }

    /// Resolve a preview URL handed out by a finished session
    pub fn preview(&self, url: &str) -> Option<Blob> {
        self.context.urls.resolve(url)
    }

    /// The last artifact, if `id` matches and its preview is still registered
    pub fn artifact(&self, id: Uuid) -> Option<Artifact> {
        self.current_session()
            .and_then(|session| session.artifact())
            .filter(|artifact| artifact.id == id)
            .filter(|artifact| self.context.urls.resolve(&artifact.preview_url).is_some())
    }

    /// Hand the last artifact to a sink
    pub async fn upload_last(&self, sink: &dyn ArtifactSink) -> Result<Uuid> {
        let artifact = self
            .current_session()
            .and_then(|session| session.artifact())
            .context("No finished recording to upload")?;

        let id = sink
            .upload(artifact.bytes().clone(), &artifact.content_type)
            .await
            .context("Upload failed")?;
        info!("Uploaded {} bytes as {}", artifact.size, id);
        Ok(id)
    }

    pub fn current_session(&self) -> Option<CaptureSession> {
        self.current.lock().clone()
    }

    pub fn webcam(&self) -> &Arc<WebcamController> {
        &self.context.webcam
    }

    pub fn urls(&self) -> &ObjectUrlRegistry {
        &self.context.urls
    }

    pub fn status(&self) -> StudioStatus {
        let session = self.current_session();
        let (layout, layout_target) = {
            let model = self.context.layout.lock();
            (model.current(), model.target())
        };

        StudioStatus {
            state: session.as_ref().map(CaptureSession::state),
            session: session.as_ref().map(CaptureSession::stats),
            elapsed: session
                .as_ref()
                .map(CaptureSession::elapsed_formatted)
                .unwrap_or_else(|| crate::timer::format_elapsed(0)),
            webcam: self.context.webcam.status(),
            webcam_enabled: self.context.webcam.is_enabled(),
            layout,
            layout_target,
            preview_url: session
                .and_then(|s| s.artifact())
                .map(|artifact| artifact.preview_url),
        }
    }

    /// Tear down the current session and turn the webcam off
    pub fn teardown(&self) {
        if let Some(session) = self.current.lock().take() {
            session.teardown();
        }
        self.context.webcam.disable();
        info!("Studio torn down");
    }
}

impl Drop for Studio {
    fn drop(&mut self) {
        self.teardown();
    }
}
