use super::config::SessionConfig;
use super::error::SessionError;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::audio::{AudioStreamSource, MixerGraph};
use crate::compositor::{self, Compositor, SharedLayout};
use crate::media::{
    bind_on_change, AcquireError, MediaDevices, MediaStream, MediaTrack, ObjectUrlRegistry, TrackState,
    VideoSurface,
};
use crate::recorder::{self, Artifact, ChunkBuffer, MediaRecorder, RecorderEvent, RecorderFactory};
use crate::timer::Timer;
use crate::webcam::WebcamController;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type StopOutcome = Result<Artifact, SessionError>;

/// Collaborators a session records with
#[derive(Clone)]
pub struct SessionContext {
    pub devices: Arc<dyn MediaDevices>,
    pub recorders: Arc<dyn RecorderFactory>,
    pub webcam: Arc<WebcamController>,
    pub layout: SharedLayout,
    pub urls: ObjectUrlRegistry,
}

/// Resources owned while recording; released by cleanup
#[derive(Default)]
struct Resources {
    display: Option<MediaStream>,
    microphone: Option<MediaStream>,
    final_stream: Option<MediaStream>,
    mixer: Option<MixerGraph>,
    compositor: Option<Compositor>,
    surfaces: Vec<Arc<VideoSurface>>,
    tasks: Vec<JoinHandle<()>>,
}

/// What the session looked like while it ran; kept after cleanup
#[derive(Default)]
struct Observed {
    display: Option<MediaStream>,
    final_stream: Option<MediaStream>,
    frames: Option<Arc<AtomicU64>>,
    overlay_active: bool,
    audio_sources: usize,
    started_at: Option<DateTime<Utc>>,
    mime_type: Option<String>,
}

struct Inner {
    id: Uuid,
    config: SessionConfig,
    context: SessionContext,

    state: watch::Sender<SessionState>,
    error: Mutex<Option<SessionError>>,

    resources: Mutex<Resources>,
    observed: Mutex<Observed>,
    recorder: Mutex<Option<Box<dyn MediaRecorder>>>,
    chunks: Mutex<ChunkBuffer>,
    artifact: Mutex<Option<Artifact>>,
    timer: Timer,

    /// Pending stop; taken exactly once by whichever outcome fires first
    completion: Mutex<Option<oneshot::Sender<StopOutcome>>>,
    finalized: AtomicBool,
    cleaned_up: AtomicBool,
    cleanup_runs: AtomicUsize,
}

/// One recording, from source acquisition to sealed artifact
///
/// A session is single-use: once Stopped or Failed, construct a new one.
/// Clones share the same session; the last one dropped tears it down.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<Inner>,
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    pub fn new(context: SessionContext, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let id = Uuid::new_v4();
        debug!("Creating capture session {}", id);

        Self {
            inner: Arc::new(Inner {
                id,
                config,
                context,
                state,
                error: Mutex::new(None),
                resources: Mutex::new(Resources::default()),
                observed: Mutex::new(Observed::default()),
                recorder: Mutex::new(None),
                chunks: Mutex::new(ChunkBuffer::new()),
                artifact: Mutex::new(None),
                timer: Timer::new(),
                completion: Mutex::new(None),
                finalized: AtomicBool::new(false),
                cleaned_up: AtomicBool::new(false),
                cleanup_runs: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Acquire sources, assemble the final stream and start the recorder
    pub async fn start(&self) -> Result<(), SessionError> {
        self.inner.start().await
    }

    /// Stop the recorder and wait for the sealed artifact
    pub async fn stop(&self) -> Result<Artifact, SessionError> {
        self.inner.stop().await
    }

    /// Release everything; a session that is not finished fails with `TornDown`
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn error_message(&self) -> Option<String> {
        self.inner.error.lock().as_ref().map(ToString::to_string)
    }

    pub fn artifact(&self) -> Option<Artifact> {
        self.inner.artifact.lock().clone()
    }

    /// The stream handed to the recorder
    pub fn final_stream(&self) -> Option<MediaStream> {
        self.inner.observed.lock().final_stream.clone()
    }

    /// The acquired display stream
    pub fn display_stream(&self) -> Option<MediaStream> {
        self.inner.observed.lock().display.clone()
    }

    /// Frames drawn by the compositor, when the webcam bubble is active
    pub fn compositor_frames(&self) -> Option<u64> {
        self.inner
            .observed
            .lock()
            .frames
            .as_ref()
            .map(|frames| frames.load(Ordering::SeqCst))
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.inner.timer.elapsed_secs()
    }

    /// Elapsed time as `MM:SS`
    pub fn elapsed_formatted(&self) -> String {
        self.inner.timer.formatted()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.inner.timer.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.inner.stats()
    }
}

impl Inner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        debug_assert!(from.can_transition_to(to));
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            info!("Session {}: {} -> {}", self.id, from, to);
        }
        moved
    }

    /// Move to Failed from any non-terminal state that allows it
    fn mark_failed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.can_transition_to(SessionState::Failed) {
                *state = SessionState::Failed;
                true
            } else {
                false
            }
        })
    }

    /// Still acquiring, i.e. not torn down while suspended on the platform
    fn ensure_acquiring(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Acquiring => Ok(()),
            _ => Err(SessionError::TornDown),
        }
    }

    async fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        if !self.transition(SessionState::Idle, SessionState::Acquiring) {
            return Err(SessionError::AlreadyStarted);
        }

        match self.acquire_and_record().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(e.clone());
                // Torn down mid-start: release what was created after cleanup ran
                self.release(std::mem::take(&mut *self.resources.lock()));
                drop(self.recorder.lock().take());
                Err(e)
            }
        }
    }

    async fn acquire_and_record(self: &Arc<Self>) -> Result<(), SessionError> {
        let devices = Arc::clone(&self.context.devices);

        // 1. Display (fatal)
        let display = devices
            .get_display_media(&self.config.display)
            .await
            .map_err(SessionError::DisplayCapture)?;
        let display_video = match display.first_video() {
            Some(track) => track,
            None => {
                display.stop_all();
                return Err(SessionError::DisplayCapture(AcquireError::Platform(
                    "display stream has no video track".to_string(),
                )));
            }
        };
        if let Err(e) = self.ensure_acquiring() {
            display.stop_all();
            return Err(e);
        }
        self.resources.lock().display = Some(display.clone());
        self.observed.lock().display = Some(display.clone());

        // 2. Microphone (degraded)
        let microphone = if self.config.capture_microphone {
            match devices.get_microphone(&self.config.microphone).await {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!("Recording without microphone: {}", e);
                    None
                }
            }
        } else {
            None
        };
        if let Err(e) = self.ensure_acquiring() {
            if let Some(stream) = &microphone {
                stream.stop_all();
            }
            return Err(e);
        }
        self.resources.lock().microphone = microphone.clone();

        // 3. Webcam (degraded)
        let webcam = &self.context.webcam;
        if webcam.is_enabled() && webcam.live_track().is_none() && !webcam.ensure_source().await {
            warn!("Recording without webcam bubble");
        }
        self.ensure_acquiring()?;
        let webcam_track = webcam.live_track();

        // 4. Audio mix
        let mut audio_sources = Vec::new();
        if let Some(track) = display.first_audio() {
            audio_sources.push((AudioStreamSource::System, track));
        }
        if let Some(track) = microphone.as_ref().and_then(MediaStream::first_audio) {
            audio_sources.push((AudioStreamSource::Microphone, track));
        }
        let mixer = MixerGraph::connect(audio_sources, self.config.mixer.clone());
        let mixed_audio = mixer.as_ref().map(|graph| graph.output_track().clone());
        let audio_count = mixer.as_ref().map(MixerGraph::source_count).unwrap_or(0);

        // 5. Video: composite when the bubble is on, raw display otherwise
        let video = match webcam_track {
            Some(_) => self.start_compositor(&display_video),
            None => display_video.clone(),
        };

        // 6. The user revoking the share ends the recording
        let observer = tokio::spawn(observe_display_end(Arc::downgrade(self), display_video.clone()));

        // 7. Final stream
        let mut tracks = vec![video];
        tracks.extend(mixed_audio);
        let final_stream = MediaStream::new(tracks);

        {
            let mut resources = self.resources.lock();
            resources.mixer = mixer;
            resources.final_stream = Some(final_stream.clone());
            resources.tasks.push(observer);
        }
        {
            let mut observed = self.observed.lock();
            observed.final_stream = Some(final_stream.clone());
            observed.audio_sources = audio_count;
        }

        // 8. Container/codec
        let recorders = Arc::clone(&self.context.recorders);
        let mime_type = recorder::select_mime_type(recorders.as_ref()).ok_or(SessionError::NoSupportedFormat)?;
        self.observed.lock().mime_type = Some(mime_type.to_string());

        // 9. Recorder and its event pump
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut recorder = recorders
            .create(final_stream, mime_type, events_tx)
            .map_err(SessionError::RecorderCreate)?;
        tokio::spawn(pump_events(Arc::downgrade(self), events_rx));
        recorder
            .start(self.config.timeslice())
            .map_err(SessionError::RecorderStart)?;
        *self.recorder.lock() = Some(recorder);

        // 10. Recording, unless the recorder already stopped or failed
        if !self.transition(SessionState::Acquiring, SessionState::Recording) {
            return Err(self.error.lock().clone().unwrap_or(SessionError::TornDown));
        }
        self.observed.lock().started_at = Some(Utc::now());
        self.timer.start();
        // Finalized in between: cleanup already ran, so the timer must not keep going
        if self.finalized.load(Ordering::SeqCst) {
            self.timer.stop();
            if let Some(error) = self.error.lock().clone() {
                return Err(error);
            }
        }

        info!(
            "Session {} recording via {} ({}, bubble: {}, audio sources: {})",
            self.id,
            recorders.name(),
            mime_type,
            self.observed.lock().overlay_active,
            audio_count
        );
        Ok(())
    }

    /// Start drawing the display with the webcam bubble; returns the canvas track
    fn start_compositor(&self, display_video: &MediaTrack) -> MediaTrack {
        let config = &self.config.compositor;

        let background = Arc::new(VideoSurface::hidden("display"));
        if let Err(e) = background.set_source(Some(display_video.clone())) {
            warn!("Display surface rejected source: {}", e);
        }
        let foreground = Arc::new(VideoSurface::hidden("webcam"));
        let binding = bind_on_change(Arc::clone(&foreground), self.context.webcam.subscribe());

        let size = compositor::canvas_size_for(display_video.settings(), config);
        let compositor = Compositor::start(
            Arc::clone(&background),
            Some(Arc::clone(&foreground)),
            Arc::clone(&self.context.layout),
            size,
            config,
        );
        let canvas = compositor.output_track().clone();

        {
            let mut observed = self.observed.lock();
            observed.frames = Some(compositor.frame_counter());
            observed.overlay_active = true;
        }

        let mut resources = self.resources.lock();
        resources.compositor = Some(compositor);
        resources.surfaces.push(background);
        resources.surfaces.push(foreground);
        resources.tasks.push(binding);
        canvas
    }

    async fn stop(&self) -> StopOutcome {
        let mut rx = {
            let mut completion = self.completion.lock();
            let (tx, rx) = oneshot::channel();
            if !self.transition(SessionState::Recording, SessionState::Stopping) {
                return Err(match self.state() {
                    SessionState::Stopping | SessionState::Stopped => SessionError::AlreadyStopped,
                    _ => SessionError::NotRecording,
                });
            }
            *completion = Some(tx);
            rx
        };

        self.timer.stop();

        let requested = self.recorder.lock().as_mut().map(|recorder| recorder.stop());
        match requested {
            Some(Ok(())) => {}
            Some(Err(e)) => self.fail(SessionError::Recorder(e.to_string())),
            None => self.fail(SessionError::RecorderClosed),
        }

        match time::timeout(self.config.stop_timeout(), &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(SessionError::StopInterrupted)),
            Err(_) => {
                warn!(
                    "Session {}: no stop confirmation within {:?}, flushing buffered data",
                    self.id,
                    self.config.stop_timeout()
                );
                let flushed = self.recorder.lock().as_mut().map(|recorder| recorder.request_data());
                if let Some(Err(e)) = flushed {
                    warn!("Recorder refused to flush: {}", e);
                }

                time::sleep(self.config.flush_grace()).await;
                self.finalize();
                rx.await.unwrap_or(Err(SessionError::StopInterrupted))
            }
        }
    }

    /// Seal the chunks, settle the pending stop and clean up
    fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        // Nothing past Acquiring can settle a stop, so the session fails instead
        if self.state() == SessionState::Acquiring {
            self.record_failure(&SessionError::StoppedBeforeRecording);
            self.cleanup();
            self.settle(Err(SessionError::StoppedBeforeRecording));
            return;
        }

        let mime_type = self.observed.lock().mime_type.clone().unwrap_or_default();
        let sealed = self.chunks.lock().seal(&mime_type);

        let outcome = match sealed {
            Some(blob) => {
                let preview_url = self.context.urls.create_object_url(&blob);
                let artifact = Artifact::new(blob, preview_url, self.timer.elapsed_secs());
                info!(
                    "Session {}: artifact sealed ({} bytes, {})",
                    self.id, artifact.size, artifact.content_type
                );
                *self.artifact.lock() = Some(artifact.clone());

                // A recorder that stops on its own skips the Stopping request
                self.transition(SessionState::Recording, SessionState::Stopping);
                self.transition(SessionState::Stopping, SessionState::Stopped);
                Ok(artifact)
            }
            None => {
                self.record_failure(&SessionError::NoDataRecorded);
                Err(SessionError::NoDataRecorded)
            }
        };

        self.cleanup();
        self.settle(outcome);
    }

    /// Fatal error: Failed, cleanup, settle the pending stop with the error
    fn fail(&self, error: SessionError) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.record_failure(&error);
        self.cleanup();
        self.settle(Err(error));
    }

    fn record_failure(&self, error: &SessionError) {
        if self.mark_failed() {
            error!("Session {} failed: {}", self.id, error);
            *self.error.lock() = Some(error.clone());
        }
    }

    fn settle(&self, outcome: StopOutcome) {
        let pending = self.completion.lock().take();
        if let Some(tx) = pending {
            // The stopper may have given up waiting
            let _ = tx.send(outcome);
        }
    }

    /// Release every resource exactly once
    fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cleanup_runs.fetch_add(1, Ordering::SeqCst);

        self.release(std::mem::take(&mut *self.resources.lock()));
        self.timer.stop();
        self.context.webcam.release();

        // Dropping the recorder closes its event channel
        drop(self.recorder.lock().take());

        info!("Session {} cleaned up", self.id);
    }

    /// Tolerates any subset of resources never having been created
    fn release(&self, resources: Resources) {
        if let Some(compositor) = &resources.compositor {
            compositor.cancel();
        }
        for surface in &resources.surfaces {
            surface.pause();
            surface.detach();
        }
        for task in &resources.tasks {
            task.abort();
        }
        for stream in [&resources.display, &resources.microphone, &resources.final_stream]
            .into_iter()
            .flatten()
        {
            stream.stop_all();
        }
        if let Some(mixer) = &resources.mixer {
            mixer.close();
        }
    }

    fn teardown(&self) {
        match self.state() {
            SessionState::Idle => {}
            state if state.is_terminal() => self.cleanup(),
            _ => {
                self.fail(SessionError::TornDown);
                // A stop that already finalized may still hold resources
                self.cleanup();
            }
        }
    }

    fn stats(&self) -> SessionStats {
        let (chunk_count, bytes) = {
            let chunks = self.chunks.lock();
            (chunks.len(), chunks.total_bytes())
        };
        let observed = self.observed.lock();

        SessionStats {
            id: self.id,
            state: self.state(),
            started_at: observed.started_at,
            elapsed_secs: self.timer.elapsed_secs(),
            chunk_count,
            bytes,
            mime_type: observed.mime_type.clone(),
            overlay_active: observed.overlay_active,
            audio_sources: observed.audio_sources,
            cleanup_runs: self.cleanup_runs.load(Ordering::SeqCst),
            error: self.error.lock().as_ref().map(ToString::to_string),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Route recorder events into the session
async fn pump_events(session: Weak<Inner>, mut events: mpsc::UnboundedReceiver<RecorderEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            return;
        };

        match event {
            RecorderEvent::Started => debug!("Session {}: recorder started", inner.id),
            RecorderEvent::DataAvailable(chunk) => {
                let size = chunk.len();
                if !inner.chunks.lock().push(chunk) {
                    debug!("Session {}: ignored {}-byte chunk", inner.id, size);
                }
            }
            RecorderEvent::Error(message) => {
                inner.fail(SessionError::Recorder(message));
                return;
            }
            RecorderEvent::Stopped => {
                inner.finalize();
                return;
            }
        }
    }

    if let Some(inner) = session.upgrade() {
        if !inner.finalized.load(Ordering::SeqCst) && !inner.cleaned_up.load(Ordering::SeqCst) {
            inner.fail(SessionError::RecorderClosed);
        }
    }
}

/// Stop the session when the platform ends the display track
async fn observe_display_end(session: Weak<Inner>, display: MediaTrack) {
    if display.ended().await != TrackState::Ended {
        return;
    }

    let Some(inner) = session.upgrade() else {
        return;
    };
    if inner.state() != SessionState::Recording {
        return;
    }

    info!("Session {}: display capture ended, stopping", inner.id);
    // Detached so cleanup aborting this observer cannot cancel the stop
    tokio::spawn(async move {
        if let Err(e) = inner.stop().await {
            warn!("Stop after display end failed: {}", e);
        }
    });
}
