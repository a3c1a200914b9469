use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::audio::AudioFrame;
use crate::media::track::{MediaStream, VideoFrame};
use crate::recorder::{
    MediaRecorder, RecorderError, RecorderEvent, RecorderEvents, RecorderFactory, RecorderState,
};

const CONTAINER_MAGIC: &[u8] = b"BCAST\x01";

/// How a synthetic recorder reacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderBehavior {
    /// Serialize observed frames into a chunk every timeslice
    Encode,
    /// Emit only what is injected through the [`RecorderHandle`]; confirms stop
    Manual,
    /// Never confirms a stop; `request_data` still flushes buffered data
    Unresponsive,
}

struct RecorderCore {
    mime_type: String,
    events: Mutex<Option<RecorderEvents>>,
    state: Mutex<RecorderState>,
    pending: Mutex<BytesMut>,
    stop_requested: AtomicBool,
    data_requests: AtomicUsize,
}

impl RecorderCore {
    fn emit(&self, event: RecorderEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    fn flush(&self) -> bool {
        let chunk = self.pending.lock().split().freeze();
        self.emit(RecorderEvent::DataAvailable(chunk))
    }

    fn close(&self) {
        self.events.lock().take();
    }
}

/// Test-side control of a synthetic recorder
#[derive(Clone)]
pub struct RecorderHandle {
    core: Arc<RecorderCore>,
}

impl RecorderHandle {
    pub fn mime_type(&self) -> &str {
        &self.core.mime_type
    }

    pub fn state(&self) -> RecorderState {
        *self.core.state.lock()
    }

    /// Deliver a chunk right away
    pub fn emit_data(&self, chunk: impl Into<Bytes>) -> bool {
        self.core.emit(RecorderEvent::DataAvailable(chunk.into()))
    }

    /// Add to the recorder's internal buffer; delivered on the next flush
    pub fn buffer(&self, data: &[u8]) {
        self.core.pending.lock().extend_from_slice(data);
    }

    pub fn emit_error(&self, message: impl Into<String>) -> bool {
        self.core.emit(RecorderEvent::Error(message.into()))
    }

    pub fn emit_stopped(&self) -> bool {
        *self.core.state.lock() = RecorderState::Inactive;
        self.core.emit(RecorderEvent::Stopped)
    }

    /// Drop the event channel as if the platform went away
    pub fn close(&self) {
        self.core.close();
    }

    pub fn stop_requested(&self) -> bool {
        self.core.stop_requested.load(Ordering::SeqCst)
    }

    pub fn data_requests(&self) -> usize {
        self.core.data_requests.load(Ordering::SeqCst)
    }
}

pub struct SyntheticRecorder {
    core: Arc<RecorderCore>,
    behavior: RecorderBehavior,
    fail_start: bool,
    stream: MediaStream,
    encoder: Option<JoinHandle<()>>,
}

impl MediaRecorder for SyntheticRecorder {
    fn start(&mut self, timeslice: Duration) -> Result<(), RecorderError> {
        if self.fail_start {
            return Err(RecorderError::Platform("encoder refused to start".to_string()));
        }

        {
            let mut state = self.core.state.lock();
            if *state != RecorderState::Inactive {
                return Err(RecorderError::InvalidState("already recording".to_string()));
            }
            *state = RecorderState::Recording;
        }

        self.core.emit(RecorderEvent::Started);
        info!(
            "Synthetic recorder started: {} ({:?}, timeslice {:?})",
            self.core.mime_type, self.behavior, timeslice
        );

        if self.behavior == RecorderBehavior::Encode {
            self.core.pending.lock().extend_from_slice(CONTAINER_MAGIC);
            self.encoder = Some(tokio::spawn(encode(
                Arc::clone(&self.core),
                self.stream.clone(),
                timeslice,
            )));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        if *self.core.state.lock() != RecorderState::Recording {
            return Err(RecorderError::InvalidState("not recording".to_string()));
        }
        self.core.stop_requested.store(true, Ordering::SeqCst);

        if let Some(encoder) = self.encoder.take() {
            encoder.abort();
        }

        match self.behavior {
            RecorderBehavior::Unresponsive => {
                debug!("Synthetic recorder ignoring stop request");
            }
            RecorderBehavior::Encode | RecorderBehavior::Manual => {
                self.core.flush();
                *self.core.state.lock() = RecorderState::Inactive;
                self.core.emit(RecorderEvent::Stopped);
            }
        }
        Ok(())
    }

    fn request_data(&mut self) -> Result<(), RecorderError> {
        if *self.core.state.lock() != RecorderState::Recording {
            return Err(RecorderError::InvalidState("not recording".to_string()));
        }
        self.core.data_requests.fetch_add(1, Ordering::SeqCst);
        self.core.flush();
        Ok(())
    }

    fn state(&self) -> RecorderState {
        *self.core.state.lock()
    }

    fn mime_type(&self) -> &str {
        &self.core.mime_type
    }
}

impl Drop for SyntheticRecorder {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            encoder.abort();
        }
        self.core.close();
    }
}

/// Append one record per observed frame; flush a chunk every timeslice
async fn encode(core: Arc<RecorderCore>, stream: MediaStream, timeslice: Duration) {
    let mut video: Option<watch::Receiver<Option<VideoFrame>>> =
        stream.first_video().and_then(|t| t.subscribe_video());
    let mut audio: Option<broadcast::Receiver<AudioFrame>> =
        stream.first_audio().and_then(|t| t.subscribe_audio());

    let mut ticker = time::interval(timeslice.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !core.flush() {
                    break;
                }
            }
            changed = next_video(&mut video) => {
                match changed {
                    Some(frame) => {
                        let mut pending = core.pending.lock();
                        pending.put_u8(b'V');
                        pending.put_u64_le(frame.timestamp_ms);
                        pending.put_u32_le(frame.width());
                        pending.put_u32_le(frame.height());
                        // Sparse checksum so large frames stay cheap
                        let checksum = frame
                            .image()
                            .as_raw()
                            .iter()
                            .step_by(64)
                            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32));
                        pending.put_u32_le(checksum);
                    }
                    None => video = None,
                }
            }
            received = next_audio(&mut audio) => {
                match received {
                    Ok(frame) => {
                        let mut pending = core.pending.lock();
                        pending.put_u8(b'A');
                        pending.put_u64_le(frame.timestamp_ms);
                        pending.put_u32_le(frame.samples.len() as u32);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Synthetic encoder lagged, {} audio frames skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => audio = None,
                }
            }
        }
    }
    debug!("Synthetic encoder exited");
}

async fn next_video(rx: &mut Option<watch::Receiver<Option<VideoFrame>>>) -> Option<VideoFrame> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => rx.borrow_and_update().clone(),
            Err(_) => None,
        },
        None => future::pending().await,
    }
}

async fn next_audio(
    rx: &mut Option<broadcast::Receiver<AudioFrame>>,
) -> Result<AudioFrame, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

/// In-process recorder factory
pub struct SyntheticRecorderFactory {
    supported: Vec<String>,
    behavior: RecorderBehavior,
    fail_create: AtomicBool,
    fail_start: AtomicBool,
    handles: Mutex<Vec<RecorderHandle>>,
}

impl SyntheticRecorderFactory {
    pub fn new(behavior: RecorderBehavior) -> Self {
        Self::with_supported(
            behavior,
            &["video/webm;codecs=vp9,opus", "video/webm;codecs=vp8,opus", "video/webm"],
        )
    }

    pub fn with_supported(behavior: RecorderBehavior, supported: &[&str]) -> Self {
        Self {
            supported: supported.iter().map(|s| s.to_string()).collect(),
            behavior,
            fail_create: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn behavior(&self) -> RecorderBehavior {
        self.behavior
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Handle of the most recently created recorder
    pub fn last_handle(&self) -> Option<RecorderHandle> {
        self.handles.lock().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.handles.lock().len()
    }
}

impl RecorderFactory for SyntheticRecorderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|s| s == mime_type)
    }

    fn create(
        &self,
        stream: MediaStream,
        mime_type: &str,
        events: RecorderEvents,
    ) -> Result<Box<dyn MediaRecorder>, RecorderError> {
        if !self.is_type_supported(mime_type) {
            return Err(RecorderError::Unsupported(mime_type.to_string()));
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RecorderError::Platform("recorder construction failed".to_string()));
        }

        let core = Arc::new(RecorderCore {
            mime_type: mime_type.to_string(),
            events: Mutex::new(Some(events)),
            state: Mutex::new(RecorderState::Inactive),
            pending: Mutex::new(BytesMut::new()),
            stop_requested: AtomicBool::new(false),
            data_requests: AtomicUsize::new(0),
        });
        self.handles.lock().push(RecorderHandle {
            core: Arc::clone(&core),
        });

        Ok(Box::new(SyntheticRecorder {
            core,
            behavior: self.behavior,
            fail_start: self.fail_start.load(Ordering::SeqCst),
            stream,
            encoder: None,
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaTrack, TrackSettings};
    use tokio::sync::mpsc;

    fn video_stream() -> (MediaStream, MediaTrack) {
        let track = MediaTrack::video("canvas", TrackSettings::video(4, 4, 30.0));
        (MediaStream::new(vec![track.clone()]), track)
    }

    #[tokio::test]
    async fn test_manual_stop_confirms() {
        let factory = SyntheticRecorderFactory::new(RecorderBehavior::Manual);
        let (stream, _track) = video_stream();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut recorder = factory.create(stream, "video/webm", tx).unwrap();
        recorder.start(Duration::from_secs(1)).unwrap();
        assert_eq!(rx.recv().await, Some(RecorderEvent::Started));

        let handle = factory.last_handle().unwrap();
        handle.emit_data(vec![1u8, 2, 3]);
        recorder.stop().unwrap();

        assert_eq!(rx.recv().await, Some(RecorderEvent::DataAvailable(Bytes::from(vec![1u8, 2, 3]))));
        assert_eq!(rx.recv().await, Some(RecorderEvent::DataAvailable(Bytes::new())));
        assert_eq!(rx.recv().await, Some(RecorderEvent::Stopped));
        assert_eq!(recorder.state(), RecorderState::Inactive);
    }

    #[tokio::test]
    async fn test_unresponsive_flushes_on_request() {
        let factory = SyntheticRecorderFactory::new(RecorderBehavior::Unresponsive);
        let (stream, _track) = video_stream();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut recorder = factory.create(stream, "video/webm", tx).unwrap();
        recorder.start(Duration::from_secs(1)).unwrap();
        rx.recv().await;

        let handle = factory.last_handle().unwrap();
        handle.buffer(b"tail");
        recorder.stop().unwrap();
        assert!(handle.stop_requested());
        assert!(rx.try_recv().is_err());

        recorder.request_data().unwrap();
        assert_eq!(rx.recv().await, Some(RecorderEvent::DataAvailable(Bytes::from_static(b"tail"))));
        assert_eq!(handle.data_requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoder_emits_per_timeslice() {
        let factory = SyntheticRecorderFactory::new(RecorderBehavior::Encode);
        let (stream, track) = video_stream();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut recorder = factory.create(stream, "video/webm", tx).unwrap();
        recorder.start(Duration::from_millis(100)).unwrap();
        assert_eq!(rx.recv().await, Some(RecorderEvent::Started));

        for i in 0..3u64 {
            track.push_video(VideoFrame::solid(4, 4, [i as u8, 0, 0, 255], i * 33));
            time::sleep(Duration::from_millis(33)).await;
        }

        match rx.recv().await {
            Some(RecorderEvent::DataAvailable(chunk)) => {
                assert!(chunk.starts_with(CONTAINER_MAGIC));
                assert!(chunk.len() > CONTAINER_MAGIC.len());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        recorder.stop().unwrap();
        let mut saw_stopped = false;
        while let Some(event) = rx.recv().await {
            if event == RecorderEvent::Stopped {
                saw_stopped = true;
                break;
            }
        }
        assert!(saw_stopped);
    }

    #[tokio::test]
    async fn test_drop_closes_channel() {
        let factory = SyntheticRecorderFactory::new(RecorderBehavior::Manual);
        let (stream, _track) = video_stream();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let recorder = factory.create(stream, "video/webm", tx).unwrap();
        drop(recorder);
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_unsupported_mime_rejected() {
        let factory = SyntheticRecorderFactory::with_supported(RecorderBehavior::Manual, &["video/mp4"]);
        let (stream, _track) = video_stream();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            factory.create(stream, "video/webm", tx),
            Err(RecorderError::Unsupported(_))
        ));
    }
}
