use bubblecast::media::synthetic::{
    DeviceKind, RecorderBehavior, SyntheticConfig, SyntheticDevices, SyntheticRecorderFactory,
};
use bubblecast::media::{AcquireError, CameraConstraints};
use bubblecast::sink::{MemorySink, StatusPoller, StatusReport};
use bubblecast::{
    Layout, LayoutPreset, SessionConfig, SessionError, SessionState, Studio, WebcamStatus,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    devices: Arc<SyntheticDevices>,
    recorders: Arc<SyntheticRecorderFactory>,
    studio: Studio,
}

fn harness() -> Harness {
    let devices = Arc::new(SyntheticDevices::new(SyntheticConfig::default()));
    let recorders = Arc::new(SyntheticRecorderFactory::new(RecorderBehavior::Manual));
    let config = SessionConfig {
        capture_microphone: false,
        ..SessionConfig::default()
    };
    let studio = Studio::new(
        devices.clone(),
        recorders.clone(),
        config,
        CameraConstraints::default(),
        Layout::default(),
    );
    Harness {
        devices,
        recorders,
        studio,
    }
}

impl Harness {
    fn emit(&self, len: usize) {
        self.recorders
            .last_handle()
            .unwrap()
            .emit_data(vec![0xabu8; len]);
    }
}

#[tokio::test]
async fn test_only_one_live_session() {
    let h = harness();
    let session = h.studio.start_recording().await.unwrap();
    assert_eq!(session.state(), SessionState::Recording);

    let err = h.studio.start_recording().await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyStarted);
    assert_eq!(h.recorders.created(), 1);

    h.emit(100);
    h.studio.stop_recording().await.unwrap();
    h.studio.start_recording().await.unwrap();
    assert_eq!(h.recorders.created(), 2);
}

#[tokio::test]
async fn test_stop_without_session() {
    let h = harness();
    assert_eq!(
        h.studio.stop_recording().await.unwrap_err(),
        SessionError::NotRecording
    );
}

#[tokio::test]
async fn test_failed_start_allows_retry() {
    let h = harness();
    h.devices.deny(DeviceKind::Display, AcquireError::Cancelled);

    let err = h.studio.start_recording().await.unwrap_err();
    assert!(matches!(err, SessionError::DisplayCapture(AcquireError::Cancelled)));
    assert_eq!(h.studio.status().state, Some(SessionState::Failed));

    h.devices.allow(DeviceKind::Display);
    let session = h.studio.start_recording().await.unwrap();
    assert_eq!(session.state(), SessionState::Recording);
}

#[tokio::test]
async fn test_webcam_locked_while_recording() {
    let h = harness();
    h.studio.start_recording().await.unwrap();

    assert_eq!(
        h.studio.toggle_webcam().await.unwrap_err(),
        SessionError::WebcamLocked
    );
    assert!(!h.studio.webcam().is_enabled());

    h.emit(10);
    h.studio.stop_recording().await.unwrap();

    assert!(h.studio.toggle_webcam().await.unwrap());
    assert_eq!(h.studio.webcam().status(), WebcamStatus::On);
    assert!(!h.studio.toggle_webcam().await.unwrap());
    assert_eq!(h.studio.webcam().status(), WebcamStatus::Off);
}

#[tokio::test]
async fn test_new_recording_revokes_previous_preview() {
    let h = harness();
    h.studio.start_recording().await.unwrap();
    h.emit(500);
    let first = h.studio.stop_recording().await.unwrap();

    assert!(h.studio.preview(&first.preview_url).is_some());
    assert_eq!(h.studio.artifact(first.id).unwrap().size, 500);
    assert_eq!(
        h.studio.status().preview_url.as_deref(),
        Some(first.preview_url.as_str())
    );

    h.studio.start_recording().await.unwrap();
    assert!(h.studio.preview(&first.preview_url).is_none());
    assert!(h.studio.artifact(first.id).is_none());
    assert!(h.studio.status().preview_url.is_none());

    h.emit(700);
    let second = h.studio.stop_recording().await.unwrap();
    assert_ne!(second.preview_url, first.preview_url);
    assert_eq!(h.studio.urls().len(), 1);
}

#[tokio::test]
async fn test_layout_changes_are_eased() {
    let h = harness();
    h.studio.set_layout_preset(LayoutPreset::TopRight);

    let status = h.studio.status();
    assert_eq!(status.layout_target, LayoutPreset::TopRight.layout());
    assert_eq!(status.layout, Layout::default());
    assert_eq!(status.elapsed, "00:00");
    assert!(status.state.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_upload_and_poll_until_ready() {
    let h = harness();
    h.studio.start_recording().await.unwrap();
    h.emit(1234);
    h.studio.stop_recording().await.unwrap();

    let sink = Arc::new(MemorySink::new());
    let id = h.studio.upload_last(sink.as_ref()).await.unwrap();
    let (bytes, content_type) = sink.get(id).unwrap();
    assert_eq!(bytes.len(), 1234);
    assert_eq!(content_type, "video/webm;codecs=vp9,opus");

    let poller = StatusPoller::with_interval(sink, Duration::from_millis(100));
    assert_eq!(poller.poll_until_terminal(id).await, StatusReport::Ready);
}

#[tokio::test]
async fn test_upload_requires_finished_recording() {
    let h = harness();
    let sink = MemorySink::new();
    assert!(h.studio.upload_last(&sink).await.is_err());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_teardown_releases_everything() {
    let h = harness();
    assert!(h.studio.toggle_webcam().await.unwrap());
    let session = h.studio.start_recording().await.unwrap();

    h.studio.teardown();

    assert_eq!(session.state(), SessionState::Failed);
    assert!(!h.studio.webcam().is_enabled());
    assert!(h.studio.current_session().is_none());
    assert!(!h.devices.last_issued(DeviceKind::Camera).unwrap().is_live());
    assert!(!h.devices.last_issued(DeviceKind::Display).unwrap().is_live());
}
