pub mod audio;
pub mod compositor;
pub mod config;
pub mod http;
pub mod media;
pub mod recorder;
pub mod session;
pub mod sink;
pub mod studio;
pub mod timer;
pub mod webcam;

pub use audio::{AudioFile, AudioFrame, AudioMixer, AudioStreamSource, MixerConfig, MixerGraph};
pub use compositor::{Compositor, CompositorConfig, Layout, LayoutModel, LayoutPreset};
pub use config::Config;
pub use http::{create_router, AppState};
pub use media::{
    Blob, MediaDevices, MediaStream, MediaTrack, ObjectUrlRegistry, TrackKind, TrackState,
    VideoFrame, VideoSurface,
};
pub use recorder::{Artifact, MediaRecorder, RecorderEvent, RecorderFactory};
pub use session::{CaptureSession, SessionConfig, SessionContext, SessionError, SessionState, SessionStats};
pub use studio::{Studio, StudioStatus};
pub use timer::Timer;
pub use webcam::{WebcamController, WebcamStatus};
