pub mod blob;
pub mod devices;
pub mod surface;
pub mod synthetic;
pub mod track;

pub use blob::{is_blob_url, Blob, ObjectUrlRegistry};
pub use devices::{
    AcquireError, CameraConstraints, DisplayConstraints, FacingMode, MediaDevices,
    MicrophoneConstraints,
};
pub use surface::{bind_on_change, SurfaceError, VideoSurface};
pub use track::{MediaStream, MediaTrack, TrackKind, TrackSettings, TrackState, VideoFrame};
