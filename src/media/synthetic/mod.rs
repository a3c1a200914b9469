//! Synthetic platform: generated capture devices and an in-process recorder
//!
//! Used by the `record`/`serve` demo commands and by the test-suite. Not an
//! encoder: the recorder serializes frame metadata into chunks so that the
//! session sees realistic event timing and data sizes.

pub mod devices;
pub mod recorder;

pub use devices::{gradient, test_pattern, DeviceKind, SyntheticConfig, SyntheticDevices};
pub use recorder::{RecorderBehavior, RecorderHandle, SyntheticRecorder, SyntheticRecorderFactory};
