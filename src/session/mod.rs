//! Capture session orchestration
//!
//! This module provides the `CaptureSession` abstraction that manages:
//! - Source acquisition (display, microphone, webcam)
//! - Video compositing and audio mixing into one final stream
//! - The recorder start/stop handshake and artifact sealing
//! - Resource cleanup and session statistics

mod config;
mod error;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{CaptureSession, SessionContext};
pub use state::SessionState;
pub use stats::SessionStats;
