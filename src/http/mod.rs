//! HTTP API server for external control
//!
//! This module provides a REST API for driving a [`Studio`](crate::studio::Studio):
//! - POST /recording/start - Start a new recording
//! - POST /recording/stop - Stop the current recording
//! - GET /recording/status - Query studio and session status
//! - POST /webcam/toggle - Turn the webcam bubble on or off
//! - PUT /layout - Move the webcam bubble
//! - GET /artifacts/:id - Download the last recording
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
