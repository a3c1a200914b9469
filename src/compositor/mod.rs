//! Real-time video compositing
//!
//! The compositor paints a background surface (the screen) and an optional
//! circular foreground (the webcam bubble) onto an off-screen canvas and
//! publishes every drawn frame on a canvas-derived video track. The loop
//! runs on a display-refresh ticker and throttles itself to a fixed frame
//! rate so the recording cadence does not depend on the refresh rate.

pub mod canvas;
pub mod layout;
pub mod throttle;

pub use canvas::Canvas;
pub use layout::{shared_layout, Layout, LayoutModel, LayoutPreset, SharedLayout, EASING_FACTOR};
pub use throttle::FrameThrottle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::media::{MediaTrack, TrackSettings, VideoSurface};

/// Label of the canvas-derived track
pub const CANVAS_TRACK_LABEL: &str = "canvas";

const RING_WIDTH: f64 = 3.0;
const SHADOW_WIDTH: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Frames drawn per second
    pub frame_rate: u32,
    /// Display refresh rate driving the loop
    pub refresh_rate_hz: u32,
    /// Largest canvas width
    pub max_width: u32,
    /// Largest canvas height
    pub max_height: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            refresh_rate_hz: 60,
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Canvas size for a source: aspect-preserving downscale into the bounds, never upscaled
pub fn canvas_size(source_width: u32, source_height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if source_width == 0 || source_height == 0 {
        return (max_width.max(1), max_height.max(1));
    }

    let scale = (max_width as f64 / source_width as f64)
        .min(max_height as f64 / source_height as f64)
        .min(1.0);

    if scale >= 1.0 {
        return (source_width, source_height);
    }

    let width = (source_width as f64 * scale).round().max(1.0) as u32;
    let height = (source_height as f64 * scale).round().max(1.0) as u32;
    (width, height)
}

/// Canvas size derived from a track's capture settings
pub fn canvas_size_for(settings: &TrackSettings, config: &CompositorConfig) -> (u32, u32) {
    canvas_size(
        settings.width.unwrap_or(config.max_width),
        settings.height.unwrap_or(config.max_height),
        config.max_width,
        config.max_height,
    )
}

/// Cancels a running compositor loop
///
/// Cancelling is idempotent and valid before the first frame was drawn.
#[derive(Clone)]
pub struct CompositorHandle {
    cancelled: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CompositorHandle {
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        debug!("Compositor loop cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A running compositor
pub struct Compositor {
    output: MediaTrack,
    handle: CompositorHandle,
    frames_drawn: Arc<AtomicU64>,
    size: (u32, u32),
}

impl Compositor {
    /// Start drawing `background` with an optional `foreground` bubble
    pub fn start(
        background: Arc<VideoSurface>,
        foreground: Option<Arc<VideoSurface>>,
        layout: SharedLayout,
        size: (u32, u32),
        config: &CompositorConfig,
    ) -> Self {
        let (width, height) = size;
        let output = MediaTrack::video(
            CANVAS_TRACK_LABEL,
            TrackSettings::video(width, height, config.frame_rate as f64),
        );

        info!(
            "Compositor started: {}x{} @ {}fps (refresh {}Hz, bubble: {})",
            width,
            height,
            config.frame_rate,
            config.refresh_rate_hz,
            foreground.is_some()
        );

        let frames_drawn = Arc::new(AtomicU64::new(0));
        let frame_loop = FrameLoop {
            canvas: Canvas::new(width, height),
            background,
            foreground,
            layout,
            output: output.clone(),
            frames_drawn: Arc::clone(&frames_drawn),
        };

        let task = tokio::spawn(frame_loop.run(
            FrameThrottle::new(config.frame_rate),
            throttle::refresh_interval(config.refresh_rate_hz),
        ));

        Self {
            output,
            handle: CompositorHandle {
                cancelled: Arc::new(AtomicBool::new(false)),
                task: Arc::new(Mutex::new(Some(task))),
            },
            frames_drawn,
            size: (width, height),
        }
    }

    /// The canvas-derived track
    pub fn output_track(&self) -> &MediaTrack {
        &self.output
    }

    pub fn handle(&self) -> CompositorHandle {
        self.handle.clone()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Stop the loop; the canvas track keeps its last frame
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Shared counter of drawn frames
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_drawn)
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

struct FrameLoop {
    canvas: Canvas,
    background: Arc<VideoSurface>,
    foreground: Option<Arc<VideoSurface>>,
    layout: SharedLayout,
    output: MediaTrack,
    frames_drawn: Arc<AtomicU64>,
}

impl FrameLoop {
    async fn run(mut self, mut throttle: FrameThrottle, refresh: std::time::Duration) {
        let mut ticker = time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();

        loop {
            let now = ticker.tick().await;

            // Nothing to draw until the screen has produced a frame
            if !self.background.is_ready() {
                continue;
            }

            if !throttle.should_draw(now) {
                continue;
            }

            let timestamp_ms = now.saturating_duration_since(started).as_millis() as u64;
            if self.draw(timestamp_ms) {
                self.frames_drawn.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn draw(&mut self, timestamp_ms: u64) -> bool {
        let Some(background) = self.background.current_frame() else {
            return false;
        };

        self.canvas.draw_stretched(&background);

        let current = self.layout.lock().step();

        if let Some(foreground) = &self.foreground {
            if foreground.is_live() {
                if let Some(bubble) = foreground.current_frame() {
                    let w = self.canvas.width() as f64;
                    let h = self.canvas.height() as f64;
                    let radius = w.min(h) * current.size;
                    let cx = w * current.x;
                    let cy = h * current.y;

                    self.canvas.draw_circle_crop(&bubble, cx, cy, radius);
                    self.canvas.stroke_ring(cx, cy, radius, RING_WIDTH, canvas::WHITE);
                    self.canvas.stroke_ring(
                        cx,
                        cy,
                        radius + RING_WIDTH / 2.0 + SHADOW_WIDTH / 2.0,
                        SHADOW_WIDTH,
                        canvas::SHADOW,
                    );
                }
            }
        }

        self.output.push_video(self.canvas.to_frame(timestamp_ms))
    }
}
