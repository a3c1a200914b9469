// Webcam bubble layout with per-frame easing
//
// Positions are normalized to the canvas: (x, y) is the bubble center and
// size is the radius as a fraction of the shorter canvas side.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fraction of the remaining distance covered per drawn frame
pub const EASING_FACTOR: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl Layout {
    pub const BOTTOM_LEFT: Layout = Layout { x: 0.1, y: 0.9, size: 0.09 };
    pub const BOTTOM_RIGHT: Layout = Layout { x: 0.9, y: 0.9, size: 0.09 };
    pub const TOP_LEFT: Layout = Layout { x: 0.1, y: 0.1, size: 0.09 };
    pub const TOP_RIGHT: Layout = Layout { x: 0.9, y: 0.1, size: 0.09 };
    pub const CENTER: Layout = Layout { x: 0.5, y: 0.5, size: 0.25 };

    /// Clamp into x, y in [0, 1] and size in [0, 0.5]
    pub fn clamped(self) -> Self {
        let clamp = |v: f64, max: f64| if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };
        Self {
            x: clamp(self.x, 1.0),
            y: clamp(self.y, 1.0),
            size: clamp(self.size, 0.5),
        }
    }

    fn eased_toward(self, target: Layout, factor: f64) -> Self {
        Self {
            x: self.x + (target.x - self.x) * factor,
            y: self.y + (target.y - self.y) * factor,
            size: self.size + (target.size - self.size) * factor,
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::BOTTOM_LEFT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutPreset {
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
    Center,
}

impl LayoutPreset {
    pub fn layout(self) -> Layout {
        match self {
            LayoutPreset::BottomLeft => Layout::BOTTOM_LEFT,
            LayoutPreset::BottomRight => Layout::BOTTOM_RIGHT,
            LayoutPreset::TopLeft => Layout::TOP_LEFT,
            LayoutPreset::TopRight => Layout::TOP_RIGHT,
            LayoutPreset::Center => Layout::CENTER,
        }
    }
}

impl Default for LayoutPreset {
    fn default() -> Self {
        Self::BottomLeft
    }
}

impl std::str::FromStr for LayoutPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "center" => Ok(Self::Center),
            other => Err(format!("unknown layout preset: {}", other)),
        }
    }
}

/// Current and target bubble layout
#[derive(Debug, Clone)]
pub struct LayoutModel {
    current: Layout,
    target: Layout,
}

impl LayoutModel {
    /// Start at rest: current equals target
    pub fn new(initial: Layout) -> Self {
        Self {
            current: initial,
            target: initial,
        }
    }

    pub fn current(&self) -> Layout {
        self.current
    }

    pub fn target(&self) -> Layout {
        self.target
    }

    /// Request a new layout; `current` follows over the next frames
    pub fn set_target(&mut self, target: Layout) {
        self.target = target;
    }

    /// Advance one frame toward the target and return the new current layout
    pub fn step(&mut self) -> Layout {
        self.current = self.current.eased_toward(self.target, EASING_FACTOR);
        self.current
    }
}

impl Default for LayoutModel {
    fn default() -> Self {
        Self::new(Layout::default())
    }
}

/// Layout shared between the compositor loop and whoever picks layouts
pub type SharedLayout = Arc<Mutex<LayoutModel>>;

pub fn shared_layout(initial: Layout) -> SharedLayout {
    Arc::new(Mutex::new(LayoutModel::new(initial)))
}
