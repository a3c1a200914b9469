//! Software canvas
//!
//! Just enough of a 2D context for the compositor: stretch a frame over the
//! whole canvas, draw a square center-crop of a frame into a circular clip,
//! and stroke rings around it.

use image::imageops::{self, FilterType};
use image::{Pixel, RgbaImage};

use crate::media::VideoFrame;

pub type Rgba = image::Rgba<u8>;

pub const WHITE: Rgba = image::Rgba([255, 255, 255, 255]);
/// Soft dark edge around the bubble
pub const SHADOW: Rgba = image::Rgba([0, 0, 0, 64]);

#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// RGBA at (x, y); transparent black when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image
            .get_pixel_checked(x, y)
            .map(|p| p.0)
            .unwrap_or([0, 0, 0, 0])
    }

    pub fn fill(&mut self, color: Rgba) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    /// Scale `frame` (nearest neighbour) to cover the whole canvas exactly
    pub fn draw_stretched(&mut self, frame: &VideoFrame) {
        if frame.width() == 0 || frame.height() == 0 {
            return;
        }
        if frame.image().dimensions() == self.image.dimensions() {
            self.image.clone_from(frame.image());
            return;
        }
        self.image = imageops::resize(frame.image(), self.width(), self.height(), FilterType::Nearest);
    }

    /// Draw the centered square crop of `frame` into a circle
    pub fn draw_circle_crop(&mut self, frame: &VideoFrame, cx: f64, cy: f64, radius: f64) {
        if frame.width() == 0 || frame.height() == 0 || radius <= 0.0 {
            return;
        }
        let Some((x_min, x_max, y_min, y_max)) = self.bounds(cx, cy, radius) else {
            return;
        };

        let side = frame.width().min(frame.height());
        let square = imageops::crop_imm(
            frame.image(),
            (frame.width() - side) / 2,
            (frame.height() - side) / 2,
            side,
            side,
        )
        .to_image();
        let diameter = (radius * 2.0).ceil().max(1.0) as u32;
        let bubble = imageops::resize(&square, diameter, diameter, FilterType::Nearest);

        let left = cx - radius;
        let top = cy - radius;
        for py in y_min..=y_max {
            for px in x_min..=x_max {
                let dx = px as f64 + 0.5 - cx;
                let dy = py as f64 + 0.5 - cy;
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }

                let sx = ((px as f64 + 0.5 - left).max(0.0) as u32).min(diameter - 1);
                let sy = ((py as f64 + 0.5 - top).max(0.0) as u32).min(diameter - 1);
                self.image.get_pixel_mut(px, py).blend(bubble.get_pixel(sx, sy));
            }
        }
    }

    /// Stroke a ring of `line_width` centered on `radius`
    pub fn stroke_ring(&mut self, cx: f64, cy: f64, radius: f64, line_width: f64, color: Rgba) {
        if line_width <= 0.0 {
            return;
        }

        let inner = (radius - line_width / 2.0).max(0.0);
        let outer = radius + line_width / 2.0;

        let Some((x_min, x_max, y_min, y_max)) = self.bounds(cx, cy, outer) else {
            return;
        };

        for py in y_min..=y_max {
            for px in x_min..=x_max {
                let dx = px as f64 + 0.5 - cx;
                let dy = py as f64 + 0.5 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist >= inner && dist <= outer {
                    self.image.get_pixel_mut(px, py).blend(&color);
                }
            }
        }
    }

    /// Pixel bounding box of a circle clipped to the canvas
    fn bounds(&self, cx: f64, cy: f64, radius: f64) -> Option<(u32, u32, u32, u32)> {
        let w = self.width() as f64;
        let h = self.height() as f64;
        if cx + radius < 0.0 || cy + radius < 0.0 || cx - radius >= w || cy - radius >= h {
            return None;
        }

        let x_min = (cx - radius - 1.0).max(0.0) as u32;
        let x_max = (cx + radius + 1.0).min(w - 1.0) as u32;
        let y_min = (cy - radius - 1.0).max(0.0) as u32;
        let y_max = (cy + radius + 1.0).min(h - 1.0) as u32;
        Some((x_min, x_max, y_min, y_max))
    }

    /// Snapshot the canvas as a video frame
    pub fn to_frame(&self, timestamp_ms: u64) -> VideoFrame {
        VideoFrame::new(self.image.clone(), timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = image::Rgba([255, 0, 0, 255]);
    const BLUE: Rgba = image::Rgba([0, 0, 255, 255]);

    fn frame_from(width: u32, height: u32, pixels: &[Rgba]) -> VideoFrame {
        let image = RgbaImage::from_fn(width, height, |x, y| pixels[(y * width + x) as usize]);
        VideoFrame::new(image, 0)
    }

    #[test]
    fn test_stretch_fills_canvas() {
        let mut canvas = Canvas::new(8, 4);
        canvas.draw_stretched(&VideoFrame::solid(2, 1, RED.0, 0));
        assert_eq!(canvas.width(), 8);
        assert_eq!(canvas.pixel(0, 0), RED.0);
        assert_eq!(canvas.pixel(7, 3), RED.0);
    }

    #[test]
    fn test_stretch_maps_halves() {
        let frame = frame_from(2, 1, &[RED, BLUE]);

        let mut canvas = Canvas::new(10, 2);
        canvas.draw_stretched(&frame);
        assert_eq!((canvas.width(), canvas.height()), (10, 2));
        assert_eq!(canvas.pixel(0, 1), RED.0);
        assert_eq!(canvas.pixel(2, 0), RED.0);
        assert_eq!(canvas.pixel(7, 0), BLUE.0);
        assert_eq!(canvas.pixel(9, 1), BLUE.0);
    }

    #[test]
    fn test_stretch_same_size_copies() {
        let frame = frame_from(2, 1, &[BLUE, RED]);
        let mut canvas = Canvas::new(2, 1);
        canvas.draw_stretched(&frame);
        assert_eq!(canvas.to_frame(0), frame);
    }

    #[test]
    fn test_circle_clip() {
        let mut canvas = Canvas::new(100, 100);
        canvas.fill(RED);
        canvas.draw_circle_crop(&VideoFrame::solid(40, 30, BLUE.0, 0), 50.0, 50.0, 20.0);

        assert_eq!(canvas.pixel(50, 50), BLUE.0);
        assert_eq!(canvas.pixel(50, 32), BLUE.0);
        // Corner of the bounding box is outside the circle
        assert_eq!(canvas.pixel(32, 32), RED.0);
        assert_eq!(canvas.pixel(5, 5), RED.0);
    }

    #[test]
    fn test_circle_uses_center_square() {
        // 3x1 frame: the centered 1x1 square is the middle pixel
        let frame = frame_from(3, 1, &[RED, BLUE, RED]);

        let mut canvas = Canvas::new(20, 20);
        canvas.draw_circle_crop(&frame, 10.0, 10.0, 6.0);
        assert_eq!(canvas.pixel(10, 10), BLUE.0);
        assert_eq!(canvas.pixel(6, 10), BLUE.0);
    }

    #[test]
    fn test_ring_stroke() {
        let mut canvas = Canvas::new(60, 60);
        canvas.fill(RED);
        canvas.stroke_ring(30.0, 30.0, 10.0, 3.0, WHITE);

        // 10px right of center lands on the ring
        assert_eq!(canvas.pixel(39, 29), WHITE.0);
        assert_eq!(canvas.pixel(29, 29), RED.0);
        assert_eq!(canvas.pixel(45, 29), RED.0);
    }

    #[test]
    fn test_shadow_blends_over_background() {
        let mut canvas = Canvas::new(60, 60);
        canvas.fill(WHITE);
        canvas.stroke_ring(30.0, 30.0, 10.0, 1.0, SHADOW);

        let shaded = canvas.pixel(39, 29);
        assert!(shaded[0] < 255 && shaded[0] > 100, "got {:?}", shaded);
        assert_eq!(canvas.pixel(30, 30), WHITE.0);
    }

    #[test]
    fn test_offscreen_circle_is_ignored() {
        let mut canvas = Canvas::new(10, 10);
        canvas.fill(RED);
        canvas.draw_circle_crop(&VideoFrame::solid(4, 4, BLUE.0, 0), -50.0, -50.0, 5.0);
        canvas.stroke_ring(100.0, 100.0, 5.0, 3.0, WHITE);
        assert!((0..10).all(|x| canvas.pixel(x, x) == RED.0));
    }
}
