use std::time::Duration;
use tokio::time::Instant;

/// Decides which display-refresh ticks get a drawn frame
///
/// A tick is drawn when at least one frame interval has passed since the
/// previous drawn frame, so two drawn frames are never closer than the
/// interval, even after a stall.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last_drawn: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            interval: frame_interval(frame_rate),
            last_drawn: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a frame should be drawn at `now`; records it if so
    pub fn should_draw(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_drawn else {
            self.last_drawn = Some(now);
            return true;
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.interval {
            return false;
        }

        self.last_drawn = Some(now);
        true
    }
}

/// Whole microseconds per frame, rounded down
pub fn frame_interval(frame_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / frame_rate.max(1) as u64)
}

/// Whole microseconds per refresh, rounded up so two 60Hz refreshes always
/// cover one 30fps frame interval
pub fn refresh_interval(refresh_rate_hz: u32) -> Duration {
    let hz = refresh_rate_hz.max(1) as u64;
    Duration::from_micros((1_000_000 + hz - 1) / hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_draws() {
        let mut throttle = FrameThrottle::new(30);
        assert!(throttle.should_draw(Instant::now()));
    }

    #[test]
    fn test_60hz_refresh_draws_every_other_tick() {
        let mut throttle = FrameThrottle::new(30);
        let start = Instant::now();
        let refresh = refresh_interval(60);

        let drawn = (0..60u32)
            .filter(|i| throttle.should_draw(start + refresh * *i))
            .count();
        assert_eq!(drawn, 30);
    }

    #[test]
    fn test_144hz_refresh_caps_at_frame_rate() {
        let mut throttle = FrameThrottle::new(30);
        let start = Instant::now();
        let refresh = refresh_interval(144);

        // One second of 144Hz refreshes
        let drawn = (0..144u32)
            .filter(|i| throttle.should_draw(start + refresh * *i))
            .count();
        assert!((29..=31).contains(&drawn), "drew {} frames", drawn);
    }

    #[test]
    fn test_too_early_is_skipped() {
        let mut throttle = FrameThrottle::new(30);
        let start = Instant::now();
        assert!(throttle.should_draw(start));
        assert!(!throttle.should_draw(start + Duration::from_millis(20)));
        assert!(throttle.should_draw(start + Duration::from_millis(34)));
    }

    #[test]
    fn test_drawn_frames_keep_min_spacing_after_stall() {
        let mut throttle = FrameThrottle::new(30);
        let start = Instant::now();
        let interval = throttle.interval();
        assert!(throttle.should_draw(start));

        // A refresh arrives late, well past one interval
        let late = start + Duration::from_millis(50);
        assert!(throttle.should_draw(late));

        let refresh = refresh_interval(60);
        let mut previous = late;
        for i in 1..30u32 {
            let now = late + refresh * i;
            if throttle.should_draw(now) {
                assert!(now - previous >= interval, "frames {:?} apart", now - previous);
                previous = now;
            }
        }
        assert!(previous > late);
    }
}
