//! Frame pacing diagnostics
//!
//! - [`FramePacer`]: instantaneous fps from the interval between displayed frames
//! - [`RelayStats`]: producer/consumer counters, logged periodically
//!
//! Neither gates the render rate; frames are shown as soon as they arrive.

use std::time::{Duration, Instant};

use crate::capture::CaptureCounters;

/// Instantaneous frame rate, `1 / Δt` between the last two displayed frames, no smoothing.
#[derive(Debug, Default)]
pub struct FramePacer {
    last_frame: Option<Instant>,
    fps: Option<f64>,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a displayed frame at `now` and return the updated fps.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        if let Some(last) = self.last_frame {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                self.fps = Some(1.0 / elapsed);
            }
        }
        self.last_frame = Some(now);
        self.fps
    }

    /// Last computed fps, `None` until two frames were displayed.
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }
}

/// Tracks how many frames crossed the relay and how many were displayed
pub struct RelayStats {
    /// Producer side, shared with the capture thread
    capture: CaptureCounters,

    /// Frames uploaded and presented by the consumer
    frames_rendered: u64,

    /// Last instantaneous fps from the pacer
    last_fps: Option<f64>,

    /// Last time stats were logged
    last_stats_log: Instant,
}

impl RelayStats {
    pub fn new(capture: CaptureCounters) -> Self {
        Self {
            capture,
            frames_rendered: 0,
            last_fps: None,
            last_stats_log: Instant::now(),
        }
    }

    pub fn record_rendered(&mut self, fps: Option<f64>) {
        self.frames_rendered += 1;
        if fps.is_some() {
            self.last_fps = fps;
        }
    }

    pub fn frames_published(&self) -> u64 {
        self.capture.published()
    }

    pub fn frames_skipped(&self) -> u64 {
        self.capture.skipped()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Published frames that were overwritten before the consumer took them.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_published().saturating_sub(self.frames_rendered)
    }

    /// Dropped frames as a percentage of published ones
    pub fn drop_rate(&self) -> f64 {
        let published = self.frames_published();
        if published == 0 {
            0.0
        } else {
            (self.frames_dropped() as f64 / published as f64) * 100.0
        }
    }

    /// Log statistics if `interval` has elapsed. A zero interval disables logging.
    pub fn maybe_log_stats(&mut self, interval: Duration) {
        if interval.is_zero() || self.last_stats_log.elapsed() < interval {
            return;
        }

        log::info!(
            "Relay stats ({:.1} fps): {} published, {} rendered, {} dropped ({:.1}%), {} capture skips",
            self.last_fps.unwrap_or(0.0),
            self.frames_published(),
            self.frames_rendered,
            self.frames_dropped(),
            self.drop_rate(),
            self.frames_skipped()
        );

        self.last_stats_log = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_needs_two_frames() {
        let mut pacer = FramePacer::new();
        assert_eq!(pacer.tick(Instant::now()), None);
        assert_eq!(pacer.fps(), None);
    }

    #[test]
    fn test_pacer_is_instantaneous() {
        let start = Instant::now();
        let mut pacer = FramePacer::new();
        pacer.tick(start);

        let fps = pacer.tick(start + Duration::from_millis(20)).unwrap();
        assert!((fps - 50.0).abs() < 1e-6);

        // No smoothing: a single slow frame shows up immediately
        let fps = pacer
            .tick(start + Duration::from_millis(20) + Duration::from_millis(100))
            .unwrap();
        assert!((fps - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_pacer_ignores_zero_interval() {
        let now = Instant::now();
        let mut pacer = FramePacer::new();
        pacer.tick(now);
        pacer.tick(now + Duration::from_millis(10));
        let fps = pacer.tick(now + Duration::from_millis(10)).unwrap();
        assert!((fps - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_relay_stats_drops() {
        let counters = CaptureCounters::default();
        let mut stats = RelayStats::new(counters.clone());

        for _ in 0..10 {
            counters.record_published();
        }
        counters.record_skipped();
        for _ in 0..7 {
            stats.record_rendered(Some(60.0));
        }

        assert_eq!(stats.frames_published(), 10);
        assert_eq!(stats.frames_rendered(), 7);
        assert_eq!(stats.frames_dropped(), 3);
        assert_eq!(stats.frames_skipped(), 1);
        assert!((stats.drop_rate() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_relay_stats_empty() {
        let stats = RelayStats::new(CaptureCounters::default());
        assert_eq!(stats.drop_rate(), 0.0);
        assert_eq!(stats.frames_dropped(), 0);
    }
}
