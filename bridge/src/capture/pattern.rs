use common::{BridgeError, ColorOrder, Frame, SOURCE_CHANNELS};
use std::thread;
use std::time::{Duration, Instant};

use super::CaptureSource;

/// Colour bars in BGR order: white, yellow, cyan, green, magenta, red, blue, black
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [16, 235, 235],
    [235, 235, 16],
    [16, 235, 16],
    [235, 16, 235],
    [16, 16, 235],
    [235, 16, 16],
    [16, 16, 16],
];

/// Pixels the bars scroll per frame
const SCROLL_STEP: u64 = 4;

/// Synthetic source producing scrolling colour bars at a fixed rate.
///
/// Useful to exercise the full pipeline without a capture device.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_frame: Instant,
    frame_index: u64,
    closed: bool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Result<Self, BridgeError> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(BridgeError::CaptureOpen(format!(
                "invalid test pattern mode {}x{}@{}",
                width, height, fps
            )));
        }

        log::info!("Test pattern source {}x{}@{}", width, height, fps);
        Ok(Self {
            width,
            height,
            frame_interval: Duration::from_secs(1) / fps,
            next_frame: Instant::now(),
            frame_index: 0,
            closed: false,
        })
    }

    fn draw(&self, pixels: &mut [u8]) {
        let width = self.width as usize;
        let bar_width = (width / BARS.len()).max(1);
        let offset = (self.frame_index * SCROLL_STEP) as usize % width;

        let Some(first_row) = pixels.get_mut(..width * SOURCE_CHANNELS) else {
            return;
        };
        for (x, px) in first_row.chunks_exact_mut(SOURCE_CHANNELS).enumerate() {
            let bar = ((x + offset) % width / bar_width).min(BARS.len() - 1);
            px.copy_from_slice(&BARS[bar]);
        }

        let row_bytes = width * SOURCE_CHANNELS;
        let (head, rest) = pixels.split_at_mut(row_bytes);
        for row in rest.chunks_exact_mut(row_bytes) {
            row.copy_from_slice(head);
        }
    }
}

impl CaptureSource for TestPatternSource {
    fn name(&self) -> &str {
        "test pattern"
    }

    fn read_into(&mut self, frame: &mut Frame) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::CaptureRead("test pattern closed".to_string()));
        }

        let now = Instant::now();
        if self.next_frame > now {
            thread::sleep(self.next_frame - now);
        }
        // Don't try to catch up after a stall
        self.next_frame = self.next_frame.max(now) + self.frame_interval;

        let pixels = frame.reshape(self.width, self.height, ColorOrder::Bgr);
        self.draw(pixels);
        self.frame_index += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
