//! Capture side of the bridge
//!
//! The capture loop runs on its own thread and is the only writer of the
//! frame relay. It asks a [`CaptureSource`] to fill the relay's write slot in
//! place and publishes the slot when a frame arrived.
//!
//! - `priority`: scoped elevated scheduling for the capture thread
//! - `pattern`: synthetic colour-bar source, no hardware needed
//! - `gstreamer`: V4L2 device source (feature `video`)
//!
//! A failed or empty read is never an error for the loop: it is counted as a
//! skip and retried after a fixed sleep quantum. A source that never delivers
//! again just keeps the last frame on screen.

mod pattern;
mod priority;

#[cfg(feature = "video")]
mod gstreamer;

#[cfg(feature = "video")]
pub use gstreamer::GstCaptureSource;

#[cfg(not(feature = "video"))]
pub use gstreamer_stub::GstCaptureSource;

pub use pattern::TestPatternSource;
pub use priority::ThreadPriority;

use common::{BridgeError, Frame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::relay::RelayWriter;

/// Adapter around a capture device or synthetic source.
///
/// Opening happens in each implementation's constructor. `close` must be
/// idempotent; implementations also close on drop.
pub trait CaptureSource: Send {
    /// Short description for logs
    fn name(&self) -> &str;

    /// Fill `frame` with the next image, reusing its storage.
    ///
    /// Leaving the frame empty (or returning `CaptureRead`) means "no frame
    /// this time".
    fn read_into(&mut self, frame: &mut Frame) -> Result<(), BridgeError>;

    /// Release the device handle.
    fn close(&mut self);
}

/// Requested device and mode for a hardware source
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Numeric index (`/dev/video<N>`) or a device path
    pub device: String,
    /// Requested mode, 0 leaves the choice to the device
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// How long a single read waits for a frame
    pub read_timeout: Duration,
}

impl DeviceSettings {
    /// Device node for the configured device.
    pub fn device_path(&self) -> String {
        if !self.device.is_empty() && self.device.chars().all(|c| c.is_ascii_digit()) {
            format!("/dev/video{}", self.device)
        } else {
            self.device.clone()
        }
    }
}

/// Producer-side counters, shared with the consumer for statistics
#[derive(Debug, Clone, Default)]
pub struct CaptureCounters {
    published: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl CaptureCounters {
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Raise the capture thread's scheduling priority while it runs
    pub elevate_priority: bool,
    /// Sleep after a skipped read. Fixed, no backoff.
    pub retry_quantum: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            elevate_priority: true,
            retry_quantum: Duration::from_millis(1),
        }
    }
}

/// Handle to the running capture thread.
///
/// Dropping the handle stops the thread and closes the source.
pub struct CaptureLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Box<dyn CaptureSource>>>,
    counters: CaptureCounters,
}

impl CaptureLoop {
    /// Start capturing from `source` into `writer` while `running` is set.
    pub fn spawn(
        source: Box<dyn CaptureSource>,
        writer: RelayWriter,
        running: Arc<AtomicBool>,
        options: CaptureOptions,
    ) -> Result<Self, BridgeError> {
        let counters = CaptureCounters::default();
        let thread_counters = counters.clone();
        let thread_running = Arc::clone(&running);

        log::info!("Starting capture loop for {}", source.name());
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || run(source, writer, thread_running, thread_counters, options))
            .map_err(|e| BridgeError::Thread(format!("spawn capture thread: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
            counters,
        })
    }

    pub fn counters(&self) -> CaptureCounters {
        self.counters.clone()
    }

    /// Whether the capture thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread, wait for it to exit, then close the source.
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return;
        };
        match handle.join() {
            Ok(mut source) => {
                source.close();
                log::info!(
                    "Capture loop stopped ({} published, {} skipped)",
                    self.counters.published(),
                    self.counters.skipped()
                );
            }
            // The source was dropped (and closed) while unwinding
            Err(_) => log::error!("Capture thread panicked"),
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut source: Box<dyn CaptureSource>,
    mut writer: RelayWriter,
    running: Arc<AtomicBool>,
    counters: CaptureCounters,
    options: CaptureOptions,
) -> Box<dyn CaptureSource> {
    let _priority = options.elevate_priority.then(ThreadPriority::elevate);
    let mut sequence = 0u64;
    let mut failing = false;

    while running.load(Ordering::Acquire) {
        let slot = writer.acquire_write_slot();
        let result = source.read_into(slot);

        let delivered = match result {
            Ok(()) if !slot.is_empty() => {
                sequence += 1;
                slot.sequence = sequence;
                true
            }
            Ok(()) => {
                log::trace!("Capture returned an empty frame");
                false
            }
            Err(e) => {
                if !failing {
                    log::warn!("Capture source stopped delivering frames: {}", e);
                }
                log::trace!("Capture read failed: {}", e);
                failing = true;
                false
            }
        };

        if delivered {
            if failing {
                log::info!("Capture source recovered");
                failing = false;
            }
            writer.publish();
            counters.record_published();
        } else {
            counters.record_skipped();
            thread::sleep(options.retry_quantum);
        }
    }

    source
}

#[cfg(not(feature = "video"))]
mod gstreamer_stub {
    use super::{CaptureSource, DeviceSettings};
    use common::{BridgeError, Frame};

    /// Stub device source when the video feature is disabled
    pub struct GstCaptureSource;

    impl GstCaptureSource {
        pub fn open(settings: &DeviceSettings) -> Result<Self, BridgeError> {
            Err(BridgeError::CaptureOpen(format!(
                "cannot open {}: built without the `video` feature",
                settings.device_path()
            )))
        }
    }

    impl CaptureSource for GstCaptureSource {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn read_into(&mut self, _frame: &mut Frame) -> Result<(), BridgeError> {
            Err(BridgeError::CaptureRead("video support disabled".to_string()))
        }

        fn close(&mut self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay;
    use common::ColorOrder;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Alternates between a good frame and a failed read
    struct FlakySource {
        reads: u64,
        closed: Arc<Mutex<u32>>,
    }

    impl CaptureSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn read_into(&mut self, frame: &mut Frame) -> Result<(), BridgeError> {
            self.reads += 1;
            match self.reads % 3 {
                0 => Err(BridgeError::CaptureRead("no signal".into())),
                1 => {
                    frame.reshape(0, 0, ColorOrder::Bgr);
                    Ok(())
                }
                _ => {
                    frame.reshape(2, 2, ColorOrder::Bgr).fill(self.reads as u8);
                    Ok(())
                }
            }
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_device_path() {
        let mut settings = DeviceSettings {
            device: "2".into(),
            width: 0,
            height: 0,
            fps: 0,
            read_timeout: Duration::from_millis(100),
        };
        assert_eq!(settings.device_path(), "/dev/video2");

        settings.device = "/dev/v4l/by-id/usb-capture".into();
        assert_eq!(settings.device_path(), "/dev/v4l/by-id/usb-capture");
    }

    #[test]
    fn test_failures_are_skipped_and_frames_published() {
        let closed = Arc::new(Mutex::new(0));
        let (writer, mut reader) = relay::channel();
        let running = Arc::new(AtomicBool::new(true));

        let mut capture = CaptureLoop::spawn(
            Box::new(FlakySource {
                reads: 0,
                closed: Arc::clone(&closed),
            }),
            writer,
            Arc::clone(&running),
            CaptureOptions {
                elevate_priority: false,
                retry_quantum: Duration::from_micros(100),
            },
        )
        .unwrap();

        let counters = capture.counters();
        assert!(wait_for(Duration::from_secs(5), || counters.published() >= 5
            && counters.skipped() >= 5));

        capture.stop();
        assert!(!capture.is_running());
        assert_eq!(*closed.lock().unwrap(), 1);

        let frame = reader.try_read().expect("published frame");
        assert!(!frame.is_empty());
        assert_eq!(frame.sequence, counters.published());
    }

    #[test]
    fn test_stop_is_idempotent_and_drop_closes_once() {
        let closed = Arc::new(Mutex::new(0));
        let (writer, _reader) = relay::channel();
        let running = Arc::new(AtomicBool::new(true));

        {
            let mut capture = CaptureLoop::spawn(
                Box::new(FlakySource {
                    reads: 0,
                    closed: Arc::clone(&closed),
                }),
                writer,
                running,
                CaptureOptions {
                    elevate_priority: false,
                    ..Default::default()
                },
            )
            .unwrap();
            capture.stop();
            capture.stop();
        }

        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_shared_running_flag_ends_loop() {
        let closed = Arc::new(Mutex::new(0));
        let (writer, _reader) = relay::channel();
        let running = Arc::new(AtomicBool::new(true));

        let capture = CaptureLoop::spawn(
            Box::new(FlakySource {
                reads: 0,
                closed: Arc::clone(&closed),
            }),
            writer,
            Arc::clone(&running),
            CaptureOptions {
                elevate_priority: false,
                ..Default::default()
            },
        )
        .unwrap();

        running.store(false, Ordering::Release);
        assert!(wait_for(Duration::from_secs(5), || !capture.is_running()));
        drop(capture);
        assert_eq!(*closed.lock().unwrap(), 1);
    }
}
