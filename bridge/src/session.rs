//! One bridging session: capture thread, frame relay and presenter
//!
//! The session is driven from the render thread by calling [`Session::step`]
//! once per loop iteration. Each step takes the newest frame from the relay
//! and, if it is new, uploads and presents it. Nothing here blocks waiting
//! for a frame: when no new frame arrived the step returns
//! [`StepOutcome::Idle`] and the caller sleeps for its poll quantum.
//!
//! Teardown order is fixed by field order: the presenter (GPU resources) is
//! released first, then the capture thread is stopped and joined, and only
//! then is the capture source closed.

use common::{BridgeError, ControlSignal, Frame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::capture::{CaptureLoop, CaptureOptions, CaptureSource};
use crate::control::ControlState;
use crate::overlay::OverlayText;
use crate::pacer::{FramePacer, RelayStats};
use crate::relay::{self, RelayReader};

/// Consumer-side display of frames.
///
/// Implemented by the GPU presentation engine; anything else that can show a
/// frame (or record what it was asked to show) can stand in for it.
pub trait Presenter {
    /// Make `frame` the image shown by the next `render`, with optional overlay text.
    fn upload_frame(
        &mut self,
        frame: &Frame,
        overlay: Option<&OverlayText>,
    ) -> Result<(), BridgeError>;

    /// Draw the last uploaded frame and present it.
    ///
    /// Returns `false` when the output was not ready and nothing reached the
    /// display this time.
    fn render(&mut self, vsync: bool) -> Result<bool, BridgeError>;

    /// The output's pixel size changed.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), BridgeError>;
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub capture: CaptureOptions,
    pub show_overlay: bool,
    pub vsync: bool,
    /// Period of the relay statistics log, zero disables it
    pub stats_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            show_overlay: false,
            vsync: false,
            stats_interval: Duration::from_secs(5),
        }
    }
}

/// What a single [`Session::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A newly published frame was uploaded and presented
    Presented,
    /// The current frame was shown again after a resize or toggle
    Redrawn,
    /// The output could not take a frame; the step is retried
    Skipped,
    /// Nothing new to show
    Idle,
    /// The session was asked to stop
    Stopped,
}

pub struct Session<P: Presenter> {
    presenter: P,
    reader: RelayReader,
    capture: CaptureLoop,
    running: Arc<AtomicBool>,
    control: Arc<ControlState>,
    pacer: FramePacer,
    stats: RelayStats,
    stats_interval: Duration,
    /// Sequence of the frame last handed to the presenter (0 = none)
    last_sequence: u64,
    /// Show the current frame again on the next step
    needs_refresh: bool,
}

impl<P: Presenter> Session<P> {
    /// Start capturing from `source`, then create the presenter.
    ///
    /// If the presenter cannot be created the capture thread is stopped and
    /// the source closed before the error is returned.
    pub fn start<F>(
        source: Box<dyn CaptureSource>,
        options: SessionOptions,
        create_presenter: F,
    ) -> Result<Self, BridgeError>
    where
        F: FnOnce() -> Result<P, BridgeError>,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (writer, reader) = relay::channel();
        let mut capture = CaptureLoop::spawn(source, writer, Arc::clone(&running), options.capture)?;

        let presenter = match create_presenter() {
            Ok(presenter) => presenter,
            Err(e) => {
                log::error!("Presenter initialization failed: {}", e);
                capture.stop();
                return Err(e);
            }
        };

        let stats = RelayStats::new(capture.counters());
        log::info!(
            "Session started (vsync {}, overlay {})",
            on_off(options.vsync),
            on_off(options.show_overlay)
        );

        Ok(Self {
            presenter,
            reader,
            capture,
            running,
            control: Arc::new(ControlState::new(options.show_overlay, options.vsync)),
            pacer: FramePacer::new(),
            stats,
            stats_interval: options.stats_interval,
            last_sequence: 0,
            needs_refresh: false,
        })
    }

    /// Ask both loops to finish. The render loop sees it on its next step.
    pub fn request_stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            log::info!("Session stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared control flags, for collaborators that toggle them directly.
    pub fn control(&self) -> Arc<ControlState> {
        Arc::clone(&self.control)
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Whether the capture thread is still alive.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    /// Apply a control signal from the input collaborator.
    pub fn apply(&mut self, signal: ControlSignal) {
        match signal {
            ControlSignal::ToggleOverlay => {
                let shown = self.control.toggle_overlay();
                log::info!("FPS overlay {}", on_off(shown));
                self.needs_refresh = true;
            }
            ControlSignal::ToggleVsync => {
                let vsync = self.control.toggle_vsync();
                log::info!("VSync {}", on_off(vsync));
                self.needs_refresh = true;
            }
            ControlSignal::RequestExit => self.request_stop(),
        }
    }

    /// The display target changed size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), BridgeError> {
        log::debug!("Output resized to {}x{}", width, height);
        self.presenter.resize(width, height).inspect_err(|e| {
            if e.is_fatal() {
                self.running.store(false, Ordering::Release);
            }
        })?;
        self.needs_refresh = true;
        Ok(())
    }

    /// One render-loop iteration.
    ///
    /// A fatal presenter error stops the session and is returned.
    pub fn step(&mut self) -> Result<StepOutcome, BridgeError> {
        if !self.is_running() {
            return Ok(StepOutcome::Stopped);
        }

        let vsync = self.control.vsync();
        let show_overlay = self.control.show_overlay();

        let Some(frame) = self.reader.try_read() else {
            if !std::mem::take(&mut self.needs_refresh) {
                return Ok(StepOutcome::Idle);
            }
            // Nothing captured yet, present the cleared surface
            return match self.presenter.render(vsync) {
                Ok(true) => Ok(StepOutcome::Redrawn),
                Ok(false) => {
                    self.needs_refresh = true;
                    Ok(StepOutcome::Skipped)
                }
                Err(e) => Err(stop_on_fatal(&self.running, e)),
            };
        };

        let fresh = frame.sequence != self.last_sequence;
        if !fresh && !self.needs_refresh {
            return Ok(StepOutcome::Idle);
        }

        let overlay =
            show_overlay.then(|| OverlayText::fps(self.pacer.fps().unwrap_or(0.0), vsync));

        let shown = self
            .presenter
            .upload_frame(frame, overlay.as_ref())
            .and_then(|()| self.presenter.render(vsync));
        let presented = match shown {
            Ok(presented) => presented,
            Err(e) => return Err(stop_on_fatal(&self.running, e)),
        };

        // Not on screen yet: keep the frame pending so the next step shows it
        if !presented {
            self.needs_refresh = true;
            return Ok(StepOutcome::Skipped);
        }

        self.needs_refresh = false;
        let outcome = if fresh {
            self.pacer.tick(Instant::now());
            self.last_sequence = frame.sequence;
            self.stats.record_rendered(self.pacer.fps());
            StepOutcome::Presented
        } else {
            StepOutcome::Redrawn
        };
        self.stats.maybe_log_stats(self.stats_interval);
        Ok(outcome)
    }
}

impl<P: Presenter> Drop for Session<P> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        log::info!(
            "Session ending ({} frames presented, {} dropped)",
            self.stats.frames_rendered(),
            self.stats.frames_dropped()
        );
    }
}

fn stop_on_fatal(running: &AtomicBool, error: BridgeError) -> BridgeError {
    if error.is_fatal() {
        running.store(false, Ordering::Release);
    }
    error
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}
