//! Window and input glue
//!
//! The winit event loop is the render loop: every `about_to_wait` runs one
//! session step. When no new frame was available the loop sleeps for the
//! configured poll quantum and polls again; it never blocks on the capture
//! thread.

use anyhow::{Context, Result};
use common::{BridgeError, ControlSignal};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::Key;
use winit::window::{Fullscreen, Window, WindowId};

use crate::capture::CaptureSource;
use crate::config::Config;
use crate::control::ControlInput;
use crate::gpu::PresentationEngine;
use crate::session::{Session, SessionOptions, StepOutcome};

/// Run the bridge until the user exits or a fatal error ends the session.
pub fn run(config: &Config, source: Box<dyn CaptureSource>) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = BridgeApp::new(config, source);

    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    match app.exit_error.take() {
        Some(e) => Err(e).context("Session ended with an error"),
        None => Ok(()),
    }
}

struct BridgeApp {
    /// Taken when the session starts
    source: Option<Box<dyn CaptureSource>>,
    options: SessionOptions,
    input: ControlInput,
    poll_quantum: Duration,
    fullscreen: bool,
    session: Option<Session<PresentationEngine>>,
    window: Option<Arc<Window>>,
    exit_error: Option<BridgeError>,
}

impl BridgeApp {
    fn new(config: &Config, source: Box<dyn CaptureSource>) -> Self {
        Self {
            source: Some(source),
            options: config.session_options(),
            input: config.control_input(),
            poll_quantum: config.poll_quantum(),
            fullscreen: config.display.fullscreen,
            session: None,
            window: None,
            exit_error: None,
        }
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>, BridgeError> {
        let mut attributes = Window::default_attributes().with_title("edb");
        if self.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| BridgeError::Surface(format!("create window: {}", e)))?;
        if self.fullscreen {
            window.set_cursor_visible(false);
        }
        Ok(Arc::new(window))
    }

    fn start_session(&mut self, event_loop: &ActiveEventLoop) -> Result<(), BridgeError> {
        let Some(source) = self.source.take() else {
            return Ok(());
        };

        let window = self.create_window(event_loop)?;
        let size = window.inner_size();
        log::info!(
            "Display target {}x{} ({})",
            size.width,
            size.height,
            if self.fullscreen { "fullscreen" } else { "windowed" }
        );

        let vsync = self.options.vsync;
        let target = Arc::clone(&window);
        let mut session = Session::start(source, self.options.clone(), move || {
            PresentationEngine::new(target, size.width, size.height, vsync)
        })?;

        // Present once so the window shows up before the first frame arrives
        session.resize(size.width, size.height)?;

        self.window = Some(window);
        self.session = Some(session);
        Ok(())
    }

    /// Tear the session down (GPU first, then capture) and leave the event loop.
    fn finish(&mut self, event_loop: &ActiveEventLoop, error: Option<BridgeError>) {
        if let Some(e) = error {
            log::error!("Fatal: {}", e);
            self.exit_error.get_or_insert(e);
        }
        self.session = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for BridgeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }
        if let Err(e) = self.start_session(event_loop) {
            self.finish(event_loop, Some(e));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_none_or(|w| w.id() != window_id) {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => session.apply(ControlSignal::RequestExit),
            WindowEvent::Resized(size) => {
                if let Err(e) = session.resize(size.width, size.height) {
                    if e.is_fatal() {
                        self.finish(event_loop, Some(e));
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let Some(name) = key_name(&event.logical_key) else {
                    return;
                };
                let pressed = event.state == ElementState::Pressed;
                if let Some(signal) = self.input.on_key(&name, pressed) {
                    log::debug!("Key {} -> {:?}", name, signal);
                    session.apply(signal);
                }
            }
            WindowEvent::Focused(false) => self.input.reset(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.step() {
            Ok(StepOutcome::Stopped) => self.finish(event_loop, None),
            Ok(StepOutcome::Idle) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(
                    Instant::now() + self.poll_quantum,
                ));
            }
            Ok(StepOutcome::Presented | StepOutcome::Redrawn | StepOutcome::Skipped) => {
                event_loop.set_control_flow(ControlFlow::Poll);
            }
            Err(e) if e.is_fatal() => self.finish(event_loop, Some(e)),
            Err(e) => log::warn!("Render step failed: {}", e),
        }
    }
}

/// Key name as used in the `[keys]` config section
fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Named(named) => Some(format!("{:?}", named)),
        Key::Character(text) => Some(text.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::NamedKey;

    #[test]
    fn test_key_names_match_config_defaults() {
        let input = Config::default().control_input();

        let escape = key_name(&Key::Named(NamedKey::Escape)).unwrap();
        assert_eq!(input.signal_for(&escape), Some(ControlSignal::RequestExit));

        let f = key_name(&Key::Character("f".into())).unwrap();
        assert_eq!(input.signal_for(&f), Some(ControlSignal::ToggleOverlay));

        assert_eq!(key_name(&Key::Named(NamedKey::F5)).as_deref(), Some("F5"));
    }
}
