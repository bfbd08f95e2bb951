//! edb: a low-latency bridge from a video capture device to a display
//!
//! A capture thread writes frames into a wait-free triple buffer ([`relay`]);
//! the render thread takes the newest one, uploads it to the GPU, reorders
//! its channels, letterboxes it and presents it ([`gpu`]). [`session`] ties
//! both ends together and owns their teardown.

pub mod macros;

pub mod app;
pub mod capture;
pub mod config;
pub mod control;
pub mod gpu;
pub mod overlay;
pub mod pacer;
pub mod relay;
pub mod session;
pub mod viewport;

pub use common::{BridgeError, ColorOrder, ControlSignal, Frame};
pub use session::{Presenter, Session, SessionOptions, StepOutcome};
