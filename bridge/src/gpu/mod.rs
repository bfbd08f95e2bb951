/// GPU presentation engine using wgpu
///
/// Everything in here is owned and driven by the render (consumer) thread;
/// no wgpu call is made from the capture thread.
///
/// Architecture:
/// - `context`: adapter/device/queue, device-lost detection
/// - `pipeline`: the full-screen presentation pass
/// - `texture`: frame texture that follows the incoming frame size
/// - `surface`: swapchain configuration, present-mode policy, resize
/// - `renderer`: `FrameRenderer` (upload + letterboxed draw) and the
///   window-bound `PresentationEngine`
pub mod context;
pub mod pipeline;
pub mod renderer;
pub mod surface;
pub mod texture;

pub use context::GpuContext;
pub use renderer::{EngineState, FrameRenderer, PresentationEngine};
pub use surface::{SurfaceTarget, select_present_mode};
pub use texture::{FRAME_TEXTURE_FORMAT, VideoTexture};
