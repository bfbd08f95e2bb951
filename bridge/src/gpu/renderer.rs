use crate::gpu::pipeline::PresentPipeline;
use crate::gpu::surface::SurfaceTarget;
use crate::gpu::texture::{FRAME_TEXTURE_FORMAT, TEXTURE_CHANNELS, VideoTexture, expand_to_rgba};
use crate::gpu::GpuContext;
use crate::overlay::OverlayText;
use crate::session::Presenter;
use crate::viewport::{Viewport, letterbox};

use common::{BridgeError, Frame};
use wgpu::util::DeviceExt;

/// Uniform block of the presentation shader
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ConvertParams {
    swap_red_blue: u32,
    _padding: [u32; 3],
}

impl ConvertParams {
    fn new(swap_red_blue: bool) -> Self {
        Self {
            swap_red_blue: swap_red_blue as u32,
            _padding: [0; 3],
        }
    }
}

/// Uploads frames into a texture that follows their size and draws it letterboxed.
///
/// Independent of any window: the same renderer draws into a surface back
/// buffer or into an offscreen texture.
pub struct FrameRenderer {
    pipeline: PresentPipeline,
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    target_format: wgpu::TextureFormat,
    texture: Option<VideoTexture>,
    /// Expanded 4-channel copy of the last frame, reused between uploads
    staging: Vec<u8>,
    generation: u64,
    swap_red_blue: bool,
}

impl FrameRenderer {
    pub fn new(
        context: &GpuContext,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, BridgeError> {
        let device = &context.device;

        // Raw redisplay: no smoothing, no mips, nothing sampled outside the frame
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let swap_red_blue = true;
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Convert Params"),
            contents: bytemuck::bytes_of(&ConvertParams::new(swap_red_blue)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let pipeline = PresentPipeline::new(device, target_format);
        context.check_device()?;

        log::debug!("Frame renderer ready (target {:?})", target_format);

        Ok(Self {
            pipeline,
            sampler,
            params_buffer,
            target_format,
            texture: None,
            staging: Vec::new(),
            generation: 0,
            swap_red_blue,
        })
    }

    /// Size of the current frame texture.
    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.texture.as_ref().map(|t| (t.width, t.height))
    }

    /// Number of times the frame texture has been (re)created.
    pub fn texture_generation(&self) -> u64 {
        self.generation
    }

    /// Copy `frame` into the frame texture, recreating it first if the size changed.
    pub fn upload(
        &mut self,
        context: &GpuContext,
        frame: &Frame,
        overlay: Option<&OverlayText>,
    ) -> Result<(), BridgeError> {
        if frame.is_empty() {
            log::trace!("Skipping upload of empty frame {}", frame.sequence);
            return Ok(());
        }
        context.check_device()?;

        if !self
            .texture
            .as_ref()
            .is_some_and(|t| t.matches(frame.width, frame.height))
        {
            self.recreate_texture(context, frame.width, frame.height)?;
        }
        let Some(texture) = &self.texture else {
            return Err(BridgeError::ResourceCreation("frame texture missing".to_string()));
        };

        expand_to_rgba(frame, &mut self.staging);
        if let Some(overlay) = overlay {
            overlay.draw(&mut self.staging, frame.width, frame.height);
        }

        let swap = frame.order.swaps_red_blue();
        if swap != self.swap_red_blue {
            self.swap_red_blue = swap;
            context.queue.write_buffer(
                &self.params_buffer,
                0,
                bytemuck::bytes_of(&ConvertParams::new(swap)),
            );
        }

        texture.write(&context.queue, &self.staging);
        context.check_device()
    }

    fn recreate_texture(
        &mut self,
        context: &GpuContext,
        width: u32,
        height: u32,
    ) -> Result<(), BridgeError> {
        context.check_texture_size(width, height)?;

        if let Some(old) = self.texture.take() {
            log::info!(
                "Frame size changed {}x{} -> {}x{}, recreating texture",
                old.width,
                old.height,
                width,
                height
            );
            old.texture.destroy();
        } else {
            log::info!("Creating frame texture {}x{}", width, height);
        }

        self.generation += 1;
        let texture = VideoTexture::new(
            &context.device,
            &self.pipeline,
            &self.sampler,
            &self.params_buffer,
            width,
            height,
            self.generation,
        );
        // An allocation failure surfaces here rather than on first use
        context.check_device()?;
        self.texture = Some(texture);
        Ok(())
    }

    /// Record the clear + letterboxed draw into `view` of size `out_w`x`out_h`.
    ///
    /// Returns the viewport used, `None` when there is nothing to draw yet
    /// (the target is still cleared to black).
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        out_w: u32,
        out_h: u32,
    ) -> Option<Viewport> {
        let placed = self
            .texture
            .as_ref()
            .and_then(|t| letterbox(t.width, t.height, out_w, out_h).map(|vp| (t, vp)));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let (texture, viewport) = placed?;
        pass.set_pipeline(&self.pipeline.pipeline);
        pass.set_bind_group(0, &texture.bind_group, &[]);
        pass.set_viewport(
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            0.0,
            1.0,
        );
        pass.draw(0..3, 0..1);
        Some(viewport)
    }

    /// Render the current frame offscreen at `width`x`height` and read it back
    /// as tightly packed RGBA.
    pub fn read_back(
        &self,
        context: &GpuContext,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BridgeError> {
        if self.target_format != FRAME_TEXTURE_FORMAT {
            return Err(BridgeError::ResourceCreation(format!(
                "read back needs a {:?} pipeline, renderer targets {:?}",
                FRAME_TEXTURE_FORMAT, self.target_format
            )));
        }
        context.check_texture_size(width, height)?;

        let output = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Readback Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = output.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        self.encode(&mut encoder, &view, width, height);

        // bytes_per_row must be aligned to COPY_BYTES_PER_ROW_ALIGNMENT for texture -> buffer copies
        let row_bytes = width * TEXTURE_CHANNELS as u32;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = row_bytes.div_ceil(align) * align;

        let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_row_bytes * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            output.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        context.queue.submit(std::iter::once(encoder.finish()));
        context.check_device()?;

        let slice = buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = context.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        pollster::block_on(receiver)
            .map_err(|e| BridgeError::ResourceCreation(format!("readback cancelled: {}", e)))?
            .map_err(|e| BridgeError::ResourceCreation(format!("map readback buffer: {}", e)))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        for row in mapped.chunks_exact(padded_row_bytes as usize) {
            pixels.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        buffer.unmap();

        Ok(pixels)
    }
}

/// Lifecycle of the presentation engine. `Fatal` is absorbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    Fatal(BridgeError),
}

/// GPU presentation for one window: context, surface and frame renderer.
///
/// Fields are declared in reverse acquisition order so they are released
/// renderer first, context last.
pub struct PresentationEngine {
    renderer: FrameRenderer,
    surface: SurfaceTarget,
    context: GpuContext,
    state: EngineState,
}

impl PresentationEngine {
    /// Bind to `target` (a window) whose drawable area is `width`x`height` pixels.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self, BridgeError> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(target)
            .map_err(|e| crate::gpu_error!(GpuInit, "create surface", e))?;

        let context = pollster::block_on(GpuContext::new(&instance, Some(&surface)))?;
        let surface = SurfaceTarget::new(surface, &context, width, height, vsync)?;
        let renderer = FrameRenderer::new(&context, surface.format())?;

        log::info!(
            "Presentation engine ready: {}x{}, vsync {}",
            width,
            height,
            if vsync { "on" } else { "off" }
        );

        Ok(Self {
            renderer,
            surface,
            context,
            state: EngineState::Ready,
        })
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    pub fn present_mode(&self) -> wgpu::PresentMode {
        self.surface.present_mode()
    }

    fn ensure_ready(&self) -> Result<(), BridgeError> {
        match &self.state {
            EngineState::Ready => self.context.check_device(),
            EngineState::Fatal(e) => Err(e.clone()),
        }
    }

    fn fail(&mut self, error: BridgeError) -> BridgeError {
        if error.is_fatal() && self.state == EngineState::Ready {
            log::error!("Presentation engine failed: {}", error);
            self.state = EngineState::Fatal(error.clone());
        }
        error
    }
}

impl Presenter for PresentationEngine {
    fn upload_frame(
        &mut self,
        frame: &Frame,
        overlay: Option<&OverlayText>,
    ) -> Result<(), BridgeError> {
        if let Err(e) = self.ensure_ready() {
            return Err(self.fail(e));
        }
        self.renderer
            .upload(&self.context, frame, overlay)
            .map_err(|e| self.fail(e))
    }

    fn render(&mut self, vsync: bool) -> Result<bool, BridgeError> {
        if let Err(e) = self.ensure_ready() {
            return Err(self.fail(e));
        }
        if vsync != self.surface.vsync()
            && let Err(e) = self.surface.set_vsync(&self.context, vsync)
        {
            return Err(self.fail(e));
        }

        let acquired = match self.surface.acquire(&self.context) {
            Ok(acquired) => acquired,
            Err(e) => return Err(self.fail(e)),
        };
        let Some(back_buffer) = acquired else {
            return Ok(false);
        };

        let view = back_buffer
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Encoder"),
            });

        let (width, height) = self.surface.size();
        self.renderer.encode(&mut encoder, &view, width, height);
        self.context.queue.submit(std::iter::once(encoder.finish()));
        if let Err(e) = self.context.check_device() {
            return Err(self.fail(e));
        }
        back_buffer.present();
        Ok(true)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BridgeError> {
        if let Err(e) = self.ensure_ready() {
            return Err(self.fail(e));
        }
        self.surface
            .resize(&self.context, width, height)
            .map_err(|e| self.fail(e))
    }
}

impl Drop for PresentationEngine {
    fn drop(&mut self) {
        log::debug!("Releasing presentation engine");
    }
}
