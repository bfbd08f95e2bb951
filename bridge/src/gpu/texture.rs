use common::{Frame, SOURCE_CHANNELS};

use crate::gpu::pipeline::PresentPipeline;

/// Bytes per pixel of the GPU frame texture.
pub const TEXTURE_CHANNELS: usize = 4;

/// Format of the frame texture. Unorm, so channel values reach the shader unaltered.
pub const FRAME_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const OPAQUE: u8 = 0xFF;

/// GPU texture sized to the incoming frames, with its bind group for the presentation pass
pub struct VideoTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
    pub width: u32,
    pub height: u32,
    /// Bumped every time the texture is recreated
    pub generation: u64,
}

impl VideoTexture {
    /// Allocate a texture for `width`x`height` frames and bind it with the shared sampler and parameters.
    pub fn new(
        device: &wgpu::Device,
        pipeline: &PresentPipeline,
        sampler: &wgpu::Sampler,
        params: &wgpu::Buffer,
        width: u32,
        height: u32,
        generation: u64,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = pipeline.bind_frame(device, &view, sampler, params);

        Self {
            texture,
            view,
            bind_group,
            width,
            height,
            generation,
        }
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Replace the whole texture content with tightly packed 4-channel rows.
    ///
    /// The queue stages the data in fresh memory, so this never waits on a
    /// draw that is still sampling the previous content.
    pub fn write(&self, queue: &wgpu::Queue, pixels: &[u8]) {
        queue.write_texture(
            self.texture.as_image_copy(),
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * TEXTURE_CHANNELS as u32),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Expand a packed 3-channel frame into tightly packed 4-channel rows.
///
/// Rows are copied one at a time so any source stride padding is dropped.
/// Channel order is preserved; the shader does the reordering. Reuses `out`.
pub fn expand_to_rgba(frame: &Frame, out: &mut Vec<u8>) {
    let row_out = frame.width as usize * TEXTURE_CHANNELS;
    out.clear();
    out.resize(row_out * frame.height as usize, OPAQUE);

    for (y, dst_row) in out.chunks_exact_mut(row_out).enumerate() {
        let Some(src_row) = frame.row(y as u32) else {
            break;
        };
        for (dst, src) in dst_row
            .chunks_exact_mut(TEXTURE_CHANNELS)
            .zip(src_row.chunks_exact(SOURCE_CHANNELS))
        {
            dst[..SOURCE_CHANNELS].copy_from_slice(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ColorOrder;

    #[test]
    fn test_expand_appends_opaque_alpha() {
        let mut frame = Frame::empty();
        frame.fill_from(&[10, 20, 30, 40, 50, 60], 2, 1, 6, ColorOrder::Bgr);

        let mut out = Vec::new();
        expand_to_rgba(&frame, &mut out);
        assert_eq!(out, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_expand_drops_stride_padding() {
        let mut frame = Frame::empty();
        let data = [
            1, 2, 3, 9, 9, // row 0 + padding
            4, 5, 6, 9, 9, // row 1 + padding
        ];
        frame.fill_from(&data, 1, 2, 5, ColorOrder::Rgb);

        let mut out = Vec::new();
        expand_to_rgba(&frame, &mut out);
        assert_eq!(out, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn test_expand_reuses_buffer() {
        let mut frame = Frame::empty();
        frame.reshape(8, 8, ColorOrder::Bgr);

        let mut out = Vec::with_capacity(1024);
        let ptr = out.as_ptr();
        expand_to_rgba(&frame, &mut out);
        assert_eq!(out.len(), 8 * 8 * 4);
        assert_eq!(out.as_ptr(), ptr);
    }
}
