/// Offscreen rendering tests for the frame renderer
/// Skipped when no GPU adapter is available (CI without a GPU or software rasterizer)
use bridge::gpu::{FRAME_TEXTURE_FORMAT, FrameRenderer, GpuContext};
use bridge::overlay::OverlayText;
use bridge::viewport::Viewport;
use bridge::{BridgeError, ColorOrder, Frame};

fn context() -> Option<GpuContext> {
    match pollster::block_on(GpuContext::headless()) {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("Skipping GPU test: {}", e);
            None
        }
    }
}

fn solid_frame(width: u32, height: u32, pixel: [u8; 3], order: ColorOrder) -> Frame {
    let mut frame = Frame::empty();
    for chunk in frame.reshape(width, height, order).chunks_exact_mut(3) {
        chunk.copy_from_slice(&pixel);
    }
    frame.sequence = 1;
    frame
}

fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    [
        pixels[offset],
        pixels[offset + 1],
        pixels[offset + 2],
        pixels[offset + 3],
    ]
}

/// Encode one draw into an offscreen target of `width`x`height` and return its viewport
fn encode_into(
    ctx: &GpuContext,
    renderer: &FrameRenderer,
    width: u32,
    height: u32,
) -> Option<Viewport> {
    let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test Target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FRAME_TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

    let viewport = renderer.encode(&mut encoder, &view, width, height);
    ctx.queue.submit(std::iter::once(encoder.finish()));
    viewport
}

#[test]
fn test_bgr_frame_is_displayed_as_rgb() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();

    let frame = solid_frame(8, 8, [10, 20, 30], ColorOrder::Bgr);
    renderer.upload(&ctx, &frame, None).unwrap();

    let pixels = renderer.read_back(&ctx, 8, 8).unwrap();
    assert_eq!(pixels.len(), 8 * 8 * 4);
    for rgba in pixels.chunks_exact(4) {
        assert_eq!(rgba, [30, 20, 10, 255]);
    }
}

#[test]
fn test_rgb_frame_is_not_swapped() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();

    renderer
        .upload(&ctx, &solid_frame(4, 4, [10, 20, 30], ColorOrder::Bgr), None)
        .unwrap();
    renderer
        .upload(&ctx, &solid_frame(4, 4, [10, 20, 30], ColorOrder::Rgb), None)
        .unwrap();

    let pixels = renderer.read_back(&ctx, 4, 4).unwrap();
    assert_eq!(pixel_at(&pixels, 4, 2, 2), [10, 20, 30, 255]);
}

#[test]
fn test_size_change_recreates_texture() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();
    assert_eq!(renderer.texture_size(), None);

    renderer
        .upload(&ctx, &solid_frame(1920, 1080, [0, 0, 0], ColorOrder::Bgr), None)
        .unwrap();
    assert_eq!(renderer.texture_size(), Some((1920, 1080)));
    let first = renderer.texture_generation();

    // Same size reuses the texture
    renderer
        .upload(&ctx, &solid_frame(1920, 1080, [1, 1, 1], ColorOrder::Bgr), None)
        .unwrap();
    assert_eq!(renderer.texture_generation(), first);

    renderer
        .upload(&ctx, &solid_frame(1280, 720, [0, 0, 0], ColorOrder::Bgr), None)
        .unwrap();
    assert_eq!(renderer.texture_size(), Some((1280, 720)));
    assert_eq!(renderer.texture_generation(), first + 1);
}

#[test]
fn test_encode_letterboxes_into_output() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();
    assert_eq!(encode_into(&ctx, &renderer, 1280, 1024), None);

    renderer
        .upload(&ctx, &solid_frame(1920, 1080, [0, 0, 255], ColorOrder::Bgr), None)
        .unwrap();
    let viewport = encode_into(&ctx, &renderer, 1280, 1024).unwrap();
    assert!((viewport.width - 1280.0).abs() < 1e-3);
    assert!((viewport.height - 720.0).abs() < 1e-3);
    assert!(viewport.x.abs() < 1e-3);
    assert!((viewport.y - 152.0).abs() < 1e-3);
    assert!((viewport.scale - 1280.0 / 1920.0).abs() < 1e-4);
}

#[test]
fn test_render_after_size_change_uses_new_size() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();

    renderer
        .upload(&ctx, &solid_frame(1920, 1080, [0, 0, 0], ColorOrder::Bgr), None)
        .unwrap();
    renderer
        .upload(&ctx, &solid_frame(1280, 720, [0, 0, 0], ColorOrder::Bgr), None)
        .unwrap();

    // 1280x720 fits 1280x1024 unscaled; the old 1920x1080 would give 0.667
    let viewport = encode_into(&ctx, &renderer, 1280, 1024).unwrap();
    assert_eq!(viewport.scale, 1.0);
    assert_eq!(viewport.width, 1280.0);
    assert_eq!(viewport.height, 720.0);
    assert_eq!(viewport.y, 152.0);

    // 1280x720 into 640x480 is limited by width
    let viewport = encode_into(&ctx, &renderer, 640, 480).unwrap();
    assert_eq!(viewport.scale, 0.5);
    assert_eq!(viewport.height, 360.0);
    assert_eq!(viewport.y, 60.0);
}

#[test]
fn test_device_error_is_reported_not_raised() {
    let Some(ctx) = context() else { return };
    assert!(ctx.check_device().is_ok());

    // A zero-sized texture is a validation error
    let _invalid = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Invalid Texture"),
        size: wgpu::Extent3d {
            width: 0,
            height: 0,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FRAME_TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    assert!(ctx.device_error().is_some());
    assert!(matches!(ctx.check_device(), Err(BridgeError::ResourceCreation(_))));

    // The error sticks, so the next resource creation fails too
    let renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT);
    assert!(matches!(renderer, Err(BridgeError::ResourceCreation(_))));
}

#[test]
fn test_letterbox_margins_are_black() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();

    // 4x2 into 4x4: one black row above and below
    renderer
        .upload(&ctx, &solid_frame(4, 2, [200, 100, 50], ColorOrder::Rgb), None)
        .unwrap();
    let pixels = renderer.read_back(&ctx, 4, 4).unwrap();

    for x in 0..4 {
        assert_eq!(pixel_at(&pixels, 4, x, 0), [0, 0, 0, 255]);
        assert_eq!(pixel_at(&pixels, 4, x, 1), [200, 100, 50, 255]);
        assert_eq!(pixel_at(&pixels, 4, x, 2), [200, 100, 50, 255]);
        assert_eq!(pixel_at(&pixels, 4, x, 3), [0, 0, 0, 255]);
    }
}

#[test]
fn test_nothing_uploaded_reads_back_black() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();

    // Empty frames are ignored
    renderer.upload(&ctx, &Frame::empty(), None).unwrap();
    assert_eq!(renderer.texture_generation(), 0);

    let pixels = renderer.read_back(&ctx, 2, 2).unwrap();
    assert!(pixels.chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
}

#[test]
fn test_overlay_is_burned_into_frame() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();

    let frame = solid_frame(320, 120, [0, 0, 0], ColorOrder::Bgr);
    let overlay = OverlayText::fps(59.9, false);
    renderer.upload(&ctx, &frame, Some(&overlay)).unwrap();

    let pixels = renderer.read_back(&ctx, 320, 120).unwrap();
    let lit = pixels
        .chunks_exact(4)
        .filter(|p| *p == [160, 160, 160, 255])
        .count();
    assert!(lit > 0, "overlay text not visible");
    // Text sits in the bottom-left corner, the top row stays untouched
    assert!(pixels[..320 * 4].chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
}

#[test]
fn test_oversized_frame_is_rejected() {
    let Some(ctx) = context() else { return };
    let mut renderer = FrameRenderer::new(&ctx, FRAME_TEXTURE_FORMAT).unwrap();

    let too_wide = ctx.limits.max_texture_dimension_2d + 1;
    let frame = solid_frame(too_wide, 1, [0, 0, 0], ColorOrder::Bgr);
    let result = renderer.upload(&ctx, &frame, None);

    assert!(matches!(result, Err(BridgeError::ResourceCreation(_))));
    assert_eq!(renderer.texture_size(), None);
}
