//! Letterbox placement of a frame inside the output surface

/// Destination rectangle of the frame on the output, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    /// Margin on the left and right of the picture.
    pub fn horizontal_margin(&self) -> f32 {
        self.x
    }

    /// Margin above and below the picture.
    pub fn vertical_margin(&self) -> f32 {
        self.y
    }
}

/// Fit `tex_w`x`tex_h` into `out_w`x`out_h` preserving aspect ratio, centered.
///
/// `scale = min(out_w / tex_w, out_h / tex_h)`, so only the non-dominant
/// axis gets a margin. Returns `None` when either size has a zero dimension.
pub fn letterbox(tex_w: u32, tex_h: u32, out_w: u32, out_h: u32) -> Option<Viewport> {
    if tex_w == 0 || tex_h == 0 || out_w == 0 || out_h == 0 {
        return None;
    }

    let (tex_w, tex_h) = (tex_w as f32, tex_h as f32);
    let (out_w, out_h) = (out_w as f32, out_h as f32);

    let scale = (out_w / tex_w).min(out_h / tex_h);
    let width = (tex_w * scale).min(out_w);
    let height = (tex_h * scale).min(out_h);

    Some(Viewport {
        x: (out_w - width) / 2.0,
        y: (out_h - height) / 2.0,
        width,
        height,
        scale,
    })
}
