//! Diagnostic FPS overlay, rasterised on the CPU into the upload staging buffer
//!
//! The overlay is drawn after a frame has been expanded to 4-channel rows and
//! before it is written to the GPU texture, so the published frame in the
//! relay is never modified.

use crate::gpu::texture::TEXTURE_CHANNELS;

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: usize = 7;
const GLYPH_ADVANCE: usize = GLYPH_WIDTH + 1;

/// Distance of the text from the left and bottom edges, in pixels
const MARGIN: usize = 20;
const SCALE: usize = 2;
const TEXT_GREY: u8 = 160;

/// Text drawn in the bottom-left corner of the displayed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayText {
    text: String,
}

impl OverlayText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// `"59.9 FPS  VSYNC OFF"`
    pub fn fps(fps: f64, vsync: bool) -> Self {
        let vsync = if vsync { "ON" } else { "OFF" };
        Self::new(format!("{:.1} FPS  VSYNC {}", fps, vsync))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Draw into tightly packed 4-channel rows of `width`x`height` pixels.
    ///
    /// Pixels that would fall outside the image are clipped.
    pub fn draw(&self, pixels: &mut [u8], width: u32, height: u32) {
        let (width, height) = (width as usize, height as usize);
        if pixels.len() < width * height * TEXTURE_CHANNELS {
            return;
        }

        let text_height = GLYPH_HEIGHT * SCALE;
        let Some(top) = height.checked_sub(MARGIN + text_height) else {
            return;
        };

        for (index, ch) in self.text.chars().enumerate() {
            let Some(rows) = glyph(ch) else {
                continue;
            };
            let left = MARGIN + index * GLYPH_ADVANCE * SCALE;
            if left >= width {
                break;
            }

            for (gy, bits) in rows.iter().enumerate() {
                for gx in 0..GLYPH_WIDTH {
                    if bits & (0x10 >> gx) == 0 {
                        continue;
                    }
                    fill_block(
                        pixels,
                        width,
                        left + gx * SCALE,
                        top + gy * SCALE,
                    );
                }
            }
        }
    }
}

fn fill_block(pixels: &mut [u8], width: usize, x0: usize, y0: usize) {
    for y in y0..y0 + SCALE {
        for x in x0..(x0 + SCALE).min(width) {
            let offset = (y * width + x) * TEXTURE_CHANNELS;
            if let Some(px) = pixels.get_mut(offset..offset + TEXTURE_CHANNELS) {
                px.copy_from_slice(&[TEXT_GREY, TEXT_GREY, TEXT_GREY, 0xFF]);
            }
        }
    }
}

/// 5x7 bitmap rows, most significant of the low five bits is the leftmost column.
fn glyph(ch: char) -> Option<[u8; GLYPH_HEIGHT]> {
    let rows = match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        _ => return None,
    };
    Some(rows)
}
