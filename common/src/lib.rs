//! Common types for edb.
//!
//! This crate holds the data shared between the capture side and the
//! presentation side of the bridge: the [`Frame`] image buffer, its channel
//! order, the control signals the user can raise and the [`BridgeError`]
//! taxonomy used across the workspace.
//!
//! # Examples
//!
//! ```
//! use common::{ColorOrder, Frame};
//!
//! let mut frame = Frame::empty();
//! assert!(frame.is_empty());
//!
//! // A 2x1 BGR frame with a padded stride of 8 bytes
//! let data = [10, 20, 30, 40, 50, 60, 0, 0];
//! frame.fill_from(&data, 2, 1, 8, ColorOrder::Bgr);
//! assert_eq!(frame.pixel(1, 0), Some([40, 50, 60]));
//! ```

use thiserror::Error;

/// Bytes per packed source pixel.
pub const SOURCE_CHANNELS: usize = 3;

/// Errors shared by every part of the bridge.
///
/// Transient errors are absorbed where they happen; fatal ones end the
/// session and are returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Failed to open capture source: {0}")]
    CaptureOpen(String),

    #[error("Capture read failed: {0}")]
    CaptureRead(String),

    #[error("GPU initialization failed: {0}")]
    GpuInit(String),

    #[error("GPU resource creation failed: {0}")]
    ResourceCreation(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("Thread error: {0}")]
    Thread(String),
}

impl BridgeError {
    /// Whether this error ends the session.
    ///
    /// Only a single failed capture read is transient; everything else
    /// requires a full teardown.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CaptureRead(_))
    }
}

/// Channel order of a packed 3-channel source pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorOrder {
    /// Blue, green, red (what most capture devices deliver)
    #[default]
    Bgr,
    /// Red, green, blue
    Rgb,
}

impl ColorOrder {
    /// Whether red and blue must be exchanged to reach RGB order.
    pub fn swaps_red_blue(self) -> bool {
        matches!(self, Self::Bgr)
    }
}

/// Logical control signals raised by the input collaborator.
///
/// The physical key or button mapping is not part of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    ToggleOverlay,
    ToggleVsync,
    RequestExit,
}

/// A packed 3-channel image buffer.
///
/// Frames live in the relay slots and are refilled in place, so the pixel
/// storage is reused from one capture to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Pixel rows, `stride` bytes apart
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes between the start of two consecutive rows
    pub stride: usize,
    pub order: ColorOrder,
    /// Publish sequence number, assigned by the capture loop (0 = never published)
    pub sequence: u64,
}

impl Frame {
    /// Create a frame with no pixels.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bytes of pixel data in one row (without stride padding).
    pub fn row_bytes(&self) -> usize {
        self.width as usize * SOURCE_CHANNELS
    }

    /// A frame is empty when it has a zero dimension or its storage cannot
    /// hold `height` rows of `stride` bytes. Empty frames are never published.
    ///
    /// Dimensions whose byte size does not fit in `usize` count as empty.
    pub fn is_empty(&self) -> bool {
        if self.width == 0 || self.height == 0 || self.stride < self.row_bytes() {
            return true;
        }
        let needed = self
            .stride
            .checked_mul(self.height as usize - 1)
            .and_then(|rows| rows.checked_add(self.row_bytes()));
        needed.is_none_or(|needed| self.data.len() < needed)
    }

    /// Pixel bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height || self.is_empty() {
            return None;
        }
        let start = y as usize * self.stride;
        self.data.get(start..start + self.row_bytes())
    }

    /// Channels of the pixel at `(x, y)` in storage order.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let offset = x as usize * SOURCE_CHANNELS;
        Some([row[offset], row[offset + 1], row[offset + 2]])
    }

    /// Overwrite this frame with new pixel data, keeping the allocation.
    pub fn fill_from(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        order: ColorOrder,
    ) {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.width = width;
        self.height = height;
        self.stride = stride;
        self.order = order;
    }

    /// Reshape the storage for a `width`x`height` tightly packed frame and
    /// return it for in-place writing.
    pub fn reshape(&mut self, width: u32, height: u32, order: ColorOrder) -> &mut [u8] {
        let stride = width as usize * SOURCE_CHANNELS;
        self.data.resize(stride * height as usize, 0);
        self.width = width;
        self.height = height;
        self.stride = stride;
        self.order = order;
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty();
        assert!(frame.is_empty());
        assert_eq!(frame.row(0), None);
        assert_eq!(frame.pixel(0, 0), None);
    }

    #[test]
    fn test_degenerate_dimensions_are_empty() {
        let mut frame = Frame::empty();
        frame.fill_from(&[1, 2, 3], 0, 1, 3, ColorOrder::Bgr);
        assert!(frame.is_empty());

        frame.fill_from(&[1, 2, 3], 1, 0, 3, ColorOrder::Bgr);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_short_storage_is_empty() {
        let mut frame = Frame::empty();
        // 2x2 with a stride of 6 needs 12 bytes
        frame.fill_from(&[0; 8], 2, 2, 6, ColorOrder::Bgr);
        assert!(frame.is_empty());

        frame.fill_from(&[0; 12], 2, 2, 6, ColorOrder::Bgr);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_overflowing_dimensions_are_empty() {
        let mut frame = Frame::empty();
        frame.fill_from(&[0; 16], 1, 3, usize::MAX, ColorOrder::Bgr);
        assert!(frame.is_empty());
        assert_eq!(frame.row(0), None);

        frame.fill_from(&[0; 16], 1, u32::MAX, usize::MAX / 2, ColorOrder::Bgr);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_stride_smaller_than_row_is_empty() {
        let mut frame = Frame::empty();
        frame.fill_from(&[0; 64], 4, 2, 8, ColorOrder::Rgb);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_padded_rows() {
        let mut frame = Frame::empty();
        let data = [
            1, 2, 3, 4, 5, 6, 0xEE, 0xEE, // row 0 + padding
            7, 8, 9, 10, 11, 12, 0xEE, 0xEE, // row 1 + padding
        ];
        frame.fill_from(&data, 2, 2, 8, ColorOrder::Bgr);

        assert_eq!(frame.row(0), Some(&[1, 2, 3, 4, 5, 6][..]));
        assert_eq!(frame.row(1), Some(&[7, 8, 9, 10, 11, 12][..]));
        assert_eq!(frame.row(2), None);
        assert_eq!(frame.pixel(1, 1), Some([10, 11, 12]));
        assert_eq!(frame.pixel(2, 1), None);
    }

    #[test]
    fn test_reshape_reuses_storage() {
        let mut frame = Frame::empty();
        frame.reshape(4, 4, ColorOrder::Bgr);
        let capacity = frame.data.capacity();

        let pixels = frame.reshape(2, 2, ColorOrder::Rgb);
        assert_eq!(pixels.len(), 12);
        assert_eq!(frame.stride, 6);
        assert_eq!(frame.order, ColorOrder::Rgb);
        assert_eq!(frame.data.capacity(), capacity);
    }

    #[test]
    fn test_error_classification() {
        assert!(!BridgeError::CaptureRead("timeout".into()).is_fatal());
        assert!(BridgeError::DeviceLost("reset".into()).is_fatal());
        assert!(BridgeError::GpuInit("no adapter".into()).is_fatal());
        assert!(BridgeError::ResourceCreation("texture".into()).is_fatal());
    }

    #[test]
    fn test_color_order_swap() {
        assert!(ColorOrder::Bgr.swaps_red_blue());
        assert!(!ColorOrder::Rgb.swaps_red_blue());
    }
}
