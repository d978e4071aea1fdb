//! Frame container shared by every pipeline stage.
//!
//! - `Frame`: packed pixel grid with a known channel order and row orientation.
//! - `ChannelOrder`: byte order of the channels inside one pixel.
//! - `RowOrder`: whether row 0 is the top or the bottom of the picture.
//!
//! A frame lives for exactly one tick and is not `Clone`: stages
//! take frames by value (or borrow them for inference) and hand back new ones.

use anyhow::{anyhow, Result};
use std::fmt;

/// Channel order inside one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ChannelOrder {
    Bgr,
    Rgb,
    Bgra,
    Rgba,
}

impl ChannelOrder {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            ChannelOrder::Bgr | ChannelOrder::Rgb => 3,
            ChannelOrder::Bgra | ChannelOrder::Rgba => 4,
        }
    }

    /// Order expected by the display surface for a pixel of the same width.
    pub fn display_order(self) -> ChannelOrder {
        match self {
            ChannelOrder::Bgr | ChannelOrder::Rgb => ChannelOrder::Rgb,
            ChannelOrder::Bgra | ChannelOrder::Rgba => ChannelOrder::Rgba,
        }
    }

    /// True when red sits in the first byte of the pixel.
    pub fn is_red_first(self) -> bool {
        matches!(self, ChannelOrder::Rgb | ChannelOrder::Rgba)
    }
}

/// Vertical orientation of the pixel rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RowOrder {
    /// Row 0 is the top of the picture (camera convention).
    TopDown,
    /// Row 0 is the bottom of the picture (texture upload convention).
    BottomUp,
}

impl RowOrder {
    pub fn flipped(self) -> RowOrder {
        match self {
            RowOrder::TopDown => RowOrder::BottomUp,
            RowOrder::BottomUp => RowOrder::TopDown,
        }
    }
}

/// One captured image.
///
/// Pixels are row-major and tightly packed: `data.len() == width * height * channels`.
/// The invariant is checked once in `Frame::new`, so every later stage can index
/// rows without re-validating.
#[derive(PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    order: ChannelOrder,
    rows: RowOrder,
}

impl Frame {
    /// Build a top-down frame, validating the buffer length.
    pub fn new(data: Vec<u8>, width: u32, height: u32, order: ChannelOrder) -> Result<Self> {
        Self::with_rows(data, width, height, order, RowOrder::TopDown)
    }

    pub fn with_rows(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
        rows: RowOrder,
    ) -> Result<Self> {
        let expected = packed_len(width, height, order.channels())?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} bytes for {}x{} {:?}, got {}",
                expected,
                width,
                height,
                order,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            order,
            rows,
        })
    }

    /// A frame filled with one pixel value. `pixel` must match the channel count.
    pub fn filled(width: u32, height: u32, order: ChannelOrder, pixel: &[u8]) -> Result<Self> {
        if pixel.len() != order.channels() {
            return Err(anyhow!(
                "fill pixel has {} channels, {:?} needs {}",
                pixel.len(),
                order,
                order.channels()
            ));
        }
        let pixels = packed_len(width, height, 1)?;
        let data = pixel.repeat(pixels);
        Self::new(data, width, height, order)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn rows(&self) -> RowOrder {
        self.rows
    }

    pub fn channels(&self) -> usize {
        self.order.channels()
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel row `y` in storage order.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Pixel at `(x, y)` in storage order.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels();
        let start = y as usize * self.stride() + x as usize * c;
        &self.data[start..start + c]
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Take the pixel buffer, leaving the metadata behind.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Decompose into parts. Used by stages that rebuild the frame in place.
    pub(crate) fn into_parts(self) -> (Vec<u8>, u32, u32, ChannelOrder, RowOrder) {
        (self.data, self.width, self.height, self.order, self.rows)
    }

    /// Reassemble from parts that already satisfy the length invariant.
    pub(crate) fn from_parts(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
        rows: RowOrder,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * order.channels()
        );
        Self {
            data,
            width,
            height,
            order,
            rows,
        }
    }
}

// Pixel content is never printed.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("rows", &self.rows)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// `width * height * channels` with overflow checks.
pub fn packed_len(width: u32, height: u32, channels: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels))
        .ok_or_else(|| anyhow!("frame dimensions overflow: {}x{}x{}", width, height, channels))
}
