//! Render target adapter and the render surface it feeds.
//!
//! - `SurfaceImage`: a display-ready, tightly packed image.
//! - `to_surface`: copies a normalized frame into a freshly sized buffer.
//! - `RenderSurface`: the single current image, replaced wholesale.

use anyhow::{anyhow, Result};

use crate::frame::{packed_len, ChannelOrder, Frame, RowOrder};

/// Display-ready image: row-major, one byte per channel, no row padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceImage {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub rows: RowOrder,
    pub bytes: Vec<u8>,
}

impl SurfaceImage {
    pub fn channels(&self) -> usize {
        self.order.channels()
    }

    /// Pixel at `(x, y)` in storage order.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels();
        let start = (y as usize * self.width as usize + x as usize) * c;
        &self.bytes[start..start + c]
    }

    /// Pixel at `(x, y)` counted from the top of the picture.
    pub fn pixel_on_screen(&self, x: u32, y: u32) -> &[u8] {
        match self.rows {
            RowOrder::TopDown => self.pixel(x, y),
            RowOrder::BottomUp => self.pixel(x, self.height - 1 - y),
        }
    }
}

/// Copy a normalized frame into a surface buffer.
///
/// The buffer is allocated at exactly `width * height * channels` bytes. Frames
/// that are not in a display channel order are rejected.
pub fn to_surface(frame: Frame) -> Result<SurfaceImage> {
    let order = frame.order();
    if order != order.display_order() {
        return Err(anyhow!(
            "frame in {:?} order is not display-ready (expected {:?})",
            order,
            order.display_order()
        ));
    }
    let len = packed_len(frame.width(), frame.height(), frame.channels())?;
    let mut bytes = Vec::with_capacity(len);
    for y in 0..frame.height() {
        bytes.extend_from_slice(frame.row(y));
    }
    Ok(SurfaceImage {
        width: frame.width(),
        height: frame.height(),
        order,
        rows: frame.rows(),
        bytes,
    })
}

/// The on-screen image. Holds at most one value and only ever replaces it whole.
#[derive(Debug, Default)]
pub struct RenderSurface {
    current: Option<SurfaceImage>,
    generation: u64,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current image.
    pub fn publish(&mut self, image: SurfaceImage) {
        self.current = Some(image);
        self.generation += 1;
    }

    pub fn current(&self) -> Option<&SurfaceImage> {
        self.current.as_ref()
    }

    /// Number of publications so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
