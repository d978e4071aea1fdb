//! Orientation and channel-order correction between the detector and the
//! display surface.
//!
//! Both transforms are total over valid frames: they only permute bytes that
//! `Frame::new` already validated, so nothing here can fail.

use crate::frame::{ChannelOrder, Frame};

/// Flip rows, then reorder channels into the display order.
pub fn normalize(frame: Frame) -> Frame {
    let target = frame.order().display_order();
    reorder_channels(flip_vertical(frame), target)
}

/// Invert row order. Applying it twice restores the original frame.
pub fn flip_vertical(frame: Frame) -> Frame {
    let stride = frame.stride();
    let (mut data, width, height, order, rows) = frame.into_parts();
    let h = height as usize;
    for top in 0..h / 2 {
        let bottom = h - 1 - top;
        let (upper, lower) = data.split_at_mut(bottom * stride);
        upper[top * stride..(top + 1) * stride].swap_with_slice(&mut lower[..stride]);
    }
    Frame::from_parts(data, width, height, order, rows.flipped())
}

/// Reorder channels to `target`. Only red/blue swaps are meaningful; a target
/// with a different channel count keeps the frame's own width.
pub fn reorder_channels(frame: Frame, target: ChannelOrder) -> Frame {
    let target = if target.channels() == frame.channels() {
        target
    } else {
        match (frame.channels(), target.is_red_first()) {
            (3, true) => ChannelOrder::Rgb,
            (3, false) => ChannelOrder::Bgr,
            (_, true) => ChannelOrder::Rgba,
            (_, false) => ChannelOrder::Bgra,
        }
    };
    let channels = frame.channels();
    let swap = frame.order().is_red_first() != target.is_red_first();
    let (mut data, width, height, _, rows) = frame.into_parts();
    if swap {
        for px in data.chunks_exact_mut(channels) {
            px.swap(0, 2);
        }
    }
    Frame::from_parts(data, width, height, target, rows)
}
