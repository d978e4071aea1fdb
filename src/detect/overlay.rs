//! Burns track boxes and id tags into a copy of a frame.

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Pixel, Rgb, Rgba};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, Canvas};
use imageproc::rect::Rect;

use crate::detect::result::{BoundingBox, Track};
use crate::frame::{ChannelOrder, Frame, RowOrder};

const PALETTE: [[u8; 3]; 10] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
];

const BOX_THICKNESS: i32 = 2;
const TAG_HEIGHT: u32 = 9;

// 3x5 digit glyphs, one row per byte, bit 2 is the leftmost column.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

/// Palette colour for a track id, as RGB.
pub fn track_color(id: u32) -> [u8; 3] {
    PALETTE[id as usize % PALETTE.len()]
}

/// Return a new frame with every track drawn on it. The input is untouched.
pub fn draw_tracks(frame: &Frame, tracks: &[Track]) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let order = frame.order();
    let data = frame.as_bytes().to_vec();

    let data = match order.channels() {
        3 => {
            let mut canvas: ImageBuffer<Rgb<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, data).ok_or_else(|| {
                    anyhow!("frame buffer does not fit a {}x{} canvas", width, height)
                })?;
            for track in tracks {
                let [a, b, c] = in_order(track_color(track.id), order);
                draw_track(&mut canvas, track, frame.rows(), Rgb([a, b, c]), Rgb([0, 0, 0]));
            }
            canvas.into_raw()
        }
        4 => {
            let mut canvas: ImageBuffer<Rgba<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width, height, data).ok_or_else(|| {
                    anyhow!("frame buffer does not fit a {}x{} canvas", width, height)
                })?;
            for track in tracks {
                let [a, b, c] = in_order(track_color(track.id), order);
                draw_track(
                    &mut canvas,
                    track,
                    frame.rows(),
                    Rgba([a, b, c, 255]),
                    Rgba([0, 0, 0, 255]),
                );
            }
            canvas.into_raw()
        }
        n => return Err(anyhow!("cannot draw on {}-channel frames", n)),
    };

    Frame::with_rows(data, width, height, order, frame.rows())
}

fn in_order(rgb: [u8; 3], order: ChannelOrder) -> [u8; 3] {
    if order.is_red_first() {
        rgb
    } else {
        [rgb[2], rgb[1], rgb[0]]
    }
}

fn draw_track<C>(canvas: &mut C, track: &Track, rows: RowOrder, color: C::Pixel, ink: C::Pixel)
where
    C: Canvas,
    C::Pixel: Pixel,
{
    let (width, height) = canvas.dimensions();
    let bbox = to_storage_rows(track.bbox.clamp_to(width, height), height, rows);
    let x = bbox.x.round() as i32;
    let y = bbox.y.round() as i32;
    let w = bbox.w.round() as u32;
    let h = bbox.h.round() as u32;
    if w == 0 || h == 0 {
        return;
    }

    for inset in 0..BOX_THICKNESS {
        let iw = w.saturating_sub(2 * inset as u32);
        let ih = h.saturating_sub(2 * inset as u32);
        if iw == 0 || ih == 0 {
            break;
        }
        draw_hollow_rect_mut(canvas, Rect::at(x + inset, y + inset).of_size(iw, ih), color);
    }

    let text = track.id.to_string();
    let tag_w = text.len() as u32 * 4 + 3;
    // Tag sits on top of the box edge, or inside it when the box touches the top.
    let tag_y = match rows {
        RowOrder::TopDown if y >= TAG_HEIGHT as i32 => y - TAG_HEIGHT as i32,
        RowOrder::TopDown => y,
        RowOrder::BottomUp if (y + h as i32 + TAG_HEIGHT as i32) <= height as i32 => {
            y + h as i32
        }
        RowOrder::BottomUp => y + h as i32 - TAG_HEIGHT as i32,
    };
    draw_filled_rect_mut(canvas, Rect::at(x, tag_y).of_size(tag_w, TAG_HEIGHT), color);
    for (i, ch) in text.bytes().enumerate() {
        let glyph = &DIGITS[(ch - b'0') as usize];
        draw_glyph(canvas, glyph, x + 2 + i as i32 * 4, tag_y + 2, rows, ink);
    }
}

fn draw_glyph<C: Canvas>(
    canvas: &mut C,
    glyph: &[u8; 5],
    left: i32,
    top: i32,
    rows: RowOrder,
    ink: C::Pixel,
) {
    let (width, height) = canvas.dimensions();
    for (gy, bits) in glyph.iter().enumerate() {
        // Bottom-up storage draws the glyph upside down so it reads upright on screen.
        let py = match rows {
            RowOrder::TopDown => top + gy as i32,
            RowOrder::BottomUp => top + 4 - gy as i32,
        };
        for gx in 0..3 {
            if bits & (0b100 >> gx) == 0 {
                continue;
            }
            let px = left + gx;
            if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                canvas.draw_pixel(px as u32, py as u32, ink);
            }
        }
    }
}

fn to_storage_rows(bbox: BoundingBox, height: u32, rows: RowOrder) -> BoundingBox {
    match rows {
        RowOrder::TopDown => bbox,
        RowOrder::BottomUp => {
            BoundingBox::new(bbox.x, height as f32 - bbox.y - bbox.h, bbox.w, bbox.h)
        }
    }
}
