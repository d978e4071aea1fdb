use anyhow::{anyhow, Result};

/// Pixel layouts a capture device may negotiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Bgr24,
    Rgb24,
    Yuyv,
}

impl PixelFormat {
    #[cfg(feature = "ingest-v4l2")]
    pub(crate) fn from_fourcc(repr: &[u8; 4]) -> Option<Self> {
        match repr {
            b"BGR3" => Some(PixelFormat::Bgr24),
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 3,
            PixelFormat::Yuyv => 2,
        }
    }
}

/// Decode a captured buffer into packed BGR, dropping any row padding.
///
/// `stride` is the device row pitch in bytes; `0` means tightly packed.
pub(crate) fn decode_to_bgr(
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let row_bytes = w
        .checked_mul(format.bytes_per_pixel())
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let stride = if stride == 0 { row_bytes } else { stride };
    if stride < row_bytes {
        return Err(anyhow!(
            "row stride {} shorter than {} bytes per row",
            stride,
            row_bytes
        ));
    }
    let expected = stride
        .checked_mul(h.saturating_sub(1))
        .and_then(|v| v.checked_add(row_bytes))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if h > 0 && pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame too short: expected at least {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    let mut bgr = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let line = &pixels[row * stride..row * stride + row_bytes];
        match format {
            PixelFormat::Bgr24 => bgr.extend_from_slice(line),
            PixelFormat::Rgb24 => {
                for px in line.chunks_exact(3) {
                    bgr.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
            PixelFormat::Yuyv => yuyv_row_to_bgr(line, &mut bgr),
        }
    }
    Ok(bgr)
}

fn yuyv_row_to_bgr(line: &[u8], out: &mut Vec<u8>) {
    for macro_px in line.chunks_exact(4) {
        let u = macro_px[1] as f32 - 128.0;
        let v = macro_px[3] as f32 - 128.0;
        for y in [macro_px[0], macro_px[2]] {
            let y = y as f32;
            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;
            out.extend_from_slice(&[clamp_to_u8(b), clamp_to_u8(g), clamp_to_u8(r)]);
        }
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_neutral_chroma_is_gray() -> Result<()> {
        let yuyv = vec![128u8, 128, 128, 128];
        let bgr = decode_to_bgr(&yuyv, 2, 1, 0, PixelFormat::Yuyv)?;
        assert_eq!(bgr, vec![128u8; 6]);
        Ok(())
    }

    #[test]
    fn rgb_is_swapped_to_bgr() -> Result<()> {
        let rgb = vec![1u8, 2, 3, 4, 5, 6];
        let bgr = decode_to_bgr(&rgb, 2, 1, 0, PixelFormat::Rgb24)?;
        assert_eq!(bgr, vec![3, 2, 1, 6, 5, 4]);
        Ok(())
    }

    #[test]
    fn stride_padding_is_dropped() -> Result<()> {
        // 1x2 BGR with 4 bytes of padding per row.
        let padded = vec![1u8, 2, 3, 0, 0, 0, 0, 4, 5, 6, 0, 0, 0, 0];
        let bgr = decode_to_bgr(&padded, 1, 2, 7, PixelFormat::Bgr24)?;
        assert_eq!(bgr, vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(decode_to_bgr(&[0u8; 5], 2, 1, 0, PixelFormat::Bgr24).is_err());
    }
}
