use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const LUMA_THRESHOLD: f32 = 200.0;
const MIN_BRIGHT_PIXELS: usize = 16;

/// Stub backend for demos and tests.
///
/// Treats the bounding box of all bright pixels as one license plate. Works on
/// the synthetic camera's output, where the plate is the only bright region.
pub struct StubBackend {
    threshold: f32,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            threshold: LUMA_THRESHOLD,
        }
    }

    /// Override the luminance threshold (0-255).
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (ri, bi) = if frame.order().is_red_first() {
            (0, 2)
        } else {
            (2, 0)
        };
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut bright = 0usize;

        for y in 0..frame.height() {
            for (x, px) in frame.row(y).chunks_exact(frame.channels()).enumerate() {
                let luma = 0.299 * px[ri] as f32 + 0.587 * px[1] as f32 + 0.114 * px[bi] as f32;
                if luma <= self.threshold {
                    continue;
                }
                let x = x as u32;
                bright += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        if bright < MIN_BRIGHT_PIXELS {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as f32,
            min_y as f32,
            (max_x - min_x + 1) as f32,
            (max_y - min_y + 1) as f32,
        );
        let confidence = (bright as f32 / bbox.area()).clamp(0.0, 1.0);
        Ok(vec![Detection {
            bbox,
            confidence,
            class_id: 0,
            label: "license plate".to_string(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;

    fn frame_with_plate(x0: u32, y0: u32, w: u32, h: u32) -> Frame {
        let (fw, fh) = (64u32, 48u32);
        let mut data = Vec::with_capacity((fw * fh * 3) as usize);
        for y in 0..fh {
            for x in 0..fw {
                let inside = x >= x0 && x < x0 + w && y >= y0 && y < y0 + h;
                let v = if inside { 250 } else { 30 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(data, fw, fh, ChannelOrder::Bgr).unwrap()
    }

    #[test]
    fn finds_bright_plate() -> Result<()> {
        let mut backend = StubBackend::new();
        let detections = backend.detect(&frame_with_plate(10, 20, 12, 5))?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BoundingBox::new(10.0, 20.0, 12.0, 5.0));
        assert!((detections[0].confidence - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn dark_frame_has_no_detections() -> Result<()> {
        let mut backend = StubBackend::new();
        let frame = Frame::filled(32, 32, ChannelOrder::Bgr, &[20, 20, 20])?;
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn tiny_specks_are_ignored() -> Result<()> {
        let mut backend = StubBackend::new();
        assert!(backend.detect(&frame_with_plate(5, 5, 2, 2))?.is_empty());
        Ok(())
    }
}
