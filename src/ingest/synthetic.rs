//! Synthetic camera for `stub://` devices.
//!
//! Renders a dim textured background with a bright plate-sized rectangle that
//! sweeps left and right, plus per-pixel sensor noise. Frames are BGR and
//! top-down, like a real capture device.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::CameraConfig;
use crate::frame::{ChannelOrder, Frame};

const NOISE: i16 = 4;
const PLATE_BGR: [u8; 3] = [240, 245, 250];
const PLATE_STEP_PX: u32 = 4;

pub(super) struct SyntheticCamera {
    config: CameraConfig,
    reads: u64,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticCamera {
    pub(super) fn open(config: CameraConfig) -> Result<Self> {
        if config.width < 8 || config.height < 8 {
            return Err(anyhow!(
                "synthetic camera needs at least 8x8 frames, got {}x{}",
                config.width,
                config.height
            ));
        }
        log::info!(
            "CameraSource: connected to {} (synthetic, {}x{})",
            config.device,
            config.width,
            config.height
        );
        Ok(Self {
            config,
            reads: 0,
            frame_count: 0,
            rng: StdRng::seed_from_u64(0x5eed_f00d),
        })
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.reads += 1;
        if let Some(every) = self.config.drop_every {
            if every > 0 && self.reads % every == 0 {
                return Ok(None);
            }
        }
        self.frame_count += 1;
        let pixels = self.render();
        Frame::new(pixels, self.config.width, self.config.height, ChannelOrder::Bgr).map(Some)
    }

    pub(super) fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub(super) fn close(&mut self) -> Result<()> {
        log::debug!(
            "CameraSource: synthetic {} closed after {} frames",
            self.config.device,
            self.frame_count
        );
        Ok(())
    }

    fn render(&mut self) -> Vec<u8> {
        let width = self.config.width;
        let height = self.config.height;
        let (px, py, pw, ph) = plate_rect(width, height, self.frame_count);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let noise = self.rng.gen_range(-NOISE..=NOISE);
                let inside = x >= px && x < px + pw && y >= py && y < py + ph;
                let base = if inside {
                    PLATE_BGR
                } else {
                    background(x, y, self.frame_count)
                };
                for channel in base {
                    pixels.push((channel as i16 + noise).clamp(0, 255) as u8);
                }
            }
        }
        pixels
    }
}

/// Plate rectangle `(x, y, w, h)` for the given frame number (1-based).
pub(crate) fn plate_rect(width: u32, height: u32, frame_count: u64) -> (u32, u32, u32, u32) {
    let pw = (width / 5).max(2);
    let ph = (height / 10).max(2);
    let travel = (width - pw).max(1) as u64;
    let offset = (frame_count.saturating_sub(1) * PLATE_STEP_PX as u64) % (2 * travel);
    let x = if offset < travel {
        offset
    } else {
        2 * travel - offset
    };
    let y = height / 2 + height / 6;
    (x as u32, y.min(height - ph), pw, ph)
}

fn background(x: u32, y: u32, frame_count: u64) -> [u8; 3] {
    let shade = ((x / 8 + y / 8) % 2) as u8 * 16;
    let drift = (frame_count % 32) as u8;
    [40 + shade + drift, 60 + shade, 80 + (y % 24) as u8]
}
