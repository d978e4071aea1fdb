use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::ingest::CameraConfig;
use crate::schedule::period_for_rate;

pub const APP_NAME: &str = "SnapPlate";
pub const DEFAULT_MODEL_PATH: &str = "license_plate_detector.onnx";
const DEFAULT_TICK_RATE_HZ: u32 = 30;
const MAX_TICK_RATE_HZ: u32 = 240;

/// Runtime configuration.
///
/// The model path is the only value supplied at startup; everything else is a
/// built-in default.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model_path: String,
    pub camera: CameraConfig,
    pub tick_rate_hz: u32,
}

impl AppConfig {
    pub fn from_model_path(model_path: impl Into<String>) -> Result<Self> {
        let mut cfg = Self {
            model_path: model_path.into(),
            camera: CameraConfig::default(),
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn tick_period(&self) -> Result<Duration> {
        period_for_rate(self.tick_rate_hz)
    }

    pub fn validate(&mut self) -> Result<()> {
        self.model_path = self.model_path.trim().to_string();
        if self.model_path.is_empty() {
            return Err(anyhow!("model path must not be empty"));
        }
        if self.tick_rate_hz == 0 || self.tick_rate_hz > MAX_TICK_RATE_HZ {
            return Err(anyhow!(
                "tick rate must be between 1 and {} per second",
                MAX_TICK_RATE_HZ
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera frame size must be non-zero"));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        // A device read may use at most half a tick.
        let half_tick = self.tick_period()? / 2;
        if self.camera.read_timeout > half_tick {
            self.camera.read_timeout = half_tick;
        }
        Ok(())
    }
}
