//! Frame ingestion.
//!
//! This module provides the camera frame source used by the pipeline session:
//! - Synthetic camera (`stub://` devices) for demos and tests
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Opening a source is fatal on failure. Reading is not: a device that has no
//! frame ready (timeout, transient read error, dropped buffer) yields `None`
//! and the caller simply tries again on its next tick.

#[cfg(any(feature = "ingest-v4l2", test))]
mod decode;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::Result;
use std::time::Duration;

use crate::frame::Frame;
use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
use v4l2::DeviceCamera;

/// A producer of frames owned by the pipeline session.
pub trait FrameSource {
    /// Next frame, or `None` when the device has nothing this call.
    ///
    /// Must return promptly; implementations bound every device read.
    fn acquire(&mut self) -> Option<Frame>;

    /// Release the underlying device. Calling it again is a no-op.
    fn release(&mut self) -> Result<()>;

    /// Human readable description for logs.
    fn describe(&self) -> String {
        String::from("frame source")
    }

    /// Whether the source has been delivering frames recently.
    fn is_healthy(&self) -> bool {
        true
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn acquire(&mut self) -> Option<Frame> {
        (**self).acquire()
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

#[cfg(feature = "stub-frame-source")]
pub const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
#[cfg(not(feature = "stub-frame-source"))]
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// Configuration for the camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g. "/dev/video0") or `stub://<name>` for the synthetic camera.
    pub device: String,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Requested device frame rate.
    pub target_fps: u32,
    /// Upper bound on a single device read.
    pub read_timeout: Duration,
    /// Synthetic camera only: every n-th read yields no frame.
    pub drop_every: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_CAMERA_DEVICE.to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
            read_timeout: Duration::from_millis(20),
            drop_every: None,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub frames_missed: u64,
    pub device: String,
}

/// Camera frame source.
///
/// Uses V4L2 for real devices, with a synthetic fallback for `stub://` paths.
/// The device is released exactly once, either through `release` or on drop.
pub struct CameraSource {
    backend: CameraBackend,
    device: String,
    frames_missed: u64,
    released: bool,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    /// Open the configured device. Failure here is fatal for the session.
    pub fn open(config: CameraConfig) -> Result<Self> {
        let device = config.device.clone();
        let backend = if config.device.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCamera::open(config)?)
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                CameraBackend::Device(DeviceCamera::open(config)?)
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                anyhow::bail!(
                    "camera device {} requires the ingest-v4l2 feature",
                    config.device
                )
            }
        };
        Ok(Self {
            backend,
            device,
            frames_missed: 0,
            released: false,
        })
    }

    pub fn stats(&self) -> CameraStats {
        let frames_captured = match &self.backend {
            CameraBackend::Synthetic(camera) => camera.frames_captured(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.frames_captured(),
        };
        CameraStats {
            frames_captured,
            frames_missed: self.frames_missed,
            device: self.device.clone(),
        }
    }

    fn note_miss(&mut self, reason: Option<&anyhow::Error>) {
        self.frames_missed += 1;
        if self.frames_missed == 1 || self.frames_missed % 100 == 0 {
            match reason {
                Some(err) => log::warn!(
                    "CameraSource: no frame from {} ({} missed so far): {:#}",
                    self.device,
                    self.frames_missed,
                    err
                ),
                None => log::debug!(
                    "CameraSource: no frame ready on {} ({} missed so far)",
                    self.device,
                    self.frames_missed
                ),
            }
        }
    }
}

impl FrameSource for CameraSource {
    fn acquire(&mut self) -> Option<Frame> {
        if self.released {
            return None;
        }
        let result = match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame(),
        };
        match result {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                self.note_miss(None);
                None
            }
            Err(err) => {
                self.note_miss(Some(&err));
                None
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let result = match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.close(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.close(),
        };
        if result.is_ok() {
            log::info!("CameraSource: released {}", self.device);
        }
        result
    }

    fn describe(&self) -> String {
        self.device.clone()
    }

    fn is_healthy(&self) -> bool {
        if self.released {
            return false;
        }
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.is_healthy(),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::error!("CameraSource: failed to release {}: {:#}", self.device, err);
        }
    }
}
