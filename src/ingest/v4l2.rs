//! V4L2 camera backend.
//!
//! Captures from a local device node (e.g. /dev/video0) through memory-mapped
//! streaming. Every read is bounded by the configured poll timeout; a timeout
//! is reported as "no frame" rather than an error.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::decode::{decode_to_bgr, PixelFormat};
use super::CameraConfig;
use crate::frame::{ChannelOrder, Frame};

pub(super) struct DeviceCamera {
    config: CameraConfig,
    state: Option<DeviceState>,
    format: PixelFormat,
    stride: usize,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceCamera {
    pub(super) fn open(config: CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"BGR3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} negotiated unsupported pixel format {}",
                config.device,
                format.fourcc
            )
        })?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let timeout = config.read_timeout;
        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                let mut stream = v4l::prelude::MmapStream::with_buffers(
                    device,
                    Type::VideoCapture,
                    4,
                )
                .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))?;
                stream.set_timeout(timeout);
                Ok::<_, anyhow::Error>(stream)
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: connected to {} ({}x{}, {})",
            config.device,
            format.width,
            format.height,
            format.fourcc
        );
        Ok(Self {
            active_width: format.width,
            active_height: format.height,
            stride: format.stride as usize,
            format: pixel_format,
            config,
            state: Some(state),
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let captured = state.with_mut(|fields| match fields.stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                let used = if used == 0 { buf.len() } else { used };
                Ok(Some(buf[..used].to_vec()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(err) => Err(err),
        });

        let raw = match captured {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Err(anyhow::Error::new(err).context("capture v4l2 frame"));
            }
        };

        let pixels = decode_to_bgr(
            &raw,
            self.active_width,
            self.active_height,
            self.stride,
            self.format,
        )?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;
        Frame::new(
            pixels,
            self.active_width,
            self.active_height,
            ChannelOrder::Bgr,
        )
        .map(Some)
    }

    pub(super) fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub(super) fn close(&mut self) -> Result<()> {
        // Dropping the stream unmaps the buffers and stops streaming; dropping
        // the device closes the file descriptor.
        match self.state.take() {
            Some(state) => {
                drop(state);
                Ok(())
            }
            None => Err(anyhow!("v4l2 device {} already closed", self.config.device)),
        }
    }

    pub(super) fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}
