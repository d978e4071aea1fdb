use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend turns one frame into a list of detections. It may keep internal
/// state between calls but never retains the frame itself.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame in the camera's native channel order.
    ///
    /// Boxes are returned in frame pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once while the model is loaded.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
