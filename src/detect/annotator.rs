use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
#[cfg(feature = "backend-tract")]
use crate::detect::backends::TractBackend;
use crate::detect::overlay::draw_tracks;
use crate::detect::tracker::IouTracker;
use crate::frame::Frame;

/// The detector/tracker capability as the pipeline sees it.
///
/// `annotate` always runs with tracking persistence: every call consults and
/// advances the tracker's temporal state, so an object keeps its id for as long
/// as it stays visible. The returned frame has the input's dimensions and
/// channel order with overlays burned in; the input is left untouched.
pub trait Annotator {
    fn annotate(&mut self, frame: &Frame) -> Result<Frame>;

    fn name(&self) -> &str {
        "annotator"
    }
}

impl<A: Annotator + ?Sized> Annotator for Box<A> {
    fn annotate(&mut self, frame: &Frame) -> Result<Frame> {
        (**self).annotate(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Detector backend + IoU tracker + overlay renderer.
pub struct TrackingAnnotator<B> {
    backend: B,
    tracker: IouTracker,
}

impl<B: DetectorBackend> TrackingAnnotator<B> {
    pub fn new(backend: B) -> Self {
        Self::with_tracker(backend, IouTracker::new())
    }

    pub fn with_tracker(backend: B, tracker: IouTracker) -> Self {
        Self { backend, tracker }
    }

    /// Tracks currently remembered by the tracker.
    pub fn live_tracks(&self) -> usize {
        self.tracker.live_count()
    }
}

impl<B: DetectorBackend> Annotator for TrackingAnnotator<B> {
    fn annotate(&mut self, frame: &Frame) -> Result<Frame> {
        if frame.channels() != 3 {
            return Err(anyhow!(
                "{} detector expects 3-channel frames, got {:?}",
                self.backend.name(),
                frame.order()
            ));
        }
        let detections = self
            .backend
            .detect(frame)
            .with_context(|| format!("{} inference failed", self.backend.name()))?;
        let tracks = self.tracker.update(detections);
        draw_tracks(frame, &tracks)
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

/// Load the detector/tracker named by `model_path`.
///
/// `stub://...` selects the built-in plate finder; anything else is an ONNX
/// model file read with the tract backend. All failures here are startup
/// failures.
pub fn load_annotator(model_path: &str) -> Result<Box<dyn Annotator>> {
    let model_path = model_path.trim();
    if model_path.is_empty() {
        bail!("model path is empty");
    }

    if model_path.starts_with("stub://") {
        let mut backend = StubBackend::new();
        backend.warm_up().context("model warm-up failed")?;
        log::info!("loaded stub detector ({})", model_path);
        return Ok(Box::new(TrackingAnnotator::new(backend)));
    }

    let path = Path::new(model_path);
    if !path.is_file() {
        bail!("model file {} not found", path.display());
    }

    #[cfg(feature = "backend-tract")]
    {
        let mut backend = TractBackend::load(path)?;
        backend.warm_up().context("model warm-up failed")?;
        log::info!("loaded tract detector from {}", path.display());
        Ok(Box::new(TrackingAnnotator::new(backend)))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        bail!(
            "loading model {} requires the backend-tract feature",
            path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::{BoundingBox, Detection};
    use crate::frame::ChannelOrder;

    struct FixedBackend {
        calls: u32,
    }

    impl DetectorBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            self.calls += 1;
            Ok(vec![Detection {
                bbox: BoundingBox::new(4.0 + self.calls as f32, 12.0, 20.0, 10.0),
                confidence: 0.8,
                class_id: 0,
                label: "license plate".to_string(),
            }])
        }
    }

    #[test]
    fn annotate_keeps_dimensions_and_remembers_tracks() -> Result<()> {
        let mut annotator = TrackingAnnotator::new(FixedBackend { calls: 0 });
        for _ in 0..3 {
            let frame = Frame::filled(48, 32, ChannelOrder::Bgr, &[5, 5, 5])?;
            let out = annotator.annotate(&frame)?;
            assert!(out.same_dimensions(&frame));
            assert_eq!(out.order(), ChannelOrder::Bgr);
            assert_ne!(out.as_bytes(), frame.as_bytes());
        }
        assert_eq!(annotator.live_tracks(), 1);
        Ok(())
    }

    #[test]
    fn four_channel_frames_are_rejected() -> Result<()> {
        let mut annotator = TrackingAnnotator::new(FixedBackend { calls: 0 });
        let frame = Frame::filled(8, 8, ChannelOrder::Bgra, &[0, 0, 0, 255])?;
        assert!(annotator.annotate(&frame).is_err());
        Ok(())
    }

    #[test]
    fn stub_models_load_without_files() -> Result<()> {
        let annotator = load_annotator("stub://plates")?;
        assert_eq!(annotator.name(), "stub");
        Ok(())
    }

    #[test]
    fn empty_and_missing_models_fail() {
        assert!(load_annotator("  ").is_err());
        let err = load_annotator("/nonexistent/plates.onnx")
            .err()
            .expect("missing model must fail");
        assert!(err.to_string().contains("not found"));
    }
}
