mod annotator;
mod backend;
mod backends;
mod overlay;
mod result;
mod tracker;

pub use annotator::{load_annotator, Annotator, TrackingAnnotator};
pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use overlay::{draw_tracks, track_color};
pub use result::{BoundingBox, Detection, Track};
pub use tracker::IouTracker;
