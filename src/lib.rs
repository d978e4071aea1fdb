//! SnapPlate
//!
//! Live camera preview with detector/tracker overlays, for license plate
//! scanning.
//!
//! # Pipeline
//!
//! Once per tick (30 Hz by default) a session runs one pass:
//!
//! 1. **Capture**: pull the next frame from the camera (`ingest`). A missing
//!    frame ends the tick quietly.
//! 2. **Annotate**: detect, track across frames, and draw boxes with track ids
//!    (`detect`).
//! 3. **Normalize**: flip rows to the display's bottom-up convention and swap
//!    BGR to RGB (`normalize`).
//! 4. **Adapt + publish**: copy into an exactly sized display buffer and replace
//!    the render surface's image (`surface`).
//!
//! The `driver` module schedules ticks, forwards display events, and closes
//! the session (releasing the camera exactly once) when the loop ends.
//!
//! # Module Structure
//!
//! - `frame`: packed pixel container
//! - `ingest`: frame sources (synthetic, V4L2)
//! - `detect`: detector backends, IoU tracker, overlay rendering
//! - `normalize`, `surface`: color/orientation fix-up and render target
//! - `session`, `schedule`, `driver`: lifecycle and timing
//! - `display`, `ui`, `config`: application surface

pub mod config;
pub mod detect;
pub mod display;
pub mod driver;
pub mod frame;
pub mod ingest;
pub mod normalize;
pub mod schedule;
pub mod session;
pub mod surface;
pub mod ui;

pub use config::AppConfig;
pub use detect::{load_annotator, Annotator, Detection, Track, TrackingAnnotator};
pub use display::{DisplaySurface, HeadlessDisplay, InfoPanel, UiEvent};
pub use driver::{CloseReason, DriverReport, LoopDriver};
pub use frame::{ChannelOrder, Frame, RowOrder};
pub use ingest::{CameraConfig, CameraSource, CameraStats, FrameSource};
pub use normalize::normalize;
pub use schedule::{Clock, FixedRateRunner, MonotonicClock, StopHandle};
pub use session::{Session, SessionState, SessionStats, Stage, TickOutcome};
pub use surface::{to_surface, RenderSurface, SurfaceImage};
