//! Display surfaces the loop driver presents to.
//!
//! - `HeadlessDisplay`: keeps the last image, no window (default build, tests)
//! - `WindowDisplay`: desktop window (feature: display-minifb)
//!
//! The display also reports UI events back to the driver. The confirmation
//! action is surfaced as `UiEvent::Confirm`; what it means is left to the
//! application (`LoopDriver::on_confirm`).

#[cfg(feature = "display-minifb")]
mod window;

use anyhow::Result;

use crate::surface::SurfaceImage;
#[cfg(feature = "display-minifb")]
pub use window::WindowDisplay;

/// Events a display reports between ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiEvent {
    /// The user pressed the confirmation action.
    Confirm,
    /// The user closed the window.
    Close,
}

pub trait DisplaySurface {
    /// Show a freshly published image.
    fn present(&mut self, image: &SurfaceImage) -> Result<()>;

    /// Drain pending UI events.
    fn poll_events(&mut self) -> Vec<UiEvent> {
        Vec::new()
    }
}

impl<D: DisplaySurface + ?Sized> DisplaySurface for Box<D> {
    fn present(&mut self, image: &SurfaceImage) -> Result<()> {
        (**self).present(image)
    }

    fn poll_events(&mut self) -> Vec<UiEvent> {
        (**self).poll_events()
    }
}

/// Static text shown next to the video.
///
/// The plate value is fixed; detections are not wired into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoPanel {
    pub header: String,
    pub field_label: String,
    pub field_value: String,
    pub confirm_label: String,
}

impl Default for InfoPanel {
    fn default() -> Self {
        Self {
            header: "Scan License Plate".to_string(),
            field_label: "License Plate".to_string(),
            field_value: "GLN 8988".to_string(),
            confirm_label: "CONFIRM".to_string(),
        }
    }
}

impl InfoPanel {
    /// One-line rendering for window titles and logs.
    pub fn title_line(&self, app: &str) -> String {
        format!(
            "{} - {} | {}: {} | [Enter] {}",
            app, self.header, self.field_label, self.field_value, self.confirm_label
        )
    }
}

/// Display without a window. Remembers what it was shown.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    last: Option<SurfaceImage>,
    presented: u64,
    pending: Vec<UiEvent>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&SurfaceImage> {
        self.last.as_ref()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Queue an event for the next poll, as if a user had acted.
    pub fn push_event(&mut self, event: UiEvent) {
        self.pending.push(event);
    }
}

impl DisplaySurface for HeadlessDisplay {
    fn present(&mut self, image: &SurfaceImage) -> Result<()> {
        self.presented += 1;
        log::debug!(
            "headless display: frame #{} {}x{}",
            self.presented,
            image.width,
            image.height
        );
        self.last = Some(image.clone());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.pending)
    }
}
