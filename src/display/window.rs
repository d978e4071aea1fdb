use anyhow::{anyhow, Result};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use super::{DisplaySurface, InfoPanel, UiEvent};
use crate::surface::SurfaceImage;

/// Desktop window backed by minifb.
///
/// The info panel is rendered into the title bar. Enter triggers the
/// confirmation action; Escape or closing the window ends the session.
pub struct WindowDisplay {
    window: Window,
    buffer: Vec<u32>,
}

impl WindowDisplay {
    pub fn open(app: &str, panel: &InfoPanel, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            &panel.title_line(app),
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| anyhow!("failed to open display window: {}", e))?;
        Ok(Self {
            window,
            buffer: vec![0; width * height],
        })
    }
}

impl DisplaySurface for WindowDisplay {
    fn present(&mut self, image: &SurfaceImage) -> Result<()> {
        let width = image.width as usize;
        let height = image.height as usize;
        self.buffer.clear();
        self.buffer.reserve(width * height);
        let (ri, bi) = if image.order.is_red_first() {
            (0, 2)
        } else {
            (2, 0)
        };
        // minifb wants 0RGB, top row first.
        for y in 0..image.height {
            for x in 0..image.width {
                let px = image.pixel_on_screen(x, y);
                let (r, g, b) = (px[ri] as u32, px[1] as u32, px[bi] as u32);
                self.buffer.push((r << 16) | (g << 8) | b);
            }
        }
        self.window
            .update_with_buffer(&self.buffer, width, height)
            .map_err(|e| anyhow!("failed to present frame: {}", e))
    }

    fn poll_events(&mut self) -> Vec<UiEvent> {
        self.window.update();
        let mut events = Vec::new();
        if self.window.is_key_pressed(Key::Enter, KeyRepeat::No) {
            events.push(UiEvent::Confirm);
        }
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            events.push(UiEvent::Close);
        }
        events
    }
}
