//! Pipeline session: owns the frame source and the detector/tracker and runs
//! one capture → annotate → normalize → adapt → publish pass per tick.
//!
//! State machine: `Idle` → `Running` → `Stopped` (terminal). Only `start` and
//! `close` change state; nothing that happens inside a tick does.

use anyhow::{anyhow, Result};
use std::fmt;

use crate::detect::Annotator;
use crate::ingest::FrameSource;
use crate::normalize::normalize;
use crate::surface::{to_surface, RenderSurface};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

/// Stage at which a tick was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Stage {
    Annotate,
    Adapt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Annotate => write!(f, "annotate"),
            Stage::Adapt => write!(f, "adapt"),
        }
    }
}

/// Result of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// A new image was published to the render surface.
    Published,
    /// The source had no frame; the surface is unchanged.
    NoFrame,
    /// A stage failed; the surface is unchanged.
    Skipped { stage: Stage, error: anyhow::Error },
    /// The session is not running.
    Inactive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SessionStats {
    pub ticks: u64,
    pub published: u64,
    pub no_frame: u64,
    pub skipped: u64,
}

pub struct Session<S: FrameSource, A: Annotator> {
    state: SessionState,
    source: Option<S>,
    annotator: A,
    surface: RenderSurface,
    stats: SessionStats,
}

impl<S: FrameSource, A: Annotator> Session<S, A> {
    /// New idle session around an already loaded detector/tracker.
    pub fn new(annotator: A) -> Self {
        Self {
            state: SessionState::Idle,
            source: None,
            annotator,
            surface: RenderSurface::new(),
            stats: SessionStats::default(),
        }
    }

    /// Open the frame source and start running.
    ///
    /// An open failure leaves the session idle and is returned to the caller.
    pub fn start<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce() -> Result<S>,
    {
        if self.state != SessionState::Idle {
            return Err(anyhow!("session cannot start from {:?}", self.state));
        }
        let source = open()?;
        log::info!(
            "session running: source={} detector={}",
            source.describe(),
            self.annotator.name()
        );
        self.source = Some(source);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Run one pipeline pass. Never fails; failures are reported in the outcome.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SessionState::Running {
            return TickOutcome::Inactive;
        }
        let Some(source) = self.source.as_mut() else {
            return TickOutcome::Inactive;
        };
        self.stats.ticks += 1;

        let Some(frame) = source.acquire() else {
            self.stats.no_frame += 1;
            return TickOutcome::NoFrame;
        };

        let annotated = match self.annotator.annotate(&frame) {
            Ok(annotated) if annotated.same_dimensions(&frame) => annotated,
            Ok(annotated) => {
                let error = anyhow!(
                    "detector returned {}x{} for a {}x{} frame",
                    annotated.width(),
                    annotated.height(),
                    frame.width(),
                    frame.height()
                );
                return self.skip(Stage::Annotate, error);
            }
            Err(error) => return self.skip(Stage::Annotate, error),
        };
        drop(frame);

        let image = match to_surface(normalize(annotated)) {
            Ok(image) => image,
            Err(error) => return self.skip(Stage::Adapt, error),
        };
        self.surface.publish(image);
        self.stats.published += 1;
        TickOutcome::Published
    }

    fn skip(&mut self, stage: Stage, error: anyhow::Error) -> TickOutcome {
        self.stats.skipped += 1;
        TickOutcome::Skipped { stage, error }
    }

    /// Release the frame source and stop. Idempotent; a release failure is
    /// logged and the session still ends up stopped.
    pub fn close(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        if let Some(mut source) = self.source.take() {
            let name = source.describe();
            match source.release() {
                Ok(()) => log::info!("session stopped: released {}", name),
                Err(err) => log::error!("session stopped: failed to release {}: {:#}", name, err),
            }
        }
        self.state = SessionState::Stopped;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Source health, false once the session is not running.
    pub fn source_healthy(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_healthy())
    }

    pub fn annotator(&self) -> &A {
        &self.annotator
    }
}

impl<S: FrameSource, A: Annotator> Drop for Session<S, A> {
    fn drop(&mut self) {
        self.close();
    }
}
