//! Loop driver: runs the session on a fixed-rate schedule and feeds the
//! display.
//!
//! Everything happens on the thread that calls `run`: UI event polling, the
//! pipeline pass, and presentation. Per-tick failures are logged and never end
//! the loop; only a stop request or the display closing does, after which the
//! session is closed before `run` returns.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use crate::detect::Annotator;
use crate::display::{DisplaySurface, UiEvent};
use crate::ingest::FrameSource;
use crate::schedule::{Clock, FixedRateRunner, MonotonicClock, RunSummary, StopHandle};
use crate::session::{Session, SessionState, SessionStats, Stage, TickOutcome};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const WARN_EVERY: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum CloseReason {
    StopRequested,
    DisplayClosed,
}

/// Summary returned when the loop ends.
#[derive(Clone, Debug, serde::Serialize)]
pub struct DriverReport {
    pub session: SessionStats,
    pub schedule: RunSummary,
    pub final_state: SessionState,
    pub close_reason: CloseReason,
    pub presented: u64,
    pub present_failures: u64,
    pub confirmations: u64,
}

pub struct LoopDriver<S, A, D, C = MonotonicClock>
where
    S: FrameSource,
    A: Annotator,
    D: DisplaySurface,
    C: Clock,
{
    session: Session<S, A>,
    display: D,
    runner: FixedRateRunner<C>,
    on_confirm: Box<dyn FnMut()>,
}

impl<S, A, D, C> LoopDriver<S, A, D, C>
where
    S: FrameSource,
    A: Annotator,
    D: DisplaySurface,
    C: Clock,
{
    pub fn new(session: Session<S, A>, display: D, runner: FixedRateRunner<C>) -> Self {
        Self {
            session,
            display,
            runner,
            on_confirm: Box::new(|| log::info!("confirmation requested")),
        }
    }

    /// Replace the confirmation hook. The default only logs.
    pub fn on_confirm<F: FnMut() + 'static>(mut self, hook: F) -> Self {
        self.on_confirm = Box::new(hook);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.runner.stop_handle()
    }

    pub fn session(&self) -> &Session<S, A> {
        &self.session
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Drive ticks until stopped. The session must already be running.
    pub fn run(&mut self) -> Result<DriverReport> {
        if self.session.state() != SessionState::Running {
            return Err(anyhow!(
                "loop driver needs a running session, found {:?}",
                self.session.state()
            ));
        }
        log::info!(
            "loop driver started at {:.1} ticks/s",
            1.0 / self.runner.period().as_secs_f64()
        );

        let session = &mut self.session;
        let display = &mut self.display;
        let on_confirm = &mut self.on_confirm;
        let mut skip_counts: HashMap<Stage, u64> = HashMap::new();
        let mut presented = 0u64;
        let mut present_failures = 0u64;
        let mut confirmations = 0u64;
        let mut close_reason = CloseReason::StopRequested;
        let mut last_health_log: Option<Instant> = None;

        let schedule = self.runner.run(|info| {
            for event in display.poll_events() {
                match event {
                    UiEvent::Confirm => {
                        confirmations += 1;
                        on_confirm();
                    }
                    UiEvent::Close => close_reason = CloseReason::DisplayClosed,
                }
            }
            if close_reason == CloseReason::DisplayClosed {
                return ControlFlow::Break(());
            }

            match session.tick() {
                TickOutcome::Published => {
                    if let Some(image) = session.surface().current() {
                        match display.present(image) {
                            Ok(()) => presented += 1,
                            Err(err) => {
                                present_failures += 1;
                                if present_failures == 1 || present_failures % WARN_EVERY == 0 {
                                    log::warn!(
                                        "present failed ({} so far): {:#}",
                                        present_failures,
                                        err
                                    );
                                }
                            }
                        }
                    }
                }
                TickOutcome::NoFrame => {}
                TickOutcome::Skipped { stage, error } => {
                    let count = skip_counts.entry(stage).or_insert(0);
                    *count += 1;
                    if *count == 1 || *count % WARN_EVERY == 0 {
                        log::warn!(
                            "tick {} skipped at {} ({} so far): {:#}",
                            info.index,
                            stage,
                            count,
                            error
                        );
                    }
                }
                TickOutcome::Inactive => return ControlFlow::Break(()),
            }

            let due = last_health_log.map_or(true, |at| {
                info.started.saturating_duration_since(at) >= HEALTH_LOG_INTERVAL
            });
            if due {
                let stats = session.stats();
                log::info!(
                    "pipeline health={} ticks={} published={} no_frame={} skipped={} late_by={:?}",
                    session.source_healthy(),
                    stats.ticks,
                    stats.published,
                    stats.no_frame,
                    stats.skipped,
                    info.lateness()
                );
                last_health_log = Some(info.started);
            }
            ControlFlow::Continue(())
        });

        self.session.close();
        let report = DriverReport {
            session: self.session.stats(),
            schedule,
            final_state: self.session.state(),
            close_reason,
            presented,
            present_failures,
            confirmations,
        };
        log::info!(
            "loop driver stopped ({:?}) after {} ticks, {} published",
            report.close_reason,
            report.schedule.ticks,
            report.session.published
        );
        Ok(report)
    }
}
