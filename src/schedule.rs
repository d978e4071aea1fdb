//! Fixed-period tick runner.
//!
//! Ticks run synchronously on the caller's thread, so a tick can never start
//! before the previous one has returned. Deadlines advance by one period per
//! tick from the start instant, so cadence does not drift with tick duration.
//! When a tick overruns its slot the next one starts as soon as it returns and
//! the schedule re-anchors there; missed slots are not replayed.

use anyhow::{anyhow, Result};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block until `deadline`. Returns immediately if it has passed.
    fn sleep_until(&self, deadline: Instant);
}

/// `Instant` + `thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Cancels a running `FixedRateRunner`. Cheap to clone and safe to trigger
/// from another thread (e.g. a signal handler).
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the runner tells each tick about its slot.
#[derive(Clone, Copy, Debug)]
pub struct TickInfo {
    /// 0-based tick number.
    pub index: u64,
    /// When the tick was due.
    pub scheduled: Instant,
    /// When it actually started.
    pub started: Instant,
}

impl TickInfo {
    pub fn lateness(&self) -> Duration {
        self.started.saturating_duration_since(self.scheduled)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks that ran past their slot and pushed the next tick back.
    pub overruns: u64,
}

pub struct FixedRateRunner<C = MonotonicClock> {
    period: Duration,
    clock: C,
    stop: StopHandle,
}

impl FixedRateRunner<MonotonicClock> {
    /// Runner at `rate_hz` ticks per second on the monotonic clock.
    pub fn new(rate_hz: u32) -> Result<Self> {
        Ok(Self::with_clock(period_for_rate(rate_hz)?, MonotonicClock))
    }
}

impl<C: Clock> FixedRateRunner<C> {
    pub fn with_clock(period: Duration, clock: C) -> Self {
        Self {
            period,
            clock,
            stop: StopHandle::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run `tick` once per period until the stop handle fires or `tick` breaks.
    pub fn run<F>(&self, mut tick: F) -> RunSummary
    where
        F: FnMut(&TickInfo) -> ControlFlow<()>,
    {
        let mut summary = RunSummary::default();
        let mut deadline = self.clock.now();
        loop {
            if self.stop.is_stopped() {
                break;
            }
            self.clock.sleep_until(deadline);
            if self.stop.is_stopped() {
                break;
            }

            let info = TickInfo {
                index: summary.ticks,
                scheduled: deadline,
                started: self.clock.now(),
            };
            summary.ticks += 1;
            let flow = tick(&info);

            let finished = self.clock.now();
            deadline += self.period;
            if finished > deadline {
                summary.overruns += 1;
                log::trace!(
                    "tick {} overran its slot by {:?}",
                    info.index,
                    finished - deadline
                );
                deadline = finished;
            }
            if flow.is_break() {
                break;
            }
        }
        summary
    }
}

/// Period for a tick rate; rejects 0.
pub fn period_for_rate(rate_hz: u32) -> Result<Duration> {
    if rate_hz == 0 {
        return Err(anyhow!("tick rate must be >= 1"));
    }
    Ok(Duration::from_nanos(1_000_000_000 / rate_hz as u64))
}
