//! Time-driven futures: delayed, periodic and delayed-periodic.
//!
//! A [`ScheduledFuture`] is a future that is also a
//! [`TimeListener`](crate::TimeListener). At construction it registers
//! with a [`TimeController`](crate::TimeController) and seeds its
//! remaining delay; every broadcast subtracts the elapsed delta, and the
//! remaining delay may go negative when a large advance overshoots a
//! deadline.
//!
//! One-shot futures fire once and ask to be deregistered. Periodic futures
//! rearm after every successful firing by folding the negative overshoot
//! back into the next period (`remaining += period`), which keeps the
//! firing phase accurate however coarsely time is advanced: advancing a
//! fresh periodic future by Δ fires it exactly `floor(Δ/P)` times and
//! leaves `P - (Δ mod P)` on the clock. A firing that fails stops the
//! future permanently.

use crate::controller::TimeController;
use crate::error::{Error, Result};
use crate::future::FutureCore;
use crate::listener::TimeListener;
use crate::task::Task;
use crate::time::{Time, TimeUnit};
use core::cmp::Ordering;
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

/// When a scheduled future runs its task relative to the virtual clock.
enum Schedule {
    /// Fire once when the remaining delay reaches zero, then deregister.
    Once,
    /// Fire every `period_nanos`, rearming after each successful firing.
    Periodic { period_nanos: i64 },
}

struct ScheduledCore<T> {
    core: FutureCore<T>,
    /// Remaining virtual time before the next firing; negative while an
    /// advance has overshot the deadline.
    remaining: i64,
    initial: i64,
    schedule: Schedule,
}

impl<T> ScheduledCore<T> {
    fn on_time_passed(&mut self, delta: Time) -> bool {
        let delta_nanos = i64::try_from(delta.as_nanos()).unwrap_or(i64::MAX);
        self.remaining = self.remaining.saturating_sub(delta_nanos);
        if self.core.is_cancelled() {
            // Cancellation already happened; nothing left to do but leave.
            return true;
        }
        match self.schedule {
            Schedule::Once => {
                if self.remaining > 0 {
                    return false;
                }
                if self.core.run().is_ok() {
                    tracing::trace!(
                        overshoot_ns = self.remaining.unsigned_abs(),
                        "one-shot future fired"
                    );
                }
                true
            }
            Schedule::Periodic { period_nanos } => {
                while self.remaining <= 0 {
                    if self.core.run().is_err() {
                        return true;
                    }
                    if !self.core.rearm() {
                        // Failed (or cancelled) firing: stop permanently.
                        tracing::trace!(
                            firings = self.core.fire_count(),
                            "periodic future stopped"
                        );
                        return true;
                    }
                    self.remaining = self.remaining.saturating_add(period_nanos);
                }
                false
            }
        }
    }

    fn next_ready(&self) -> Option<Time> {
        if self.core.is_done() {
            return None;
        }
        if self.remaining <= 0 {
            Some(Time::from_nanos(1))
        } else {
            Some(Time::from_nanos(self.remaining as u64))
        }
    }

    /// Readiness for `get`: terminal, or at least one completed firing
    /// whose result is retained.
    fn ready_for_get(&self) -> bool {
        self.core.is_done() || self.core.fire_count() > 0
    }
}

/// The listener object registered with the controller; kept separate from
/// the public handle so the handle stays freely clonable.
struct Registration<T> {
    cell: Arc<Mutex<ScheduledCore<T>>>,
}

impl<T: Send + 'static> TimeListener for Registration<T> {
    fn time_passed(&self, delta: Time) -> bool {
        self.cell.lock().on_time_passed(delta)
    }

    fn next_ready_in(&self) -> Option<Time> {
        self.cell.lock().next_ready()
    }
}

/// A future driven by a virtual clock.
///
/// ```
/// use sequent::{ScheduledFuture, TaskError, TimeController, TimeUnit};
///
/// let controller = TimeController::live();
/// let future = ScheduledFuture::periodic(
///     || Ok::<_, TaskError>(()),
///     10,
///     TimeUnit::Nanos,
///     &controller,
/// )
/// .expect("valid period");
///
/// controller.advance(100, TimeUnit::Nanos).expect("advance");
/// assert_eq!(future.fire_count(), 10);
/// assert_eq!(future.get_delay(TimeUnit::Nanos), 10);
/// ```
pub struct ScheduledFuture<T> {
    cell: Arc<Mutex<ScheduledCore<T>>>,
    registration: Arc<dyn TimeListener>,
    controller: TimeController,
}

impl<T> Clone for ScheduledFuture<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            registration: Arc::clone(&self.registration),
            controller: self.controller.clone(),
        }
    }
}

fn ensure_positive(what: &'static str, value: i64) -> Result<()> {
    if value <= 0 {
        return Err(Error::InvalidArgument { what, value });
    }
    Ok(())
}

impl<T: Send + 'static> ScheduledFuture<T> {
    fn register(
        task: impl Task<T> + 'static,
        remaining: i64,
        schedule: Schedule,
        controller: &TimeController,
    ) -> Self {
        let cell = Arc::new(Mutex::new(ScheduledCore {
            core: FutureCore::new(Box::new(task)),
            remaining,
            initial: remaining,
            schedule,
        }));
        let registration: Arc<dyn TimeListener> = Arc::new(Registration {
            cell: Arc::clone(&cell),
        });
        controller.register(&registration);
        Self {
            cell,
            registration,
            controller: controller.clone(),
        }
    }

    /// Constructs a one-shot future that fires once `delay` of `unit` has
    /// passed on `controller`.
    ///
    /// Fails with [`Error::InvalidArgument`] unless the delay is strictly
    /// positive.
    pub fn delayed(
        task: impl Task<T> + 'static,
        delay: i64,
        unit: TimeUnit,
        controller: &TimeController,
    ) -> Result<Self> {
        ensure_positive("delay", delay)?;
        Ok(Self::register(
            task,
            unit.to_nanos(delay),
            Schedule::Once,
            controller,
        ))
    }

    /// Constructs a periodic future that fires every `period` of `unit`.
    ///
    /// Fails with [`Error::InvalidArgument`] unless the period is strictly
    /// positive.
    pub fn periodic(
        task: impl Task<T> + 'static,
        period: i64,
        unit: TimeUnit,
        controller: &TimeController,
    ) -> Result<Self> {
        ensure_positive("period", period)?;
        let period_nanos = unit.to_nanos(period);
        Ok(Self::register(
            task,
            period_nanos,
            Schedule::Periodic { period_nanos },
            controller,
        ))
    }

    /// Constructs a periodic future whose first firing waits
    /// `initial_delay` instead of one period; afterwards it rearms with
    /// `period` exactly like a plain periodic future.
    ///
    /// Fails with [`Error::InvalidArgument`] unless both the initial delay
    /// and the period are strictly positive.
    pub fn delayed_periodic(
        task: impl Task<T> + 'static,
        initial_delay: i64,
        period: i64,
        unit: TimeUnit,
        controller: &TimeController,
    ) -> Result<Self> {
        ensure_positive("initial delay", initial_delay)?;
        ensure_positive("period", period)?;
        Ok(Self::register(
            task,
            unit.to_nanos(initial_delay),
            Schedule::Periodic {
                period_nanos: unit.to_nanos(period),
            },
            controller,
        ))
    }

    /// Cancels the future and deregisters it from its controller.
    ///
    /// Succeeds only while pending; subsequent `advance` calls never
    /// affect a cancelled future.
    pub fn cancel(&self) -> bool {
        let cancelled = self.cell.lock().core.cancel();
        if cancelled {
            self.controller.deregister_when_idle(&self.registration);
        }
        cancelled
    }

    /// Executes the task if the future is still pending, regardless of the
    /// remaining delay.
    pub fn run(&self) -> Result<()> {
        self.cell.lock().core.run()
    }

    /// Drives the owning controller until this future is ready, then
    /// retrieves the outcome.
    ///
    /// "Ready" means terminal for a one-shot future, and "terminal or at
    /// least one completed firing" for a periodic one (whose most recent
    /// result is retained). All waiting is simulated time advancement.
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.controller
            .block_until(|| self.cell.lock().ready_for_get())?;
        self.cell.lock().core.get()
    }

    /// Like [`get`](Self::get), bounded by a simulated-time budget of
    /// `amount` of `unit`; fails with [`Error::Timeout`] on exhaustion.
    pub fn get_timeout(&self, amount: i64, unit: TimeUnit) -> Result<T>
    where
        T: Clone,
    {
        self.controller
            .block_until_timeout(|| self.cell.lock().ready_for_get(), amount, unit)?;
        self.cell.lock().core.get()
    }

    /// Returns the remaining delay converted to `unit` (truncating); does
    /// not advance time. Negative once an advance has overshot the
    /// deadline.
    #[must_use]
    pub fn get_delay(&self, unit: TimeUnit) -> i64 {
        unit.from_nanos(self.cell.lock().remaining)
    }

    /// The delay this future was constructed with, in `unit`.
    #[must_use]
    pub fn initial_delay(&self, unit: TimeUnit) -> i64 {
        unit.from_nanos(self.cell.lock().initial)
    }

    /// Orders scheduled futures by remaining delay, ascending. Equal
    /// remaining delays compare equal regardless of identity or
    /// registration order.
    #[must_use]
    pub fn delay_cmp<U>(&self, other: &ScheduledFuture<U>) -> Ordering {
        let mine = self.cell.lock().remaining;
        let theirs = other.cell.lock().remaining;
        mine.cmp(&theirs)
    }

    /// Number of completed task invocations so far.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.cell.lock().core.fire_count()
    }

    /// Returns true once the future is terminal (cancelled, complete or
    /// failed). A healthy periodic future is never "done".
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cell.lock().core.is_done()
    }

    /// Returns true if the future was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cell.lock().core.is_cancelled()
    }

    /// Returns true while the task's latest outcome is stored (success or
    /// failure).
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.cell.lock().core.has_run()
    }

    /// Returns true if a firing failed; a failed future never fires again.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.cell.lock().core.failed()
    }
}

impl<T: Send + 'static> TimeListener for ScheduledFuture<T> {
    fn time_passed(&self, delta: Time) -> bool {
        self.cell.lock().on_time_passed(delta)
    }

    fn next_ready_in(&self) -> Option<Time> {
        self.cell.lock().next_ready()
    }
}

impl<T> fmt::Display for ScheduledFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.lock();
        let kind = match cell.schedule {
            Schedule::Once => "delayed",
            Schedule::Periodic { .. } => "periodic",
        };
        write!(
            f,
            "ScheduledFuture[kind={kind}, state={}, remaining={}ns]",
            cell.core.state_name(),
            cell.remaining
        )
    }
}

impl<T> fmt::Debug for ScheduledFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
