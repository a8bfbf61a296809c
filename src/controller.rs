//! The virtual clock: listener registry, time advancement and
//! predicate-driven waiting.
//!
//! A [`TimeController`] holds a set of registered
//! [`TimeListener`](crate::TimeListener)s and advances simulated time.
//! `advance` broadcasts over a stable snapshot of the set and applies all
//! requested deregistrations in one batch afterwards, so callbacks can
//! never observe (or cause) mutation of the set mid-iteration. "Waiting"
//! is entirely simulated: [`block_until`](TimeController::block_until)
//! advances the clock in minimal steps until a predicate holds, without
//! ever sleeping.
//!
//! A no-op controller ([`TimeController::nop`]) exists for plain futures
//! that never need a live clock; every operation on it does nothing.

use crate::error::{Error, Result};
use crate::listener::TimeListener;
use crate::time::{Elapsed, Time, TimeUnit};
use core::fmt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const REENTRANT_UNREGISTER: &str =
    "unregister called from inside a time broadcast; return true from the callback instead";
const REENTRANT_ADVANCE: &str = "advance called from inside a time broadcast";
const NO_PROGRESS: &str = "no registered listener can make progress toward the predicate";

/// Cooperative interruption flag.
///
/// Replaces the ambient "thread interrupted" state of blocking designs
/// with an explicit token: `block_until` checks it before doing any
/// simulated waiting and fails fast with [`Error::Interrupted`] once it is
/// set.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
}

impl InterruptToken {
    /// Creates a fresh, unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the token. All subsequent simulated waits fail fast.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clears the token.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Returns whether the token is set.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Configuration for a live [`TimeController`].
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Fallback step for `block_until` when no registered listener offers
    /// a progress hint.
    ///
    /// Default: 1 nanosecond (the minimal representable granularity).
    pub granularity: Time,

    /// Optional cooperative interruption token checked before simulated
    /// waiting.
    pub interrupt: Option<InterruptToken>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            granularity: Time::from_nanos(1),
            interrupt: None,
        }
    }
}

impl ControllerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback `block_until` step. Clamped to at least 1 ns.
    #[must_use]
    pub fn granularity(mut self, granularity: Time) -> Self {
        self.granularity = if granularity.is_zero() {
            Time::from_nanos(1)
        } else {
            granularity
        };
        self
    }

    /// Attaches a cooperative interruption token.
    #[must_use]
    pub fn interrupt(mut self, token: InterruptToken) -> Self {
        self.interrupt = Some(token);
        self
    }
}

struct ControllerState {
    listeners: Vec<Arc<dyn TimeListener>>,
    broadcasting: bool,
    now: Time,
}

struct ControllerInner {
    state: Mutex<ControllerState>,
    config: ControllerConfig,
}

/// A virtual clock driving registered listeners forward deterministically.
///
/// Handles are cheap to clone and share one listener set.
///
/// ```
/// use sequent::{ScheduledFuture, TaskError, TimeController, TimeUnit};
///
/// let controller = TimeController::live();
/// let future = ScheduledFuture::delayed(
///     || Ok::<_, TaskError>("fired"),
///     10,
///     TimeUnit::Nanos,
///     &controller,
/// )
/// .expect("valid delay");
///
/// controller.advance(9, TimeUnit::Nanos).expect("advance");
/// assert!(!future.is_done());
/// controller.advance(1, TimeUnit::Nanos).expect("advance");
/// assert!(future.is_done());
/// ```
#[derive(Clone)]
pub struct TimeController {
    inner: Option<Arc<ControllerInner>>,
}

impl TimeController {
    /// Creates a live controller with default configuration.
    #[must_use]
    pub fn live() -> Self {
        Self::live_with(ControllerConfig::default())
    }

    /// Creates a live controller with the given configuration.
    #[must_use]
    pub fn live_with(config: ControllerConfig) -> Self {
        Self {
            inner: Some(Arc::new(ControllerInner {
                state: Mutex::new(ControllerState {
                    listeners: Vec::new(),
                    broadcasting: false,
                    now: Time::ZERO,
                }),
                config,
            })),
        }
    }

    /// Creates a controller on which every operation is a no-op.
    ///
    /// Useful to keep non-time-driven futures decoupled from any live
    /// clock.
    #[must_use]
    pub fn nop() -> Self {
        Self { inner: None }
    }

    /// Returns true for the no-op variant.
    #[must_use]
    pub fn is_nop(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns the current virtual time (always zero on a no-op
    /// controller).
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner
            .as_ref()
            .map_or(Time::ZERO, |inner| inner.state.lock().now)
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |inner| inner.state.lock().listeners.len())
    }

    /// Registers a listener. Idempotent if the same listener (by identity)
    /// is already present.
    pub fn register(&self, listener: &Arc<dyn TimeListener>) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let mut state = inner.state.lock();
        if !state.listeners.iter().any(|l| Arc::ptr_eq(l, listener)) {
            state.listeners.push(Arc::clone(listener));
            tracing::trace!(listeners = state.listeners.len(), "listener registered");
        }
    }

    /// Removes a listener. Removing an absent listener is fine.
    ///
    /// Fails with [`Error::IllegalState`] when called from inside a
    /// broadcast: the correct way to deregister from a callback is to
    /// return true from it.
    pub fn unregister(&self, listener: &Arc<dyn TimeListener>) -> Result<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        let mut state = inner.state.lock();
        if state.broadcasting {
            return Err(Error::IllegalState(REENTRANT_UNREGISTER));
        }
        state.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        tracing::trace!(listeners = state.listeners.len(), "listener unregistered");
        Ok(())
    }

    /// Removes a listener unless a broadcast is in progress; in that case
    /// the listener is left for its own callback return (or the next
    /// broadcast) to clean up. Used by scheduled-future cancellation.
    pub(crate) fn deregister_when_idle(&self, listener: &Arc<dyn TimeListener>) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let mut state = inner.state.lock();
        if !state.broadcasting {
            state.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    /// Advances simulated time by `amount` of `unit`.
    ///
    /// Broadcasts the normalized delta to a snapshot of the currently
    /// registered listeners; listeners registered by a callback only see
    /// later advances. After the full pass, every listener that returned
    /// true is removed in one batch. Fails with [`Error::IllegalState`]
    /// when invoked reentrantly from a callback.
    pub fn advance(&self, amount: u64, unit: TimeUnit) -> Result<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Ok(());
        };
        let delta = unit.to_time(amount);

        let snapshot: Vec<Arc<dyn TimeListener>> = {
            let mut state = inner.state.lock();
            if state.broadcasting {
                return Err(Error::IllegalState(REENTRANT_ADVANCE));
            }
            state.broadcasting = true;
            state.listeners.clone()
        };
        tracing::trace!(
            delta_ns = delta.as_nanos(),
            listeners = snapshot.len(),
            "advancing virtual time"
        );

        let mut doomed: Vec<Arc<dyn TimeListener>> = Vec::new();
        for listener in &snapshot {
            if listener.time_passed(delta) {
                doomed.push(Arc::clone(listener));
            }
        }

        let mut state = inner.state.lock();
        state.broadcasting = false;
        state.now = state.now.saturating_add(delta);
        if !doomed.is_empty() {
            state
                .listeners
                .retain(|l| !doomed.iter().any(|d| Arc::ptr_eq(d, l)));
            tracing::trace!(
                removed = doomed.len(),
                listeners = state.listeners.len(),
                "deregistered listeners after broadcast"
            );
        }
        Ok(())
    }

    /// Advances simulated time until the predicate holds.
    ///
    /// Each step is the minimum progress hint across registered listeners,
    /// falling back to the configured granularity. Fails with
    /// [`Error::Interrupted`] if the interrupt token is set before any
    /// step, and with [`Error::IllegalState`] when no listeners are
    /// registered (no step could ever change the predicate). On a no-op
    /// controller this returns immediately.
    pub fn block_until(&self, mut predicate: impl FnMut() -> bool) -> Result<()> {
        if self.inner.is_none() {
            return Ok(());
        }
        loop {
            self.check_interrupt()?;
            if predicate() {
                return Ok(());
            }
            let Some(step) = self.next_step() else {
                return Err(Error::IllegalState(NO_PROGRESS));
            };
            self.advance(step.as_nanos(), TimeUnit::Nanos)?;
        }
    }

    /// Like [`block_until`](Self::block_until), bounded by a simulated
    /// time budget of `amount` of `unit`.
    ///
    /// Fails with [`Error::Timeout`] once the budget is exhausted without
    /// the predicate becoming true. A non-positive budget allows no
    /// advancement at all. On a no-op controller this returns immediately.
    pub fn block_until_timeout(
        &self,
        mut predicate: impl FnMut() -> bool,
        amount: i64,
        unit: TimeUnit,
    ) -> Result<()> {
        if self.inner.is_none() {
            return Ok(());
        }
        let budget = unit.to_time_clamped(amount);
        let mut remaining = budget;
        loop {
            self.check_interrupt()?;
            if predicate() {
                return Ok(());
            }
            if remaining.is_zero() {
                return Err(Error::Timeout(Elapsed::new(budget)));
            }
            let step = self
                .next_step()
                .unwrap_or_else(|| self.granularity())
                .min(remaining);
            self.advance(step.as_nanos(), TimeUnit::Nanos)?;
            remaining = remaining.saturating_sub(step);
        }
    }

    fn check_interrupt(&self) -> Result<()> {
        let interrupted = self
            .inner
            .as_ref()
            .and_then(|inner| inner.config.interrupt.as_ref())
            .is_some_and(InterruptToken::is_interrupted);
        if interrupted {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    fn granularity(&self) -> Time {
        self.inner
            .as_ref()
            .map_or_else(|| Time::from_nanos(1), |inner| inner.config.granularity)
    }

    /// The next step `block_until` should take: the minimum listener hint,
    /// else the fallback granularity. `None` when no listeners are
    /// registered at all.
    fn next_step(&self) -> Option<Time> {
        let inner = self.inner.as_ref()?;
        let state = inner.state.lock();
        if state.listeners.is_empty() {
            return None;
        }
        let mut min: Option<Time> = None;
        for listener in &state.listeners {
            if let Some(hint) = listener.next_ready_in() {
                min = Some(min.map_or(hint, |current| current.min(hint)));
            }
        }
        let step = min.unwrap_or(inner.config.granularity);
        Some(if step.is_zero() {
            Time::from_nanos(1)
        } else {
            step
        })
    }
}

impl fmt::Debug for TimeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.as_ref() {
            None => f.debug_struct("TimeController").field("nop", &true).finish(),
            Some(inner) => {
                let state = inner.state.lock();
                f.debug_struct("TimeController")
                    .field("now", &state.now)
                    .field("listeners", &state.listeners.len())
                    .field("broadcasting", &state.broadcasting)
                    .finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::AtomicU64;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    /// Listener that counts callbacks and deregisters after a set number.
    struct CountingListener {
        calls: AtomicU64,
        deregister_after: u64,
    }

    impl CountingListener {
        fn new(deregister_after: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                deregister_after,
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TimeListener for CountingListener {
        fn time_passed(&self, _delta: Time) -> bool {
            let seen = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            seen >= self.deregister_after
        }
    }

    #[test]
    fn advance_broadcasts_and_batch_removes() {
        init_test("advance_broadcasts_and_batch_removes");
        let controller = TimeController::live();
        let keeper = CountingListener::new(u64::MAX);
        let leaver = CountingListener::new(1);
        let keeper_dyn: Arc<dyn TimeListener> = keeper.clone();
        let leaver_dyn: Arc<dyn TimeListener> = leaver.clone();
        controller.register(&keeper_dyn);
        controller.register(&leaver_dyn);
        crate::assert_with_log!(
            controller.listener_count() == 2,
            "both registered",
            2,
            controller.listener_count()
        );

        controller.advance(5, TimeUnit::Nanos).expect("advance");
        crate::assert_with_log!(
            controller.listener_count() == 1,
            "leaver removed in batch",
            1,
            controller.listener_count()
        );
        assert_eq!(keeper.calls(), 1);
        assert_eq!(leaver.calls(), 1);

        controller.advance(5, TimeUnit::Nanos).expect("advance");
        assert_eq!(keeper.calls(), 2);
        assert_eq!(leaver.calls(), 1, "deregistered listener untouched");
        assert_eq!(controller.now(), Time::from_nanos(10));
        crate::test_complete!("advance_broadcasts_and_batch_removes");
    }

    #[test]
    fn register_is_idempotent_by_identity() {
        init_test("register_is_idempotent_by_identity");
        let controller = TimeController::live();
        let listener: Arc<dyn TimeListener> = CountingListener::new(u64::MAX);
        controller.register(&listener);
        controller.register(&listener);
        assert_eq!(controller.listener_count(), 1);

        controller.unregister(&listener).expect("unregister");
        controller.unregister(&listener).expect("absent unregister is fine");
        assert_eq!(controller.listener_count(), 0);
        crate::test_complete!("register_is_idempotent_by_identity");
    }

    /// Listener whose callback tries to unregister itself reentrantly.
    struct ReentrantListener {
        controller: TimeController,
        cell: Mutex<Option<Arc<dyn TimeListener>>>,
        observed: Mutex<Option<Error>>,
    }

    impl TimeListener for ReentrantListener {
        fn time_passed(&self, _delta: Time) -> bool {
            let target = self.cell.lock().clone().expect("self arc installed");
            if let Err(err) = self.controller.unregister(&target) {
                *self.observed.lock() = Some(err);
            }
            false
        }
    }

    #[test]
    fn reentrant_unregister_fails_loudly() {
        init_test("reentrant_unregister_fails_loudly");
        let controller = TimeController::live();
        let listener = Arc::new(ReentrantListener {
            controller: controller.clone(),
            cell: Mutex::new(None),
            observed: Mutex::new(None),
        });
        let as_dyn: Arc<dyn TimeListener> = listener.clone();
        *listener.cell.lock() = Some(Arc::clone(&as_dyn));
        controller.register(&as_dyn);

        controller.advance(1, TimeUnit::Nanos).expect("advance");
        let observed = listener.observed.lock().take().expect("error captured");
        assert!(observed.is_illegal_state());
        assert_eq!(
            controller.listener_count(),
            1,
            "listener stays registered after rejected reentrant unregister"
        );
        crate::test_complete!("reentrant_unregister_fails_loudly");
    }

    #[test]
    fn block_until_without_listeners_fails_fast() {
        init_test("block_until_without_listeners_fails_fast");
        let controller = TimeController::live();
        let err = controller
            .block_until(|| false)
            .expect_err("nothing can make progress");
        assert!(err.is_illegal_state());

        // Already-true predicates succeed without listeners.
        controller.block_until(|| true).expect("trivially true");
        crate::test_complete!("block_until_without_listeners_fails_fast");
    }

    #[test]
    fn block_until_timeout_exhausts_the_budget() {
        init_test("block_until_timeout_exhausts_the_budget");
        let controller = TimeController::live();
        let err = controller
            .block_until_timeout(|| false, 100, TimeUnit::Nanos)
            .expect_err("budget exhausted");
        assert!(err.is_timeout());
        assert_eq!(
            controller.now(),
            Time::from_nanos(100),
            "whole budget was simulated"
        );
        crate::test_complete!("block_until_timeout_exhausts_the_budget");
    }

    #[test]
    fn interrupt_token_fails_fast_before_waiting() {
        init_test("interrupt_token_fails_fast_before_waiting");
        let token = InterruptToken::new();
        let controller =
            TimeController::live_with(ControllerConfig::new().interrupt(token.clone()));
        token.interrupt();

        let err = controller
            .block_until(|| true)
            .expect_err("interrupt observed before predicate");
        assert!(matches!(err, Error::Interrupted));
        assert_eq!(controller.now(), Time::ZERO, "no simulated waiting happened");

        token.clear();
        controller.block_until(|| true).expect("cleared token");
        crate::test_complete!("interrupt_token_fails_fast_before_waiting");
    }

    #[test]
    fn nop_controller_ignores_everything() {
        init_test("nop_controller_ignores_everything");
        let controller = TimeController::nop();
        assert!(controller.is_nop());
        let listener: Arc<dyn TimeListener> = CountingListener::new(u64::MAX);
        controller.register(&listener);
        assert_eq!(controller.listener_count(), 0);
        controller.advance(1_000, TimeUnit::Millis).expect("advance");
        assert_eq!(controller.now(), Time::ZERO);
        controller.unregister(&listener).expect("unregister");
        controller.block_until(|| false).expect("nop block_until");
        controller
            .block_until_timeout(|| false, 5, TimeUnit::Secs)
            .expect("nop bounded block_until");
        crate::test_complete!("nop_controller_ignores_everything");
    }
}
