//! The future state machine and the non-time-driven policy variants.
//!
//! A [`SequentialFuture`] wraps exactly one task outcome. Its state moves
//! out of `Pending` at most once (to `Cancelled`, `Complete` or `Failed`)
//! and a terminal cancelled/failed state is never left again. *When* the
//! task actually executes is decided by the policy the future was
//! constructed with:
//!
//! - **Immediate**: the task runs inside the constructor; the future is
//!   terminal before the caller ever sees it, so `cancel` always fails.
//! - **OnCall**: the first `get()` runs the task; earlier `cancel` works
//!   normally.
//! - **Never**: the task is never run automatically; `get()` on a pending
//!   instance fails fast with an illegal-state error because nothing could
//!   ever complete it.
//!
//! Time-driven variants live in [`crate::scheduled`] and reuse the same
//! core.

use crate::error::{Error, Result, TaskError};
use crate::task::Task;
use crate::time::TimeUnit;
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) const TASK_NOT_RUN: &str = "task has not run yet";
const NEVER_NOT_READY: &str = "never-run future is not ready";

/// The at-most-once outcome of a task.
pub(crate) enum FutureState<T> {
    /// The task has not produced an outcome yet.
    Pending,
    /// The future was cancelled before the task produced an outcome.
    Cancelled,
    /// The task completed with a result.
    Complete(T),
    /// The task failed; the failure is shared across `get()` calls.
    Failed(Arc<TaskError>),
}

impl<T> FutureState<T> {
    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
            Self::Complete(_) => "complete",
            Self::Failed(_) => "failed",
        }
    }
}

/// The state machine shared by every future variant.
///
/// Holds the task, the current state and, for periodic futures, the result
/// of the most recent completed firing (stashed by [`rearm`](Self::rearm)).
pub(crate) struct FutureCore<T> {
    task: Box<dyn Task<T>>,
    state: FutureState<T>,
    last: Option<T>,
    fire_count: u64,
}

impl<T> FutureCore<T> {
    pub(crate) fn new(task: Box<dyn Task<T>>) -> Self {
        Self {
            task,
            state: FutureState::Pending,
            last: None,
            fire_count: 0,
        }
    }

    /// Executes the task if the future is still pending.
    ///
    /// On a cancelled future this fails without touching the task. On an
    /// already-complete or failed future it is a no-op, which is what keeps
    /// the task at exactly one invocation however the caller retries.
    pub(crate) fn run(&mut self) -> Result<()> {
        match self.state {
            FutureState::Cancelled => return Err(Error::Cancelled),
            FutureState::Complete(_) | FutureState::Failed(_) => return Ok(()),
            FutureState::Pending => {}
        }
        self.fire_count += 1;
        match self.task.call() {
            Ok(value) => self.state = FutureState::Complete(value),
            Err(err) => {
                tracing::debug!(error = %err, "task failed; capturing failure into future state");
                self.state = FutureState::Failed(Arc::new(err));
            }
        }
        Ok(())
    }

    /// Cancels the future. Succeeds only while pending.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.state {
            FutureState::Pending => {
                self.state = FutureState::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Puts a completed future back into `Pending` so its task can run
    /// again, retaining the completed value for `get()`.
    ///
    /// Refuses on a cancelled or failed future: a terminal outcome of
    /// those kinds is never resurrected. Returns whether the future is
    /// pending afterwards.
    pub(crate) fn rearm(&mut self) -> bool {
        match std::mem::replace(&mut self.state, FutureState::Pending) {
            FutureState::Complete(value) => {
                self.last = Some(value);
                true
            }
            FutureState::Pending => true,
            terminal => {
                self.state = terminal;
                false
            }
        }
    }

    /// Retrieves the stored outcome.
    pub(crate) fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        match &self.state {
            FutureState::Cancelled => Err(Error::Cancelled),
            FutureState::Failed(err) => Err(Error::Execution(Arc::clone(err))),
            FutureState::Complete(value) => Ok(value.clone()),
            FutureState::Pending => self
                .last
                .clone()
                .map_or(Err(Error::IllegalState(TASK_NOT_RUN)), Ok),
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.state, FutureState::Pending)
    }

    pub(crate) fn is_done(&self) -> bool {
        !self.is_pending()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self.state, FutureState::Cancelled)
    }

    pub(crate) fn has_run(&self) -> bool {
        matches!(self.state, FutureState::Complete(_) | FutureState::Failed(_))
    }

    pub(crate) fn failed(&self) -> bool {
        matches!(self.state, FutureState::Failed(_))
    }

    pub(crate) fn fire_count(&self) -> u64 {
        self.fire_count
    }

    pub(crate) fn state_name(&self) -> &'static str {
        self.state.name()
    }
}

/// Execution policy of a plain (non-time-driven) future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Immediate,
    OnCall,
    Never,
}

/// A handle to a task's eventual, at-most-once outcome.
///
/// Handles are cheap to clone and share one underlying state machine.
///
/// ```
/// use sequent::{SequentialFuture, TaskError};
///
/// let future = SequentialFuture::on_call(|| Ok::<_, TaskError>("ready"));
/// assert!(!future.is_done());
/// assert_eq!(future.get().expect("task ran"), "ready");
/// assert!(future.has_run());
/// ```
pub struct SequentialFuture<T> {
    cell: Arc<Mutex<FutureCore<T>>>,
    policy: Policy,
}

impl<T> Clone for SequentialFuture<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            policy: self.policy,
        }
    }
}

impl<T> SequentialFuture<T> {
    fn with_policy(task: impl Task<T> + 'static, policy: Policy) -> Self {
        Self {
            cell: Arc::new(Mutex::new(FutureCore::new(Box::new(task)))),
            policy,
        }
    }

    /// Constructs a future whose task runs synchronously right here, before
    /// the caller receives the handle. `cancel` on the result always
    /// returns false.
    pub fn immediate(task: impl Task<T> + 'static) -> Self {
        let future = Self::with_policy(task, Policy::Immediate);
        // A freshly constructed core is pending, so this cannot hit the
        // cancelled-error path.
        let _ = future.cell.lock().run();
        future
    }

    /// Constructs a future whose task runs at the first `get()`.
    pub fn on_call(task: impl Task<T> + 'static) -> Self {
        Self::with_policy(task, Policy::OnCall)
    }

    /// Constructs a future whose task is never run automatically.
    pub fn never(task: impl Task<T> + 'static) -> Self {
        Self::with_policy(task, Policy::Never)
    }

    /// Cancels the future.
    ///
    /// Succeeds (and returns true) only while the future is pending; any
    /// later call returns false and leaves the state untouched.
    pub fn cancel(&self) -> bool {
        self.cell.lock().cancel()
    }

    /// Executes the task if the future is still pending.
    ///
    /// Fails with [`Error::Cancelled`] on a cancelled future without
    /// touching the task; a task failure is captured into the future state
    /// and does *not* propagate out of this call.
    pub fn run(&self) -> Result<()> {
        self.cell.lock().run()
    }

    /// Retrieves the task's outcome.
    ///
    /// - Cancelled: fails with [`Error::Cancelled`].
    /// - Failed: fails with [`Error::Execution`] wrapping the captured
    ///   failure; the task is not re-invoked.
    /// - Complete: returns a clone of the stored result.
    /// - Pending: policy-dependent — OnCall runs the task now; Never fails
    ///   fast with [`Error::IllegalState`].
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        let mut core = self.cell.lock();
        match self.policy {
            Policy::OnCall if core.is_pending() => {
                core.run()?;
                core.get()
            }
            Policy::Never if core.is_pending() => Err(Error::IllegalState(NEVER_NOT_READY)),
            _ => core.get(),
        }
    }

    /// Like [`get`](Self::get), but bounded by a simulated-time budget.
    ///
    /// A plain future has no background actor, so if the future is not
    /// terminal and the policy cannot make progress synchronously this
    /// fails with [`Error::Timeout`] without any real waiting. OnCall
    /// treats the timeout form identically to `get()`.
    pub fn get_timeout(&self, amount: i64, unit: TimeUnit) -> Result<T>
    where
        T: Clone,
    {
        let mut core = self.cell.lock();
        match self.policy {
            Policy::OnCall if core.is_pending() => {
                core.run()?;
                core.get()
            }
            _ if core.is_done() => core.get(),
            _ => Err(Error::Timeout(crate::time::Elapsed::new(
                unit.to_time_clamped(amount),
            ))),
        }
    }

    /// Returns true once the future is terminal (cancelled, complete or
    /// failed).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cell.lock().is_done()
    }

    /// Returns true if the future was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cell.lock().is_cancelled()
    }

    /// Returns true once the task has produced an outcome (success or
    /// failure).
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.cell.lock().has_run()
    }

    /// Returns true if the task ran and failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.cell.lock().failed()
    }
}

impl<T> fmt::Display for SequentialFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = match self.policy {
            Policy::Immediate => "immediate",
            Policy::OnCall => "on-call",
            Policy::Never => "never",
        };
        write!(
            f,
            "SequentialFuture[policy={policy}, state={}]",
            self.cell.lock().state_name()
        )
    }
}

impl<T> fmt::Debug for SequentialFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
