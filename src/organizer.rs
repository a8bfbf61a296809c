//! Submission bookkeeping on top of sequential futures.
//!
//! A [`TaskOrganizer`] fronts the future constructors with a single
//! `submit` entry point plus counters over everything submitted so far.
//! It exists for test doubles that stand in for an executor: tasks are
//! grouped by [`SubmissionMode`], deferred work can be flushed at
//! termination, and leftover work can be cancelled in bulk.

use crate::error::{Error, Result};
use crate::future::SequentialFuture;
use crate::task::Task;
use parking_lot::Mutex;

/// When a submitted task is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionMode {
    /// Run during `submit` itself.
    Immediate,
    /// Run lazily on the first result retrieval.
    OnCall,
    /// Never run; retrieval fails fast.
    Never,
    /// Run when the organizer terminates.
    OnTermination,
}

impl SubmissionMode {
    const fn name(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnCall => "on_call",
            Self::Never => "never",
            Self::OnTermination => "on_termination",
        }
    }
}

/// Type-erased view of a submitted future, enough for bookkeeping.
trait Submitted: Send {
    fn is_done(&self) -> bool;
    fn cancel(&self) -> bool;
    fn run(&self) -> Result<()>;
}

impl<T: Send + 'static> Submitted for SequentialFuture<T> {
    fn is_done(&self) -> bool {
        SequentialFuture::is_done(self)
    }

    fn cancel(&self) -> bool {
        SequentialFuture::cancel(self)
    }

    fn run(&self) -> Result<()> {
        SequentialFuture::run(self)
    }
}

struct Entry {
    mode: SubmissionMode,
    handle: Box<dyn Submitted>,
}

impl Entry {
    /// A `Never` submission counts as unfinished for its whole life: it
    /// exists to assert that nothing ran it, so "done" never applies.
    fn finished(&self) -> bool {
        self.mode != SubmissionMode::Never && self.handle.is_done()
    }
}

struct OrganizerState {
    entries: Vec<Entry>,
    terminated: bool,
}

/// Groups submitted tasks and tracks their completion.
///
/// ```
/// use sequent::{SubmissionMode, TaskError, TaskOrganizer};
///
/// let organizer = TaskOrganizer::new();
/// let done = organizer
///     .submit(SubmissionMode::Immediate, || Ok::<_, TaskError>(1))
///     .expect("accepting submissions");
/// let deferred = organizer
///     .submit(SubmissionMode::OnTermination, || Ok::<_, TaskError>(2))
///     .expect("accepting submissions");
///
/// assert_eq!(organizer.finished_count(), 1);
/// organizer.terminate().expect("first termination");
/// assert!(deferred.is_done());
/// assert_eq!(done.get().expect("ran at submit"), 1);
/// ```
pub struct TaskOrganizer {
    state: Mutex<OrganizerState>,
}

impl TaskOrganizer {
    /// Creates an empty organizer accepting submissions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OrganizerState {
                entries: Vec::new(),
                terminated: false,
            }),
        }
    }

    /// Submits a task under the given mode and returns its future.
    ///
    /// Fails with [`Error::IllegalState`] once the organizer has
    /// terminated.
    pub fn submit<T: Send + 'static>(
        &self,
        mode: SubmissionMode,
        task: impl Task<T> + 'static,
    ) -> Result<SequentialFuture<T>> {
        let mut state = self.state.lock();
        if state.terminated {
            return Err(Error::IllegalState(TERMINATED));
        }
        let future = match mode {
            SubmissionMode::Immediate => SequentialFuture::immediate(task),
            // Termination flushes these through the on-call path.
            SubmissionMode::OnCall | SubmissionMode::OnTermination => {
                SequentialFuture::on_call(task)
            }
            SubmissionMode::Never => SequentialFuture::never(task),
        };
        state.entries.push(Entry {
            mode,
            handle: Box::new(future.clone()),
        });
        tracing::debug!(
            mode = mode.name(),
            submitted = state.entries.len(),
            "task submitted"
        );
        Ok(future)
    }

    /// Total tasks submitted so far.
    #[must_use]
    pub fn submitted_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Submitted tasks that have reached a terminal state. `Never`
    /// submissions are excluded from this count permanently.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.finished())
            .count()
    }

    /// Submitted tasks still outstanding.
    #[must_use]
    pub fn unfinished_count(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| !e.finished())
            .count()
    }

    /// Runs every pending `OnTermination` task and closes the organizer.
    ///
    /// Task failures are captured inside the respective futures, not
    /// surfaced here. Fails with [`Error::IllegalState`] when called a
    /// second time.
    pub fn terminate(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.terminated {
            return Err(Error::IllegalState(TERMINATED));
        }
        state.terminated = true;
        let mut flushed = 0usize;
        for entry in &state.entries {
            if entry.mode == SubmissionMode::OnTermination && !entry.handle.is_done() {
                let _ = entry.handle.run();
                flushed += 1;
            }
        }
        tracing::debug!(flushed, "organizer terminated");
        Ok(())
    }

    /// Returns true once [`terminate`](Self::terminate) has run.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Cancels every future that is still pending and returns how many
    /// cancellations took effect.
    pub fn cancel_unfinished(&self) -> usize {
        let state = self.state.lock();
        let cancelled = state
            .entries
            .iter()
            .filter(|e| e.handle.cancel())
            .count();
        tracing::debug!(cancelled, "unfinished tasks cancelled");
        cancelled
    }
}

impl Default for TaskOrganizer {
    fn default() -> Self {
        Self::new()
    }
}

const TERMINATED: &str = "organizer has terminated";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{counting_task, failing_task, init_test_logging, ok_task};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn counters_track_each_mode() {
        init_test("counters_track_each_mode");
        let organizer = TaskOrganizer::new();

        let immediate = organizer
            .submit(SubmissionMode::Immediate, ok_task(1u8))
            .expect("submit");
        let on_call = organizer
            .submit(SubmissionMode::OnCall, ok_task(2u8))
            .expect("submit");
        let never = organizer
            .submit(SubmissionMode::Never, ok_task(3u8))
            .expect("submit");

        assert_eq!(organizer.submitted_count(), 3);
        crate::assert_with_log!(
            organizer.finished_count() == 1,
            "only immediate finished",
            1,
            organizer.finished_count()
        );
        assert_eq!(organizer.unfinished_count(), 2);

        assert_eq!(on_call.get().expect("lazy run"), 2);
        assert_eq!(organizer.finished_count(), 2);

        assert!(immediate.is_done());
        assert!(!never.is_done());
        crate::test_complete!("counters_track_each_mode");
    }

    #[test]
    fn never_submissions_stay_unfinished() {
        init_test("never_submissions_stay_unfinished");
        let organizer = TaskOrganizer::new();
        let never = organizer
            .submit(SubmissionMode::Never, ok_task(1u8))
            .expect("submit");

        never.run().expect("manual run still allowed");
        assert!(never.is_done());
        crate::assert_with_log!(
            organizer.unfinished_count() == 1,
            "never stays unfinished",
            1,
            organizer.unfinished_count()
        );
        crate::test_complete!("never_submissions_stay_unfinished");
    }

    #[test]
    fn terminate_flushes_deferred_tasks_once() {
        init_test("terminate_flushes_deferred_tasks_once");
        let organizer = TaskOrganizer::new();
        let counter = Arc::new(AtomicU64::new(0));
        let deferred = organizer
            .submit(SubmissionMode::OnTermination, counting_task(counter.clone()))
            .expect("submit");
        let failing = organizer
            .submit(SubmissionMode::OnTermination, failing_task::<u8>("boom"))
            .expect("submit");

        assert!(!organizer.is_terminated());
        assert_eq!(counter.load(Ordering::SeqCst), 0, "deferred until terminate");

        organizer.terminate().expect("first terminate");
        assert!(organizer.is_terminated());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(deferred.get().expect("flushed result"), 1);
        assert!(failing.failed(), "failure captured in the future");

        let err = organizer.terminate().expect_err("second terminate");
        assert!(err.is_illegal_state());
        crate::test_complete!("terminate_flushes_deferred_tasks_once");
    }

    #[test]
    fn submissions_after_terminate_are_rejected() {
        init_test("submissions_after_terminate_are_rejected");
        let organizer = TaskOrganizer::new();
        organizer.terminate().expect("terminate empty organizer");

        let err = organizer
            .submit(SubmissionMode::Immediate, ok_task(1u8))
            .expect_err("closed organizer");
        assert!(err.is_illegal_state());
        assert_eq!(organizer.submitted_count(), 0);
        crate::test_complete!("submissions_after_terminate_are_rejected");
    }

    #[test]
    fn cancel_unfinished_skips_terminal_futures() {
        init_test("cancel_unfinished_skips_terminal_futures");
        let organizer = TaskOrganizer::new();
        let counter = Arc::new(AtomicU64::new(0));

        organizer
            .submit(SubmissionMode::Immediate, ok_task(1u8))
            .expect("submit");
        let on_call = organizer
            .submit(SubmissionMode::OnCall, counting_task(counter.clone()))
            .expect("submit");
        let never = organizer
            .submit(SubmissionMode::Never, ok_task(2u8))
            .expect("submit");

        let cancelled = organizer.cancel_unfinished();
        crate::assert_with_log!(cancelled == 2, "pending futures cancelled", 2, cancelled);
        assert!(on_call.is_cancelled());
        assert!(never.is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 0, "cancelled before running");

        assert_eq!(organizer.cancel_unfinished(), 0, "idempotent on rerun");
        crate::test_complete!("cancel_unfinished_skips_terminal_futures");
    }
}
