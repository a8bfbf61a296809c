//! The task abstraction: a nullary operation that produces a result or
//! fails.
//!
//! A task is owned by exactly one future core. It is `FnMut`-shaped rather
//! than `FnOnce`-shaped because a periodic future re-invokes the same task
//! on every firing.

use crate::error::TaskError;

/// A nullary operation producing a `T` or failing with a [`TaskError`].
///
/// Implemented for any `FnMut() -> Result<T, TaskError> + Send` closure,
/// which is the normal way to construct one:
///
/// ```
/// use sequent::{SequentialFuture, TaskError};
///
/// let future = SequentialFuture::immediate(|| Ok::<_, TaskError>(21 * 2));
/// assert_eq!(future.get().expect("task succeeded"), 42);
/// ```
pub trait Task<T>: Send {
    /// Executes the task once.
    ///
    /// A failure returned here is captured into the owning future's state;
    /// it never propagates out of the future's `run()`.
    fn call(&mut self) -> std::result::Result<T, TaskError>;
}

impl<T, F> Task<T> for F
where
    F: FnMut() -> std::result::Result<T, TaskError> + Send,
{
    fn call(&mut self) -> std::result::Result<T, TaskError> {
        self()
    }
}

/// A boxed task, as stored inside a future core.
pub type BoxTask<T> = Box<dyn Task<T>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_tasks_and_may_run_repeatedly() {
        let mut calls = 0u32;
        let mut task = || {
            calls += 1;
            Ok::<_, TaskError>(calls)
        };
        assert_eq!(task.call().expect("first call"), 1);
        assert_eq!(task.call().expect("second call"), 2);
    }

    #[test]
    fn failures_surface_as_task_errors() {
        let mut task = || Err::<u32, TaskError>("no luck".into());
        let err = task.call().expect_err("task fails");
        assert_eq!(err.to_string(), "no luck");
    }
}
