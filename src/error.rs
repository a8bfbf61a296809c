//! Error types for the sequent crate.
//!
//! One error enum covers the whole surface; every variant corresponds to a
//! distinct failure family:
//!
//! - [`Error::InvalidArgument`]: construction-time validation, raised
//!   synchronously and never deferred
//! - [`Error::Cancelled`]: `run()` or `get()` on a cancelled future
//! - [`Error::Execution`]: `get()` on a future whose task failed; the task
//!   failure itself is captured into future state and never propagates out
//!   of `run()`
//! - [`Error::Timeout`]: a simulated-time budget ran out
//! - [`Error::IllegalState`]: API misuse, such as unregistering a listener
//!   from inside its own callback
//! - [`Error::Interrupted`]: a cooperative interrupt was observed before
//!   simulated waiting

use crate::time::Elapsed;
use std::sync::Arc;

/// A failure produced by a task's own code.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all fallible operations in this crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A constructor argument failed validation.
    #[error("invalid {what}: must be strictly positive, got {value}")]
    InvalidArgument {
        /// Which argument was rejected.
        what: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// The future was cancelled.
    #[error("future was cancelled")]
    Cancelled,

    /// The task failed; the captured failure is shared so that repeated
    /// `get()` calls observe the same underlying error.
    #[error("task failed: {0}")]
    Execution(Arc<TaskError>),

    /// A simulated-time budget was exhausted.
    #[error(transparent)]
    Timeout(#[from] Elapsed),

    /// The API was used outside its contract.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// A cooperative interrupt was observed before simulated waiting.
    #[error("interrupted before simulated wait")]
    Interrupted,
}

impl Error {
    /// Returns true for [`Error::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true for [`Error::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns true for [`Error::Execution`].
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true for [`Error::IllegalState`].
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }

    /// Returns the wrapped task failure, if this is an execution error.
    #[must_use]
    pub fn task_error(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        match self {
            Self::Execution(err) => Some(&***err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Time;

    #[test]
    fn display_messages_name_the_failure() {
        let err = Error::InvalidArgument {
            what: "period",
            value: -3,
        };
        assert!(err.to_string().contains("period"));
        assert!(err.to_string().contains("-3"));

        let err = Error::Timeout(Elapsed::new(Time::from_nanos(10)));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn execution_exposes_the_task_failure() {
        let inner: TaskError = "boom".into();
        let err = Error::Execution(Arc::new(inner));
        assert!(err.is_execution());
        assert_eq!(
            err.task_error().map(ToString::to_string).as_deref(),
            Some("boom")
        );
    }
}
