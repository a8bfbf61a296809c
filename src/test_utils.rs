//! Test utilities for Sequent.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Canned task constructors for future and scheduling tests
//!
//! # Example
//! ```
//! use sequent::test_utils::{init_test_logging, ok_task};
//! use sequent::SequentialFuture;
//!
//! init_test_logging();
//! let future = SequentialFuture::immediate(ok_task(42u32));
//! assert_eq!(future.get().expect("immediate result"), 42);
//! ```

use crate::error::TaskError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// A task that always succeeds with a clone of `value`.
pub fn ok_task<T: Clone + Send>(value: T) -> impl FnMut() -> Result<T, TaskError> + Send {
    move || Ok(value.clone())
}

/// A task that always fails with `message`.
pub fn failing_task<T>(message: &'static str) -> impl FnMut() -> Result<T, TaskError> + Send {
    move || Err(TaskError::from(message))
}

/// A task that increments `counter` and succeeds with the new count.
pub fn counting_task(counter: Arc<AtomicU64>) -> impl FnMut() -> Result<u64, TaskError> + Send {
    move || Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
}

/// A task that counts invocations in `calls` and fails on the `n`th call
/// (1-based), succeeding with the count on every other call.
pub fn fail_on_nth_task(
    calls: Arc<AtomicU64>,
    n: u64,
) -> impl FnMut() -> Result<u64, TaskError> + Send {
    move || {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == n {
            Err(TaskError::from(format!("task failed on call {call}")))
        } else {
            Ok(call)
        }
    }
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
