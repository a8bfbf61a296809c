//! Sequent: deterministic sequential futures driven by a virtual clock.
//!
//! # Overview
//!
//! Sequent replaces real executors in tests with futures that run on the
//! caller's thread at well-defined moments. Every future wraps exactly one
//! task; a policy decides when the task runs (at construction, on first
//! retrieval, or never), and time-based futures hang off a
//! [`TimeController`] that only moves when a test advances it.
//!
//! # Core Guarantees
//!
//! - **Single execution**: A future's task runs at most once; terminal
//!   states (cancelled, complete, failed) are permanent
//! - **Deterministic time**: The virtual clock moves only through explicit
//!   `advance` calls; `get` "waits" by simulating time, never by blocking
//! - **Phase-accurate periodics**: Overshooting advances fold into the next
//!   period, so firing counts match `floor(Δ/P)` exactly
//! - **Loud misuse**: Reentrant controller mutation, retrieval from a
//!   never-run future, and unsatisfiable waits fail with typed errors
//!   instead of hanging
//!
//! # Module Structure
//!
//! - [`time`]: Virtual time, unit conversions, budget exhaustion payload
//! - [`error`]: Error types
//! - [`task`]: The task trait futures execute
//! - [`future`]: Future state machine and execution policies
//! - [`listener`]: The time-listener capability
//! - [`controller`]: Virtual clock with registration and blocking waits
//! - [`scheduled`]: Delayed, periodic and delayed-periodic futures
//! - [`organizer`]: Submission bookkeeping over the future constructors

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod controller;
pub mod error;
pub mod future;
pub mod listener;
pub mod organizer;
pub mod scheduled;
pub mod task;
pub mod test_utils;
pub mod time;

// Re-exports for convenient access to core types
pub use controller::{ControllerConfig, InterruptToken, TimeController};
pub use error::{Error, Result, TaskError};
pub use future::SequentialFuture;
pub use listener::TimeListener;
pub use organizer::{SubmissionMode, TaskOrganizer};
pub use scheduled::ScheduledFuture;
pub use task::{BoxTask, Task};
pub use time::{Elapsed, Time, TimeUnit};
