//! The time-listener capability.
//!
//! Anything that can be told "Δ time has passed" and may ask to be
//! deregistered can register with a [`TimeController`](crate::TimeController).
//! Membership in a controller is the only relationship; the controller does
//! not own the listener's lifetime.

use crate::time::Time;

/// A participant in simulated time.
///
/// The controller normalizes every `(amount, unit)` pair to nanoseconds
/// before fan-out, so callbacks always receive a plain [`Time`] delta.
pub trait TimeListener: Send + Sync {
    /// Callback invoked when simulated time passed.
    ///
    /// Returns true to request deregistration from the calling controller.
    /// That return value is the *only* correct way to deregister from
    /// inside the callback: calling
    /// [`unregister`](crate::TimeController::unregister) reentrantly during
    /// the broadcast is a usage error the controller rejects.
    fn time_passed(&self, delta: Time) -> bool;

    /// Optional progress hint: how much further time must pass before this
    /// listener would do something.
    ///
    /// `block_until` uses the minimum hint across registered listeners to
    /// step straight to the next interesting instant instead of crawling
    /// by its fallback granularity. Returning `None` (the default) opts
    /// out.
    fn next_ready_in(&self) -> Option<Time> {
        None
    }
}
