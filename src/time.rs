//! Virtual time primitives.
//!
//! Simulated time is carried as unsigned nanoseconds in [`Time`]. Public
//! entry points that accept `(amount, unit)` pairs normalize through
//! [`TimeUnit`] before any arithmetic happens, so the rest of the crate
//! only ever deals in nanoseconds. Remaining-delay arithmetic is signed
//! (`i64` nanoseconds) at the call sites because a large advance may
//! overshoot a deadline.

use core::fmt;

/// An instant or span of virtual time, in nanoseconds.
///
/// Virtual time starts at [`Time::ZERO`] and only moves forward when a
/// controller is explicitly advanced; there is no wall-clock component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The zero instant.
    pub const ZERO: Self = Self(0);

    /// The maximum representable instant.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a time from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from microseconds.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// Creates a time from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the time as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as milliseconds (truncated).
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns the time as seconds (truncated).
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Returns the smaller of two times.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Returns true if this is the zero instant.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Units accepted at the public `(amount, unit)` boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Nanoseconds.
    Nanos,
    /// Microseconds.
    Micros,
    /// Milliseconds.
    Millis,
    /// Seconds.
    Secs,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
}

impl TimeUnit {
    /// Nanoseconds per one unit.
    #[must_use]
    pub const fn nanos_per(self) -> i64 {
        match self {
            Self::Nanos => 1,
            Self::Micros => 1_000,
            Self::Millis => 1_000_000,
            Self::Secs => 1_000_000_000,
            Self::Minutes => 60_000_000_000,
            Self::Hours => 3_600_000_000_000,
        }
    }

    /// Converts an amount of this unit to nanoseconds, saturating on
    /// overflow.
    #[must_use]
    pub const fn to_nanos(self, amount: i64) -> i64 {
        amount.saturating_mul(self.nanos_per())
    }

    /// Converts nanoseconds to this unit, truncating toward zero.
    #[must_use]
    pub const fn from_nanos(self, nanos: i64) -> i64 {
        nanos / self.nanos_per()
    }

    /// Converts an unsigned amount of this unit to a [`Time`], saturating
    /// on overflow.
    #[must_use]
    pub const fn to_time(self, amount: u64) -> Time {
        Time::from_nanos(amount.saturating_mul(self.nanos_per() as u64))
    }

    /// Converts a signed amount of this unit to a [`Time`], clamping
    /// negative amounts to zero.
    #[must_use]
    pub const fn to_time_clamped(self, amount: i64) -> Time {
        if amount <= 0 {
            Time::ZERO
        } else {
            self.to_time(amount as u64)
        }
    }
}

/// Error payload carried when a simulated-time budget runs out.
///
/// Returned inside [`Error::Timeout`](crate::Error::Timeout) by
/// `get_timeout` and the bounded `block_until` form once the requested
/// amount of virtual time has been spent without the awaited condition
/// becoming true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    budget: Time,
}

impl Elapsed {
    /// Creates a new `Elapsed` for the given exhausted budget.
    #[must_use]
    pub const fn new(budget: Time) -> Self {
        Self { budget }
    }

    /// Returns the simulated-time budget that was exhausted.
    #[must_use]
    pub const fn budget(&self) -> Time {
        self.budget
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulated time budget of {} exhausted", self.budget)
    }
}

impl std::error::Error for Elapsed {}
