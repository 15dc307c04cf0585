//! Virtual time for the deterministic simulation.
//!
//! Represents a logical timestamp with nanosecond resolution and no
//! dependency on `std::time`. Time advances only when the scheduler
//! processes events — never from wall-clock observation.
//!
//! `SimTime` doubles as a duration (the time elapsed since the zero
//! point), so intervals and absolute instants share one type and one
//! set of arithmetic operators.

/// A point in (or span of) simulation time, in nanoseconds.
///
/// The `Default` value is [`SimTime::ZERO`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(u64);

impl SimTime {
    /// The zero-point of simulation time.
    pub const ZERO: SimTime = SimTime(0);

    const NANOS_PER_SEC: u64 = 1_000_000_000;

    /// Create a `SimTime` from raw nanoseconds.
    #[inline]
    pub fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    /// Create a `SimTime` from microseconds.
    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        SimTime(micros * 1_000)
    }

    /// Create a `SimTime` from milliseconds.
    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1_000_000)
    }

    /// Create a `SimTime` from whole seconds.
    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        SimTime(secs * Self::NANOS_PER_SEC)
    }

    /// Create a `SimTime` from fractional seconds, rounding to the
    /// nearest nanosecond.
    ///
    /// # Panics
    /// Panics if `secs` is negative or not finite.
    pub fn from_secs_f64(secs: f64) -> Self {
        assert!(
            secs.is_finite() && secs >= 0.0,
            "SimTime::from_secs_f64: invalid duration {secs}"
        );
        SimTime((secs * Self::NANOS_PER_SEC as f64).round() as u64)
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub fn nanos(self) -> u64 {
        self.0
    }

    /// Return the value as fractional seconds.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / Self::NANOS_PER_SEC as f64
    }

    /// Advance by `delta`. Returns `None` on overflow.
    #[inline]
    pub fn advance(self, delta: SimTime) -> Option<SimTime> {
        self.0.checked_add(delta.0).map(SimTime)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: SimTime) -> bool {
        self.0 < other.0
    }

    /// Returns the span between two points in time.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: SimTime) -> Option<SimTime> {
        self.0.checked_sub(earlier.0).map(SimTime)
    }
}

impl std::ops::Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        self.advance(rhs).expect("SimTime overflow")
    }
}

impl std::ops::Mul<u64> for SimTime {
    type Output = SimTime;

    fn mul(self, rhs: u64) -> SimTime {
        SimTime(self.0.checked_mul(rhs).expect("SimTime overflow"))
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={:.9}s", self.as_secs_f64())
    }
}
