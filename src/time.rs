//! Timestamp representation used by stream log files.
//!
//! This module provides the `Time` value stamped on every sample. A time is
//! a signed count of microseconds since the Unix epoch; on disk it is always
//! decomposed into whole seconds and the remaining microseconds.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::{SystemTime, UNIX_EPOCH};

const USEC_PER_SEC: i64 = 1_000_000;

/// A point in time (or a duration) with microsecond resolution.
///
/// `Time` plays two roles, like the timestamps of most robotics frameworks:
/// an absolute instant (`Time::now()`, sample stamps) and a span between two
/// instants (sampling periods, the result of `a - b`).
///
/// # Examples
///
/// ```
/// # use stream_logfile::Time;
/// let t = Time::from_seconds_micros(100, 250);
/// assert_eq!(t.to_timeval(), (100, 250));
///
/// let period = Time::from_microseconds(1_000_000);
/// assert!(t + period > t);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    microseconds: i64,
}

impl Time {
    /// Creates a time from a raw microsecond count.
    pub const fn from_microseconds(microseconds: i64) -> Self {
        Self { microseconds }
    }

    /// Creates a time from a seconds/microseconds pair.
    ///
    /// `usec` may exceed one second; it is simply added to `sec`. Results
    /// outside the `i64` microsecond range saturate.
    pub const fn from_seconds_micros(sec: i64, usec: i64) -> Self {
        Self {
            microseconds: sec.saturating_mul(USEC_PER_SEC).saturating_add(usec),
        }
    }

    /// Returns the current wall-clock time.
    ///
    /// A system clock set before the Unix epoch yields the null time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Self::from_microseconds(micros)
    }

    /// Raw microsecond count.
    pub const fn to_microseconds(&self) -> i64 {
        self.microseconds
    }

    /// True for the zero time, used as "no period" by the sampling filter.
    pub const fn is_null(&self) -> bool {
        self.microseconds == 0
    }

    /// Splits the time into the on-disk `(seconds, microseconds)` pair.
    ///
    /// The microsecond part is always in `0..1_000_000`. Both values are
    /// truncated to 32 bits, which is what the file format stores.
    pub fn to_timeval(&self) -> (u32, u32) {
        let sec = self.microseconds.div_euclid(USEC_PER_SEC);
        let usec = self.microseconds.rem_euclid(USEC_PER_SEC);
        (sec as u32, usec as u32)
    }
}

// Saturating: a sampling reference near the ends of the range must not
// panic the logger.
impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        Time::from_microseconds(self.microseconds.saturating_add(rhs.microseconds))
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        Time::from_microseconds(self.microseconds.saturating_sub(rhs.microseconds))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sec = self.microseconds.div_euclid(USEC_PER_SEC);
        let usec = self.microseconds.rem_euclid(USEC_PER_SEC);
        write!(f, "{}.{:06}", sec, usec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeval_split() {
        let t = Time::from_microseconds(1_200_000);
        assert_eq!(t.to_timeval(), (1, 200_000));
        assert_eq!(Time::from_seconds_micros(3, 1_500_000).to_timeval(), (4, 500_000));
    }

    #[test]
    fn test_arithmetic_and_ordering() {
        let a = Time::from_microseconds(500_000);
        let b = Time::from_microseconds(1_200_000);
        assert_eq!(b - a, Time::from_microseconds(700_000));
        assert_eq!(a + a, Time::from_seconds_micros(1, 0));
        assert!(a < b);
        assert!(Time::default().is_null());
    }

    #[test]
    fn test_arithmetic_saturates_at_range_ends() {
        let min = Time::from_microseconds(i64::MIN);
        let max = Time::from_microseconds(i64::MAX);
        let one = Time::from_microseconds(1);

        assert_eq!(min - one, min);
        assert_eq!(max + one, max);
        assert_eq!(max - min, max);
        assert_eq!(Time::from_seconds_micros(i64::MAX, 1), max);
        assert_eq!(Time::from_seconds_micros(i64::MIN / 2, -1), min);
    }

    #[test]
    fn test_display() {
        assert_eq!(Time::from_seconds_micros(100, 42).to_string(), "100.000042");
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(Time::now() > Time::from_seconds_micros(1_000_000_000, 0));
    }
}
