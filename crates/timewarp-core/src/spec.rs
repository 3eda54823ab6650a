//! Time specifications - how callers describe a target instant
//!
//! Every freeze/travel/scale call accepts one of four argument shapes:
//! an absolute instant, a calendar date (midnight of that day), an offset
//! in seconds from the real current instant, or nothing (the real current
//! instant itself). Resolution is pure: it depends only on the spec and
//! the real-clock reading passed in.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};

use crate::{TimewarpError, TimewarpResult};

/// A caller-supplied description of a target instant
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeSpec {
    /// The real current instant
    Now,
    /// An absolute instant, used directly as the target
    Instant(DateTime<Utc>),
    /// Midnight (00:00:00 UTC) of a calendar date
    Date(NaiveDate),
    /// Offset in seconds relative to the real current instant
    Offset(f64),
}

impl TimeSpec {
    /// Resolve this spec to a concrete instant, given the real current time
    pub fn resolve(self, real_now: DateTime<Utc>) -> TimewarpResult<DateTime<Utc>> {
        match self {
            TimeSpec::Now => Ok(real_now),
            TimeSpec::Instant(t) => Ok(t),
            TimeSpec::Date(d) => {
                let midnight = d.and_hms_opt(0, 0, 0).ok_or_else(|| {
                    TimewarpError::InvalidArgument(format!("date {d} has no midnight"))
                })?;
                Ok(midnight.and_utc())
            }
            TimeSpec::Offset(secs) => {
                if !secs.is_finite() {
                    return Err(TimewarpError::InvalidArgument(format!(
                        "offset must be finite, got {secs}"
                    )));
                }
                let micros = (secs * 1_000_000.0) as i64;
                real_now
                    .checked_add_signed(ChronoDuration::microseconds(micros))
                    .ok_or_else(|| {
                        TimewarpError::InvalidArgument(format!("offset {secs}s out of range"))
                    })
            }
        }
    }
}

impl Default for TimeSpec {
    fn default() -> Self {
        TimeSpec::Now
    }
}

impl From<DateTime<Utc>> for TimeSpec {
    fn from(t: DateTime<Utc>) -> Self {
        TimeSpec::Instant(t)
    }
}

impl From<NaiveDate> for TimeSpec {
    fn from(d: NaiveDate) -> Self {
        TimeSpec::Date(d)
    }
}

impl From<f64> for TimeSpec {
    fn from(secs: f64) -> Self {
        TimeSpec::Offset(secs)
    }
}

impl From<i64> for TimeSpec {
    fn from(secs: i64) -> Self {
        TimeSpec::Offset(secs as f64)
    }
}

impl From<std::time::Duration> for TimeSpec {
    fn from(d: std::time::Duration) -> Self {
        TimeSpec::Offset(d.as_secs_f64())
    }
}

impl From<ChronoDuration> for TimeSpec {
    fn from(d: ChronoDuration) -> Self {
        let micros = d.num_microseconds().unwrap_or_else(|| {
            if d < ChronoDuration::zero() {
                i64::MIN
            } else {
                i64::MAX
            }
        });
        TimeSpec::Offset(micros as f64 / 1_000_000.0)
    }
}
