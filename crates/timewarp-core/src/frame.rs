//! Override frames - immutable time-mocking directives
//!
//! A frame captures everything needed to answer "what time is it?" while it
//! is active: the directive kind, the real-clock readings at creation, the
//! virtual target, and the rate factor. All fields are fixed at creation,
//! so repeated queries against the same frame are pure functions of the
//! real-clock reading passed in.

use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::{TimeSpec, TimewarpError, TimewarpResult};

/// Kind of time-mocking directive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockType {
    /// Virtual time is pinned at the target
    Freeze,
    /// Virtual time advances at real rate from the target
    Travel,
    /// Virtual time advances at `factor` times real rate from the target
    Scale,
}

/// One active time-mocking directive
#[derive(Clone, Copy, Debug)]
pub struct OverrideFrame {
    /// Directive kind
    mock_type: MockType,
    /// Real wall-clock reading captured at creation
    anchor_wall: DateTime<Utc>,
    /// Real monotonic reading captured at creation
    anchor_monotonic: Instant,
    /// Virtual instant presented at the creation instant
    target: DateTime<Utc>,
    /// Rate of advance relative to real time (1.0 except for Scale)
    factor: f64,
}

impl OverrideFrame {
    /// Build a frame, resolving `spec` against the given real readings
    pub fn new(
        mock_type: MockType,
        spec: TimeSpec,
        factor: f64,
        wall_now: DateTime<Utc>,
        monotonic_now: Instant,
    ) -> TimewarpResult<Self> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(TimewarpError::InvalidArgument(format!(
                "scale factor must be finite and non-negative, got {factor}"
            )));
        }
        let target = spec.resolve(wall_now)?;
        Ok(OverrideFrame {
            mock_type,
            anchor_wall: wall_now,
            anchor_monotonic: monotonic_now,
            target,
            factor,
        })
    }

    /// Freeze directive: virtual time pinned at the resolved target
    pub fn freeze(
        spec: TimeSpec,
        wall_now: DateTime<Utc>,
        monotonic_now: Instant,
    ) -> TimewarpResult<Self> {
        Self::new(MockType::Freeze, spec, 1.0, wall_now, monotonic_now)
    }

    /// Travel directive: virtual time advances at real rate from the target
    pub fn travel(
        spec: TimeSpec,
        wall_now: DateTime<Utc>,
        monotonic_now: Instant,
    ) -> TimewarpResult<Self> {
        Self::new(MockType::Travel, spec, 1.0, wall_now, monotonic_now)
    }

    /// Scale directive: virtual time advances at `factor` times real rate
    pub fn scale(
        factor: f64,
        spec: TimeSpec,
        wall_now: DateTime<Utc>,
        monotonic_now: Instant,
    ) -> TimewarpResult<Self> {
        Self::new(MockType::Scale, spec, factor, wall_now, monotonic_now)
    }

    /// Directive kind
    #[inline]
    pub fn mock_type(&self) -> MockType {
        self.mock_type
    }

    /// Virtual instant presented at the creation instant
    #[inline]
    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    /// Rate factor (1.0 except for Scale)
    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Real wall reading captured at creation
    #[inline]
    pub fn anchor_wall(&self) -> DateTime<Utc> {
        self.anchor_wall
    }

    /// Real monotonic reading captured at creation
    #[inline]
    pub fn anchor_monotonic(&self) -> Instant {
        self.anchor_monotonic
    }

    /// Virtual wall-clock instant for a real wall reading
    pub fn wall_at(&self, real_now: DateTime<Utc>) -> DateTime<Utc> {
        match self.mock_type {
            MockType::Freeze => self.target,
            MockType::Travel => saturating_add(self.target, real_now - self.anchor_wall),
            MockType::Scale => {
                let elapsed = real_now - self.anchor_wall;
                saturating_add(self.target, scale_delta(elapsed, self.factor))
            }
        }
    }

    /// Virtual monotonic reading for a real monotonic reading
    ///
    /// Monotonic time cannot be set absolutely: Freeze pins the tick
    /// observed at creation, Travel shifts elapsed ticks by the wall
    /// offset, Scale additionally stretches them by the factor. Arithmetic
    /// saturates where the platform `Instant` cannot represent the result.
    pub fn monotonic_at(&self, real_now: Instant) -> Instant {
        match self.mock_type {
            MockType::Freeze => self.anchor_monotonic,
            MockType::Travel => shift_instant(real_now, self.wall_offset()),
            MockType::Scale => {
                let elapsed = real_now.saturating_duration_since(self.anchor_monotonic);
                let scaled = Duration::try_from_secs_f64(elapsed.as_secs_f64() * self.factor)
                    .unwrap_or(elapsed);
                let advanced = self.anchor_monotonic.checked_add(scaled).unwrap_or(real_now);
                shift_instant(advanced, self.wall_offset())
            }
        }
    }

    /// Wall offset applied to monotonic readings (target - anchor)
    #[inline]
    fn wall_offset(&self) -> ChronoDuration {
        self.target - self.anchor_wall
    }
}

/// Add a signed delta to an instant, saturating at the representable range
fn saturating_add(base: DateTime<Utc>, delta: ChronoDuration) -> DateTime<Utc> {
    base.checked_add_signed(delta).unwrap_or(if delta < ChronoDuration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Multiply a signed delta by a non-negative factor, saturating at i64 micros
fn scale_delta(delta: ChronoDuration, factor: f64) -> ChronoDuration {
    let micros = delta.num_microseconds().unwrap_or_else(|| {
        if delta < ChronoDuration::zero() {
            i64::MIN
        } else {
            i64::MAX
        }
    });
    ChronoDuration::microseconds((micros as f64 * factor) as i64)
}

/// Shift a monotonic reading by a signed wall offset, saturating where the
/// platform `Instant` cannot represent the result
fn shift_instant(base: Instant, offset: ChronoDuration) -> Instant {
    if offset >= ChronoDuration::zero() {
        let forward = offset.to_std().unwrap_or(Duration::MAX);
        base.checked_add(forward).unwrap_or(base)
    } else {
        let backward = (-offset).to_std().unwrap_or(Duration::MAX);
        base.checked_sub(backward).unwrap_or(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn target() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_freeze_constant_under_elapsed_time() {
        let mono = Instant::now();
        let frame = OverrideFrame::freeze(TimeSpec::Instant(target()), anchor(), mono).unwrap();

        assert_eq!(frame.wall_at(anchor()), target());
        assert_eq!(frame.wall_at(anchor() + ChronoDuration::hours(5)), target());
        assert_eq!(frame.wall_at(anchor() + ChronoDuration::days(400)), target());
    }

    #[test]
    fn test_travel_offsets_real_time() {
        let mono = Instant::now();
        let frame = OverrideFrame::travel(TimeSpec::Instant(target()), anchor(), mono).unwrap();

        assert_eq!(frame.wall_at(anchor()), target());
        assert_eq!(
            frame.wall_at(anchor() + ChronoDuration::seconds(42)),
            target() + ChronoDuration::seconds(42)
        );
    }

    #[test]
    fn test_scale_stretches_elapsed_time() {
        let mono = Instant::now();
        let frame =
            OverrideFrame::scale(4.0, TimeSpec::Instant(target()), anchor(), mono).unwrap();

        assert_eq!(frame.wall_at(anchor()), target());
        assert_eq!(
            frame.wall_at(anchor() + ChronoDuration::seconds(10)),
            target() + ChronoDuration::seconds(40)
        );
    }

    #[test]
    fn test_scale_with_explicit_target_anchors_at_creation() {
        // The elapsed-time reference is the real clock at creation, even
        // when the target is an explicit instant far from the anchor.
        let mono = Instant::now();
        let frame =
            OverrideFrame::scale(2.0, TimeSpec::Instant(target()), anchor(), mono).unwrap();

        assert_eq!(frame.anchor_wall(), anchor());
        assert_eq!(
            frame.wall_at(anchor() + ChronoDuration::minutes(1)),
            target() + ChronoDuration::minutes(2)
        );
    }

    #[test]
    fn test_scale_default_spec_uses_anchor_as_target() {
        let mono = Instant::now();
        let frame = OverrideFrame::scale(0.5, TimeSpec::Now, anchor(), mono).unwrap();

        assert_eq!(frame.target(), anchor());
        assert_eq!(
            frame.wall_at(anchor() + ChronoDuration::seconds(60)),
            anchor() + ChronoDuration::seconds(30)
        );
    }

    #[test]
    fn test_negative_factor_rejected() {
        let mono = Instant::now();
        assert!(matches!(
            OverrideFrame::scale(-1.0, TimeSpec::Now, anchor(), mono),
            Err(TimewarpError::InvalidArgument(_))
        ));
        assert!(matches!(
            OverrideFrame::scale(f64::NAN, TimeSpec::Now, anchor(), mono),
            Err(TimewarpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_monotonic_freeze_pins_creation_tick() {
        let mono = Instant::now();
        let frame = OverrideFrame::freeze(TimeSpec::Instant(target()), anchor(), mono).unwrap();

        let later = mono + Duration::from_secs(30);
        assert_eq!(frame.monotonic_at(later), mono);
    }

    #[test]
    fn test_monotonic_travel_applies_wall_offset() {
        let mono = Instant::now();
        let ahead = anchor() + ChronoDuration::seconds(100);
        let frame = OverrideFrame::travel(TimeSpec::Instant(ahead), anchor(), mono).unwrap();

        let later = mono + Duration::from_secs(5);
        assert_eq!(frame.monotonic_at(later), later + Duration::from_secs(100));
    }

    #[test]
    fn test_monotonic_scale_stretches_ticks() {
        let mono = Instant::now();
        let frame = OverrideFrame::scale(3.0, TimeSpec::Now, anchor(), mono).unwrap();

        let later = mono + Duration::from_secs(10);
        assert_eq!(frame.monotonic_at(later), mono + Duration::from_secs(30));
    }

    #[test]
    fn test_wall_saturates_at_range_limits() {
        let mono = Instant::now();
        let frame =
            OverrideFrame::travel(TimeSpec::Instant(DateTime::<Utc>::MAX_UTC), anchor(), mono)
                .unwrap();

        // Advancing past the representable range clamps instead of panicking.
        let v = frame.wall_at(anchor() + ChronoDuration::days(1));
        assert_eq!(v, DateTime::<Utc>::MAX_UTC);
    }
}

#[cfg(test)]
mod computation_laws {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    proptest! {
        #[test]
        fn travel_is_exact_offset(delta_ms in -86_400_000i64..86_400_000i64) {
            let mono = Instant::now();
            let target = Utc.with_ymd_and_hms(1990, 5, 4, 3, 2, 1).unwrap();
            let frame =
                OverrideFrame::travel(TimeSpec::Instant(target), anchor(), mono).unwrap();

            let delta = ChronoDuration::milliseconds(delta_ms);
            prop_assert_eq!(frame.wall_at(anchor() + delta), target + delta);
        }

        #[test]
        fn freeze_ignores_elapsed_time(delta_ms in -86_400_000i64..86_400_000i64) {
            let mono = Instant::now();
            let target = Utc.with_ymd_and_hms(1990, 5, 4, 3, 2, 1).unwrap();
            let frame =
                OverrideFrame::freeze(TimeSpec::Instant(target), anchor(), mono).unwrap();

            let delta = ChronoDuration::milliseconds(delta_ms);
            prop_assert_eq!(frame.wall_at(anchor() + delta), target);
        }

        #[test]
        fn unit_scale_equals_travel(delta_ms in -86_400_000i64..86_400_000i64) {
            let mono = Instant::now();
            let target = Utc.with_ymd_and_hms(1990, 5, 4, 3, 2, 1).unwrap();
            let scaled =
                OverrideFrame::scale(1.0, TimeSpec::Instant(target), anchor(), mono).unwrap();
            let travel =
                OverrideFrame::travel(TimeSpec::Instant(target), anchor(), mono).unwrap();

            let real = anchor() + ChronoDuration::milliseconds(delta_ms);
            prop_assert_eq!(scaled.wall_at(real), travel.wall_at(real));
        }

        #[test]
        fn zero_scale_equals_freeze(delta_ms in -86_400_000i64..86_400_000i64) {
            let mono = Instant::now();
            let target = Utc.with_ymd_and_hms(1990, 5, 4, 3, 2, 1).unwrap();
            let scaled =
                OverrideFrame::scale(0.0, TimeSpec::Instant(target), anchor(), mono).unwrap();

            let real = anchor() + ChronoDuration::milliseconds(delta_ms);
            prop_assert_eq!(scaled.wall_at(real), target);
        }
    }
}
