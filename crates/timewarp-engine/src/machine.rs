//! Time machine - scoped and permanent virtual-time overrides
//!
//! The machine owns the real-clock source, the configuration toggles, and
//! the context registry. Scoped overrides are restored through a drop
//! guard, so the pre-scope stack comes back on every exit path - normal
//! return, early return, or unwind - before the failure reaches the
//! caller.

use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use timewarp_core::{
    MockType, OverrideFrame, RealClock, SystemClock, TimeSpec, TimewarpError, TimewarpResult,
};

use crate::{ContextRegistry, ContextState, ThreadAffinity};

/// Time machine configuration
#[derive(Clone, Copy, Debug, Default)]
pub struct MachineConfig {
    /// Reject permanent overrides issued outside any active scope
    pub safe_mode: bool,
    /// Storage affinity for context state
    pub thread_affinity: ThreadAffinity,
}

/// Virtual time controller
pub struct TimeMachine {
    /// Real-clock source
    clock: Box<dyn RealClock>,
    /// Configuration toggles
    config: Mutex<MachineConfig>,
    /// Context state storage
    registry: ContextRegistry,
}

/// Process-wide default machine
///
/// Interception layers that reroute the host environment's time queries
/// are expected to read from this instance.
pub fn global() -> &'static TimeMachine {
    static GLOBAL: OnceLock<TimeMachine> = OnceLock::new();
    GLOBAL.get_or_init(TimeMachine::new)
}

impl TimeMachine {
    /// Create a machine backed by the system clocks
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a machine backed by a caller-supplied clock source
    pub fn with_clock(clock: impl RealClock + 'static) -> Self {
        TimeMachine {
            clock: Box::new(clock),
            config: Mutex::new(MachineConfig::default()),
            registry: ContextRegistry::new(),
        }
    }

    // --- queries ---

    /// Current virtual wall-clock instant
    ///
    /// The active frame's computation applied to the real reading, or the
    /// real reading itself when no override is active.
    pub fn now(&self) -> DateTime<Utc> {
        let real = self.clock.wall_now();
        self.with_state(|state| state.top().map(|f| f.wall_at(real)))
            .unwrap_or(real)
    }

    /// Current virtual monotonic reading
    pub fn monotonic_now(&self) -> Instant {
        let real = self.clock.monotonic_now();
        self.with_state(|state| state.top().map(|f| f.monotonic_at(real)))
            .unwrap_or(real)
    }

    /// True iff the active frame is a Freeze
    pub fn is_frozen(&self) -> bool {
        self.top_kind() == Some(MockType::Freeze)
    }

    /// True iff the active frame is a Travel
    pub fn is_travelling(&self) -> bool {
        self.top_kind() == Some(MockType::Travel)
    }

    /// True iff the active frame is a Scale
    pub fn is_scaled(&self) -> bool {
        self.top_kind() == Some(MockType::Scale)
    }

    // --- overrides ---

    /// Permanently freeze virtual time at the resolved target
    ///
    /// The frame persists until `unmock`/`return_to_baseline`. Returns the
    /// initial virtual time. Rejected under safe mode outside a scope.
    pub fn freeze(&self, spec: impl Into<TimeSpec>) -> TimewarpResult<DateTime<Utc>> {
        self.apply_permanent(MockType::Freeze, spec.into(), 1.0)
    }

    /// Freeze virtual time for the duration of `body`
    ///
    /// `body` receives the initial virtual time; its result is returned.
    /// The prior stack is restored on every exit path.
    pub fn freeze_scoped<R>(
        &self,
        spec: impl Into<TimeSpec>,
        body: impl FnOnce(DateTime<Utc>) -> R,
    ) -> TimewarpResult<R> {
        self.apply_scoped(MockType::Freeze, spec.into(), 1.0, body)
    }

    /// Permanently shift virtual time to the resolved target
    pub fn travel(&self, spec: impl Into<TimeSpec>) -> TimewarpResult<DateTime<Utc>> {
        self.apply_permanent(MockType::Travel, spec.into(), 1.0)
    }

    /// Shift virtual time for the duration of `body`
    pub fn travel_scoped<R>(
        &self,
        spec: impl Into<TimeSpec>,
        body: impl FnOnce(DateTime<Utc>) -> R,
    ) -> TimewarpResult<R> {
        self.apply_scoped(MockType::Travel, spec.into(), 1.0, body)
    }

    /// Permanently run virtual time at `factor` times real rate
    pub fn scale(&self, factor: f64, spec: impl Into<TimeSpec>) -> TimewarpResult<DateTime<Utc>> {
        self.apply_permanent(MockType::Scale, spec.into(), factor)
    }

    /// Run virtual time at `factor` times real rate for the duration of `body`
    pub fn scale_scoped<R>(
        &self,
        factor: f64,
        spec: impl Into<TimeSpec>,
        body: impl FnOnce(DateTime<Utc>) -> R,
    ) -> TimewarpResult<R> {
        self.apply_scoped(MockType::Scale, spec.into(), factor, body)
    }

    /// Permanent, unconditional revert to real time
    ///
    /// Clears the stack and the baseline.
    pub fn unmock(&self) {
        self.with_state(|state| {
            state.clear_stack();
            state.set_baseline(None);
        });
        debug!("all overrides cleared");
    }

    /// Expose real time for the duration of `body`
    ///
    /// Stack and baseline are both snapshotted, cleared, and restored on
    /// every exit path.
    pub fn return_temporarily<R>(&self, body: impl FnOnce() -> R) -> R {
        let (stack, baseline) = self.with_state(|state| {
            let stack = state.stack_snapshot();
            let baseline = state.baseline().copied();
            state.clear_stack();
            state.set_baseline(None);
            state.enter_scope();
            (stack, baseline)
        });
        let _restore = RestoreGuard {
            machine: self,
            stack: Some(stack),
            baseline: Some(baseline),
        };
        body()
    }

    // --- baseline ---

    /// Set the baseline to a Travel frame at the resolved target
    ///
    /// Returns the baseline's initial virtual time.
    pub fn set_baseline(&self, spec: impl Into<TimeSpec>) -> TimewarpResult<DateTime<Utc>> {
        let frame = self.build_frame(MockType::Travel, spec.into(), 1.0)?;
        self.with_state(|state| state.set_baseline(Some(frame)));
        Ok(frame.target())
    }

    /// The baseline frame, if one is set
    pub fn baseline(&self) -> Option<OverrideFrame> {
        self.with_state(|state| state.baseline().copied())
    }

    /// Unset the baseline; the stack is untouched
    pub fn clear_baseline(&self) {
        self.with_state(|state| state.set_baseline(None));
    }

    /// Collapse the stack onto the baseline and return the virtual time
    ///
    /// Overrides layered above the baseline are discarded. With no
    /// baseline set this is identical to `unmock` and returns real time.
    pub fn return_to_baseline(&self) -> DateTime<Utc> {
        let collapsed = self.with_state(|state| match state.baseline().copied() {
            Some(frame) => {
                state.collapse_to(frame);
                Some(frame)
            }
            None => {
                state.clear_stack();
                state.set_baseline(None);
                None
            }
        });
        match collapsed {
            Some(frame) => {
                debug!(baseline = %frame.target(), "stack collapsed to baseline");
                frame.wall_at(self.clock.wall_now())
            }
            None => self.clock.wall_now(),
        }
    }

    // --- configuration ---

    /// Whether permanent overrides outside a scope are rejected
    pub fn safe_mode(&self) -> bool {
        self.config.lock().safe_mode
    }

    pub fn set_safe_mode(&self, enabled: bool) {
        self.config.lock().safe_mode = enabled;
    }

    /// Current context storage affinity
    pub fn thread_affinity(&self) -> ThreadAffinity {
        self.config.lock().thread_affinity
    }

    /// Switch context storage affinity
    ///
    /// An actual switch discards all held stack/baseline state; setting
    /// the current affinity again is a no-op.
    pub fn set_thread_affinity(&self, affinity: ThreadAffinity) {
        {
            let mut config = self.config.lock();
            if config.thread_affinity == affinity {
                return;
            }
            config.thread_affinity = affinity;
        }
        self.registry.reset();
        debug!(?affinity, "thread affinity switched, state discarded");
    }

    /// Discard all stack/baseline state; configuration is untouched
    pub fn reset(&self) {
        self.registry.reset();
    }

    // --- internals ---

    fn with_state<R>(&self, f: impl FnOnce(&mut ContextState) -> R) -> R {
        let affinity = self.config.lock().thread_affinity;
        self.registry.with_state(affinity, f)
    }

    fn top_kind(&self) -> Option<MockType> {
        self.with_state(|state| state.top_kind())
    }

    fn build_frame(
        &self,
        mock_type: MockType,
        spec: TimeSpec,
        factor: f64,
    ) -> TimewarpResult<OverrideFrame> {
        OverrideFrame::new(
            mock_type,
            spec,
            factor,
            self.clock.wall_now(),
            self.clock.monotonic_now(),
        )
    }

    fn apply_permanent(
        &self,
        mock_type: MockType,
        spec: TimeSpec,
        factor: f64,
    ) -> TimewarpResult<DateTime<Utc>> {
        let frame = self.build_frame(mock_type, spec, factor)?;
        let safe_mode = self.config.lock().safe_mode;
        self.with_state(|state| {
            if safe_mode && !state.in_scope() {
                return Err(TimewarpError::SafeModeViolation);
            }
            state.push(frame);
            Ok(())
        })?;
        debug!(?mock_type, at = %frame.target(), "permanent override pushed");
        Ok(frame.target())
    }

    fn apply_scoped<R>(
        &self,
        mock_type: MockType,
        spec: TimeSpec,
        factor: f64,
        body: impl FnOnce(DateTime<Utc>) -> R,
    ) -> TimewarpResult<R> {
        let frame = self.build_frame(mock_type, spec, factor)?;
        let snapshot = self.with_state(|state| {
            let snapshot = state.stack_snapshot();
            state.push(frame);
            state.enter_scope();
            snapshot
        });
        let _restore = RestoreGuard {
            machine: self,
            stack: Some(snapshot),
            baseline: None,
        };
        Ok(body(frame.target()))
    }
}

impl Default for TimeMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores snapshotted state when dropped
///
/// Dropping on the unwind path is what makes the restoration guarantee
/// hold when a scoped body panics: the snapshot comes back exactly once,
/// before the unwind continues.
struct RestoreGuard<'a> {
    machine: &'a TimeMachine,
    stack: Option<Vec<OverrideFrame>>,
    baseline: Option<Option<OverrideFrame>>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        let stack = self.stack.take();
        let baseline = self.baseline.take();
        self.machine.with_state(|state| {
            if let Some(snapshot) = stack {
                state.restore_stack(snapshot);
            }
            if let Some(snapshot) = baseline {
                state.set_baseline(snapshot);
            }
            state.exit_scope();
        });
    }
}
