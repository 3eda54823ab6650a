//! Context state - the override stack and its storage affinity
//!
//! A `ContextState` holds the frames currently overriding time for one
//! logical scope, plus an optional baseline frame. The registry stores one
//! shared state or one state per calling thread, depending on the
//! configured affinity.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use timewarp_core::{MockType, OverrideFrame};

/// Storage affinity for context state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreadAffinity {
    /// One state read and mutated by every thread
    #[default]
    Shared,
    /// An independent state per calling thread, created lazily
    PerThread,
}

/// Mutable mock state for one logical scope
#[derive(Clone, Debug, Default)]
pub struct ContextState {
    /// Active override frames, last element is the active one
    stack: Vec<OverrideFrame>,
    /// Persistent reference frame (always a Travel frame)
    baseline: Option<OverrideFrame>,
    /// Depth of currently executing scoped calls
    scope_depth: usize,
}

impl ContextState {
    pub fn new() -> Self {
        ContextState::default()
    }

    /// The active frame, if any
    #[inline]
    pub fn top(&self) -> Option<&OverrideFrame> {
        self.stack.last()
    }

    /// Kind of the active frame, if any
    #[inline]
    pub fn top_kind(&self) -> Option<MockType> {
        self.stack.last().map(|f| f.mock_type())
    }

    /// Push a frame, making it the active one
    pub fn push(&mut self, frame: OverrideFrame) {
        self.stack.push(frame);
    }

    /// Copy of the current stack, for later restoration
    pub fn stack_snapshot(&self) -> Vec<OverrideFrame> {
        self.stack.clone()
    }

    /// Replace the stack with a previously taken snapshot
    pub fn restore_stack(&mut self, snapshot: Vec<OverrideFrame>) {
        self.stack = snapshot;
    }

    /// Drop every frame, leaving real time active
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Collapse the stack to a single frame
    pub fn collapse_to(&mut self, frame: OverrideFrame) {
        self.stack.clear();
        self.stack.push(frame);
    }

    #[inline]
    pub fn baseline(&self) -> Option<&OverrideFrame> {
        self.baseline.as_ref()
    }

    pub fn set_baseline(&mut self, baseline: Option<OverrideFrame>) {
        self.baseline = baseline;
    }

    /// True while a scoped call is executing in this context
    #[inline]
    pub fn in_scope(&self) -> bool {
        self.scope_depth > 0
    }

    pub fn enter_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub fn exit_scope(&mut self) {
        self.scope_depth = self.scope_depth.saturating_sub(1);
    }

    #[inline]
    pub fn is_mocked(&self) -> bool {
        !self.stack.is_empty()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop stack and baseline; scope depth is left alone so an enclosing
    /// scoped call still unwinds correctly
    pub fn reset(&mut self) {
        self.stack.clear();
        self.baseline = None;
    }
}

/// Storage for context state under both affinities
///
/// Shared affinity keeps one state behind a lock; the lock makes
/// interleaved pushes and pops from different threads data-race free, not
/// meaningful - callers wanting isolation use per-thread affinity.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    shared: Mutex<ContextState>,
    per_thread: Mutex<HashMap<ThreadId, ContextState>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        ContextRegistry::default()
    }

    /// Run `f` against the calling thread's context state under `affinity`
    ///
    /// Per-thread states are created empty on first use by each thread.
    pub fn with_state<R>(
        &self,
        affinity: ThreadAffinity,
        f: impl FnOnce(&mut ContextState) -> R,
    ) -> R {
        match affinity {
            ThreadAffinity::Shared => f(&mut self.shared.lock()),
            ThreadAffinity::PerThread => {
                let mut map = self.per_thread.lock();
                f(map.entry(thread::current().id()).or_default())
            }
        }
    }

    /// Discard all held state; both storages start empty again
    pub fn reset(&self) {
        *self.shared.lock() = ContextState::new();
        self.per_thread.lock().clear();
    }
}
