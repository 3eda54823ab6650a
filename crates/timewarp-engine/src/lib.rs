//! Timewarp Engine - Virtual time control for deterministic testing
//!
//! This crate implements the stateful engine on top of `timewarp-core`:
//! - Override stack with freeze / travel / scale directives
//! - Scoped overrides restored on every exit path, including unwinds
//! - Baseline reference frames and stack collapse
//! - Safe-mode guard against leaked permanent overrides
//! - Process-wide or per-thread context affinity
//!
//! Whatever intercepts the host environment's real time queries is expected
//! to route them through [`TimeMachine::now`] / [`TimeMachine::monotonic_now`]
//! (typically on the [`global`] instance).

pub mod context;
pub mod machine;

pub use context::*;
pub use machine::*;
