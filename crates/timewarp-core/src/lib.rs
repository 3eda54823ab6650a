//! Timewarp Core - Fundamental types for virtual time control
//!
//! This crate defines the primitives shared by the timewarp engine:
//! - Time specifications and their resolution rules (TimeSpec)
//! - Override frames - immutable freeze/travel/scale directives
//! - Pure virtual-time computation against real clock readings
//! - Real-clock sources (system and manual)
//! - Error types

pub mod clock;
pub mod error;
pub mod frame;
pub mod spec;

pub use clock::*;
pub use error::*;
pub use frame::*;
pub use spec::*;
