//! # Differential drive module
//!
//! Converts the body rates requested by heading control into left and right wheel speeds for a
//! two-wheel differential drive platform:
//!
//! ```text
//! left  = F * (u1 - L * u2) / r
//! right = F * (u1 + L * u2) / r
//! ```
//!
//! where `r` is the wheel radius, `L` the distance from the platform centre to each wheel and
//! `F` a scale factor into motor units. Speeds are truncated towards zero.
//!
//! Every command, including fixed-speed spot turns, passes through a safety limit. If either wheel
//! would exceed the speed threshold both wheels are stopped for that tick.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::{DriveProfile, Params};
pub use state::*;
