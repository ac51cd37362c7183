//! # Heading control module
//!
//! Heading control drives the platform along a straight line, and every so often reverses it by
//! turning on the spot through 180 degrees. It is a small state machine:
//!
//! ```text
//!              wait elapsed                 heading reached
//!   Straight ---------------> SpotTurn ----------------------> EndSpotTurn
//!      ^     (goal toggled)                                         |
//!      |                heading held and settle time elapsed        |
//!      +------------------------------------------------------------+
//! ```
//!
//! Every tick, whatever the state, the heading error to the goal is computed. Small errors are
//! corrected proportionally, with a forward rate only while going straight. Large errors switch
//! to a fixed-speed spot turn towards the goal.
//!
//! Yaw comes from pure gyro integration and drifts, the controller does not attempt to correct
//! for that.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::Params;
pub use state::*;
