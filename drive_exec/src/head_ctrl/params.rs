//! Heading control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for heading control
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Time spent driving straight before a spot turn is started.
    ///
    /// Units: seconds
    pub wait_straight_s: f64,

    /// Time the heading must be held after a turn before driving straight again.
    ///
    /// Units: seconds
    pub turn_settle_s: f64,

    /// Heading error under which a spot turn is considered complete.
    ///
    /// Units: degrees
    pub heading_tolerance_deg: f64,

    /// Heading error from which the proportional law is replaced by a fixed speed spot turn.
    ///
    /// Units: degrees
    pub spot_turn_band_deg: f64,

    /// Proportional heading gain
    pub k1: f64,

    /// Wheel speed used for the fixed speed spot turn.
    ///
    /// Units: motor units
    pub spot_turn_speed: i32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            wait_straight_s: 30.0,
            turn_settle_s: 4.0,
            heading_tolerance_deg: 1.5,
            spot_turn_band_deg: 20.0,
            k1: 5.0,
            spot_turn_speed: 80,
        }
    }
}
