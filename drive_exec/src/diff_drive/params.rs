//! Differential drive parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the differential drive mixer
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Radius of the drive wheels.
    ///
    /// Units: meters
    pub wheel_radius_m: f64,

    /// Distance from the centre of the platform to each wheel.
    ///
    /// Units: meters
    pub axle_half_width_m: f64,

    /// Scale factor from wheel rate into motor units
    pub scale_factor: f64,

    /// Largest wheel speed magnitude allowed, above which the platform is stopped.
    ///
    /// Units: motor units
    pub speed_threshold: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Named motor tunings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveProfile {
    /// Heading hold with spot turns, the default tuning
    HeadingHold,

    /// Gentler tuning for forward driving
    ForwardOnly,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Tuning for heading hold with spot turns.
    pub fn heading_hold() -> Self {
        Self {
            wheel_radius_m: 0.105,
            axle_half_width_m: 0.26,
            scale_factor: 20.0,
            speed_threshold: 220.0,
        }
    }

    /// Tuning for forward driving only.
    pub fn forward_only() -> Self {
        Self {
            scale_factor: 16.0,
            speed_threshold: 180.0,
            ..Self::heading_hold()
        }
    }

    /// Replace the motor tuning with that of the given profile, keeping the geometry.
    pub fn apply_profile(&mut self, profile: DriveProfile) {
        let tuning = match profile {
            DriveProfile::HeadingHold => Self::heading_hold(),
            DriveProfile::ForwardOnly => Self::forward_only(),
        };

        self.scale_factor = tuning.scale_factor;
        self.speed_threshold = tuning.speed_threshold;
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::heading_hold()
    }
}

impl FromStr for DriveProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heading-hold" => Ok(DriveProfile::HeadingHold),
            "forward-only" => Ok(DriveProfile::ForwardOnly),
            _ => Err(format!(
                "Unknown drive profile \"{}\", expected \"heading-hold\" or \"forward-only\"",
                s
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_profiles() {
        assert_eq!(Params::default(), Params::heading_hold());

        let mut p = Params {
            wheel_radius_m: 0.2,
            ..Params::default()
        };
        p.apply_profile(DriveProfile::ForwardOnly);

        assert_eq!(p.wheel_radius_m, 0.2);
        assert_eq!(p.scale_factor, 16.0);
        assert_eq!(p.speed_threshold, 180.0);

        assert_eq!(
            "heading-hold".parse::<DriveProfile>(),
            Ok(DriveProfile::HeadingHold)
        );
        assert!("reverse".parse::<DriveProfile>().is_err());
    }
}
