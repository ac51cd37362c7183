//! Attitude estimation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for attitude estimation
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Number of samples, taken at rest, over which the sensor biases are averaged.
    pub num_calib_samples: usize,

    /// Accelerometer sensitivity.
    ///
    /// Units: raw units per g
    pub acc_scale: f64,

    /// Gyroscope sensitivity.
    ///
    /// Units: raw units per radian/second
    pub gyro_scale: f64,

    /// Complementary filter weight of the integrated gyro against the accelerometer tilt.
    ///
    /// Must be in [0, 1].
    pub alpha: f64,

    /// Nominal interval between two samples.
    ///
    /// Units: seconds
    pub dt_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            num_calib_samples: 10,
            acc_scale: 1.0,
            // 131 LSB per degree/second
            gyro_scale: 131.0 * 180.0 / std::f64::consts::PI,
            alpha: 0.98,
            dt_s: 0.02,
        }
    }
}
