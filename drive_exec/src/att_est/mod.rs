//! # Attitude estimation module
//!
//! Attitude estimation turns raw IMU samples into an estimate of the platform's roll, pitch and
//! yaw.
//!
//! The first samples of a run are used to calibrate the sensor biases (see [`crate::calib`]).
//! After that each sample is corrected, scaled into physical units and fused:
//!
//! - Roll and pitch come from a complementary filter. The gyroscope is accurate over a short time
//!   but drifts, the accelerometer's view of gravity does not drift but is noisy and disturbed by
//!   horizontal acceleration. The filter weights the integrated gyro by `alpha` and the
//!   accelerometer tilt by `1 - alpha`.
//! - Yaw cannot be observed from gravity, so it is the pure integral of the Z rate. It drifts
//!   without bound and consumers must tolerate that.
//!
//! Angles are not wrapped inside the filter.

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
