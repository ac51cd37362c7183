//! Attitude estimation module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::UnitQuaternion;
use serde::Serialize;

// Internal
use super::Params;
use crate::calib::{CalibError, CalibrationOffsets, Calibrator};
use comms_if::eqpt::imu::RawSample;
use util::{module::State, params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Attitude estimator.
pub struct AttEst {
    params: Params,

    calibrator: Calibrator,

    /// Pure gyro integrals
    gyro_roll_rad: f64,
    gyro_pitch_rad: f64,
    gyro_yaw_rad: f64,

    /// Filtered angles from the previous tick
    roll_rad: f64,
    pitch_rad: f64,
}

/// The attitude estimate produced on each calibrated tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AttitudeEstimate {
    /// Timestamp of the sample this estimate was computed from.
    ///
    /// Units: seconds since session start
    pub timestamp_s: f64,

    /// Filtered roll
    pub roll_rad: f64,

    /// Filtered pitch
    pub pitch_rad: f64,

    /// Gyro-integrated yaw, not corrected by any absolute reference.
    pub yaw_rad: f64,

    /// Roll as seen by the accelerometer alone
    pub acc_roll_rad: f64,

    /// Pitch as seen by the accelerometer alone
    pub acc_pitch_rad: f64,

    /// Gyro-integrated roll
    pub gyro_roll_rad: f64,

    /// Gyro-integrated pitch
    pub gyro_pitch_rad: f64,

    /// Sum of the absolute accelerations on each axis, about 1 when at rest.
    ///
    /// Units: g
    pub force_magnitude_g: f64,
}

/// Status report for attitude estimation.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// True while the calibration window is still being filled
    pub calibrating: bool,

    /// True on the tick which completed calibration
    pub calibrated_this_tick: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur during attitude estimation.
#[derive(Debug, thiserror::Error)]
pub enum AttEstError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(params::LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Calibration failed: {0}")]
    CalibError(CalibError),

    #[error("Sample contains non-finite values: {0:?}")]
    NonFiniteSample(RawSample),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AttEst {
    /// Initialise the estimator from a parameter file.
    pub fn init(params_path: &str) -> Result<Self, AttEstError> {
        let params = params::load(params_path).map_err(AttEstError::ParamLoadError)?;

        Self::new(params)
    }

    /// Create a new estimator, validating the parameters.
    pub fn new(params: Params) -> Result<Self, AttEstError> {
        if !params.acc_scale.is_normal() || !params.gyro_scale.is_normal() {
            return Err(AttEstError::InvalidParams(format!(
                "sensor scales must be finite and non-zero (acc {}, gyro {})",
                params.acc_scale, params.gyro_scale
            )));
        }
        if !(0.0..=1.0).contains(&params.alpha) {
            return Err(AttEstError::InvalidParams(format!(
                "alpha must be in [0, 1], found {}",
                params.alpha
            )));
        }
        if !(params.dt_s.is_finite() && params.dt_s > 0.0) {
            return Err(AttEstError::InvalidParams(format!(
                "dt must be positive, found {}",
                params.dt_s
            )));
        }

        let calibrator =
            Calibrator::new(params.num_calib_samples).map_err(AttEstError::CalibError)?;

        Ok(Self {
            params,
            calibrator,
            gyro_roll_rad: 0.0,
            gyro_pitch_rad: 0.0,
            gyro_yaw_rad: 0.0,
            roll_rad: 0.0,
            pitch_rad: 0.0,
        })
    }

    /// The calibration offsets, once calibration has completed.
    pub fn offsets(&self) -> Option<&CalibrationOffsets> {
        self.calibrator.offsets()
    }

    /// True once calibration has completed.
    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    /// Run one filter tick on a sample which has already been calibrated.
    fn estimate(&mut self, offsets: &CalibrationOffsets, sample: &RawSample) -> AttitudeEstimate {
        let dt = self.params.dt_s;
        let alpha = self.params.alpha;

        // ---- UNITS ----

        let (acc_raw, gyro_raw) = offsets.apply(sample);
        let ax = acc_raw[0] / self.params.acc_scale;
        let ay = acc_raw[1] / self.params.acc_scale;
        let az = acc_raw[2] / self.params.acc_scale;
        let gx = gyro_raw[0] / self.params.gyro_scale;
        let gy = gyro_raw[1] / self.params.gyro_scale;
        let gz = gyro_raw[2] / self.params.gyro_scale;

        // ---- ACCELEROMETER TILT ----

        let acc_roll_rad = ay.atan2(az);
        let acc_pitch_rad = -ax.atan2(az);

        // ---- GYRO INTEGRATION ----

        self.gyro_roll_rad += dt * gx;
        self.gyro_pitch_rad += dt * gy;
        self.gyro_yaw_rad += dt * gz;

        // ---- FUSION ----

        // The filtered angles are expressed in the opposite sense to the accelerometer tilt, so
        // they settle at -acc_roll and -acc_pitch when the platform is still.
        self.roll_rad = alpha * (self.roll_rad - dt * gx) - (1.0 - alpha) * acc_roll_rad;
        self.pitch_rad = alpha * (self.pitch_rad + dt * gy) - (1.0 - alpha) * acc_pitch_rad;

        AttitudeEstimate {
            timestamp_s: sample.timestamp_s,
            roll_rad: self.roll_rad,
            pitch_rad: self.pitch_rad,
            yaw_rad: self.gyro_yaw_rad,
            acc_roll_rad,
            acc_pitch_rad,
            gyro_roll_rad: self.gyro_roll_rad,
            gyro_pitch_rad: self.gyro_pitch_rad,
            force_magnitude_g: ax.abs() + ay.abs() + az.abs(),
        }
    }
}

impl State for AttEst {
    type InputData = RawSample;
    type OutputData = Option<AttitudeEstimate>;
    type StatusReport = StatusReport;
    type ProcError = AttEstError;

    /// Process one sample.
    ///
    /// No estimate is produced while the calibration window is being filled, including on the
    /// sample which completes it.
    fn proc(
        &mut self,
        sample: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let finite = sample
            .acc_raw
            .iter()
            .chain(sample.gyro_raw.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(AttEstError::NonFiniteSample(*sample));
        }

        let mut report = StatusReport::default();

        let offsets = match self.calibrator.offsets() {
            Some(o) => *o,
            None => {
                report.calibrated_this_tick = self
                    .calibrator
                    .push(sample)
                    .map_err(AttEstError::CalibError)?
                    .is_some();
                report.calibrating = !report.calibrated_this_tick;
                return Ok((None, report));
            }
        };

        let estimate = self.estimate(&offsets, sample);

        trace!(
            "AttEst: roll {:.4} pitch {:.4} yaw {:.4} (acc roll {:.4} pitch {:.4})",
            estimate.roll_rad,
            estimate.pitch_rad,
            estimate.yaw_rad,
            estimate.acc_roll_rad,
            estimate.acc_pitch_rad
        );

        Ok((Some(estimate), report))
    }
}

impl AttitudeEstimate {
    /// Orientation from the filtered roll and pitch and the integrated yaw.
    ///
    /// Roll is negated to bring it back to the accelerometer's sense.
    pub fn filtered_orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(-self.roll_rad, self.pitch_rad, self.yaw_rad)
    }

    /// Orientation from the accelerometer tilt alone and the integrated yaw.
    pub fn raw_orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(-self.acc_roll_rad, self.acc_pitch_rad, self.yaw_rad)
    }

    /// Yaw in degrees
    pub fn yaw_deg(&self) -> f64 {
        self.yaw_rad.to_degrees()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(acc: [f64; 3], gyro: [f64; 3]) -> RawSample {
        RawSample {
            timestamp_s: 0.0,
            acc_raw: acc,
            gyro_raw: gyro,
        }
    }

    /// Estimator in physical units (scales of 1) calibrated on a level, still platform.
    fn calibrated(alpha: f64) -> AttEst {
        let mut est = AttEst::new(Params {
            num_calib_samples: 5,
            acc_scale: 1.0,
            gyro_scale: 1.0,
            alpha,
            dt_s: 0.02,
        })
        .unwrap();

        let level = sample([0.0, 0.0, 1.0], [0.0; 3]);
        for i in 0..5 {
            let (out, report) = est.proc(&level).unwrap();
            assert!(out.is_none());
            assert_eq!(report.calibrated_this_tick, i == 4);
        }
        assert!(est.is_calibrated());

        est
    }

    #[test]
    fn test_invalid_params() {
        let bad = [
            Params { acc_scale: 0.0, ..Params::default() },
            Params { gyro_scale: std::f64::NAN, ..Params::default() },
            Params { alpha: 1.5, ..Params::default() },
            Params { dt_s: 0.0, ..Params::default() },
        ];
        for p in bad.iter() {
            assert!(matches!(
                AttEst::new(p.clone()),
                Err(AttEstError::InvalidParams(_))
            ));
        }

        assert!(matches!(
            AttEst::new(Params { num_calib_samples: 0, ..Params::default() }),
            Err(AttEstError::CalibError(_))
        ));
    }

    #[test]
    fn test_no_estimate_before_calibration() {
        let mut est = AttEst::new(Params::default()).unwrap();

        for _ in 0..9 {
            let (out, report) = est.proc(&sample([1.0, 2.0, 3.0], [4.0, 5.0, 6.0])).unwrap();
            assert!(out.is_none());
            assert!(report.calibrating);
        }
        assert!(est.offsets().is_none());
    }

    #[test]
    fn test_non_finite_sample_rejected_without_mutation() {
        let mut est = calibrated(0.98);

        let bad = sample([std::f64::NAN, 0.0, 1.0], [0.0, 0.0, 1.0]);
        assert!(matches!(est.proc(&bad), Err(AttEstError::NonFiniteSample(_))));

        // The yaw integral is untouched by the rejected sample
        let (out, _) = est.proc(&sample([0.0, 0.0, 1.0], [0.0, 0.0, 1.0])).unwrap();
        assert!((out.unwrap().yaw_rad - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_single_tick_values() {
        let mut est = calibrated(0.98);

        let (out, _) = est.proc(&sample([0.0, 0.5, 0.5], [0.1, -0.2, 0.3])).unwrap();
        let e = out.unwrap();

        let pi_4 = std::f64::consts::FRAC_PI_4;
        assert!((e.acc_roll_rad - pi_4).abs() < 1e-12);
        assert!(e.acc_pitch_rad.abs() < 1e-12);
        assert!((e.gyro_roll_rad - 0.002).abs() < 1e-12);
        assert!((e.gyro_pitch_rad + 0.004).abs() < 1e-12);
        assert!((e.yaw_rad - 0.006).abs() < 1e-12);
        assert!((e.roll_rad - (0.98 * -0.002 - 0.02 * pi_4)).abs() < 1e-12);
        assert!((e.pitch_rad - 0.98 * -0.004).abs() < 1e-12);
        assert!((e.force_magnitude_g - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_yaw_integrates_without_wrapping() {
        let mut est = calibrated(0.98);

        // 1 rad/s for 10 s
        let mut yaw = 0.0;
        for _ in 0..500 {
            let (out, _) = est.proc(&sample([0.0, 0.0, 1.0], [0.0, 0.0, 1.0])).unwrap();
            yaw = out.unwrap().yaw_rad;
        }

        assert!((yaw - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_stationary_tilt_converges() {
        let alpha = 0.98;
        let mut est = calibrated(alpha);

        // Tilted about X, still
        let tilt = sample([0.0, 0.3f64.sin(), 0.3f64.cos()], [0.0; 3]);

        let mut last = AttitudeEstimate::default();
        for k in 1..=400 {
            let (out, _) = est.proc(&tilt).unwrap();
            last = out.unwrap();

            // Distance to the fixed point shrinks by alpha each tick
            let err = (last.roll_rad + last.acc_roll_rad).abs();
            assert!(err <= alpha.powi(k) * 0.3 + 1e-12, "tick {}: error {}", k, err);
        }

        assert!((last.acc_roll_rad - 0.3).abs() < 1e-12);
        assert!((last.roll_rad + 0.3).abs() < 1e-3);
        assert!(last.pitch_rad.abs() < 1e-12);

        let (roll, pitch, yaw) = last.filtered_orientation().euler_angles();
        assert!((roll - 0.3).abs() < 1e-3);
        assert!(pitch.abs() < 1e-9);
        assert!(yaw.abs() < 1e-9);

        let (raw_roll, _, _) = last.raw_orientation().euler_angles();
        assert!((raw_roll + 0.3).abs() < 1e-9);
    }
}
