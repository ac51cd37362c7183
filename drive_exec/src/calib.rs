//! # IMU bias calibration
//!
//! The IMU is assumed to be at rest while the first samples of a run arrive. The mean of those
//! samples gives the resting bias of each axis, which is removed from every later sample.
//!
//! The accelerometer Z axis is not calibrated, as at rest it reads gravity rather than a bias.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;

// Internal
use comms_if::eqpt::imu::RawSample;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Bias offsets of each axis, in raw sensor units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CalibrationOffsets {
    /// Accelerometer bias, Z is always zero.
    pub acc_raw: [f64; 3],

    /// Gyroscope bias
    pub gyro_raw: [f64; 3],
}

/// Accumulates the first samples of a run and computes the bias offsets from them.
///
/// Samples are held in a buffer of fixed capacity equal to the calibration window. Once the
/// window is full the offsets are computed, the buffer is released, and any further samples are
/// ignored. A window whose mean is not finite is discarded and calibration starts again.
#[derive(Debug, Clone)]
pub struct Calibrator {
    num_samples: usize,
    buffer: VecDeque<RawSample>,
    offsets: Option<CalibrationOffsets>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur when configuring the calibrator.
#[derive(Debug, thiserror::Error)]
pub enum CalibError {
    #[error("The calibration window must contain at least one sample")]
    EmptyWindow,

    #[error("Calibration window gave non-finite offsets {0:?}, restarting calibration")]
    NonFiniteOffsets(CalibrationOffsets),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CalibrationOffsets {
    /// Remove the offsets from a sample, returning the corrected acceleration and angular rate
    /// (still in raw sensor units).
    pub fn apply(&self, sample: &RawSample) -> ([f64; 3], [f64; 3]) {
        let mut acc = [0f64; 3];
        let mut gyro = [0f64; 3];

        for i in 0..3 {
            acc[i] = sample.acc_raw[i] - self.acc_raw[i];
            gyro[i] = sample.gyro_raw[i] - self.gyro_raw[i];
        }

        (acc, gyro)
    }

    /// True if every offset is finite.
    pub fn is_finite(&self) -> bool {
        self.acc_raw
            .iter()
            .chain(self.gyro_raw.iter())
            .all(|v| v.is_finite())
    }
}

impl Calibrator {
    /// Create a new calibrator averaging over the first `num_samples` samples.
    pub fn new(num_samples: usize) -> Result<Self, CalibError> {
        if num_samples == 0 {
            return Err(CalibError::EmptyWindow);
        }

        Ok(Self {
            num_samples,
            buffer: VecDeque::with_capacity(num_samples),
            offsets: None,
        })
    }

    /// Offer a sample to the calibrator.
    ///
    /// Returns the offsets on the sample which completes the calibration window, and `None`
    /// otherwise. Samples offered after calibration are ignored.
    ///
    /// If the completed window overflows to non-finite offsets it is emptied and an error is
    /// returned.
    pub fn push(&mut self, sample: &RawSample) -> Result<Option<CalibrationOffsets>, CalibError> {
        if self.offsets.is_some() {
            return Ok(None);
        }

        self.buffer.push_back(*sample);
        debug!(
            "Calibration sample {}/{}",
            self.buffer.len(),
            self.num_samples
        );

        if self.buffer.len() < self.num_samples {
            return Ok(None);
        }

        let offsets = self.compute_offsets();

        if !offsets.is_finite() {
            warn!("Non-finite calibration offsets, discarding the window");
            self.buffer.clear();
            return Err(CalibError::NonFiniteOffsets(offsets));
        }

        // Release the buffer, it is never needed again
        self.buffer = VecDeque::new();
        self.offsets = Some(offsets);

        info!(
            "IMU calibrated over {} samples: acc bias {:?}, gyro bias {:?}",
            self.num_samples, offsets.acc_raw, offsets.gyro_raw
        );

        Ok(Some(offsets))
    }

    /// The offsets, if calibration has completed.
    pub fn offsets(&self) -> Option<&CalibrationOffsets> {
        self.offsets.as_ref()
    }

    /// True once the calibration window has been filled.
    pub fn is_calibrated(&self) -> bool {
        self.offsets.is_some()
    }

    /// Number of samples currently held towards calibration.
    pub fn num_buffered(&self) -> usize {
        self.buffer.len()
    }

    fn compute_offsets(&self) -> CalibrationOffsets {
        let n = self.buffer.len() as f64;
        let mut offsets = CalibrationOffsets::default();

        for s in self.buffer.iter() {
            for i in 0..3 {
                offsets.acc_raw[i] += s.acc_raw[i];
                offsets.gyro_raw[i] += s.gyro_raw[i];
            }
        }

        for i in 0..3 {
            offsets.acc_raw[i] /= n;
            offsets.gyro_raw[i] /= n;
        }

        // Z reads gravity at rest, not a bias
        offsets.acc_raw[2] = 0.0;

        offsets
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

    #[test]
    fn test_empty_window_rejected() {
        assert!(matches!(Calibrator::new(0), Err(CalibError::EmptyWindow)));
    }

    #[test]
    fn test_identical_samples_give_sample_values() {
        let s = sample([-312.0, 48.0, 16384.0], [-5.0, 3.0, 12.0]);
        let mut cal = Calibrator::new(10).unwrap();

        for _ in 0..9 {
            assert_eq!(cal.push(&s).unwrap(), None);
        }
        let offsets = cal.push(&s).unwrap().unwrap();

        assert_eq!(offsets.acc_raw, [-312.0, 48.0, 0.0]);
        assert_eq!(offsets.gyro_raw, [-5.0, 3.0, 12.0]);
        assert!(cal.is_calibrated());
        assert_eq!(cal.num_buffered(), 0);
    }

    #[test]
    fn test_short_stream_never_calibrates() {
        let mut cal = Calibrator::new(10).unwrap();

        for i in 0..9 {
            assert_eq!(cal.push(&sample([i as f64; 3], [0.0; 3])).unwrap(), None);
        }

        assert!(!cal.is_calibrated());
        assert!(cal.offsets().is_none());
        assert_eq!(cal.num_buffered(), 9);
    }

    #[test]
    fn test_mean_of_window_only() {
        let mut cal = Calibrator::new(4).unwrap();

        for g in [1.0, 2.0, 3.0].iter() {
            cal.push(&sample([*g, -*g, 100.0], [*g, 0.0, -*g])).unwrap();
        }
        let offsets = cal
            .push(&sample([6.0, -6.0, 100.0], [6.0, 0.0, -6.0]))
            .unwrap()
            .unwrap();

        assert_eq!(offsets.acc_raw, [3.0, -3.0, 0.0]);
        assert_eq!(offsets.gyro_raw, [3.0, 0.0, -3.0]);

        // Later samples never change the offsets
        assert_eq!(cal.push(&sample([1000.0; 3], [1000.0; 3])).unwrap(), None);
        assert_eq!(cal.offsets(), Some(&offsets));
        assert_eq!(cal.num_buffered(), 0);
    }

    #[test]
    fn test_overflowing_window_restarts() {
        let mut cal = Calibrator::new(3).unwrap();
        let huge = sample([0.0; 3], [0.0, 0.0, 1e308]);

        cal.push(&huge).unwrap();
        cal.push(&huge).unwrap();
        assert!(matches!(
            cal.push(&huge),
            Err(CalibError::NonFiniteOffsets(_))
        ));
        assert!(!cal.is_calibrated());
        assert_eq!(cal.num_buffered(), 0);

        // A sane window afterwards calibrates normally
        let s = sample([1.0, 2.0, 3.0], [4.0, 5.0, 6.0]);
        cal.push(&s).unwrap();
        cal.push(&s).unwrap();
        let offsets = cal.push(&s).unwrap().unwrap();
        assert_eq!(offsets.gyro_raw, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_apply() {
        let offsets = CalibrationOffsets {
            acc_raw: [1.0, 2.0, 0.0],
            gyro_raw: [0.5, -0.5, 1.0],
        };

        let (acc, gyro) = offsets.apply(&sample([1.0, 3.0, 10.0], [0.5, 0.5, 0.0]));

        assert_eq!(acc, [0.0, 1.0, 10.0]);
        assert_eq!(gyro, [0.0, 1.0, -1.0]);
    }
}
