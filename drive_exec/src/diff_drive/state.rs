//! Differential drive mixer state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use serde::Serialize;
use std::convert::Infallible;

// Internal
use super::Params;
use crate::head_ctrl::HeadCtrlOutput;
use comms_if::eqpt::platform::PlatformCmd;
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Differential drive mixer
pub struct DiffDrive {
    params: Params,
}

/// Wheel speed command sent to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WheelCommand {
    /// Left wheel speed.
    ///
    /// Units: motor units
    pub left: i32,

    /// Right wheel speed.
    ///
    /// Units: motor units
    pub right: i32,
}

/// Status report for the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StatusReport {
    /// Left speed before limiting
    pub left_demand: f64,

    /// Right speed before limiting
    pub right_demand: f64,

    /// Set if the platform was stopped for safety on this tick, by the speed limit or a stop
    /// demand from heading control
    pub speed_limited: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur when creating the mixer.
#[derive(Debug, thiserror::Error)]
pub enum DiffDriveError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WheelCommand {
    /// Both wheels stopped.
    pub fn stop() -> Self {
        Self::default()
    }
}

impl From<WheelCommand> for PlatformCmd {
    fn from(cmd: WheelCommand) -> Self {
        PlatformCmd::diff_drive(cmd.left, cmd.right)
    }
}

impl DiffDrive {
    /// Create a new mixer, validating the parameters.
    pub fn new(params: Params) -> Result<Self, DiffDriveError> {
        if !(params.wheel_radius_m.is_finite() && params.wheel_radius_m > 0.0) {
            return Err(DiffDriveError::InvalidParams(format!(
                "wheel_radius_m must be positive, found {}",
                params.wheel_radius_m
            )));
        }
        if !(params.axle_half_width_m.is_finite() && params.axle_half_width_m >= 0.0) {
            return Err(DiffDriveError::InvalidParams(format!(
                "axle_half_width_m must be non-negative, found {}",
                params.axle_half_width_m
            )));
        }
        if !params.scale_factor.is_finite() {
            return Err(DiffDriveError::InvalidParams(format!(
                "scale_factor must be finite, found {}",
                params.scale_factor
            )));
        }
        if !(params.speed_threshold.is_finite() && params.speed_threshold > 0.0) {
            return Err(DiffDriveError::InvalidParams(format!(
                "speed_threshold must be positive, found {}",
                params.speed_threshold
            )));
        }

        Ok(Self { params })
    }

    /// Mix a forward rate `u1` and steering rate `u2` into limited wheel speeds.
    pub fn mix(&self, u1: f64, u2: f64) -> (WheelCommand, StatusReport) {
        let gain = self.params.scale_factor / self.params.wheel_radius_m;
        let half_width = self.params.axle_half_width_m;

        let left = gain * (u1 - half_width * u2);
        let right = gain * (u1 + half_width * u2);

        self.enforce_limits(left, right)
    }

    /// Pass an integer command, such as a spot turn, through the speed limit.
    pub fn limit(&self, cmd: WheelCommand) -> (WheelCommand, StatusReport) {
        self.enforce_limits(cmd.left as f64, cmd.right as f64)
    }

    /// Stop both wheels if either speed exceeds the threshold, otherwise truncate the speeds
    /// towards zero.
    fn enforce_limits(&self, left: f64, right: f64) -> (WheelCommand, StatusReport) {
        let threshold = self.params.speed_threshold;
        let exceeded = |v: f64| !v.is_finite() || v.abs() > threshold;

        let mut report = StatusReport {
            left_demand: left,
            right_demand: right,
            speed_limited: false,
        };

        let cmd = if exceeded(left) || exceeded(right) {
            warn!(
                "Wheel speed demand ({:.1}, {:.1}) exceeds the limit of {}, stopping",
                left, right, threshold
            );
            report.speed_limited = true;
            WheelCommand::stop()
        } else {
            // Casting truncates towards zero
            WheelCommand {
                left: left as i32,
                right: right as i32,
            }
        };

        trace!("DiffDrive output: {:?}", cmd);

        (cmd, report)
    }
}

impl State for DiffDrive {
    type InputData = HeadCtrlOutput;
    type OutputData = WheelCommand;
    type StatusReport = StatusReport;
    type ProcError = Infallible;

    /// Convert the heading control output into a wheel command.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        Ok(match *input_data {
            HeadCtrlOutput::Rates { u1, u2 } => self.mix(u1, u2),
            HeadCtrlOutput::SpotTurn { left, right } => self.limit(WheelCommand { left, right }),
            HeadCtrlOutput::Stop => {
                warn!("Heading control demanded a stop");
                (
                    WheelCommand::stop(),
                    StatusReport {
                        speed_limited: true,
                        ..StatusReport::default()
                    },
                )
            }
        })
    }
}
