//! # Drive library.
//!
//! This library allows other crates in the workspace to access items defined inside the drive
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Attitude estimation module - fuses IMU samples into roll, pitch and yaw
pub mod att_est;

/// IMU calibration - removes the resting sensor biases
pub mod calib;

/// Differential drive module - mixes body rates into limited wheel speeds
pub mod diff_drive;

/// Drive loop - runs the modules once per sample and forwards the commands
pub mod drive_loop;

/// Heading control module - holds heading and reverses it with spot turns
pub mod head_ctrl;

/// IMU source - reads the IMU stream on a background thread
pub mod imu_source;

/// Parameters for the drive executable
pub mod params;

/// Platform client - sends wheel commands to the drive platform
pub mod platform_client;
