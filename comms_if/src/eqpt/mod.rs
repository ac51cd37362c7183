//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with the equipment: raw
//! samples from the IMU and wheel speed commands to the drive platform.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod imu;
pub mod platform;
