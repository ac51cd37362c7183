//! # Communications interface crate.
//!
//! Provides the interfaces shared between the drive executable and the
//! equipment around it: the inertial sample feed and the platform command
//! channel.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Sample and command definitions for equipment (IMU, drive platform)
pub mod eqpt;

/// Network module
pub mod net;
