//! # Drive Executable Parameters
//!
//! This module provides parameters for the drive executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::SocketOptions;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveExecParams {
    /// Network endpoint on which platform commands are published
    pub platform_cmd_endpoint: String,

    /// Options for the platform command socket
    pub platform_socket: SocketOptions,

    /// Number of assembled samples that may wait for the drive loop before new ones are dropped
    pub sample_queue_capacity: usize,

    /// If true the estimates and commands of each tick are archived into the session
    pub archive: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DriveExecParams {
    fn default() -> Self {
        Self {
            platform_cmd_endpoint: "tcp://*:4020".into(),
            platform_socket: SocketOptions {
                bind: true,
                ..Default::default()
            },
            sample_queue_capacity: 64,
            archive: true,
        }
    }
}
