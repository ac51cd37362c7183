//! # Drive Platform Commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Command code understood by the platform as "set left/right wheel speeds".
pub const DIFF_DRIVE_CMD_CODE: u8 = 11;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A command sent to the drive platform.
///
/// For [`DIFF_DRIVE_CMD_CODE`] the parameters are the left and right motor speeds, in that
/// order, in motor units.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCmd {
    /// The command code
    pub command: u8,

    /// The command's parameters
    pub params: [i32; 2],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PlatformCmd {
    /// Build a differential drive command.
    pub fn diff_drive(left: i32, right: i32) -> Self {
        Self {
            command: DIFF_DRIVE_CMD_CODE,
            params: [left, right],
        }
    }

    /// Left motor speed
    pub fn left(&self) -> i32 {
        self.params[0]
    }

    /// Right motor speed
    pub fn right(&self) -> i32 {
        self.params[1]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_diff_drive_json() {
        let cmd = PlatformCmd::diff_drive(80, -80);

        assert_eq!(cmd.left(), 80);
        assert_eq!(cmd.right(), -80);
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"command":11,"params":[80,-80]}"#
        );
    }
}
