//! Host platform (linux for example) utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable which points at the root of the software directory.
pub const SW_ROOT_ENV_VAR: &str = "DRIVE_SW_ROOT";

/// Get the root directory of the software, from which `params` and
/// `sessions` are resolved.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
