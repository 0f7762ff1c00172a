//! Exit codes returned by the `toolbelt` binary
//!
//! - 0: Success
//! - 1: General error, such as an unknown tool or a failed execution
//! - 2: One or more tool units are invalid

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// General error
pub const EXIT_WARNING: i32 = 1;

/// Invalid tool units found
pub const EXIT_ERROR: i32 = 2;
