//! Exit codes for the CLI.
//!
//! These follow common Unix conventions and provide meaningful
//! status information for scripting and automation.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments). Emitted by clap.
#[allow(dead_code)]
pub const USAGE_ERROR: u8 = 2;

/// Candidate passcode decrypted nothing
pub const AUTH_FAILED: u8 = 3;

/// Some items could not be decrypted
pub const DECRYPT_FAILED: u8 = 4;
