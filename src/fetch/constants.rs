//! Constants for the fetch module.

/// HTTP connect timeout: bounds time to connection/first byte (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// HTTP read timeout for a whole request (archive parts are large).
pub const READ_TIMEOUT_SECS: u64 = 300;
