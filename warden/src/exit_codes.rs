//! Stable exit codes for warden CLI commands.

/// Command succeeded; for `run`, the session completed.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/checklist/ownership or other
/// errors.
pub const INVALID: i32 = 1;
/// `warden run` ended with the session paused (operator request or the
/// agent asking for help).
pub const PAUSED: i32 = 2;
/// `warden run` ended pending verification of soft completion evidence.
pub const VERIFY: i32 = 3;
/// `warden run` ended with the session aborted by the circuit breaker,
/// budget, or operator.
pub const ABORTED: i32 = 4;
