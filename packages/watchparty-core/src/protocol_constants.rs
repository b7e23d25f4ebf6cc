//! Fixed protocol and scheduling constants.
//!
//! Tunables that operators may want to change (pause length, drift
//! threshold, verifier timeout) live in [`Config`](crate::state::Config);
//! the values here define the playback protocol itself.

// ─────────────────────────────────────────────────────────────────────────────
// Automatic Pause Scheduling
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between automatic pauses, measured in unpaused playback time.
pub const PAUSE_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Minimum playback remaining after a candidate pause point for the pause to
/// be scheduled (the first pause is exempt).
pub const MIN_REMAINING_AFTER_PAUSE_MS: u64 = 30 * 60 * 1000;

/// Default length of an automatic pause (seconds).
pub const DEFAULT_PAUSE_DURATION_SECS: u64 = 10 * 60;

// ─────────────────────────────────────────────────────────────────────────────
// Drift Correction
// ─────────────────────────────────────────────────────────────────────────────

/// Default divergence between reported and server offsets that triggers a SEEK.
pub const DEFAULT_DRIFT_THRESHOLD_MS: u64 = 5000;

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Upper bound for a single outbound frame write (seconds).
///
/// A recipient that stops reading holds only its own connection lock for
/// at most this long.
pub const SEND_TIMEOUT_SECS: u64 = 10;

/// Timeout for credential verification requests (seconds).
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 5;

/// Default HTTP/WebSocket listen port.
pub const DEFAULT_PORT: u16 = 8000;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "watchparty-orchestrator";
