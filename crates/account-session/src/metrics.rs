//! Metrics facade counters for the login lifecycle
//!
//! Counters only; no recorder is installed here. The embedding process
//! installs whatever exporter it wants; without one these are no-ops.

/// Record a dispatched login attempt (after the backoff delay elapsed).
pub(crate) fn record_login_dispatched(bootstrap: bool) {
    let kind = if bootstrap { "bootstrap" } else { "relogin" };
    metrics::counter!("session_login_attempts_total", "kind" => kind).increment(1);
}

/// Record a login request that was dropped before dispatch.
pub(crate) fn record_login_blocked(reason: &'static str) {
    metrics::counter!("session_login_blocked_total", "reason" => reason).increment(1);
}

/// Record a resolved login outcome.
pub(crate) fn record_login_outcome(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("session_login_outcomes_total", "outcome" => outcome).increment(1);
}
