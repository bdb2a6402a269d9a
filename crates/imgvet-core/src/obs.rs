//! Structured observability hooks for the vetting lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans via `vet_span`
//! - Emission functions for key lifecycle events: start, check evaluated,
//!   finish, occurrence published, publish error
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).

use tracing::info;

/// Run-scoped span tagged with the run id and image.
///
/// Attach it to the run future with `tracing::Instrument`; an entered span
/// must not be held across `.await`.
pub fn vet_span(run_id: &str, image: &str) -> tracing::Span {
    tracing::info_span!("imgvet.vet", run_id = %run_id, image = %image)
}

/// Emit event: vetting run started.
pub fn emit_vet_started(run_id: &str, image: &str, checks: usize) {
    info!(event = "vet.started", run_id = %run_id, image = %image, checks = checks);
}

/// Emit event: one check finished, with its verdict or error.
pub fn emit_check_evaluated(
    run_id: &str,
    check: &str,
    passed: bool,
    error: Option<&dyn std::fmt::Display>,
    duration_ms: u64,
) {
    match error {
        Some(error) => tracing::warn!(
            event = "check.evaluated",
            run_id = %run_id,
            check = %check,
            passed = false,
            error = %error,
            duration_ms = duration_ms,
        ),
        None => info!(
            event = "check.evaluated",
            run_id = %run_id,
            check = %check,
            passed = passed,
            duration_ms = duration_ms,
        ),
    }
}

/// Emit event: run finished with its overall verdict.
pub fn emit_vet_finished(run_id: &str, verdict: &str, duration_ms: u64, detail: &str) {
    info!(
        event = "vet.finished",
        run_id = %run_id,
        verdict = %verdict,
        duration_ms = duration_ms,
        detail = %detail,
    );
}

/// Emit event: attestation occurrence written.
pub fn emit_occurrence_published(run_id: &str, policy_set: &str) {
    info!(event = "occurrence.published", run_id = %run_id, policy_set = %policy_set);
}

/// Emit event: attestation write failed after a passed verdict (warning level).
pub fn emit_publish_error(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "occurrence.publish_error", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vet_span_create() {
        let _span = vet_span("test-run-id", "gcr.io/team/app@sha256:00").entered();
        emit_check_evaluated("test-run-id", "approved", true, None, 3);
    }
}
