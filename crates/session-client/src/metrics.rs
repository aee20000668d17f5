//! Session client metrics
//!
//! Emitted through the `metrics` facade; a binary decides where they go by
//! installing a recorder. Without one every call is a no-op.
//!
//! - `session_refresh_total` (counter): label `outcome` (`success`, `failure`)
//! - `session_requests_queued_total` (counter): requests parked behind a refresh
//! - `session_requests_replayed_total` (counter): label `outcome` (`ok`, `error`)
//! - `session_sign_out_total` (counter): label `reason`

/// Record a settled refresh attempt.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request queued behind an in-flight refresh.
pub fn record_queued() {
    metrics::counter!("session_requests_queued_total").increment(1);
}

/// Record a replayed request and whether the replay succeeded.
pub fn record_replay(outcome: &'static str) {
    metrics::counter!("session_requests_replayed_total", "outcome" => outcome).increment(1);
}

/// Record a sign-out with its trigger.
pub fn record_sign_out(reason: &'static str) {
    metrics::counter!("session_sign_out_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_refresh("success");
        record_queued();
        record_replay("ok");
        record_sign_out("requested");
    }

    #[test]
    fn counters_render_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_refresh("success");
        record_refresh("failure");
        record_queued();
        record_replay("error");
        record_sign_out("refresh_failed");

        let output = handle.render();
        assert!(output.contains("session_refresh_total{outcome=\"success\"} 1"), "{output}");
        assert!(output.contains("session_refresh_total{outcome=\"failure\"} 1"), "{output}");
        assert!(output.contains("session_requests_queued_total 1"), "{output}");
        assert!(output.contains("session_requests_replayed_total{outcome=\"error\"} 1"), "{output}");
        assert!(output.contains("session_sign_out_total{reason=\"refresh_failed\"} 1"), "{output}");
    }
}
