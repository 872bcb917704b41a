//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Record a call's media stream opening.
pub fn record_call_start() {
    metrics::gauge!("calls_active").increment(1.0);
    metrics::counter!("calls_total").increment(1);
}

/// Record a call's media stream closing.
pub fn record_call_end() {
    metrics::gauge!("calls_active").decrement(1.0);
}

/// Record one dialogue decision by intent and action.
pub fn record_decision(intent: &str, action: &str) {
    let labels = [("intent", intent.to_string()), ("action", action.to_string())];
    metrics::counter!("dialogue_decisions_total", &labels).increment(1);
}

/// Record how a call finished.
pub fn record_outcome(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    metrics::counter!("call_outcomes_total", &labels).increment(1);
}

/// Record a failed call to an external collaborator.
pub fn record_collaborator_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("collaborator_errors_total", &labels).increment(1);
}
