//! Prometheus metrics for issuance and verification.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

/// Tokens issued counter.
pub static TOKENS_ISSUED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "opcode_token_tokens_issued_total",
        "Total number of tokens issued"
    )
    .expect("Failed to register tokens_issued metric")
});

/// Issuance rejections by error code.
pub static ISSUANCE_REJECTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opcode_token_issuance_rejected_total",
        "Total number of rejected issuance requests",
        &["reason"]
    )
    .expect("Failed to register issuance_rejected metric")
});

/// Verifications by outcome.
pub static VERIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "opcode_token_verifications_total",
        "Total number of token verifications",
        &["outcome"]
    )
    .expect("Failed to register verifications metric")
});

/// RSA operation latency histogram.
pub static RSA_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "opcode_token_rsa_latency_seconds",
        "RSA operation latency in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .expect("Failed to register rsa_latency metric")
});

/// Record a token issuance.
pub fn record_token_issued() {
    TOKENS_ISSUED.inc();
}

/// Record a rejected issuance.
pub fn record_issuance_rejected(reason: &str) {
    ISSUANCE_REJECTED.with_label_values(&[reason]).inc();
}

/// Record a verification outcome (`OK` or an error code).
pub fn record_verification(outcome: &str) {
    VERIFICATIONS.with_label_values(&[outcome]).inc();
}

/// Record RSA operation latency.
pub fn record_rsa_operation(operation: &str, duration_secs: f64) {
    RSA_LATENCY
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// All registered metrics in the Prometheus text format.
#[must_use]
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_issuance_rejected() {
        record_issuance_rejected("TOKEN_AUTH_FAILED");
        let value = ISSUANCE_REJECTED
            .with_label_values(&["TOKEN_AUTH_FAILED"])
            .get();
        assert!(value > 0.0);
    }

    #[test]
    fn test_record_verification() {
        record_verification("OK");
        assert!(VERIFICATIONS.with_label_values(&["OK"]).get() > 0.0);
    }

    #[test]
    fn test_render_contains_metric_names() {
        record_token_issued();
        record_rsa_operation("sign", 0.001);
        let text = render();
        assert!(text.contains("opcode_token_tokens_issued_total"));
        assert!(text.contains("opcode_token_rsa_latency_seconds"));
    }
}
