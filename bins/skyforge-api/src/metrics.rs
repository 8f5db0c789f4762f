// Prometheus metrics for the HTTP surface

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use skyforge_common::types::ExecutionResult;

lazy_static! {
    pub static ref EXECUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "skyforge_executions_total",
        "Completed executions by tier and outcome",
        &["tier", "outcome"]
    )
    .expect("skyforge_executions_total can be registered");

    pub static ref EXECUTION_DURATION: HistogramVec = register_histogram_vec!(
        "skyforge_execution_duration_seconds",
        "Execution wall time by tier",
        &["tier"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]
    )
    .expect("skyforge_execution_duration_seconds can be registered");

    pub static ref REQUESTS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "skyforge_requests_rejected_total",
        "Requests rejected before execution",
        &["reason"]
    )
    .expect("skyforge_requests_rejected_total can be registered");
}

pub fn record_execution(result: &ExecutionResult) {
    let tier = result.tier_used.as_str();
    let outcome = if result.timed_out {
        "timeout"
    } else if result.success() {
        "success"
    } else {
        "failure"
    };

    EXECUTIONS_TOTAL.with_label_values(&[tier, outcome]).inc();
    EXECUTION_DURATION
        .with_label_values(&[tier])
        .observe(result.duration_ms as f64 / 1000.0);
}

/// Text exposition of the default registry
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyforge_common::types::Tier;

    #[test]
    fn test_record_execution_shows_up_in_exposition() {
        record_execution(&ExecutionResult {
            stdout: "2".into(),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 120,
            tier_used: Tier::FallbackA,
            timed_out: false,
        });

        let text = render().unwrap();
        assert!(text.contains("skyforge_executions_total"));
        assert!(text.contains(r#"tier="fallbackA""#));
        assert!(text.contains("skyforge_execution_duration_seconds_bucket"));
    }

    #[test]
    fn test_killed_run_is_counted_as_timeout() {
        let before = EXECUTIONS_TOTAL
            .with_label_values(&["primary", "timeout"])
            .get();

        record_execution(&ExecutionResult {
            stdout: String::new(),
            stderr: "Execution timeout exceeded (20 seconds)".into(),
            exit_code: 137,
            duration_ms: 20_000,
            tier_used: Tier::Primary,
            timed_out: true,
        });

        let after = EXECUTIONS_TOTAL
            .with_label_values(&["primary", "timeout"])
            .get();
        assert_eq!(after, before + 1);
    }
}
