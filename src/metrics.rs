use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and describe the capture metrics.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "reqtrail_captured_requests_total",
        "Requests captured by the middleware"
    );
    describe_counter!(
        "reqtrail_captured_queries_total",
        "SQL queries correlated with a captured request"
    );
    describe_counter!(
        "reqtrail_store_writes_total",
        "Request log writes by outcome"
    );
    describe_histogram!(
        "reqtrail_store_write_duration_seconds",
        "Time spent persisting one request log"
    );
    describe_gauge!("reqtrail_info", "Build information");

    gauge!("reqtrail_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a captured request
pub fn record_capture(method: &str, status: u16) {
    counter!(
        "reqtrail_captured_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record one query appended to a trace buffer
pub fn record_captured_query() {
    counter!("reqtrail_captured_queries_total").increment(1);
}

/// Record the outcome of a store write
pub fn record_store_write(outcome: &'static str, duration: Duration) {
    counter!("reqtrail_store_writes_total", "outcome" => outcome).increment(1);
    histogram!("reqtrail_store_write_duration_seconds").record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        init_metric_descriptions();

        record_capture("GET", 200);
        record_captured_query();
        record_store_write("ok", Duration::from_millis(2));
        record_store_write("error", Duration::from_millis(1));
    }
}
