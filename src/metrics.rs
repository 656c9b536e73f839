use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder, register_histogram,
    register_int_counter, register_int_counter_vec,
};


lazy_static! {
    pub static ref API_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "recipe_hub_api_requests_total",
        "API requests by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref SERVER_THROTTLED: IntCounter = register_int_counter!(
        "recipe_hub_server_throttled_total",
        "Requests rejected by the server with 429"
    )
    .unwrap();
    pub static ref API_LATENCY: Histogram = register_histogram!(
        "recipe_hub_api_latency_seconds",
        "API request latency in seconds"
    )
    .unwrap();
    pub static ref THROTTLE_DECISIONS: IntCounterVec = register_int_counter_vec!(
        "recipe_hub_throttle_decisions_total",
        "Client-side throttle decisions",
        &["decision"]
    )
    .unwrap();
    pub static ref SESSION_EVENTS: IntCounterVec = register_int_counter_vec!(
        "recipe_hub_session_events_total",
        "Session lifecycle events",
        &["event"]
    )
    .unwrap();
}

// Text exposition of everything registered in the default registry
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
