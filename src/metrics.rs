use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("tools_requests_total", "Total number of tool requests").unwrap();
    pub static ref ADMISSIONS: CounterVec = register_counter_vec!(
        "tools_admissions_total",
        "Admission decisions by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref STORE_FALLBACKS: Counter = register_counter!(
        "quota_store_fallbacks_total",
        "Increments served by the in-memory store after a durable store failure"
    )
    .unwrap();
    pub static ref FALLBACK_ENTRIES: Gauge =
        register_gauge!("quota_fallback_entries", "Counters held by the in-memory store").unwrap();
    pub static ref COMPLETION_LATENCY: Histogram = register_histogram!(
        "tools_completion_latency_seconds",
        "Completion service latency in seconds"
    )
    .unwrap();
    pub static ref COMPLETION_ERRORS: Counter =
        register_counter!("tools_completion_errors_total", "Failed completion calls").unwrap();
}
