use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("admission_requests_total", "Total number of requests").unwrap();
    pub static ref ADMITTED_TOTAL: Counter =
        register_counter!("admission_admitted_total", "Total admitted requests").unwrap();
    pub static ref REJECTED_RATE_LIMITED_TOTAL: Counter = register_counter!(
        "admission_rejected_rate_limited_total",
        "Total requests rejected by the rate check"
    )
    .unwrap();
    pub static ref REJECTED_BANNED_TOTAL: Counter = register_counter!(
        "admission_rejected_banned_total",
        "Total requests rejected because the client is banned"
    )
    .unwrap();
    pub static ref FAIL_OPEN_TOTAL: Counter = register_counter!(
        "admission_fail_open_total",
        "Total requests admitted because of an internal fault"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "admission_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge = register_gauge!(
        "admission_tracked_clients",
        "Clients with requests inside the retention window"
    )
    .unwrap();
    pub static ref ACTIVE_BANS: Gauge =
        register_gauge!("admission_active_bans", "Currently active bans").unwrap();
}
