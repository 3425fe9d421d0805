use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Histogram,
    HistogramVec,
};

pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "catalog_requests_total",
        "Requests by route and outcome",
        &["route", "outcome"]
    )
    .unwrap()
});

pub static REQUEST_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "catalog_request_seconds",
        "End-to-end request durations",
        &["route"]
    )
    .unwrap()
});

pub static BACKEND_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "catalog_backend_seconds",
        "Elasticsearch round-trip durations"
    )
    .unwrap()
});
