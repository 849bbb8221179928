//! HTTP server metrics.
//!
//! # Metrics
//! - `http.server.request.duration` (histogram, seconds): by method, route, status
//! - `http.server.active_requests` (up-down counter): requests in flight, by method

use opentelemetry::metrics::{Histogram, Meter, UpDownCounter};

const REQUEST_DURATION: &str = "http.server.request.duration";
const ACTIVE_REQUESTS: &str = "http.server.active_requests";

/// Instruments recorded once per request.
#[derive(Clone)]
pub struct HttpServerMetrics {
    pub request_duration: Histogram<f64>,
    pub active_requests: UpDownCounter<i64>,
}

impl HttpServerMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            request_duration: meter
                .f64_histogram(REQUEST_DURATION)
                .with_unit("s")
                .with_description("Duration of HTTP server requests.")
                .build(),
            active_requests: meter
                .i64_up_down_counter(ACTIVE_REQUESTS)
                .with_unit("{request}")
                .with_description("Number of active HTTP server requests.")
                .build(),
        }
    }
}
