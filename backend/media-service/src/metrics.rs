use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder,
};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "media_service_http_requests_total",
            "Total HTTP requests handled by media-service",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create media_service_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register media_service_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "media_service_http_request_duration_seconds",
            "HTTP request latency for media-service",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
        ]),
        &["method", "path", "status"],
    )
    .expect("failed to create media_service_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register media_service_http_request_duration_seconds");
    histogram
});

static INGEST_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "media_service_ingest_runs_total",
            "Completed ingestion runs by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create media_service_ingest_runs_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register media_service_ingest_runs_total");
    counter
});

static INGEST_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "media_service_ingest_in_flight",
        "Ingestion runs currently executing",
    )
    .expect("failed to create media_service_ingest_in_flight");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register media_service_ingest_in_flight");
    gauge
});

static INGEST_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "media_service_ingest_duration_seconds",
            "Wall time of one ingestion run",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
    )
    .expect("failed to create media_service_ingest_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register media_service_ingest_duration_seconds");
    histogram
});

static RELAY_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "media_service_relay_events_total",
            "Events published on video progress channels",
        ),
        &["event"],
    )
    .expect("failed to create media_service_relay_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register media_service_relay_events_total");
    counter
});

static ONLINE_USERS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("media_service_online_users", "Users with a live presence socket")
        .expect("failed to create media_service_online_users");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register media_service_online_users");
    gauge
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

/// Tracks one ingestion run; records outcome and duration when finished
pub struct IngestRunGuard {
    started: std::time::Instant,
}

impl IngestRunGuard {
    pub fn start() -> Self {
        INGEST_IN_FLIGHT.inc();
        Self {
            started: std::time::Instant::now(),
        }
    }

    pub fn finish(self, outcome: &str) {
        INGEST_RUNS_TOTAL.with_label_values(&[outcome]).inc();
        INGEST_DURATION_SECONDS.observe(self.started.elapsed().as_secs_f64());
        // Drop decrements the gauge
    }
}

impl Drop for IngestRunGuard {
    fn drop(&mut self) {
        INGEST_IN_FLIGHT.dec();
    }
}

pub fn record_relay_event(event: &str) {
    RELAY_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn set_online_users(count: usize) {
    ONLINE_USERS.set(count as i64);
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
