use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;


lazy_static! {
    pub static ref HTTP_REQUEST_LATENCY_METRIC: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_latency_ms",
            "Histogram of configuration service request latency in ms"
        )
        .buckets(exponential_buckets(1.0, 2.0, 17).expect("valid buckets")),
        &["method", "status"]
    )
    .expect("metric can not be created");

    pub static ref HTTP_REQUEST_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("http_request_failures", "Requests that failed without an answer"),
        &["method"]
    )
    .expect("Should succeed to create metric");

    pub static ref POLL_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("poll_failures", "Failed long-polling cycles"),
        &["client"]
    )
    .expect("Should succeed to create metric");

    pub static ref LISTENER_NOTIFICATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("listener_notifications", "Listener deliveries by outcome"),
        &["client", "outcome"]
    )
    .expect("Should succeed to create metric");

    pub static ref WATCHED_KEYS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("watched_keys", "Keys currently included in poll batches"),
        &["client"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new_custom(Some("dconfig".to_string()), None)
            .expect("registry can be created");
        register_custom_metrics(&registry);
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_LATENCY_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(HTTP_REQUEST_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(POLL_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(LISTENER_NOTIFICATIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCHED_KEYS.clone()))
        .expect("collector can be registered");
}

/// Renders the client's metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
        return String::default();
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
