use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;

use super::HttpAgent;
use super::HttpResult;
use super::Pairs;
use crate::metrics::HTTP_REQUEST_FAILURES;
use crate::metrics::HTTP_REQUEST_LATENCY_METRIC;
use crate::Result;

/// Decorator recording latency and failures of every request made through
/// the wrapped agent.
pub struct MetricsHttpAgent {
    inner: Arc<dyn HttpAgent>,
}

impl MetricsHttpAgent {
    pub fn new(inner: Arc<dyn HttpAgent>) -> Self {
        Self { inner }
    }

    fn record(
        method: &'static str,
        started: Instant,
        result: &Result<HttpResult>,
    ) {
        match result {
            Ok(r) => {
                HTTP_REQUEST_LATENCY_METRIC
                    .with_label_values(&[method, status_class(r.code)])
                    .observe(started.elapsed().as_secs_f64() * 1000.0);
            }
            Err(_) => {
                HTTP_REQUEST_FAILURES.with_label_values(&[method]).inc();
            }
        }
    }
}

#[async_trait]
impl HttpAgent for MetricsHttpAgent {
    async fn http_get(
        &self,
        path: &str,
        headers: &Pairs,
        params: &Pairs,
        encoding: &str,
        timeout: Duration,
    ) -> Result<HttpResult> {
        let started = Instant::now();
        let result = self.inner.http_get(path, headers, params, encoding, timeout).await;
        Self::record("GET", started, &result);
        result
    }

    async fn http_post(
        &self,
        path: &str,
        headers: &Pairs,
        params: &Pairs,
        encoding: &str,
        timeout: Duration,
    ) -> Result<HttpResult> {
        let started = Instant::now();
        let result = self.inner.http_post(path, headers, params, encoding, timeout).await;
        Self::record("POST", started, &result);
        result
    }

    async fn http_delete(
        &self,
        path: &str,
        headers: &Pairs,
        params: &Pairs,
        encoding: &str,
        timeout: Duration,
    ) -> Result<HttpResult> {
        let started = Instant::now();
        let result = self.inner.http_delete(path, headers, params, encoding, timeout).await;
        Self::record("DELETE", started, &result);
        result
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}

fn status_class(code: u16) -> &'static str {
    match code {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
