//! Transport port towards the configuration service.
//!
//! The client never speaks HTTP itself. Applications plug an implementation
//! of [`HttpAgent`] in (server list resolution, connection pooling, TLS and
//! authentication all live behind it). Network failures must be returned as
//! `Err`, distinct from a non-2xx answer, which is an `Ok(HttpResult)`.

mod metrics_agent;
pub use metrics_agent::*;


use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

pub const HTTP_OK: u16 = 200;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_CONFLICT: u16 = 409;

/// Ordered `name=value` pairs for headers or request parameters
pub type Pairs = Vec<(String, String)>;

/// Status code and body of one answered request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResult {
    pub code: u16,
    pub content: String,
}

impl HttpResult {
    pub fn new(
        code: u16,
        content: impl Into<String>,
    ) -> Self {
        Self {
            code,
            content: content.into(),
        }
    }

    pub fn ok(content: impl Into<String>) -> Self {
        Self::new(HTTP_OK, content)
    }

    pub fn is_ok(&self) -> bool {
        self.code == HTTP_OK
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpAgent: Send + Sync + 'static {
    async fn http_get(
        &self,
        path: &str,
        headers: &Pairs,
        params: &Pairs,
        encoding: &str,
        timeout: Duration,
    ) -> Result<HttpResult>;

    async fn http_post(
        &self,
        path: &str,
        headers: &Pairs,
        params: &Pairs,
        encoding: &str,
        timeout: Duration,
    ) -> Result<HttpResult>;

    async fn http_delete(
        &self,
        path: &str,
        headers: &Pairs,
        params: &Pairs,
        encoding: &str,
        timeout: Duration,
    ) -> Result<HttpResult>;

    /// Logical name used in diagnostics and as the local cache root
    fn name(&self) -> String;
}

pub(crate) fn pair(
    name: &str,
    value: impl Into<String>,
) -> (String, String) {
    (name.to_string(), value.into())
}
