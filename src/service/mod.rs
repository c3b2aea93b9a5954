//! Synchronization facade
//!
//! Provides the public entry points of the configuration client:
//! - [`ConfigService`] - Capability set (get/publish/remove/listen)
//! - [`ConfigClient`] - Implementation over an [`HttpAgent`](crate::transport::HttpAgent)
//! - [`ConfigClientBuilder`] - Configurable client construction
//!
//! # Basic Usage
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use d_config::{ClientConfig, ConfigClient, ConfigService};
//!
//! let config = ClientConfig::with_server_addr("127.0.0.1:8848").validate()?;
//! let client = ConfigClient::builder(config).agent(my_agent).build().await?;
//!
//! let content = client
//!     .get_config("app.yaml", "DEFAULT_GROUP", Duration::from_secs(3))
//!     .await?;
//! client
//!     .add_listener("app.yaml", "DEFAULT_GROUP", Arc::new(|c: &str| println!("{c}")))
//!     .await?;
//! ```

mod builder;
mod client;

pub use builder::*;
pub use client::*;


use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::listener::Listener;
use crate::Result;

/// Reachability of the configuration service as seen by the change poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Up,
    Down,
}

impl fmt::Display for ServerStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ServerStatus::Up => write!(f, "UP"),
            ServerStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// Optional attributes of a publish request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub app_name: Option<String>,
    pub tag: Option<String>,
    /// Comma separated client addresses of a beta (gray) release
    pub beta_ips: Option<String>,
    /// Content type hint, e.g. `yaml` or `properties`
    pub config_type: Option<String>,
}

#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Content of `data_id`/`group`, resolved failover -> live -> snapshot.
    ///
    /// Returns an empty string when no tier holds a value.
    ///
    /// # Errors
    /// - [`crate::Error::Parameter`] for an invalid key
    /// - [`crate::Error::AccessDenied`] when the server refuses the read
    /// - [`crate::Error::Filter`] when an inbound filter rejects the content
    async fn get_config(
        &self,
        data_id: &str,
        group: &str,
        timeout: Duration,
    ) -> Result<String>;

    /// [`get_config`](ConfigService::get_config), then binds `listener`
    /// seeded with the returned content: it is only called on a later change.
    async fn get_config_and_sign_listener(
        &self,
        data_id: &str,
        group: &str,
        timeout: Duration,
        listener: Arc<dyn Listener>,
    ) -> Result<String>;

    /// Binds `listener` and makes sure the key is watched. Binding the same
    /// listener twice is a no-op.
    async fn add_listener(
        &self,
        data_id: &str,
        group: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<()>;

    async fn remove_listener(
        &self,
        data_id: &str,
        group: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<()>;

    /// `true` only when the server accepted the write.
    ///
    /// # Errors
    /// - [`crate::Error::Parameter`] for an invalid key or blank content
    /// - [`crate::Error::AccessDenied`] on HTTP 403
    /// - [`crate::Error::Filter`] when an outbound filter rejects the content
    async fn publish_config(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
    ) -> Result<bool>;

    async fn publish_config_with(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
        options: PublishOptions,
    ) -> Result<bool>;

    /// `true` only when the server accepted the delete
    async fn remove_config(
        &self,
        data_id: &str,
        group: &str,
    ) -> Result<bool>;

    fn get_server_status(&self) -> ServerStatus;

    /// Stops change polling and all listener deliveries
    async fn shutdown(&self);
}
