use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ConfigClientBuilder;
use super::ConfigService;
use super::PublishOptions;
use super::ServerStatus;
use crate::cache::LocalConfigStore;
use crate::constants::CONFIG_CONTROLLER_PATH;
use crate::filter::FilterChain;
use crate::filter::FilterDirection;
use crate::listener::Listener;
use crate::model::check_content;
use crate::poller::ConfigFetcher;
use crate::poller::ConfigPoller;
use crate::poller::WatchSeed;
use crate::transport::pair;
use crate::transport::HttpAgent;
use crate::transport::Pairs;
use crate::transport::HTTP_FORBIDDEN;
use crate::utils::truncate_content;
use crate::ClientConfig;
use crate::ConfigContent;
use crate::ConfigKey;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// Tier a read was answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Failover,
    Live,
    Snapshot,
}

/// Configuration client over one configuration service.
///
/// Cheap to clone; all clones share the same poller, listeners and local
/// cache. Polling stops with [`shutdown`](ConfigService::shutdown) or when
/// the last clone is dropped.
///
/// Created through the [`builder()`](ConfigClient::builder) method
#[derive(Clone)]
pub struct ConfigClient {
    pub(super) inner: Arc<ClientInner>,
}

pub(super) struct ClientInner {
    pub(super) name: String,
    pub(super) config: ClientConfig,
    pub(super) agent: Arc<dyn HttpAgent>,
    pub(super) store: Arc<LocalConfigStore>,
    pub(super) fetcher: Arc<ConfigFetcher>,
    pub(super) filters: FilterChain,
    pub(super) poller: ConfigPoller,
}

impl ConfigClient {
    /// Create a configured client builder
    ///
    /// `config` is validated by [`build()`](ConfigClientBuilder::build).
    pub fn builder(config: ClientConfig) -> ConfigClientBuilder {
        ConfigClientBuilder::new(config)
    }

    /// Logical name of this client; also the name of its cache root
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Failover and snapshot records of this client
    pub fn local_store(&self) -> &LocalConfigStore {
        &self.inner.store
    }

    fn key(
        &self,
        data_id: &str,
        group: &str,
    ) -> Result<ConfigKey> {
        ConfigKey::new(data_id, group, &self.inner.config.namespace)
    }

    /// Raw content of `key` and the tier that answered
    async fn resolve(
        &self,
        key: &ConfigKey,
        timeout: Duration,
    ) -> Result<(ConfigContent, Tier)> {
        let name = &self.inner.name;

        if let Some(content) = self.inner.store.get_failover(key).await {
            warn!(
                client = %name,
                key = %key,
                content = %truncate_content(&content),
                "[get-config] get failover ok"
            );
            return Ok((ConfigContent::new(content), Tier::Failover));
        }

        match self.inner.fetcher.fetch(key, timeout).await {
            Ok(content) => return Ok((content, Tier::Live)),
            Err(e) if e.is_access_denied() => return Err(e),
            Err(e) => {
                warn!(client = %name, key = %key, error = %e, "[get-config] get from server error")
            }
        }

        let content = self.inner.store.get_snapshot(key).await.unwrap_or_default();
        warn!(
            client = %name,
            key = %key,
            content = %truncate_content(&content),
            "[get-config] get snapshot ok"
        );
        Ok((ConfigContent::new(content), Tier::Snapshot))
    }

    fn apply_inbound(
        &self,
        key: &ConfigKey,
        content: ConfigContent,
    ) -> Result<String> {
        self.inner
            .filters
            .apply(key, FilterDirection::Inbound, content.into_content())
    }

    /// Sends a write and maps its outcome: `Ok(true)` on 200, `Err` on 403,
    /// `Ok(false)` for everything else.
    async fn write(
        &self,
        op: WriteOp,
        key: &ConfigKey,
        headers: Pairs,
        params: Pairs,
    ) -> Result<bool> {
        let name = &self.inner.name;
        let timeout = self.inner.config.write_timeout();
        let encode = &self.inner.config.encode;

        let request = match op {
            WriteOp::Publish => {
                self.inner
                    .agent
                    .http_post(CONFIG_CONTROLLER_PATH, &headers, &params, encode, timeout)
            }
            WriteOp::Remove => {
                self.inner
                    .agent
                    .http_delete(CONFIG_CONTROLLER_PATH, &headers, &params, encode, timeout)
            }
        };
        let result = match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout(timeout).into()),
        };

        let op = op.as_str();
        match result {
            Ok(result) if result.is_ok() => {
                info!(client = %name, key = %key, "[{op}] ok");
                Ok(true)
            }
            Ok(result) if result.code == HTTP_FORBIDDEN => {
                warn!(client = %name, key = %key, status = result.code, "[{op}] no right");
                Err(Error::AccessDenied {
                    status: result.code,
                    message: result.content,
                })
            }
            Ok(result) => {
                warn!(
                    client = %name,
                    key = %key,
                    status = result.code,
                    msg = %result.content,
                    "[{op}] error"
                );
                Ok(false)
            }
            Err(e) => {
                warn!(client = %name, key = %key, error = %e, "[{op}] error");
                Ok(false)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteOp {
    Publish,
    Remove,
}

impl WriteOp {
    fn as_str(self) -> &'static str {
        match self {
            WriteOp::Publish => "publish",
            WriteOp::Remove => "remove",
        }
    }
}

#[async_trait]
impl ConfigService for ConfigClient {
    async fn get_config(
        &self,
        data_id: &str,
        group: &str,
        timeout: Duration,
    ) -> Result<String> {
        let key = self.key(data_id, group)?;
        let (content, _) = self.resolve(&key, timeout).await?;
        self.apply_inbound(&key, content)
    }

    async fn get_config_and_sign_listener(
        &self,
        data_id: &str,
        group: &str,
        timeout: Duration,
        listener: Arc<dyn Listener>,
    ) -> Result<String> {
        let key = self.key(data_id, group)?;
        let (content, tier) = self.resolve(&key, timeout).await?;
        let seed = WatchSeed {
            fingerprint: content.fingerprint().to_string(),
            live: (tier == Tier::Live).then(|| content.clone()),
        };
        let returned = self.apply_inbound(&key, content)?;
        self.inner.poller.watch(key, listener, Some(seed)).await?;
        Ok(returned)
    }

    async fn add_listener(
        &self,
        data_id: &str,
        group: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<()> {
        let key = self.key(data_id, group)?;
        self.inner.poller.watch(key, listener, None).await
    }

    async fn remove_listener(
        &self,
        data_id: &str,
        group: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<()> {
        let key = self.key(data_id, group)?;
        self.inner.poller.unwatch(key, listener).await
    }

    async fn publish_config(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
    ) -> Result<bool> {
        self.publish_config_with(data_id, group, content, PublishOptions::default())
            .await
    }

    async fn publish_config_with(
        &self,
        data_id: &str,
        group: &str,
        content: &str,
        options: PublishOptions,
    ) -> Result<bool> {
        let key = self.key(data_id, group)?;
        check_content(content)?;
        let content = self
            .inner
            .filters
            .apply(&key, FilterDirection::Outbound, content.to_string())?;
        debug!(
            client = %self.inner.name,
            key = %key,
            content = %truncate_content(&content),
            "[publish]"
        );

        let mut params = vec![
            pair("dataId", key.data_id()),
            pair("group", key.group()),
            pair("content", content),
        ];
        if key.has_tenant() {
            params.push(pair("tenant", key.tenant()));
        }
        if let Some(app_name) = options.app_name {
            params.push(pair("appName", app_name));
        }
        if let Some(tag) = options.tag {
            params.push(pair("tag", tag));
        }
        if let Some(config_type) = options.config_type {
            params.push(pair("type", config_type));
        }
        let mut headers = Pairs::new();
        if let Some(beta_ips) = options.beta_ips {
            headers.push(pair("betaIps", beta_ips));
        }

        self.write(WriteOp::Publish, &key, headers, params).await
    }

    async fn remove_config(
        &self,
        data_id: &str,
        group: &str,
    ) -> Result<bool> {
        let key = self.key(data_id, group)?;
        let mut params = vec![pair("dataId", key.data_id()), pair("group", key.group())];
        if key.has_tenant() {
            params.push(pair("tenant", key.tenant()));
        }

        let removed = self.write(WriteOp::Remove, &key, Pairs::new(), params).await?;
        if removed {
            // save_snapshot logs its own failures
            let _ = self.inner.store.save_snapshot(&key, "").await;
            if let Err(e) = self.inner.poller.reset_cursor(key.clone()).await {
                warn!(client = %self.inner.name, key = %key, error = %e, "[remove] cursor not reset");
            }
        }
        Ok(removed)
    }

    fn get_server_status(&self) -> ServerStatus {
        if self.inner.poller.is_healthy() {
            ServerStatus::Up
        } else {
            ServerStatus::Down
        }
    }

    async fn shutdown(&self) {
        info!(client = %self.inner.name, "shutting down");
        self.inner.poller.shutdown().await;
    }
}
