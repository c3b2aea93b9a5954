use std::sync::Arc;

use config::ConfigError;
use tracing::info;

use super::ClientInner;
use super::ConfigClient;
use crate::cache::LocalConfigStore;
use crate::filter::ConfigFilter;
use crate::filter::FilterChain;
use crate::poller::ConfigFetcher;
use crate::poller::ConfigPoller;
use crate::poller::PollContext;
use crate::transport::HttpAgent;
use crate::transport::MetricsHttpAgent;
use crate::ClientConfig;
use crate::Error;
use crate::Result;

pub struct ConfigClientBuilder {
    config: ClientConfig,
    agent: Option<Arc<dyn HttpAgent>>,
    filters: Vec<Arc<dyn ConfigFilter>>,
    enable_metrics: bool,
}

impl ConfigClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            agent: None,
            filters: Vec::new(),
            enable_metrics: true,
        }
    }

    /// Transport used for every request (required)
    pub fn agent(
        mut self,
        agent: Arc<dyn HttpAgent>,
    ) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Appends one step to the content filter chain
    pub fn filter(
        mut self,
        filter: Arc<dyn ConfigFilter>,
    ) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replaces the whole content filter chain
    pub fn filters(
        mut self,
        filters: Vec<Arc<dyn ConfigFilter>>,
    ) -> Self {
        self.filters = filters;
        self
    }

    /// Record request latency and failures of the agent (default: enabled)
    pub fn enable_metrics(
        mut self,
        enable: bool,
    ) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Validates the configuration and starts the change poller.
    ///
    /// Must be called inside a tokio runtime: that runtime hosts the poller
    /// and delivers to listeners without their own executor.
    pub async fn build(self) -> Result<ConfigClient> {
        let config = self.config.validate()?;
        let agent = self
            .agent
            .ok_or_else(|| Error::Config(ConfigError::Message("an HttpAgent is required".into())))?;
        let name = resolve_name(&config, agent.as_ref());
        let agent: Arc<dyn HttpAgent> = if self.enable_metrics {
            Arc::new(MetricsHttpAgent::new(agent))
        } else {
            agent
        };

        let store = Arc::new(LocalConfigStore::new(&config.cache_dir, &name));
        let fetcher = Arc::new(ConfigFetcher::new(
            name.clone(),
            agent.clone(),
            store.clone(),
            config.encode.clone(),
        ));
        let filters = FilterChain::new(self.filters);
        let poller = ConfigPoller::spawn(
            PollContext {
                client: Arc::from(name.as_str()),
                agent: agent.clone(),
                fetcher: fetcher.clone(),
                store: store.clone(),
                poll: config.poll.clone(),
                retry: config.retry,
                encode: config.encode.clone(),
            },
            filters.clone(),
        );

        info!(
            client = %name,
            server_addr = %config.server_addr,
            namespace = %config.namespace,
            cache_root = %store.root().display(),
            ?filters,
            "config client started"
        );
        Ok(ConfigClient {
            inner: Arc::new(ClientInner {
                name,
                config,
                agent,
                store,
                fetcher,
                filters,
                poller,
            }),
        })
    }
}

/// Explicit name, else a path-safe agent name, else one derived from the
/// server address.
pub(super) fn resolve_name(
    config: &ClientConfig,
    agent: &dyn HttpAgent,
) -> String {
    if config.name.is_some() {
        return config.client_name();
    }
    let agent_name = agent.name();
    let agent_name = agent_name.trim();
    if !agent_name.is_empty() && !agent_name.contains(['/', '\\']) && !agent_name.contains("..") {
        return agent_name.to_string();
    }
    config.client_name()
}
