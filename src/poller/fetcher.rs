use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::cache::LocalConfigStore;
use crate::constants::CONFIG_CONTROLLER_PATH;
use crate::transport::pair;
use crate::transport::HttpAgent;
use crate::transport::Pairs;
use crate::transport::HTTP_CONFLICT;
use crate::transport::HTTP_FORBIDDEN;
use crate::transport::HTTP_NOT_FOUND;
use crate::transport::HTTP_OK;
use crate::utils::truncate_content;
use crate::ConfigContent;
use crate::ConfigKey;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// Live reads of full content, shared by the facade and the poller.
///
/// Every answered read refreshes the snapshot record of the key: the content
/// on 200, an empty record on 404.
pub(crate) struct ConfigFetcher {
    client: String,
    agent: Arc<dyn HttpAgent>,
    store: Arc<LocalConfigStore>,
    encode: String,
}

impl ConfigFetcher {
    pub(crate) fn new(
        client: String,
        agent: Arc<dyn HttpAgent>,
        store: Arc<LocalConfigStore>,
        encode: String,
    ) -> Self {
        Self {
            client,
            agent,
            store,
            encode,
        }
    }

    /// Raw (unfiltered) server content of `key`, empty when the server does
    /// not hold it.
    pub(crate) async fn fetch(
        &self,
        key: &ConfigKey,
        timeout: Duration,
    ) -> Result<ConfigContent> {
        let mut params = vec![pair("dataId", key.data_id()), pair("group", key.group())];
        if key.has_tenant() {
            params.push(pair("tenant", key.tenant()));
        }

        let headers = Pairs::new();
        let request = self
            .agent
            .http_get(CONFIG_CONTROLLER_PATH, &headers, &params, &self.encode, timeout);
        let result = match tokio::time::timeout(timeout, request).await {
            Ok(result) => result?,
            Err(_) => return Err(NetworkError::Timeout(timeout).into()),
        };

        match result.code {
            HTTP_OK => {
                let content = ConfigContent::new(result.content);
                self.save_snapshot(key, content.content()).await;
                debug!(
                    client = %self.client,
                    key = %key,
                    md5 = content.fingerprint(),
                    content = %truncate_content(content.content()),
                    "[get-config] live read"
                );
                Ok(content)
            }
            HTTP_NOT_FOUND => {
                self.save_snapshot(key, "").await;
                debug!(client = %self.client, key = %key, "[get-config] not found on server");
                Ok(ConfigContent::empty())
            }
            HTTP_CONFLICT => {
                error!(client = %self.client, key = %key, "[get-config] data being modified");
                Err(Error::Server {
                    status: HTTP_CONFLICT,
                    message: format!("{key} is being modified"),
                })
            }
            HTTP_FORBIDDEN => {
                error!(client = %self.client, key = %key, "[get-config] no right");
                Err(Error::AccessDenied {
                    status: HTTP_FORBIDDEN,
                    message: result.content,
                })
            }
            status => {
                error!(client = %self.client, key = %key, status, "[get-config] error");
                Err(Error::Server {
                    status,
                    message: result.content,
                })
            }
        }
    }

    async fn save_snapshot(
        &self,
        key: &ConfigKey,
        content: &str,
    ) {
        // a failed snapshot write never fails the read itself
        if let Err(e) = self.store.save_snapshot(key, content).await {
            warn!(client = %self.client, key = %key, error = %e, "[snapshot] not refreshed");
        }
    }
}
