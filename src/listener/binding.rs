use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::Listener;
use crate::filter::FilterChain;
use crate::filter::FilterDirection;
use crate::metrics::LISTENER_NOTIFICATIONS;
use crate::utils::truncate_content;
use crate::ConfigContent;
use crate::ConfigKey;

/// One listener bound to one key.
///
/// Dropping the binding stops its worker: queued contents that were not yet
/// handed to the listener are discarded.
pub(crate) struct ListenerBinding {
    listener: Arc<dyn Listener>,
    /// Fingerprint of the raw content last handed to the listener, empty when
    /// nothing was delivered yet
    last_delivered: Arc<Mutex<String>>,
    queue: mpsc::UnboundedSender<ConfigContent>,
    cancel: CancellationToken,
}

impl ListenerBinding {
    pub(crate) fn spawn(
        client: Arc<str>,
        key: ConfigKey,
        listener: Arc<dyn Listener>,
        seed_fingerprint: Option<String>,
        filters: FilterChain,
        default_executor: &Handle,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let last_delivered = Arc::new(Mutex::new(seed_fingerprint.unwrap_or_default()));
        let cancel = CancellationToken::new();
        let executor = listener.executor().unwrap_or_else(|| default_executor.clone());

        let worker = DeliveryWorker {
            client,
            key,
            listener: listener.clone(),
            last_delivered: last_delivered.clone(),
            filters,
            executor: executor.clone(),
            cancel: cancel.clone(),
        };
        executor.spawn(worker.run(rx));

        Self {
            listener,
            last_delivered,
            queue,
            cancel,
        }
    }

    pub(crate) fn listener(&self) -> &Arc<dyn Listener> {
        &self.listener
    }

    #[cfg(test)]
    pub(crate) fn last_delivered(&self) -> String {
        self.last_delivered.lock().clone()
    }

    /// Queues `content` unless the listener already holds it.
    ///
    /// Returns whether the content was queued.
    pub(crate) fn offer(
        &self,
        content: &ConfigContent,
    ) -> bool {
        if *self.last_delivered.lock() == content.fingerprint() {
            return false;
        }
        self.queue.send(content.clone()).is_ok()
    }
}

impl Drop for ListenerBinding {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct DeliveryWorker {
    client: Arc<str>,
    key: ConfigKey,
    listener: Arc<dyn Listener>,
    last_delivered: Arc<Mutex<String>>,
    filters: FilterChain,
    executor: Handle,
    cancel: CancellationToken,
}

impl DeliveryWorker {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<ConfigContent>,
    ) {
        loop {
            let content = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(content) => content,
                    None => break,
                },
            };
            self.deliver(content).await;
        }
        debug!(client = %self.client, key = %self.key, "listener worker stopped");
    }

    async fn deliver(
        &self,
        content: ConfigContent,
    ) {
        // an older queued entry may equal what a newer one already delivered
        if *self.last_delivered.lock() == content.fingerprint() {
            return;
        }

        let filtered = match self
            .filters
            .apply(&self.key, FilterDirection::Inbound, content.content().to_string())
        {
            Ok(filtered) => filtered,
            Err(e) => {
                error!(client = %self.client, key = %self.key, error = %e, "notification dropped by filter");
                LISTENER_NOTIFICATIONS
                    .with_label_values(&[self.client.as_ref(), "failed"])
                    .inc();
                return;
            }
        };

        let listener = self.listener.clone();
        match self
            .executor
            .spawn_blocking(move || listener.on_change(&filtered))
            .await
        {
            Ok(()) => {
                *self.last_delivered.lock() = content.fingerprint().to_string();
                info!(
                    client = %self.client,
                    key = %self.key,
                    md5 = content.fingerprint(),
                    content = %truncate_content(content.content()),
                    "[notify-ok]"
                );
                LISTENER_NOTIFICATIONS
                    .with_label_values(&[self.client.as_ref(), "delivered"])
                    .inc();
            }
            Err(e) => {
                error!(client = %self.client, key = %self.key, error = %e, "[notify-error] listener failed");
                LISTENER_NOTIFICATIONS
                    .with_label_values(&[self.client.as_ref(), "failed"])
                    .inc();
            }
        }
    }
}
