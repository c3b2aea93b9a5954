use std::collections::HashMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;
use tracing::info;

use super::same_listener;
use super::Listener;
use super::ListenerBinding;
use crate::filter::FilterChain;
use crate::ConfigContent;
use crate::ConfigKey;

/// Key -> listener bindings.
///
/// Owned by the poller task, which is the only writer; no internal locking.
pub(crate) struct ListenerRegistry {
    client: Arc<str>,
    filters: FilterChain,
    default_executor: Handle,
    bindings: HashMap<ConfigKey, Vec<ListenerBinding>>,
}

impl ListenerRegistry {
    pub(crate) fn new(
        client: Arc<str>,
        filters: FilterChain,
        default_executor: Handle,
    ) -> Self {
        Self {
            client,
            filters,
            default_executor,
            bindings: HashMap::new(),
        }
    }

    /// Binds `listener` to `key`.
    ///
    /// A listener already bound to `key` is left as is and `false` is
    /// returned. When `current` is known, a new binding whose seed differs
    /// from it is handed that content right away.
    pub(crate) fn add(
        &mut self,
        key: &ConfigKey,
        listener: Arc<dyn Listener>,
        seed_fingerprint: Option<String>,
        current: Option<&ConfigContent>,
    ) -> bool {
        let bindings = self.bindings.entry(key.clone()).or_default();
        if bindings.iter().any(|b| same_listener(b.listener(), &listener)) {
            debug!(client = %self.client, key = %key, "listener already bound");
            return false;
        }

        let binding = ListenerBinding::spawn(
            self.client.clone(),
            key.clone(),
            listener,
            seed_fingerprint,
            self.filters.clone(),
            &self.default_executor,
        );
        if let Some(current) = current {
            binding.offer(current);
        }
        bindings.push(binding);
        info!(client = %self.client, key = %key, listeners = bindings.len(), "[add-listener] ok");
        true
    }

    /// Unbinds `listener` from `key` and returns how many bindings remain.
    pub(crate) fn remove(
        &mut self,
        key: &ConfigKey,
        listener: &Arc<dyn Listener>,
    ) -> usize {
        let Some(bindings) = self.bindings.get_mut(key) else {
            return 0;
        };
        let before = bindings.len();
        bindings.retain(|b| !same_listener(b.listener(), listener));
        let remaining = bindings.len();
        if remaining < before {
            info!(client = %self.client, key = %key, remaining, "[remove-listener] ok");
        }
        if remaining == 0 {
            self.bindings.remove(key);
        }
        remaining
    }

    /// Offers `content` to every binding of `key`; returns how many queued it.
    pub(crate) fn notify(
        &self,
        key: &ConfigKey,
        content: &ConfigContent,
    ) -> usize {
        self.bindings
            .get(key)
            .map(|bindings| bindings.iter().filter(|b| b.offer(content)).count())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn listener_count(
        &self,
        key: &ConfigKey,
    ) -> usize {
        self.bindings.get(key).map(Vec::len).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn bindings(
        &self,
        key: &ConfigKey,
    ) -> &[ListenerBinding] {
        self.bindings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drops every binding, stopping all delivery workers
    pub(crate) fn clear(&mut self) {
        self.bindings.clear();
    }
}
