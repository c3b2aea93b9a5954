use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::protocol::build_listening_configs;
use super::protocol::parse_changed_keys;
use super::ConfigFetcher;
use crate::cache::LocalConfigStore;
use crate::config::BackoffPolicy;
use crate::config::PollConfig;
use crate::constants::CONFIG_LISTENER_PATH;
use crate::constants::LONG_POLLING_NO_HANGUP_HEADER;
use crate::constants::LONG_POLLING_TIMEOUT_HEADER;
use crate::constants::PROBE_MODIFY_REQUEST;
use crate::listener::Listener;
use crate::listener::ListenerRegistry;
use crate::metrics::POLL_FAILURES;
use crate::metrics::WATCHED_KEYS;
use crate::transport::pair;
use crate::transport::HttpAgent;
use crate::transport::HTTP_FORBIDDEN;
use crate::ConfigContent;
use crate::ConfigKey;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// Everything a poll cycle needs, shared with in-flight requests
pub(crate) struct PollContext {
    pub(crate) client: Arc<str>,
    pub(crate) agent: Arc<dyn HttpAgent>,
    pub(crate) fetcher: Arc<ConfigFetcher>,
    pub(crate) store: Arc<LocalConfigStore>,
    pub(crate) poll: PollConfig,
    pub(crate) retry: BackoffPolicy,
    pub(crate) encode: String,
}

/// What the caller already knows about a key it starts watching
#[derive(Debug, Clone)]
pub(crate) struct WatchSeed {
    /// Fingerprint of the raw content just returned to the caller
    pub(crate) fingerprint: String,
    /// That raw content, when it came from a live read
    pub(crate) live: Option<ConfigContent>,
}

pub(crate) enum PollerCommand {
    Watch {
        key: ConfigKey,
        listener: Arc<dyn Listener>,
        seed: Option<WatchSeed>,
        ack: oneshot::Sender<()>,
    },
    Unwatch {
        key: ConfigKey,
        listener: Arc<dyn Listener>,
        ack: oneshot::Sender<()>,
    },
    ResetCursor {
        key: ConfigKey,
        ack: oneshot::Sender<()>,
    },
}

/// Poll state of one watched key
struct WatchEntry {
    /// Last content known to match the server
    cursor: ConfigContent,
    /// Not yet answered by any cycle; asks the server not to hold the request
    initializing: bool,
    /// `cursor` was checked against the server at least once
    confirmed: bool,
    /// Changes whenever `cursor` is reset; stale cycle results are dropped
    epoch: u64,
}

/// `(key, fingerprint, initializing)` as sent in one request
type BatchEntry = (ConfigKey, String, bool);
type BatchOutcome = (Vec<ConfigKey>, Result<Vec<ConfigKey>>);

/// Single owner of the watched set, the cursors and the listener registry.
///
/// Everything that mutates them arrives as a [`PollerCommand`], so a cycle
/// result is always applied against a consistent view.
pub(crate) struct PollWorker {
    ctx: Arc<PollContext>,
    entries: HashMap<ConfigKey, WatchEntry>,
    registry: ListenerRegistry,
    commands: mpsc::Receiver<PollerCommand>,
    healthy: Arc<AtomicBool>,
    cancel: CancellationToken,

    failures: u32,
    retry_at: Option<Instant>,
    next_epoch: u64,
    /// A new key must be announced before the in-flight cycle returns
    restart: bool,
}

impl PollWorker {
    pub(crate) fn new(
        ctx: Arc<PollContext>,
        registry: ListenerRegistry,
        commands: mpsc::Receiver<PollerCommand>,
        healthy: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            entries: HashMap::new(),
            registry,
            commands,
            healthy,
            cancel,
            failures: 0,
            retry_at: None,
            next_epoch: 0,
            restart: false,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(client = %self.ctx.client, "change poller started");
        // the cycle after a restart asks every batch for an immediate answer
        let mut prompt_next = false;

        'cycles: loop {
            if self.entries.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break 'cycles,
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => {
                            self.handle(cmd).await;
                            continue 'cycles;
                        }
                        None => break 'cycles,
                    },
                }
            }

            if let Some(deadline) = self.retry_at {
                tokio::select! {
                    _ = self.cancel.cancelled() => break 'cycles,
                    _ = sleep_until(deadline) => self.retry_at = None,
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => {
                            self.handle(cmd).await;
                            continue 'cycles;
                        }
                        None => break 'cycles,
                    },
                }
            }

            let (batches, epochs) = self.prepare_cycle(prompt_next);
            prompt_next = false;
            self.restart = false;
            // answered without a hold, so new keys simply wait for the next cycle
            let prompt = batches
                .iter()
                .all(|batch| batch.iter().any(|(_, _, no_hangup)| *no_hangup));
            let mut cycle = Box::pin(run_cycle(self.ctx.clone(), batches));

            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'cycles,
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => {
                            self.handle(cmd).await;
                            if self.restart && !prompt {
                                debug!(client = %self.ctx.client, "new key watched, restarting cycle");
                                prompt_next = true;
                                break None;
                            }
                        }
                        None => break 'cycles,
                    },
                    outcome = &mut cycle => break Some(outcome),
                }
            };

            if let Some(outcome) = outcome {
                self.apply_cycle(outcome, &epochs).await;
            }
        }

        self.registry.clear();
        self.entries.clear();
        self.update_gauge();
        info!(client = %self.ctx.client, "change poller stopped");
    }

    async fn handle(
        &mut self,
        cmd: PollerCommand,
    ) {
        match cmd {
            PollerCommand::Watch {
                key,
                listener,
                seed,
                ack,
            } => {
                self.watch(key, listener, seed).await;
                let _ = ack.send(());
            }
            PollerCommand::Unwatch { key, listener, ack } => {
                self.unwatch(&key, &listener);
                let _ = ack.send(());
            }
            PollerCommand::ResetCursor { key, ack } => {
                self.reset_cursor(&key);
                let _ = ack.send(());
            }
        }
    }

    async fn watch(
        &mut self,
        key: ConfigKey,
        listener: Arc<dyn Listener>,
        seed: Option<WatchSeed>,
    ) {
        if seed.is_some() && self.entries.contains_key(&key) {
            // The seed and the cursor may differ and either can be the newer
            // one. Re-check against the server; the answer is offered to every
            // binding, which skips it when it matches what it already holds.
            let epoch = self.bump_epoch();
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.initializing = true;
                entry.confirmed = false;
                entry.epoch = epoch;
            }
            self.restart = true;
            debug!(client = %self.ctx.client, key = %key, "seeded listener, re-checking key");
        } else if !self.entries.contains_key(&key) {
            let (cursor, confirmed) = match seed.as_ref().and_then(|s| s.live.clone()) {
                Some(live) => (live, true),
                None => {
                    let snapshot = self.ctx.store.get_snapshot(&key).await.unwrap_or_default();
                    (ConfigContent::new(snapshot), false)
                }
            };
            let epoch = self.bump_epoch();
            info!(client = %self.ctx.client, key = %key, md5 = cursor.fingerprint(), "[subscribe]");
            self.entries.insert(
                key.clone(),
                WatchEntry {
                    cursor,
                    initializing: true,
                    confirmed,
                    epoch,
                },
            );
            self.restart = true;
            self.update_gauge();
        }

        // a seeded binding only hears what the server reports from now on
        let current = self
            .entries
            .get(&key)
            .filter(|entry| entry.confirmed && seed.is_none())
            .map(|entry| entry.cursor.clone());
        self.registry.add(
            &key,
            listener,
            seed.map(|s| s.fingerprint),
            current.as_ref(),
        );
    }

    fn unwatch(
        &mut self,
        key: &ConfigKey,
        listener: &Arc<dyn Listener>,
    ) {
        if self.registry.remove(key, listener) == 0 && self.entries.remove(key).is_some() {
            info!(client = %self.ctx.client, key = %key, "[unsubscribe]");
            self.update_gauge();
        }
    }

    /// Forgets the cursor of `key` so that whatever the server holds next is
    /// treated as new.
    fn reset_cursor(
        &mut self,
        key: &ConfigKey,
    ) {
        let epoch = self.bump_epoch();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.cursor = ConfigContent::empty();
            entry.initializing = true;
            entry.confirmed = false;
            entry.epoch = epoch;
            self.restart = true;
            debug!(client = %self.ctx.client, key = %key, "cursor reset");
        }
    }

    fn prepare_cycle(
        &self,
        prompt: bool,
    ) -> (Vec<Vec<BatchEntry>>, HashMap<ConfigKey, u64>) {
        let mut watched: Vec<(&ConfigKey, &WatchEntry)> = self.entries.iter().collect();
        watched.sort_by(|a, b| a.0.cmp(b.0));

        let epochs = watched
            .iter()
            .map(|(key, entry)| ((*key).clone(), entry.epoch))
            .collect();
        let batches = watched
            .chunks(self.ctx.poll.keys_per_batch)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|(key, entry)| {
                        (
                            (*key).clone(),
                            entry.cursor.fingerprint().to_string(),
                            entry.initializing || prompt,
                        )
                    })
                    .collect()
            })
            .collect();
        (batches, epochs)
    }

    async fn apply_cycle(
        &mut self,
        outcome: Vec<BatchOutcome>,
        epochs: &HashMap<ConfigKey, u64>,
    ) {
        let mut failed = None;
        for (batch, result) in outcome {
            let changed: HashSet<ConfigKey> = match result {
                Ok(changed) => changed.into_iter().collect(),
                Err(e) => {
                    failed = Some(e);
                    continue;
                }
            };

            for key in batch {
                if !self.is_current(&key, epochs) {
                    continue;
                }
                if changed.contains(&key) {
                    if let Err(e) = self.refresh(&key).await {
                        // the server keeps reporting the key until the cursor matches
                        warn!(client = %self.ctx.client, key = %key, error = %e, "[refresh] failed");
                        failed = Some(e);
                    }
                } else {
                    self.confirm(&key);
                }
            }
        }

        match failed {
            Some(e) => self.on_failure(e),
            None => self.on_success(),
        }
    }

    /// Entry still watched and not reset since the cycle was built
    fn is_current(
        &self,
        key: &ConfigKey,
        epochs: &HashMap<ConfigKey, u64>,
    ) -> bool {
        matches!(
            (self.entries.get(key), epochs.get(key)),
            (Some(entry), Some(epoch)) if entry.epoch == *epoch
        )
    }

    async fn refresh(
        &mut self,
        key: &ConfigKey,
    ) -> Result<()> {
        let content = self.ctx.fetcher.fetch(key, self.ctx.retry.timeout()).await?;

        let Some(entry) = self.entries.get_mut(key) else {
            return Ok(());
        };
        entry.initializing = false;
        entry.confirmed = true;
        if entry.cursor.fingerprint() != content.fingerprint() {
            info!(
                client = %self.ctx.client,
                key = %key,
                md5 = content.fingerprint(),
                "[data-received]"
            );
            entry.cursor = content.clone();
        }
        self.registry.notify(key, &content);
        Ok(())
    }

    fn confirm(
        &mut self,
        key: &ConfigKey,
    ) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.initializing = false;
        if entry.confirmed {
            return;
        }
        entry.confirmed = true;
        let current = entry.cursor.clone();
        self.registry.notify(key, &current);
    }

    fn on_failure(
        &mut self,
        e: Error,
    ) {
        self.failures = self.failures.saturating_add(1);
        self.healthy.store(false, Ordering::Release);
        POLL_FAILURES.with_label_values(&[self.ctx.client.as_ref()]).inc();

        let delay = self.ctx.retry.delay_for(self.failures);
        self.retry_at = Some(Instant::now() + delay);
        error!(
            client = %self.ctx.client,
            error = %e,
            failures = self.failures,
            ?delay,
            "long polling error, retrying later"
        );
    }

    fn on_success(&mut self) {
        if self.failures > 0 {
            info!(client = %self.ctx.client, failures = self.failures, "long polling recovered");
        }
        self.failures = 0;
        self.healthy.store(true, Ordering::Release);
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    fn update_gauge(&self) {
        WATCHED_KEYS
            .with_label_values(&[self.ctx.client.as_ref()])
            .set(self.entries.len() as i64);
    }
}

async fn run_cycle(
    ctx: Arc<PollContext>,
    batches: Vec<Vec<BatchEntry>>,
) -> Vec<BatchOutcome> {
    join_all(batches.into_iter().map(|batch| {
        let ctx = ctx.clone();
        async move {
            let result = check_batch(&ctx, &batch).await;
            let keys = batch.into_iter().map(|(key, _, _)| key).collect();
            (keys, result)
        }
    }))
    .await
}

/// One long-polling request; returns the keys the server reports as changed.
async fn check_batch(
    ctx: &PollContext,
    batch: &[BatchEntry],
) -> Result<Vec<ConfigKey>> {
    let hold = ctx.poll.hold_timeout();
    let timeout = ctx.poll.client_timeout();

    let mut headers = vec![pair(LONG_POLLING_TIMEOUT_HEADER, hold.as_millis().to_string())];
    if batch.iter().any(|(_, _, initializing)| *initializing) {
        headers.push(pair(LONG_POLLING_NO_HANGUP_HEADER, "true"));
    }
    let body = build_listening_configs(batch.iter().map(|(key, md5, _)| (key, md5.as_str())));
    let params = vec![pair(PROBE_MODIFY_REQUEST, body)];

    let request = ctx
        .agent
        .http_post(CONFIG_LISTENER_PATH, &headers, &params, &ctx.encode, timeout);
    let result = match tokio::time::timeout(timeout, request).await {
        Ok(result) => result?,
        Err(_) => return Err(NetworkError::Timeout(timeout).into()),
    };

    if result.is_ok() {
        let changed = parse_changed_keys(&result.content);
        if !changed.is_empty() {
            debug!(client = %ctx.client, changed = changed.len(), "[polling-resp] config changed");
        }
        return Ok(changed);
    }
    if result.code == HTTP_FORBIDDEN {
        return Err(Error::AccessDenied {
            status: result.code,
            message: result.content,
        });
    }
    Err(Error::Server {
        status: result.code,
        message: result.content,
    })
}
