//! Change-detection poller
//!
//! A single background task per client. It repeatedly sends the fingerprints
//! of all watched keys to the server in long-polling requests (at most
//! `poll.keys_per_batch` keys each), fetches the full content of every key
//! the server reports as changed and hands it to the listener registry.
//!
//! The task owns the watched set and the registry. Callers reach it through
//! [`ConfigPoller`], whose requests are acknowledged once applied.

mod fetcher;
mod protocol;
mod worker;

pub(crate) use fetcher::*;
pub(crate) use worker::PollContext;
pub(crate) use worker::WatchSeed;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::filter::FilterChain;
use crate::listener::Listener;
use crate::listener::ListenerRegistry;
use crate::ConfigKey;
use crate::Error;
use crate::Result;
use worker::PollWorker;
use worker::PollerCommand;

const COMMAND_BUFFER: usize = 1024;

pub(crate) struct ConfigPoller {
    commands: mpsc::Sender<PollerCommand>,
    healthy: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigPoller {
    /// Starts the poller on the current runtime, which also becomes the
    /// default delivery runtime of listeners.
    pub(crate) fn spawn(
        ctx: PollContext,
        filters: FilterChain,
    ) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let healthy = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let registry = ListenerRegistry::new(ctx.client.clone(), filters, Handle::current());
        let worker = PollWorker::new(Arc::new(ctx), registry, rx, healthy.clone(), cancel.clone());
        let task = tokio::spawn(worker.run());

        Self {
            commands,
            healthy,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Binds `listener` to `key` and makes sure `key` is polled.
    pub(crate) async fn watch(
        &self,
        key: ConfigKey,
        listener: Arc<dyn Listener>,
        seed: Option<WatchSeed>,
    ) -> Result<()> {
        self.request(|ack| PollerCommand::Watch {
            key,
            listener,
            seed,
            ack,
        })
        .await
    }

    /// Unbinds `listener`; the key stops being polled with its last listener.
    pub(crate) async fn unwatch(
        &self,
        key: ConfigKey,
        listener: Arc<dyn Listener>,
    ) -> Result<()> {
        self.request(|ack| PollerCommand::Unwatch { key, listener, ack })
            .await
    }

    pub(crate) async fn reset_cursor(
        &self,
        key: ConfigKey,
    ) -> Result<()> {
        self.request(|ack| PollerCommand::ResetCursor { key, ack }).await
    }

    /// `false` while the latest poll cycle failed
    pub(crate) fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Stops polling and all listener deliveries; waits for the task to end.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "change poller ended abnormally");
            }
        }
    }

    async fn request<F>(
        &self,
        build: F,
    ) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<()>) -> PollerCommand,
    {
        let (ack, applied) = oneshot::channel();
        if self.cancel.is_cancelled() || self.commands.send(build(ack)).await.is_err() {
            return Err(Error::Fatal("change poller is stopped".into()));
        }
        applied
            .await
            .map_err(|_| Error::Fatal("change poller stopped before applying the request".into()))
    }
}

impl Drop for ConfigPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
